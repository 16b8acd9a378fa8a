/*
    fluxforge
    https://github.com/dbalsom/fluxforge

    Copyright 2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/formats/raw.rs

    Dumb format for raw bitcell data, as from an extended ADF or an HFE
    image. The decoded payload stores two bytes of speed per byte of data:
    u16 speed[ceil(total_bits/8)] followed by the raw bitcell bytes.
*/

use crate::{
    disk::{Disk, TrackLength},
    flux::FluxStream,
    formats::{init_track_info, HandlerData, TrackDensity, TrackHandler, TrackType},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

const MAX_BYTES: usize = 100_000;

fn raw_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let ttype = d.di.tracks[tracknr].ttype;

    let mut dat: Vec<u8> = Vec::new();
    let mut speed: Vec<u32> = Vec::new();
    let mut tot_latency: u64 = 0;

    // One full revolution, byte at a time, measuring per-byte latency.
    loop {
        s.latency = 0;
        if s.next_bits(8).is_none() || dat.len() == MAX_BYTES {
            return None;
        }
        dat.push(s.word as u8);
        speed.push(s.latency as u32);
        tot_latency += s.latency;
        if s.index_offset_bc < 8 {
            break;
        }
    }

    let variable = matches!(
        ttype,
        TrackType::VariableRawSd | TrackType::VariableRawDd | TrackType::VariableRawHd | TrackType::VariableRawEd
    );
    if variable {
        let av_latency = (tot_latency / dat.len() as u64).max(1);
        for sp in speed.iter_mut() {
            *sp = ((*sp as u64 * SPEED_AVG as u64 + av_latency / 2) / av_latency) as u32;
        }
    }
    else {
        for sp in speed.iter_mut() {
            *sp = SPEED_AVG as u32;
        }
    }

    let total_bits = dat.len() as u32 * 8 - s.index_offset_bc;

    let ti = &mut d.di.tracks[tracknr];
    ti.total_bits = TrackLength::Fixed(total_bits);
    ti.data_bitoff = 0;

    // Marshal the descriptor block: speeds then data.
    let mut block = Vec::with_capacity(dat.len() * 3);
    for sp in &speed {
        block.extend_from_slice(&(*sp as u16).to_be_bytes());
    }
    block.extend_from_slice(&dat);
    Some(block)
}

fn raw_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let total_bits = ti.total_bits.fixed().unwrap_or(0) as usize;
    let nr_bytes = (total_bits + 7) / 8;
    let (speed, dat) = ti.dat.split_at(nr_bytes * 2);

    let spd = |i: usize| u16::from_be_bytes([speed[i * 2], speed[i * 2 + 1]]);

    for i in 0..total_bits / 8 {
        tbuf.bits(spd(i), crate::codec::BitcellEncoding::Raw, 8, dat[i] as u32);
    }
    if total_bits % 8 != 0 {
        let i = total_bits / 8;
        let rem = (total_bits % 8) as u32;
        tbuf.bits(spd(i), crate::codec::BitcellEncoding::Raw, rem, (dat[i] >> (8 - rem)) as u32);
    }
}

/// Install a uniform-density raw track directly from packed bitcell bytes.
pub fn setup_uniform_raw_track(d: &mut Disk, tracknr: usize, ttype: TrackType, nr_bits: u32, raw_dat: &[u8]) {
    let nr_bytes = (nr_bits as usize + 7) / 8;

    let ti = &mut d.di.tracks[tracknr];
    *ti = crate::disk::TrackInfo::default();
    init_track_info(ti, ttype);
    ti.total_bits = TrackLength::Fixed(nr_bits);
    ti.data_bitoff = 0;

    let mut block = Vec::with_capacity(nr_bytes * 3);
    for _ in 0..nr_bytes {
        block.extend_from_slice(&SPEED_AVG.to_be_bytes());
    }
    block.extend_from_slice(&raw_dat[..nr_bytes]);
    ti.dat = block;
}

/// Poke per-byte speed values into an installed raw track (HFEv3 variable
/// bitrate opcodes land here).
pub fn set_raw_track_speeds(d: &mut Disk, tracknr: usize, speeds: &[u16]) {
    let ti = &mut d.di.tracks[tracknr];
    let nr_bytes = ((ti.total_bits.fixed().unwrap_or(0) as usize) + 7) / 8;
    for (i, &sp) in speeds.iter().take(nr_bytes).enumerate() {
        ti.dat[i * 2..i * 2 + 2].copy_from_slice(&sp.to_be_bytes());
    }
}

const fn raw_handler(density: TrackDensity) -> TrackHandler {
    TrackHandler {
        density,
        bytes_per_sector: 0,
        nr_sectors: 0,
        write_raw: Some(raw_write_raw),
        read_raw: Some(raw_read_raw),
        write_sectors: None,
        read_sectors: None,
        extra: HandlerData::None,
    }
}

pub(crate) static RAW_SD_HANDLER: TrackHandler = raw_handler(TrackDensity::Single);
pub(crate) static RAW_DD_HANDLER: TrackHandler = raw_handler(TrackDensity::Double);
pub(crate) static RAW_HD_HANDLER: TrackHandler = raw_handler(TrackDensity::High);
pub(crate) static RAW_ED_HANDLER: TrackHandler = raw_handler(TrackDensity::Extra);
pub(crate) static VARIABLE_RAW_SD_HANDLER: TrackHandler = raw_handler(TrackDensity::Single);
pub(crate) static VARIABLE_RAW_DD_HANDLER: TrackHandler = raw_handler(TrackDensity::Double);
pub(crate) static VARIABLE_RAW_HD_HANDLER: TrackHandler = raw_handler(TrackDensity::High);
pub(crate) static VARIABLE_RAW_ED_HANDLER: TrackHandler = raw_handler(TrackDensity::Extra);
