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

    src/formats/federation_of_free_traders.rs

    Custom format as used in Federation Of Free Traders by Gremlin.

    Raw track layout:
     3 back-to-back sectors with explicit sector gap. Total encoded sector
     size, including gap, is 0xfc8 (4040) bytes.
    Raw sector:
     u8 0xa1,0xa1   :: 0x4489 sync marks
     u8 0xff
     u8 trk^1,sec
     u8 data[2000]
     u16 csum
     u8 gap[13]
    No even/odd split. The checksum is over encoded MFM words, *including*
    clock bits.
*/

use crate::{
    codec::{mfm_decode_word, mfm_encode_word, BitcellEncoding},
    disk::{Disk, SectorBitmap},
    flux::FluxStream,
    formats::{HandlerData, TrackDensity, TrackHandler},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

fn fof_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let (nr_sectors, bytes_per_sector) = {
        let ti = &d.di.tracks[tracknr];
        (ti.nr_sectors as usize, ti.bytes_per_sector as usize)
    };

    let mut block = vec![0u8; nr_sectors * bytes_per_sector];
    let mut valid = SectorBitmap::default();
    let mut nr_valid_blocks = 0usize;
    let mut least_block = usize::MAX;
    let mut data_bitoff = 0u32;

    'hunt: while nr_valid_blocks != nr_sectors {
        if s.next_bit().is_none() {
            break;
        }

        let idx_off = s.index_offset_bc.wrapping_sub(31);
        if s.word != 0x4489_4489 {
            continue;
        }

        if s.next_bits(32).is_none() {
            break;
        }
        if mfm_decode_word(s.word) != (0xff00 | (tracknr as u16 ^ 1)) {
            continue;
        }

        if s.next_bits(16).is_none() {
            break;
        }
        let sec = (mfm_decode_word(s.word) & 0xFF) as usize;
        if sec >= nr_sectors || valid.is_valid(sec) {
            continue;
        }

        let mut csum: u16 = 0;
        for i in 0..bytes_per_sector {
            if s.next_bits(16).is_none() {
                break 'hunt;
            }
            csum ^= s.word as u16;
            block[sec * bytes_per_sector + i] = (mfm_decode_word(s.word) & 0xFF) as u8;
        }

        if s.next_bits(32).is_none() {
            break;
        }
        if csum != mfm_decode_word(s.word) {
            continue;
        }

        valid.set_valid(sec);
        nr_valid_blocks += 1;
        if least_block > sec {
            data_bitoff = idx_off;
            least_block = sec;
        }
    }

    if nr_valid_blocks == 0 {
        return None;
    }

    let first_valid = (0..nr_sectors).find(|&i| valid.is_valid(i)).unwrap();
    data_bitoff = data_bitoff.wrapping_sub(first_valid as u32 * 0xfc8);

    let ti = &mut d.di.tracks[tracknr];
    ti.valid_sectors = valid;
    ti.data_bitoff = data_bitoff;

    Some(block)
}

fn fof_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let bytes_per_sector = ti.bytes_per_sector as usize;

    for i in 0..ti.nr_sectors as usize {
        let dat = &ti.dat[i * bytes_per_sector..(i + 1) * bytes_per_sector];

        // header
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0xff);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, tracknr as u32 ^ 1);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, i as u32);

        // data; seed the encoder with the preceding data byte so the first
        // clock bit comes out right
        let mut w: u32 = i as u32;
        let mut csum: u16 = 0;
        for &b in dat {
            w = (w << 8) | b as u32;
            csum ^= mfm_encode_word(w) as u16;
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, b as u32);
        }

        // csum
        if !ti.is_valid_sector(i) {
            csum = !csum; // bad checksum for an invalid sector
        }
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 16, csum as u32);

        // gap
        for _ in 0..13 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0);
        }
    }
}

pub(crate) static FEDERATION_OF_FREE_TRADERS_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: 2000,
    nr_sectors: 3,
    write_raw: Some(fof_write_raw),
    read_raw: Some(fof_read_raw),
    write_sectors: None,
    read_sectors: None,
    extra: HandlerData::None,
};
