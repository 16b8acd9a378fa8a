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

    src/formats/amigados.rs

    The AmigaDOS track format and its variants.

    Raw track layout:
     544 decoded bytes per sector (including sector gap), 11 back-to-back
     sectors. Decoded sector:
      u8 0x00,0x00 :: sector gap
      u8 0xa1,0xa1 :: sync header (encoded as 0x4489 0x4489)
      u8 format    :: always 0xff
      u8 track     :: 0-159
      u8 sector    :: 0-10
      u8 sec_to_gap:: 1-11
      u8 label[16] :: usually zero
      u32 hdr_csum :: (XOR raw MFM) & 0x55555555
      u32 dat_csum
      u8 data[512]
     All header and data fields use the even/odd block interleave.

    Decoded data layout: u8 sector_data[11][512].

    The extended form additionally records per-sector sync, header bytes and
    speed, for titles that stash custom data in the label area or replace the
    sync word (Z Out track 1 uses 0x4521).
*/

use crate::{
    codec::{amigados_checksum, mfm_decode_bytes, BitcellEncoding},
    disk::{Disk, SectorBitmap, TrackLength},
    flux::FluxStream,
    formats::{handler, init_track_info, HandlerData, TrackDensity, TrackHandler, TrackType},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

/// Sector data sizes for the plain and extended layouts.
const STD_SEC: usize = 512;
const EXT_HDR: usize = 26; // sync(4) + header(20) + speed(2)
const EXT_SEC: usize = STD_SEC + EXT_HDR;

static SYNCS: [u32; 2] = [
    0x4489_4489,
    0x4521_4521, // Z Out, track 1
];

fn ados_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let (nr_sectors, ttype) = {
        let ti = &d.di.tracks[tracknr];
        (ti.nr_sectors as usize, ti.ttype)
    };

    let mut block = vec![0u8; EXT_SEC * nr_sectors];
    for sec in block.chunks_exact_mut(EXT_SEC) {
        for j in 0..STD_SEC / 16 {
            sec[EXT_HDR + j * 16..EXT_HDR + (j + 1) * 16].copy_from_slice(b"-=[BAD SECTOR]=-");
        }
    }

    let mut latency = vec![0u64; nr_sectors];
    let mut valid = SectorBitmap::default();
    let mut nr_valid_blocks = 0usize;
    let mut has_extended_blocks = false;
    let mut least_block = 0u8;
    let mut data_bitoff = 0u32;

    while nr_valid_blocks != nr_sectors {
        if s.next_bit().is_none() {
            break;
        }

        let sync = s.word;
        if !SYNCS.contains(&sync) {
            continue;
        }
        let idx_off = s.index_offset_bc.wrapping_sub(31);

        let mut lat = s.latency;
        let mut raw = [0u8; 2 * (28 + STD_SEC)];
        if s.next_bytes(&mut raw).is_none() {
            break;
        }
        lat = s.latency - lat;

        let mut hdr = [0u8; 20];
        let mut hdr_csum = [0u8; 4];
        let mut dat_csum = [0u8; 4];
        let mut dat = [0u8; STD_SEC];
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 4, &raw[0..8], &mut hdr[0..4]);
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 16, &raw[8..40], &mut hdr[4..20]);
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 4, &raw[40..48], &mut hdr_csum);
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 4, &raw[48..56], &mut dat_csum);
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, STD_SEC, &raw[56..], &mut dat);

        let hdr_csum = u32::from_be_bytes(hdr_csum);
        let dat_csum = u32::from_be_bytes(dat_csum);
        if amigados_checksum(&hdr) != hdr_csum || amigados_checksum(&dat) != dat_csum {
            continue;
        }

        let format = hdr[0];
        let track = hdr[1];
        let sector = hdr[2] as usize;
        let sectors_to_gap = hdr[3];
        let lbl = &hdr[4..20];

        if sector >= nr_sectors || valid.is_valid(sector) {
            continue;
        }

        // Detect non-standard header info.
        if format != 0xff || track as usize != tracknr || sync != SYNCS[0] {
            has_extended_blocks = true;
        }
        if lbl.iter().any(|&b| b != 0) {
            has_extended_blocks = true;
        }

        let ext = &mut block[sector * EXT_SEC..(sector + 1) * EXT_SEC];
        ext[0..4].copy_from_slice(&sync.to_be_bytes());
        ext[4..24].copy_from_slice(&hdr);
        ext[26..].copy_from_slice(&dat);
        latency[sector] = lat;

        valid.set_valid(sector);
        nr_valid_blocks += 1;
        if least_block < sectors_to_gap {
            data_bitoff = idx_off;
            least_block = sectors_to_gap;
        }
    }

    if nr_valid_blocks == 0 {
        return None;
    }

    // Average block latency over the recovered sectors.
    let mut avg_lat: u64 = 0;
    for sector in 0..nr_sectors {
        if valid.is_valid(sector) {
            avg_lat += latency[sector];
        }
    }
    avg_lat /= nr_valid_blocks as u64;

    // Long and short blocks are only recorded for the variable-rate type;
    // everywhere else they normalise to the average.
    for sector in 0..nr_sectors {
        let mut speed = ((latency[sector] * SPEED_AVG as u64) / avg_lat.max(1)) as u32;
        if !valid.is_valid(sector) || ttype != TrackType::AmigadosVarrate {
            speed = SPEED_AVG as u32;
        }
        else if speed > (SPEED_AVG as u32 * 102) / 100 {
            speed = (SPEED_AVG as u32 * 105) / 100;
            has_extended_blocks = true;
        }
        else if speed < (SPEED_AVG as u32 * 98) / 100 {
            speed = (SPEED_AVG as u32 * 95) / 100;
            has_extended_blocks = true;
        }
        else {
            speed = SPEED_AVG as u32;
        }
        block[sector * EXT_SEC + 24..sector * EXT_SEC + 26].copy_from_slice(&(speed as u16).to_be_bytes());
    }

    if !has_extended_blocks {
        // Compact to the plain per-sector data layout.
        let mut plain = vec![0u8; STD_SEC * nr_sectors];
        for sector in 0..nr_sectors {
            plain[sector * STD_SEC..(sector + 1) * STD_SEC]
                .copy_from_slice(&block[sector * EXT_SEC + EXT_HDR..(sector + 1) * EXT_SEC]);
        }
        block = plain;
    }

    let ti = &mut d.di.tracks[tracknr];
    init_track_info(
        ti,
        if has_extended_blocks {
            TrackType::AmigadosExtended
        }
        else {
            TrackType::Amigados
        },
    );
    ti.valid_sectors = valid;

    // Extrapolate back from the first recovered block to the track start.
    data_bitoff = data_bitoff.wrapping_sub((11 - least_block as u32) * 544 * 8 * 2);
    data_bitoff = data_bitoff.wrapping_sub(32); // initial gap
    ti.data_bitoff = data_bitoff;

    Some(block)
}

fn ados_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let extended = ti.ttype == TrackType::AmigadosExtended;
    let sec_len = if extended { EXT_SEC } else { STD_SEC };

    for sector in 0..ti.nr_sectors as usize {
        let rec = &ti.dat[sector * sec_len..(sector + 1) * sec_len];

        let mut speed = SPEED_AVG;
        let mut sync = SYNCS[0];
        let mut hdr = [0u8; 20];
        hdr[0] = 0xff;
        hdr[1] = tracknr as u8;

        let dat = if extended {
            speed = u16::from_be_bytes([rec[24], rec[25]]);
            sync = u32::from_be_bytes([rec[0], rec[1], rec[2], rec[3]]);
            hdr.copy_from_slice(&rec[4..24]);
            &rec[EXT_HDR..]
        }
        else {
            rec
        };

        hdr[2] = sector as u8;
        hdr[3] = 11 - sector as u8;

        // gap
        tbuf.bits(speed, BitcellEncoding::Mfm, 16, 0);
        // sync mark
        tbuf.bits(speed, BitcellEncoding::Raw, 32, sync);
        // info + label
        tbuf.bytes(speed, BitcellEncoding::MfmEvenOdd, &hdr[0..4]);
        tbuf.bytes(speed, BitcellEncoding::MfmEvenOdd, &hdr[4..20]);
        // header checksum
        let csum = amigados_checksum(&hdr);
        tbuf.bits(speed, BitcellEncoding::MfmEvenOdd, 32, csum);
        // data checksum
        let csum = amigados_checksum(dat);
        tbuf.bits(speed, BitcellEncoding::MfmEvenOdd, 32, csum);
        // data
        tbuf.bytes(speed, BitcellEncoding::MfmEvenOdd, dat);
    }
}

/// Dummy sector image used by multi-format disks; plain AmigaDOS tracks
/// export their decoded payload directly.
fn ados_read_sectors(d: &Disk, tracknr: usize) -> Option<Vec<u8>> {
    let ti = &d.di.tracks[tracknr];
    if ti.ttype != TrackType::Amigados {
        return None;
    }
    Some(ti.dat.clone())
}

fn ados_write_sectors(d: &mut Disk, tracknr: usize, sectors: &[u8]) -> Option<Vec<u8>> {
    let total_bits = crate::default_bits_per_track(d.rpm);
    let ti = &mut d.di.tracks[tracknr];
    let len = STD_SEC * ti.nr_sectors as usize;
    if sectors.len() < len {
        return None;
    }
    ti.set_all_sectors_valid();
    ti.data_bitoff = 1024;
    ti.total_bits = TrackLength::Fixed(total_bits);
    Some(sectors[..len].to_vec())
}

pub(crate) static AMIGADOS_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: STD_SEC as u32,
    nr_sectors: 11,
    write_raw: Some(ados_write_raw),
    read_raw: Some(ados_read_raw),
    write_sectors: Some(ados_write_sectors),
    read_sectors: Some(ados_read_sectors),
    extra: HandlerData::None,
};

pub(crate) static AMIGADOS_VARRATE_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: STD_SEC as u32,
    nr_sectors: 11,
    write_raw: Some(ados_write_raw),
    read_raw: Some(ados_read_raw),
    write_sectors: None,
    read_sectors: None,
    extra: HandlerData::None,
};

pub(crate) static AMIGADOS_EXTENDED_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: EXT_SEC as u32,
    nr_sectors: 11,
    write_raw: Some(ados_write_raw),
    read_raw: Some(ados_read_raw),
    write_sectors: None,
    read_sectors: None,
    extra: HandlerData::None,
};

/* AmigaDOS long tracks: dummy types and a write handler which increase the
 * track gap by a defined amount. Used where the protection routine does not
 * check for any data in the track gap, or expects only MFM-encoded zeros. */

static LONG_TYPES: [(TrackType, u32); 7] = [
    (TrackType::AmigadosLong102200, 102_200),
    (TrackType::AmigadosLong103300, 103_300),
    (TrackType::AmigadosLong104400, 104_400),
    (TrackType::AmigadosLong105500, 105_500),
    (TrackType::AmigadosLong106600, 106_600),
    (TrackType::AmigadosLong108800, 108_800),
    (TrackType::AmigadosLong111000, 111_000),
];

fn ados_longtrack_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let requested = d.di.tracks[tracknr].ttype;
    let mut total_bits = match handler(requested).extra {
        HandlerData::TotalBits(n) => n,
        _ => 0,
    };
    let mut typename = requested.name();

    init_track_info(&mut d.di.tracks[tracknr], TrackType::Amigados);
    let ablk = (AMIGADOS_HANDLER.write_raw.unwrap())(d, tracknr, s)?;

    if total_bits == 0 {
        // Unknown length: bucket the observed revolution into the nearest
        // defined long-track variant.
        let _ = s.next_index();
        if s.track_len_bc <= 101_100 {
            return Some(ablk); // not long
        }
        let mut pick = LONG_TYPES.len() - 1;
        for i in 0..LONG_TYPES.len() - 1 {
            let midpoint = (LONG_TYPES[i].1 + LONG_TYPES[i + 1].1) / 2;
            if s.track_len_bc <= midpoint {
                pick = i;
                break;
            }
        }
        total_bits = LONG_TYPES[pick].1;
        typename = LONG_TYPES[pick].0.name();
    }

    let ti = &mut d.di.tracks[tracknr];
    ti.total_bits = TrackLength::Fixed(total_bits);
    ti.typename = typename;
    Some(ablk)
}

const fn ados_longtrack(total_bits: u32) -> TrackHandler {
    TrackHandler {
        density: TrackDensity::Double,
        bytes_per_sector: 0,
        nr_sectors: 0,
        write_raw: Some(ados_longtrack_write_raw),
        read_raw: None,
        write_sectors: None,
        read_sectors: None,
        extra: HandlerData::TotalBits(total_bits),
    }
}

pub(crate) static AMIGADOS_LONG_102200_HANDLER: TrackHandler = ados_longtrack(102_200);
pub(crate) static AMIGADOS_LONG_103300_HANDLER: TrackHandler = ados_longtrack(103_300);
pub(crate) static AMIGADOS_LONG_104400_HANDLER: TrackHandler = ados_longtrack(104_400);
pub(crate) static AMIGADOS_LONG_105500_HANDLER: TrackHandler = ados_longtrack(105_500);
pub(crate) static AMIGADOS_LONG_106600_HANDLER: TrackHandler = ados_longtrack(106_600);
pub(crate) static AMIGADOS_LONG_108800_HANDLER: TrackHandler = ados_longtrack(108_800);
pub(crate) static AMIGADOS_LONG_111000_HANDLER: TrackHandler = ados_longtrack(111_000);

pub(crate) static AMIGADOS_UNKNOWN_LENGTH_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: 0,
    nr_sectors: 0,
    write_raw: Some(ados_longtrack_write_raw),
    read_raw: None,
    write_sectors: None,
    read_sectors: None,
    extra: HandlerData::None,
};
