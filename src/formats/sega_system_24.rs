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

    src/formats/sega_system_24.rs

    Custom IBM-based format used on disks for the Sega System 24.
    Sectors 1-5: 2kB, sector 6: 1kB, sector 7: 256 bytes.
*/

use crate::{
    codec::{
        ibm::{scan_dam, scan_idam, IBM_MARK_DAM},
        mfm_decode_bytes, BitcellEncoding,
    },
    disk::{Disk, SectorBitmap},
    flux::FluxStream,
    formats::{HandlerData, TrackDensity, TrackHandler},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

const TRACK_LEN: usize = 5 * 2048 + 1024 + 256;

fn sec_no(sec: usize) -> u8 {
    match sec {
        0..=4 => 4,
        5 => 3,
        _ => 1,
    }
}

fn sec_off(sec: usize) -> usize {
    if sec < 6 {
        sec * 2048
    }
    else {
        11 * 1024
    }
}

fn s24_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let nr_sectors = d.di.tracks[tracknr].nr_sectors as usize;

    let mut block = vec![0u8; TRACK_LEN];
    let mut valid = SectorBitmap::default();
    let mut nr_valid_blocks = 0usize;

    while nr_valid_blocks != nr_sectors {
        // IDAM
        let Some((mut idam, _)) = scan_idam(s) else {
            break;
        };
        if s.crc16_ccitt != 0 {
            continue;
        }

        idam.sec = idam.sec.wrapping_sub(1);
        let sec = idam.sec as usize;
        if sec >= nr_sectors
            || idam.cyl as usize != crate::cyl(tracknr)
            || idam.head as usize != crate::hd(tracknr)
            || idam.no != sec_no(sec)
        {
            log::warn!(
                "T{}.{}: Unexpected IDAM sec={:02x} cyl={:02x} hd={:02x} no={:02x}",
                crate::cyl(tracknr),
                crate::hd(tracknr),
                idam.sec.wrapping_add(1),
                idam.cyl,
                idam.head,
                idam.no
            );
            continue;
        }

        if valid.is_valid(sec) {
            continue;
        }

        // DAM
        let sec_sz = 128usize << idam.no;
        let mut raw = vec![0u8; 2 * sec_sz];
        if scan_dam(s) != Some(IBM_MARK_DAM)
            || s.next_bytes(&mut raw).is_none()
            || s.next_bits(32).is_none()
            || s.crc16_ccitt != 0
        {
            continue;
        }

        mfm_decode_bytes(
            BitcellEncoding::Mfm,
            sec_sz,
            &raw,
            &mut block[sec_off(sec)..sec_off(sec) + sec_sz],
        );
        valid.set_valid(sec);
        nr_valid_blocks += 1;
    }

    if nr_valid_blocks == 0 {
        return None;
    }

    let ti = &mut d.di.tracks[tracknr];
    ti.valid_sectors = valid;
    ti.data_bitoff = 500;

    Some(block)
}

fn s24_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let cyl = crate::cyl(tracknr) as u32;
    let hd = crate::hd(tracknr) as u32;

    for sec in 0..ti.nr_sectors as usize {
        // IDAM
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_5554);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, cyl);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, hd);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, sec as u32 + 1);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, sec_no(sec) as u32);
        tbuf.emit_crc16_ccitt(SPEED_AVG);
        for _ in 0..22 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }

        // DAM
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_5545);
        let sec_sz = 128usize << sec_no(sec);
        tbuf.bytes(
            SPEED_AVG,
            BitcellEncoding::Mfm,
            &ti.dat[sec_off(sec)..sec_off(sec) + sec_sz],
        );
        tbuf.emit_crc16_ccitt(SPEED_AVG);
        for _ in 0..50 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }
    }
}

fn s24_write_sectors(d: &mut Disk, tracknr: usize, sectors: &[u8]) -> Option<Vec<u8>> {
    let total_bits = crate::default_bits_per_track(d.rpm) * 2; // HD cells
    let ti = &mut d.di.tracks[tracknr];
    if sectors.len() < TRACK_LEN {
        return None;
    }
    ti.set_all_sectors_valid();
    ti.data_bitoff = 500;
    ti.total_bits = crate::disk::TrackLength::Fixed(total_bits);
    Some(sectors[..TRACK_LEN].to_vec())
}

fn s24_read_sectors(d: &Disk, tracknr: usize) -> Option<Vec<u8>> {
    let ti = &d.di.tracks[tracknr];
    if ti.dat.is_empty() {
        return None;
    }
    Some(ti.dat.clone())
}

pub(crate) static SEGA_SYSTEM_24_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::High,
    bytes_per_sector: 2048,
    nr_sectors: 7,
    write_raw: Some(s24_write_raw),
    read_raw: Some(s24_read_raw),
    write_sectors: Some(s24_write_sectors),
    read_sectors: Some(s24_read_sectors),
    extra: HandlerData::None,
};
