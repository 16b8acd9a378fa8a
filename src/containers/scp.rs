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

    src/containers/scp.rs

    Write-only SuperCard Pro images: re-materialised flux timing at 25ns per
    tick. Weak regions are emitted as no-flux-area patterns designed to lose
    sync on real hardware.
*/

use crate::{
    disk::Disk,
    io::{ReadWriteSeek, Write},
    DiskError, SPEED_AVG, SPEED_WEAK,
};
use bitflags::bitflags;

const SCK_NS_PER_TICK: u32 = 25;

/* Thresholds beyond which we generate weak-bit patterns. */
const LONG_WEAK_THRESH: u32 = 1_000_000 / SCK_NS_PER_TICK; // 1000us
const SHORT_WEAK_THRESH: u32 = 100_000 / SCK_NS_PER_TICK; // 100us

const DISKTYPE_AMIGA: u8 = 4;

bitflags! {
    #[derive(Debug, Clone, Copy)]
    struct ScpFlags: u8 {
        const INDEX_CUED = 1 << 0;
        const TPI_96     = 1 << 1;
        const RPM_360    = 1 << 2;
        const NORMALIZED = 1 << 3;
        const WRITABLE   = 1 << 4;
        const FOOTER     = 1 << 5;
    }
}

pub struct ScpContainer;

pub static CONTAINER_SCP: ScpContainer = ScpContainer;

impl super::Container for ScpContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(168);
    }

    fn open(&self, _d: &mut Disk, _file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        // Not supported: SCP input goes through the flux stream layer.
        Err(DiskError::UnsupportedFormat)
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let nr_tracks = d.di.nr_tracks();
        let mut buf: Vec<u8> = Vec::new();

        // File header, patched with the checksum at the end.
        buf.extend_from_slice(b"SCP");
        buf.push(0); // version
        buf.push(DISKTYPE_AMIGA);
        buf.push(1); // revolutions
        buf.push(0); // start track
        buf.push(nr_tracks.saturating_sub(1) as u8);
        buf.push((ScpFlags::INDEX_CUED | ScpFlags::TPI_96 | ScpFlags::FOOTER).bits());
        buf.push(0); // 16-bit cell width
        buf.extend_from_slice(&[0u8; 2]); // reserved
        buf.extend_from_slice(&0u32.to_le_bytes()); // checksum placeholder

        let th_offs_pos = buf.len();
        buf.extend_from_slice(&vec![0u8; nr_tracks * 4]);

        let mut dat: Vec<u16> = Vec::new();
        for trk in 0..nr_tracks {
            let raw = d.track_read_raw(trk);

            let th_off = buf.len() as u32;
            buf[th_offs_pos + trk * 4..th_offs_pos + trk * 4 + 4].copy_from_slice(&th_off.to_le_bytes());

            dat.clear();

            // Rotate the track so the gap is at the index.
            let mut bit = raw.write_splice_bc;
            if bit > raw.data_start_bc {
                bit = 0; // don't mess with an already-aligned track
            }

            let track_ns = 60_000_000_000u64 / d.rpm as u64;
            let av_cell = (track_ns / raw.bitlen.max(1) as u64) as u32;
            let mut cell: u64 = 0;
            let mut is_weak = false;

            for _ in 0..raw.bitlen {
                if raw.speed[bit] == SPEED_WEAK {
                    cell += av_cell as u64;
                    is_weak = true;
                }
                else {
                    cell += (av_cell as u64 * raw.speed[bit] as u64) / SPEED_AVG as u64;
                    if raw.bit(bit) {
                        emit(&mut dat, (cell / SCK_NS_PER_TICK as u64) as u32, is_weak);
                        cell %= SCK_NS_PER_TICK as u64;
                        is_weak = false;
                    }
                }
                bit += 1;
                if bit >= raw.bitlen {
                    bit = 0;
                }
            }

            let cell = (cell / SCK_NS_PER_TICK as u64) as u32;
            if !dat.is_empty() && dat[0] != 0 && cell < SHORT_WEAK_THRESH && (dat[0] as u32 + cell) < 0x10000 {
                // Place the remainder in the first bitcell if the result is
                // small.
                dat[0] += cell as u16;
            }
            else if cell != 0 {
                // The remainder may be too significant to merge with the
                // first bitcell (e.g. a weak region): own final sample.
                emit(&mut dat, cell, is_weak);
            }

            let mut duration: u32 = 0;
            for &t in dat.iter() {
                duration = duration.wrapping_add(if t == 0 { 0x10000 } else { t as u32 });
            }

            // Track header followed by the big-endian samples.
            buf.extend_from_slice(b"TRK");
            buf.push(trk as u8);
            buf.extend_from_slice(&duration.to_le_bytes());
            buf.extend_from_slice(&(dat.len() as u32).to_le_bytes());
            buf.extend_from_slice(&16u32.to_le_bytes()); // data offset past header
            for &t in dat.iter() {
                buf.extend_from_slice(&t.to_be_bytes());
            }
        }

        // Footer.
        let app_name = b"fluxforge";
        let application_offset = buf.len() as u32;
        buf.extend_from_slice(&(app_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(app_name);

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|t| t.as_secs())
            .unwrap_or(0);
        buf.extend_from_slice(&0u32.to_le_bytes()); // manufacturer offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // model offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // serial offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // creator offset
        buf.extend_from_slice(&application_offset.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // comments offset
        buf.extend_from_slice(&now.to_le_bytes()); // creation time
        buf.extend_from_slice(&now.to_le_bytes()); // modification time
        buf.push(0x10); // application version
        buf.push(0); // hardware version
        buf.push(0); // firmware version
        buf.push(0x16); // format revision, 1.6
        buf.extend_from_slice(b"FPCS");

        // Checksum covers everything after the 16-byte file header.
        let csum: u32 = buf[0x10..].iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32));
        buf[12..16].copy_from_slice(&csum.to_le_bytes());

        file.write_all(&buf)?;
        Ok(())
    }
}

/// Append one flux interval, splitting long weak regions into patterns that
/// deliberately destabilise the read channel.
fn emit(dat: &mut Vec<u16>, mut cell: u32, is_weak: bool) {
    let one_us = 1000 / SCK_NS_PER_TICK;

    // A long pattern which transitions between 000101 and 010001.
    if is_weak && cell >= LONG_WEAK_THRESH {
        let min = 42 * one_us / 10;
        let max = 78 * one_us / 10;
        let mut delta = 0;
        while max * 2 < cell {
            dat.push((max - delta) as u16);
            cell -= max - delta;
            dat.push((min + delta) as u16);
            cell -= min + delta;
            delta += 2 * one_us / 10;
            if delta > max - min {
                delta = 0;
            }
        }
    }

    // A short pattern that seems to be good at losing sync:
    // 25us, 0.5us*6, 19us, 0.5us*4
    // The intention is to let the timing drift and weaken the eventual flux
    // transitions by placing read pulses very close together.
    if is_weak && cell >= SHORT_WEAK_THRESH {
        let mut delta = false;
        while 32 * one_us < cell {
            delta = !delta;
            let long = (19 + if delta { 6 } else { 0 }) * one_us;
            dat.push(long as u16);
            cell -= long;
            for _ in 0..if delta { 6 } else { 4 } {
                dat.push((5 * one_us / 10) as u16);
                cell -= 5 * one_us / 10;
            }
        }
    }

    // Handle 16-bit overflow (should never happen, since we subdivide long
    // empty regions with weak bits).
    while cell >= 0x10000 {
        dat.push(0);
        cell -= 0x10000;
    }

    // Final sample: everything else; must be nonzero (zero is special).
    dat.push(if cell != 0 { cell as u16 } else { 1 });
}
