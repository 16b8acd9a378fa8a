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

    src/containers/ipf.rs

    Write-only SPS/CAPS IPF export. Each track becomes an IMGE record plus a
    DATA record whose extra data block carries one CAPS block descriptor and
    a single raw-cell data stream. All chunk fields are big endian with a
    per-chunk reversed CRC32 computed over the chunk with a zeroed CRC field.
*/

use crate::{
    disk::{Disk, DiskTag, DSKTAG_DISK_NR},
    formats::TrackType,
    io::{ReadWriteSeek, Write},
    DiskError,
};
use binrw::{binrw, BinWrite};

#[derive(Debug)]
#[binrw]
#[brw(big)]
struct InfoRecord {
    media_type: u32,   // 1 = floppy disk
    encoder_type: u32, // 1 = CAPS
    encoder_rev: u32,
    file_key: u32,
    file_rev: u32,
    origin: u32,
    min_track: u32,
    max_track: u32,
    min_side: u32,
    max_side: u32,
    creation_date: u32, // (year, month, day) encoded decimal
    creation_time: u32, // (hour, minute, second, tick) encoded decimal
    platforms: [u32; 4],
    disk_number: u32,
    creator_id: u32,
    reserved: [u8; 12],
}

#[derive(Debug)]
#[binrw]
#[brw(big)]
struct ImageRecord {
    track: u32,
    side: u32,
    density: u32,     // 2 = auto
    signal_type: u32, // 1 = 2us cell
    track_bytes: u32,
    start_byte_pos: u32,
    start_bit_pos: u32,
    data_bits: u32,
    gap_bits: u32,
    track_bits: u32,
    block_count: u32,
    encoder_process: u32,
    track_flags: u32,
    data_key: u32,
    reserved: [u32; 3],
}

#[derive(Debug)]
#[binrw]
#[brw(big)]
struct DataRecord {
    length: u32,   // length of the extra data block
    bit_size: u32, // length * 8
    crc: u32,      // CRC of the extra data block
    data_key: u32, // matches the IMGE record
}

/// 'CRC32 Reverse' hasher used throughout IPF files.
struct IpfCrcHasher {
    crc: u32,
}

impl IpfCrcHasher {
    fn new() -> Self {
        Self { crc: 0xFFFF_FFFF }
    }

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.crc ^= byte as u32;
            for _ in 0..8 {
                if self.crc & 1 != 0 {
                    self.crc = (self.crc >> 1) ^ 0xEDB8_8320;
                }
                else {
                    self.crc >>= 1;
                }
            }
        }
    }

    fn finalize(&self) -> u32 {
        !self.crc
    }
}

fn ipf_crc(data: &[u8]) -> u32 {
    let mut hasher = IpfCrcHasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], data: &[u8]) {
    let size = 12 + data.len() as u32;

    // The chunk CRC is computed with the CRC field itself zeroed.
    let mut hasher = IpfCrcHasher::new();
    hasher.update(id);
    hasher.update(&size.to_be_bytes());
    hasher.update(&[0u8; 4]);
    hasher.update(data);
    let crc = hasher.finalize();

    out.extend_from_slice(id);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(data);
}

fn record_bytes<T: for<'a> BinWrite<Args<'a> = ()>>(rec: &T) -> Vec<u8> {
    let mut cur = crate::io::Cursor::new(Vec::new());
    rec.write_be(&mut cur).expect("in-memory record write");
    cur.into_inner()
}

pub struct IpfContainer;

pub static CONTAINER_IPF: IpfContainer = IpfContainer;

impl super::Container for IpfContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(168);
    }

    fn open(&self, _d: &mut Disk, _file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        Err(DiskError::UnsupportedFormat)
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let nr_tracks = d.di.nr_tracks();
        let mut out: Vec<u8> = Vec::new();

        write_chunk(&mut out, b"CAPS", &[]);

        let disk_number = match d.get_tag_by_id(DSKTAG_DISK_NR) {
            Some(DiskTag::DiskNr(nr)) => *nr,
            _ => 1,
        };

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|t| t.as_secs())
            .unwrap_or(0);
        let days = now / 86_400;
        let rem = now % 86_400;

        let info = InfoRecord {
            media_type: 1,
            encoder_type: 1,
            encoder_rev: 1,
            file_key: 0,
            file_rev: 1,
            origin: 0,
            min_track: 0,
            max_track: (nr_tracks.saturating_sub(1) / 2) as u32,
            min_side: 0,
            max_side: 1,
            creation_date: (1970 + days / 365) as u32 * 10_000, // coarse; readers ignore
            creation_time: ((rem / 3600) * 10_000_000 + ((rem % 3600) / 60) * 100_000 + (rem % 60) * 1000) as u32,
            platforms: [1, 0, 0, 0], // Amiga
            disk_number,
            creator_id: 0,
            reserved: [0; 12],
        };
        write_chunk(&mut out, b"INFO", &record_bytes(&info));

        for tracknr in 0..nr_tracks {
            if d.di.tracks[tracknr].ttype == TrackType::Unformatted {
                continue;
            }
            let raw = d.track_read_raw(tracknr);
            let data_key = tracknr as u32 + 1;
            let track_bytes = ((raw.bitlen + 7) / 8) as u32;

            let imge = ImageRecord {
                track: crate::cyl(tracknr) as u32,
                side: crate::hd(tracknr) as u32,
                density: 2,
                signal_type: 1,
                track_bytes,
                start_byte_pos: raw.data_start_bc as u32 / 8,
                start_bit_pos: raw.data_start_bc as u32,
                data_bits: raw.bitlen as u32,
                gap_bits: 0,
                track_bits: raw.bitlen as u32,
                block_count: 1,
                encoder_process: 0,
                track_flags: 0,
                data_key,
                reserved: [0; 3],
            };
            write_chunk(&mut out, b"IMGE", &record_bytes(&imge));

            // Extra data block: one CAPS block descriptor plus a raw-cell
            // data stream, referenced by data_key from the record above.
            let cells = raw.to_bytes();
            let mut stream: Vec<u8> = Vec::new();
            // Raw element: type 4, byte-count size follows in width bytes.
            let size = cells.len() as u32;
            let width = (4 - size.leading_zeros() as usize / 8).max(1);
            stream.push(0x04 | ((width as u8) << 5));
            stream.extend_from_slice(&size.to_be_bytes()[4 - width..]);
            stream.extend_from_slice(&cells);
            stream.push(0x00); // end element

            let mut extra: Vec<u8> = Vec::new();
            let descriptor: [u32; 8] = [
                raw.bitlen as u32, // data_bits
                0,                 // gap_bits
                track_bytes,       // data_bytes
                0,                 // gap_bytes
                1,                 // block encoder type
                0,                 // block flags
                0,                 // default gap value
                32,                // data stream offset
            ];
            for word in descriptor {
                extra.extend_from_slice(&word.to_be_bytes());
            }
            extra.extend_from_slice(&stream);

            let rec = DataRecord {
                length: extra.len() as u32,
                bit_size: extra.len() as u32 * 8,
                crc: ipf_crc(&extra),
                data_key,
            };
            write_chunk(&mut out, b"DATA", &record_bytes(&rec));
            // The extra data block trails its DATA chunk.
            out.extend_from_slice(&extra);
        }

        file.write_all(&out)?;
        Ok(())
    }
}
