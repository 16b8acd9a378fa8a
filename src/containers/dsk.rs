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

    src/containers/dsk.rs

    The native container. On-disk format:
     <disk_header>
     <track_header> * nr_tracks (each entry is disk_header.bytes_per_thdr)
     [<tag_header> tag data...]+
     <track data...>
    All fields are big endian.
*/

use crate::{
    disk::{Disk, DiskTag, SectorBitmap, TrackLength, DSKTAG_END},
    formats::{init_track_info, TrackType},
    io::{Cursor, Read, ReadWriteSeek, Seek, SeekFrom, Write},
    DiskError,
};
use binrw::{binrw, BinRead, BinWrite};

/// `total_bits` sentinel for flakey-bit tracks.
const TRK_WEAK: u32 = 0xFFFF_FFFF;

const DEFAULT_NR_TRACKS: usize = 168;

#[derive(Debug)]
#[binrw]
#[brw(big)]
struct DiskHeader {
    signature: [u8; 4], // "DSK\0"
    version: u16,       // must be 0
    nr_tracks: u16,
    bytes_per_thdr: u16, // forward-compat: readers accept >= own size
    flags: u16,
}

#[derive(Debug, Default)]
#[binrw]
#[brw(big)]
struct TrackHeader {
    ttype: u16,
    flags: u16,
    nr_sectors: u16,
    bytes_per_sector: u16,
    valid_sectors: [u8; 8],
    off: u32,
    len: u32,
    data_bitoff: u32,
    total_bits: u32,
}

const TRACK_HEADER_BYTES: usize = 32;

#[derive(Debug)]
#[binrw]
#[brw(big)]
struct TagHeader {
    id: u16,
    len: u16,
}

fn track_length_to_wire(len: TrackLength) -> u32 {
    match len {
        TrackLength::Fixed(n) => n,
        TrackLength::Weak => TRK_WEAK,
        TrackLength::Unknown => 0,
    }
}

fn track_length_from_wire(raw: u32) -> TrackLength {
    match raw {
        TRK_WEAK => TrackLength::Weak,
        0 => TrackLength::Unknown,
        n => TrackLength::Fixed(n),
    }
}

pub struct DskContainer;

pub static CONTAINER_DSK: DskContainer = DskContainer;

impl super::Container for DskContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(DEFAULT_NR_TRACKS);
    }

    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut r = file;
        let dh = DiskHeader::read(&mut r)?;
        if &dh.signature != b"DSK\0" || dh.version != 0 {
            return Err(DiskError::ImageCorruptError(
                "Bad signature or version in DSK header".to_string(),
            ));
        }

        let nr_tracks = dh.nr_tracks as usize;
        let bytes_per_thdr = dh.bytes_per_thdr as usize;
        if bytes_per_thdr < TRACK_HEADER_BYTES {
            return Err(DiskError::ImageCorruptError(format!(
                "DSK track header too small ({bytes_per_thdr} bytes)"
            )));
        }
        d.di.flags = dh.flags;
        d.di.tracks = Vec::with_capacity(nr_tracks);

        let mut headers = Vec::with_capacity(nr_tracks);
        for _ in 0..nr_tracks {
            let mut raw = vec![0u8; bytes_per_thdr];
            r.read_exact(&mut raw)?;
            let th = TrackHeader::read(&mut Cursor::new(&raw[..TRACK_HEADER_BYTES]))?;
            headers.push(th);
        }

        let tag_pos = r.stream_position()?;

        for th in &headers {
            let ttype = TrackType::from_repr(th.ttype).unwrap_or_else(|| {
                log::warn!("DSK: Unknown track type {}; treating as unformatted", th.ttype);
                TrackType::Unformatted
            });
            let mut ti = crate::disk::TrackInfo::default();
            init_track_info(&mut ti, ttype);
            ti.flags = th.flags;
            ti.nr_sectors = th.nr_sectors;
            ti.bytes_per_sector = th.bytes_per_sector as u32;
            ti.valid_sectors = SectorBitmap(th.valid_sectors);
            ti.data_bitoff = th.data_bitoff;
            ti.total_bits = track_length_from_wire(th.total_bits);

            r.seek(SeekFrom::Start(th.off as u64))?;
            ti.dat = vec![0u8; th.len as usize];
            r.read_exact(&mut ti.dat)?;

            d.di.tracks.push(ti);
        }

        // Tag list, terminated by the end marker.
        r.seek(SeekFrom::Start(tag_pos))?;
        loop {
            let tagh = TagHeader::read(&mut r)?;
            let mut payload = vec![0u8; tagh.len as usize];
            r.read_exact(&mut payload)?;
            if tagh.id == DSKTAG_END {
                break;
            }
            match DiskTag::from_wire(tagh.id, &payload) {
                Some(tag) => {
                    d.set_tag(tag);
                }
                None => log::warn!("DSK: Unknown tag id {}; dropped", tagh.id),
            }
        }

        Ok(())
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut w = file;
        let nr_tracks = d.di.nr_tracks();

        let dh = DiskHeader {
            signature: *b"DSK\0",
            version: 0,
            nr_tracks: nr_tracks as u16,
            bytes_per_thdr: TRACK_HEADER_BYTES as u16,
            flags: d.di.flags,
        };
        dh.write(&mut w)?;

        let mut datoff = 12 + nr_tracks * TRACK_HEADER_BYTES;
        for tag in d.tags() {
            datoff += 4 + tag.payload_be().len();
        }
        datoff += 4; // end tag

        for ti in &d.di.tracks {
            let th = TrackHeader {
                ttype: ti.ttype as u16,
                flags: ti.flags,
                nr_sectors: ti.nr_sectors,
                bytes_per_sector: ti.bytes_per_sector as u16,
                valid_sectors: ti.valid_sectors.0,
                off: datoff as u32,
                len: ti.dat.len() as u32,
                data_bitoff: ti.data_bitoff,
                total_bits: track_length_to_wire(ti.total_bits),
            };
            th.write(&mut w)?;
            datoff += ti.dat.len();
        }

        for tag in d.tags() {
            let payload = tag.payload_be();
            TagHeader {
                id: tag.id(),
                len: payload.len() as u16,
            }
            .write(&mut w)?;
            w.write_all(&payload)?;
        }
        TagHeader { id: DSKTAG_END, len: 0 }.write(&mut w)?;

        for ti in &d.di.tracks {
            if !ti.dat.is_empty() {
                w.write_all(&ti.dat)?;
            }
        }

        Ok(())
    }
}
