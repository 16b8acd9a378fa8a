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

    src/containers/eadf.rs

    Extended ADF (UAE--ADF v1 and UAE-1ADF) images: per-track headers with
    type, byte length and bit length, carrying both AmigaDOS and raw-MFM
    tracks.
*/

use crate::{
    disk::Disk,
    formats::{handler, init_track_info, raw::setup_uniform_raw_track, TrackType},
    io::{Read, ReadWriteSeek, Write},
    DiskError, SPEED_AVG,
};
use binrw::{binrw, BinRead, BinWrite};

const NR_TRACKS: usize = 166;

#[derive(Debug, Default)]
#[binrw]
#[brw(big)]
struct TrackHeader {
    rsvd: u16,
    ttype: u16,
    len: u32,
    bitlen: u32,
}

struct PendingTrack {
    ttype: u16,
    len: usize,
    bitlen: u32,
    sync: u16, // v1 raw tracks patch the sync word back in
}

pub struct EadfContainer;

pub static CONTAINER_EADF: EadfContainer = EadfContainer;

impl super::Container for EadfContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(NR_TRACKS);
    }

    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut r = file;
        let mut sig = [0u8; 8];
        r.read_exact(&mut sig)?;

        let ext_type = match &sig {
            b"UAE--ADF" => 1,
            b"UAE-1ADF" => 2,
            _ => {
                return Err(DiskError::ImageCorruptError(
                    "Bad signature in Ext-ADF header".to_string(),
                ))
            }
        };

        let nr_tracks = if ext_type == 1 {
            160
        }
        else {
            let mut hdr = [0u8; 4];
            r.read_exact(&mut hdr)?;
            u16::from_be_bytes([hdr[2], hdr[3]]) as usize
        };

        let mut pending = Vec::with_capacity(nr_tracks);
        for _ in 0..nr_tracks {
            if ext_type == 1 {
                let mut raw = [0u8; 4];
                r.read_exact(&mut raw)?;
                let sync = u16::from_be_bytes([raw[0], raw[1]]);
                let len = u16::from_be_bytes([raw[2], raw[3]]) as usize;
                pending.push(PendingTrack {
                    ttype: (sync != 0) as u16,
                    len,
                    bitlen: len as u32 * 8,
                    sync,
                });
            }
            else {
                let th = TrackHeader::read(&mut r)?;
                pending.push(PendingTrack {
                    ttype: th.ttype,
                    len: th.len as usize,
                    bitlen: th.bitlen,
                    sync: 0,
                });
            }
        }

        d.init_tracks(nr_tracks);

        for (tracknr, p) in pending.iter().enumerate() {
            if p.ttype > 1 {
                return Err(DiskError::ImageCorruptError(format!(
                    "Bad track type {} in Ext-ADF",
                    p.ttype
                )));
            }

            if p.len == 0 {
                d.track_mark_unformatted(tracknr);
                continue;
            }

            let mut dat = vec![0u8; p.len];
            r.read_exact(&mut dat)?;

            if p.ttype == 0 {
                // AmigaDOS sector track.
                if p.len < 11 * 512 {
                    return Err(DiskError::ImageCorruptError(format!(
                        "Bad ADOS track len {} in Ext-ADF",
                        p.len
                    )));
                }
                init_track_info(&mut d.di.tracks[tracknr], TrackType::Amigados);
                let write_sectors = handler(TrackType::Amigados).write_sectors.unwrap();
                match write_sectors(d, tracknr, &dat) {
                    Some(blob) => d.di.tracks[tracknr].dat = blob,
                    None => d.track_mark_unformatted(tracknr),
                }
            }
            else {
                // Raw MFM track. v1 images store the sync word out of band;
                // patch it back onto the front of the bitcell data.
                let (bitlen, raw_dat) = if ext_type == 1 {
                    let mut patched = Vec::with_capacity(dat.len() + 2);
                    patched.extend_from_slice(&p.sync.to_be_bytes());
                    patched.extend_from_slice(&dat);
                    (p.bitlen + 16, patched)
                }
                else {
                    (p.bitlen, dat)
                };
                setup_uniform_raw_track(d, tracknr, TrackType::RawDd, bitlen, &raw_dat);
                if ext_type == 1 {
                    d.di.tracks[tracknr].data_bitoff = 1024;
                }
            }
        }

        Ok(())
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut w = file;
        let nr_tracks = d.di.nr_tracks();

        w.write_all(b"UAE-1ADF")?;
        w.write_all(&0u16.to_be_bytes())?;
        w.write_all(&(nr_tracks as u16).to_be_bytes())?;

        let mut raws = Vec::with_capacity(nr_tracks);
        for tracknr in 0..nr_tracks {
            let ti = &d.di.tracks[tracknr];
            if ti.ttype == TrackType::Unformatted {
                TrackHeader {
                    rsvd: 0,
                    ttype: 1,
                    len: 0,
                    bitlen: 0,
                }
                .write(&mut w)?;
                raws.push(None);
                continue;
            }

            let raw = d.track_read_raw(tracknr);
            if raw.speed.iter().take(raw.bitlen).any(|&sp| sp != SPEED_AVG) {
                log::warn!(
                    "T{}.{}: Variable-density track cannot be correctly written to an Ext-ADF file",
                    crate::cyl(tracknr),
                    crate::hd(tracknr)
                );
            }
            TrackHeader {
                rsvd: 0,
                ttype: 1,
                len: ((raw.bitlen + 7) / 8) as u32,
                bitlen: raw.bitlen as u32,
            }
            .write(&mut w)?;
            raws.push(Some(raw));
        }

        for raw in raws.into_iter().flatten() {
            w.write_all(&raw.to_bytes())?;
        }

        Ok(())
    }
}
