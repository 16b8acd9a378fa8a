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

    src/containers/adf.rs

    Plain 880 KiB Amiga sector image: 11 sectors, 80 cylinders, 2 sides,
    assumed AmigaDOS throughout.
*/

use crate::{
    disk::Disk,
    formats::{handler, init_track_info, TrackType},
    io::{Read, ReadWriteSeek, Write},
    DiskError,
};

const NR_TRACKS: usize = 160;
const TRACK_BYTES: usize = 11 * 512;

pub struct AdfContainer;

pub static CONTAINER_ADF: AdfContainer = AdfContainer;

impl super::Container for AdfContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(NR_TRACKS);
    }

    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut img = Vec::new();
        file.read_to_end(&mut img)?;
        if img.len() != NR_TRACKS * TRACK_BYTES {
            return Err(DiskError::ImageCorruptError(format!(
                "ADF image has unexpected size {}",
                img.len()
            )));
        }

        d.init_tracks(NR_TRACKS);
        for tracknr in 0..NR_TRACKS {
            let chunk = &img[tracknr * TRACK_BYTES..(tracknr + 1) * TRACK_BYTES];
            init_track_info(&mut d.di.tracks[tracknr], TrackType::Amigados);
            let write_sectors = handler(TrackType::Amigados).write_sectors.unwrap();
            match write_sectors(d, tracknr, chunk) {
                Some(dat) => d.di.tracks[tracknr].dat = dat,
                None => d.track_mark_unformatted(tracknr),
            }
        }
        Ok(())
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        for tracknr in 0..d.di.nr_tracks().min(NR_TRACKS) {
            let ti = &d.di.tracks[tracknr];
            let sectors = handler(ti.ttype)
                .read_sectors
                .and_then(|read_sectors| read_sectors(d, tracknr));
            match sectors {
                Some(sectors) if sectors.len() >= TRACK_BYTES => {
                    file.write_all(&sectors[..TRACK_BYTES])?;
                }
                _ => {
                    // Unformatted or non-AmigaDOS track: blank sectors.
                    if ti.ttype != TrackType::Unformatted {
                        log::warn!(
                            "T{}.{}: Track format '{}' cannot be written to an ADF file",
                            crate::cyl(tracknr),
                            crate::hd(tracknr),
                            ti.typename
                        );
                    }
                    file.write_all(&[0u8; TRACK_BYTES])?;
                }
            }
        }
        Ok(())
    }
}
