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

    src/containers/img.rs

    Write-only plain sector image (IMG/IMA/ST): the filesystem-level export
    of each track's sector array, concatenated in track order.
*/

use crate::{
    disk::Disk,
    formats::{handler, TrackType},
    io::{ReadWriteSeek, Write},
    DiskError,
};

pub struct ImgContainer;

pub static CONTAINER_IMG: ImgContainer = ImgContainer;

impl super::Container for ImgContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(168);
    }

    fn open(&self, _d: &mut Disk, _file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        Err(DiskError::UnsupportedFormat)
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        // Unformatted tracks pad with blank sectors matching the prevailing
        // geometry, so cylinders keep their file offsets.
        let track_bytes = d
            .di
            .tracks
            .iter()
            .map(|ti| ti.nr_sectors as usize * ti.bytes_per_sector as usize)
            .max()
            .unwrap_or(0);

        for tracknr in 0..d.di.nr_tracks() {
            let ti = &d.di.tracks[tracknr];
            let sectors = handler(ti.ttype)
                .read_sectors
                .and_then(|read_sectors| read_sectors(d, tracknr));
            match sectors {
                Some(sectors) => file.write_all(&sectors)?,
                None => {
                    if ti.ttype != TrackType::Unformatted {
                        log::warn!(
                            "T{}.{}: Track format '{}' cannot be written to a sector image",
                            crate::cyl(tracknr),
                            crate::hd(tracknr),
                            ti.typename
                        );
                    }
                    file.write_all(&vec![0u8; track_bytes])?;
                }
            }
        }
        Ok(())
    }
}
