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

    src/containers/mod.rs

    Container formats: each one materialises a Disk from and to a file. The
    per-track analyse step is shared: the default write_raw pre-sets the
    stream density from the handler registry and falls back to an
    unformatted track when every candidate rejects.
*/

pub mod adf;
pub mod dsk;
pub mod eadf;
pub mod hfe;
pub mod imd;
pub mod img;
pub mod ipf;
pub mod scp;

use crate::{disk::Disk, flux::FluxStream, formats::TrackType, io::ReadWriteSeek, DiskError};
use std::path::Path;

/// A disk-image container format.
pub trait Container: Sync {
    /// Create a brand new empty container.
    fn init(&self, d: &mut Disk);

    /// Populate the disk from an existing container file.
    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError>;

    /// Write back the whole container file.
    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError>;

    /// Analyse and write a raw stream to the given track. Shared default:
    /// dispatch through the handler registry.
    fn write_raw(&self, d: &mut Disk, tracknr: usize, ttype: TrackType, s: &mut FluxStream) -> bool {
        d.write_raw_track(tracknr, ttype, s)
    }
}

/// Identify the container format for a path by suffix.
pub fn container_for_path(path: &Path) -> Result<&'static dyn Container, DiskError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "dsk" => &dsk::CONTAINER_DSK,
        "adf" => &adf::CONTAINER_ADF,
        "eadf" => &eadf::CONTAINER_EADF,
        "hfe" => &hfe::CONTAINER_HFE,
        "imd" => &imd::CONTAINER_IMD,
        "scp" => &scp::CONTAINER_SCP,
        "img" | "ima" | "st" => &img::CONTAINER_IMG,
        "ipf" => &ipf::CONTAINER_IPF,
        _ => return Err(DiskError::UnknownFormat),
    })
}
