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
*/

//! # fluxforge
//!
//! fluxforge is a Rust library for preserving, analysing, and re-mastering
//! floppy disk images from vintage home-computer platforms - principally
//! Commodore Amiga, Atari ST, and IBM-PC-format media.
//!
//! A physical disk encodes data as a stream of magnetic flux transitions.
//! Given a low-level flux capture of a disk (KryoFlux stream set or
//! SuperCard Pro image), fluxforge identifies which format each track uses,
//! decodes it losslessly into a compact intermediate representation, and can
//! later regenerate a bit-exact MFM/FM bitcell stream that the original
//! hardware will accept.
//!
//! The main interface is the [`Disk`] object, opened from or created over one
//! of the supported container formats. Per-track analysis is dispatched
//! through a registry of format handlers keyed by [`TrackType`]; see the
//! [`formats`] module for the handler contract.

pub mod codec;
pub mod containers;
pub mod disk;
pub mod flux;
pub mod formats;
pub mod io;
pub mod tbuf;
pub mod util;

use thiserror::Error;

pub use crate::{
    disk::{Disk, DiskInfo, DiskTag, TrackInfo, TrackLength},
    flux::FluxStream,
    formats::TrackType,
    tbuf::{TrackBuffer, TrackRaw},
};

/// Nominal drive speed, revolutions per minute.
pub const DEFAULT_RPM: u32 = 300;

/// Per-bitcell speed value representing nominal density.
pub const SPEED_AVG: u16 = 1000;

/// Per-bitcell speed marker for weak (flux-free or non-reproducible) zones.
pub const SPEED_WEAK: u16 = 0xffff;

/// Bitcells per revolution of a double-density track at the given drive
/// speed. Determined empirically - larger than expected for a 2us bitcell
/// at 300rpm.
pub const fn default_bits_per_track(rpm: u32) -> u32 {
    100_150 * 300 / rpm
}

/// Cylinder number of a zero-based track number.
#[inline]
pub const fn cyl(tracknr: usize) -> usize {
    tracknr >> 1
}

/// Head (side) number of a zero-based track number.
#[inline]
pub const fn hd(tracknr: usize) -> usize {
    tracknr & 1
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("An IO error occurred reading or writing the disk image: {0}")]
    IoError(String),
    #[error("Unknown disk image format")]
    UnknownFormat,
    #[error("Unsupported disk image format for requested operation")]
    UnsupportedFormat,
    #[error("The flux capture was malformed at the affected track: {0}")]
    FormatParseError(String),
    #[error("The container file is malformed: {0}")]
    ImageCorruptError(String),
    #[error("The requested track could not be found")]
    SeekError,
    #[error("An invalid function parameter was supplied")]
    ParameterError,
}

impl From<io::Error> for DiskError {
    fn from(err: io::Error) -> Self {
        DiskError::IoError(err.to_string())
    }
}

impl From<binrw::Error> for DiskError {
    fn from(err: binrw::Error) -> Self {
        DiskError::IoError(err.to_string())
    }
}
