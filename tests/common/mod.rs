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

    tests/common/mod.rs

    Common support routines for tests: synthetic flux captures are produced
    by remastering a reference disk and feeding the flux back through the
    analyser.
*/

use fluxforge::{
    disk::TrackLength,
    formats::{handler, init_track_info},
    Disk, FluxStream, TrackType,
};
use sha1::{Digest, Sha1};

#[allow(dead_code)]
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn compute_slice_hash(slice: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(slice);
    hex::encode(hasher.finalize())
}

/// Install a track from a plain sector image, using the handler's
/// filesystem-level import.
#[allow(dead_code)]
pub fn install_sector_track(d: &mut Disk, tracknr: usize, ttype: TrackType, sectors: &[u8]) {
    init_track_info(&mut d.di.tracks[tracknr], ttype);
    let write_sectors = handler(ttype).write_sectors.expect("handler has no sector import");
    let dat = write_sectors(d, tracknr, sectors).expect("sector import rejected");
    d.di.tracks[tracknr].dat = dat;
}

/// Install a track whose decoded payload is given directly.
#[allow(dead_code)]
pub fn install_raw_payload(
    d: &mut Disk,
    tracknr: usize,
    ttype: TrackType,
    dat: Vec<u8>,
    total_bits: u32,
    data_bitoff: u32,
) {
    let ti = &mut d.di.tracks[tracknr];
    init_track_info(ti, ttype);
    ti.dat = dat;
    ti.set_all_sectors_valid();
    ti.total_bits = TrackLength::Fixed(total_bits);
    ti.data_bitoff = data_bitoff;
}

/// Remaster one track to flux and present it as a two-revolution capture.
#[allow(dead_code)]
pub fn flux_capture(d: &Disk, tracknr: usize) -> FluxStream {
    let raw = d.track_read_raw(tracknr);
    let flux = raw.to_flux(d.rpm);
    FluxStream::from_revolutions(vec![flux.clone(), flux])
}
