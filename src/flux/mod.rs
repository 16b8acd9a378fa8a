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

    src/flux/mod.rs

    The flux-to-bitcell stream abstraction. A FluxSource yields raw flux
    intervals for one loaded track; FluxStream runs a phase-locked loop over
    them to present a uniform bit-level view to the format handlers.
*/

pub mod kryoflux;
pub mod scp;

use crate::{codec::mfm_decode_word, util::crc16_ccitt_byte, DiskError};
use std::path::Path;

/// Default bitcell time: 2us for a double-density track at 300rpm.
pub const DEFAULT_CELL_NS: u32 = 2000;

/// One step of a flux capture.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FluxEvent {
    /// Nanoseconds to the next flux transition.
    Flux(u32),
    /// The index pulse passed the head.
    Index,
    /// All captured revolutions are consumed.
    End,
}

/// A per-track supplier of flux intervals. Implementations load one track at
/// a time and replay it from the start on `rewind`.
pub trait FluxSource {
    fn select_track(&mut self, tracknr: usize) -> Result<(), DiskError>;
    fn rewind(&mut self);
    fn next_event(&mut self) -> FluxEvent;
}

/// Bit-level view over a flux capture.
///
/// The PLL consumes one nominal bitcell per `next_bit` call, shifting the
/// decoded bit into the low end of the rolling 32-bit `word`. The clock is
/// allowed to drift within 5% of nominal, driven by the position of detected
/// transitions within their cells.
pub struct FluxStream {
    source: Box<dyn FluxSource>,

    /// Rolling shift register of the last 32 decoded bits.
    pub word: u32,
    /// Nanoseconds consumed so far.
    pub latency: u64,
    /// Bitcells since the last index pulse.
    pub index_offset_bc: u32,
    /// Observed length in bitcells of the last complete revolution.
    pub track_len_bc: u32,
    /// Number of index pulses seen since the last reset.
    pub nr_index: u32,
    /// Running CRC-16/CCITT over decoded bytes since `start_crc`.
    pub crc16_ccitt: u16,

    nominal_cell_ns: i64,
    cell_ns: i64,
    flux: i64,
    crc_bitoff: u8,
}

/// Integral gain: percentage of the phase error folded into the clock
/// period at each observed transition.
const PERIOD_ADJ_PCT: i64 = 5;

/// Phase gain: percentage of the phase error absorbed immediately. An
/// authentic PLL does not snap the timing window to each flux transition.
const PHASE_ADJ_PCT: i64 = 60;

impl FluxStream {
    /// Open a flux capture, identifying the format by suffix and signature:
    /// SuperCard Pro `.scp` images, or a KryoFlux stream set addressed by
    /// basename, directory, or any one `NN.H.raw` member file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FluxStream, DiskError> {
        let path = path.as_ref();
        let source: Box<dyn FluxSource> = if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("scp"))
            .unwrap_or(false)
        {
            Box::new(scp::ScpSource::open(path)?)
        }
        else {
            Box::new(kryoflux::KfxSource::open(path)?)
        };
        Ok(FluxStream::from_source(source))
    }

    pub fn from_source(source: Box<dyn FluxSource>) -> FluxStream {
        FluxStream {
            source,
            word: 0,
            latency: 0,
            index_offset_bc: 0,
            track_len_bc: 0,
            nr_index: 0,
            crc16_ccitt: 0xFFFF,
            nominal_cell_ns: DEFAULT_CELL_NS as i64,
            cell_ns: DEFAULT_CELL_NS as i64,
            flux: 0,
            crc_bitoff: 0,
        }
    }

    /// Construct a memory-backed stream from explicit revolutions of flux
    /// intervals (nanoseconds between transitions). An index event precedes
    /// each revolution and a final one closes the last, so callers can
    /// measure `track_len_bc` the same way they would on a real capture.
    pub fn from_revolutions(revs: Vec<Vec<u32>>) -> FluxStream {
        FluxStream::from_source(Box::new(MemorySource::new(revs)))
    }

    /// Load a track's flux. Resets the stream cursor.
    pub fn select_track(&mut self, tracknr: usize) -> Result<(), DiskError> {
        self.source.select_track(tracknr)?;
        self.reset();
        Ok(())
    }

    /// Set the nominal bitcell time. Must precede `next_bit`.
    pub fn set_density(&mut self, ns_per_cell: u32) {
        self.nominal_cell_ns = ns_per_cell as i64;
        self.cell_ns = ns_per_cell as i64;
    }

    /// Return the cursor to the start of the first revolution. The loaded
    /// track and density are preserved.
    pub fn reset(&mut self) {
        self.source.rewind();
        self.word = 0;
        self.latency = 0;
        self.index_offset_bc = 0;
        self.nr_index = 0;
        self.cell_ns = self.nominal_cell_ns;
        self.flux = 0;
        self.crc_bitoff = 0;
    }

    /// Advance the PLL by one bitcell. Returns `None` when all captured
    /// revolutions are consumed.
    ///
    /// `flux` holds the time from the current cell midpoint to the next
    /// transition: a value within half a cell either way means the
    /// transition belongs to this cell.
    pub fn next_bit(&mut self) -> Option<bool> {
        while self.flux < self.cell_ns / 2 {
            match self.source.next_event() {
                FluxEvent::Flux(ns) => self.flux += ns as i64,
                FluxEvent::Index => self.index_pulse(),
                FluxEvent::End => return None,
            }
        }

        let cell = self.cell_ns;
        self.latency += cell as u64;
        self.flux -= cell;
        self.index_offset_bc = self.index_offset_bc.wrapping_add(1);

        let bit = if self.flux >= cell / 2 {
            // No transition in this cell.
            false
        }
        else {
            // Transition in this cell; `flux` is now the phase error.
            // Fold part of it into the clock period, clamped to 5% around
            // nominal.
            self.cell_ns += self.flux * PERIOD_ADJ_PCT / 100;
            let max_adj = self.nominal_cell_ns / 20;
            self.cell_ns = self
                .cell_ns
                .clamp(self.nominal_cell_ns - max_adj, self.nominal_cell_ns + max_adj);

            // Absorb part of the phase error directly.
            let new_flux = self.flux * (100 - PHASE_ADJ_PCT) / 100;
            self.latency = (self.latency as i64 + (self.flux - new_flux)) as u64;
            self.flux = new_flux;
            true
        };

        self.word = (self.word << 1) | bit as u32;
        self.clock_crc(bit);
        Some(bit)
    }

    /// Advance by `n` bitcells. Fails if the stream ends first.
    pub fn next_bits(&mut self, n: u32) -> Option<()> {
        for _ in 0..n {
            self.next_bit()?;
        }
        Some(())
    }

    /// Fill `buf` with raw (undecoded) bitcells, 8 per byte, MSB first.
    pub fn next_bytes(&mut self, buf: &mut [u8]) -> Option<()> {
        for b in buf.iter_mut() {
            self.next_bits(8)?;
            *b = self.word as u8;
        }
        Some(())
    }

    /// Advance until the next index pulse, updating `track_len_bc` with the
    /// observed revolution length.
    pub fn next_index(&mut self) -> Option<()> {
        let seen = self.nr_index;
        while self.nr_index == seen {
            self.next_bit()?;
        }
        Some(())
    }

    /// Begin a CRC-16/CCITT span over subsequently decoded bytes.
    pub fn start_crc(&mut self) {
        self.crc16_ccitt = 0xFFFF;
        self.crc_bitoff = 0;
    }

    /// Begin a CRC span pre-seeded with bytes already consumed (e.g. the
    /// sync and mark bytes of an IBM address mark).
    pub fn start_crc_with(&mut self, seed: &[u8]) {
        self.start_crc();
        for &b in seed {
            self.crc16_ccitt = crc16_ccitt_byte(b, self.crc16_ccitt);
        }
    }

    fn index_pulse(&mut self) {
        if self.index_offset_bc != 0 {
            self.track_len_bc = self.index_offset_bc;
        }
        self.index_offset_bc = 0;
        self.nr_index += 1;
    }

    fn clock_crc(&mut self, _bit: bool) {
        self.crc_bitoff += 1;
        if self.crc_bitoff == 16 {
            self.crc_bitoff = 0;
            let byte = (mfm_decode_word(self.word) & 0xFF) as u8;
            self.crc16_ccitt = crc16_ccitt_byte(byte, self.crc16_ccitt);
        }
    }
}

/// Memory-backed flux source used for synthetic captures and round-trip
/// verification.
pub struct MemorySource {
    revs: Vec<Vec<u32>>,
    rev: usize,
    idx: usize,
    index_pending: bool,
    done: bool,
}

impl MemorySource {
    pub fn new(revs: Vec<Vec<u32>>) -> MemorySource {
        MemorySource {
            revs,
            rev: 0,
            idx: 0,
            index_pending: true,
            done: false,
        }
    }
}

impl FluxSource for MemorySource {
    fn select_track(&mut self, _tracknr: usize) -> Result<(), DiskError> {
        self.rewind();
        Ok(())
    }

    fn rewind(&mut self) {
        self.rev = 0;
        self.idx = 0;
        self.index_pending = true;
        self.done = false;
    }

    fn next_event(&mut self) -> FluxEvent {
        if self.done {
            return FluxEvent::End;
        }
        if self.index_pending {
            self.index_pending = false;
            return FluxEvent::Index;
        }
        while self.rev < self.revs.len() {
            if let Some(&ns) = self.revs[self.rev].get(self.idx) {
                self.idx += 1;
                return FluxEvent::Flux(ns);
            }
            self.rev += 1;
            self.idx = 0;
            // One index closes each revolution, including the last.
            if self.rev >= self.revs.len() {
                self.done = true;
            }
            return FluxEvent::Index;
        }
        FluxEvent::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pll_decodes_exact_intervals() {
        // 2-cell, 3-cell and 4-cell spacings at 2us nominal: 10 100 1000.
        let rev: Vec<u32> = vec![4000, 6000, 8000, 4000];
        let mut s = FluxStream::from_revolutions(vec![rev]);
        s.set_density(2000);
        let mut bits = Vec::new();
        while let Some(b) = s.next_bit() {
            bits.push(b as u8);
        }
        // The first transition anchors the cell grid.
        assert_eq!(bits, vec![0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 1]);
    }

    #[test]
    fn word_shifts_in_from_low_end() {
        let rev: Vec<u32> = vec![4000; 40];
        let mut s = FluxStream::from_revolutions(vec![rev]);
        s.set_density(2000);
        s.next_bits(32).unwrap();
        assert_eq!(s.word, 0x5555_5555);
    }

    #[test]
    fn index_crossing_updates_track_len() {
        let rev: Vec<u32> = vec![4000; 100]; // 200 cells per revolution
        let mut s = FluxStream::from_revolutions(vec![rev.clone(), rev]);
        s.set_density(2000);
        s.next_index().unwrap();
        s.next_index().unwrap();
        assert_eq!(s.track_len_bc, 200);
    }

    #[test]
    fn density_contract_holds() {
        // Average bits per second must equal 1/d within 5% over a revolution.
        let rev: Vec<u32> = vec![4000; 1000];
        let mut s = FluxStream::from_revolutions(vec![rev]);
        s.set_density(2000);
        let mut nbits = 0u64;
        while s.next_bit().is_some() {
            nbits += 1;
        }
        let avg_ns_per_bit = s.latency / nbits;
        assert!((1900..=2100).contains(&avg_ns_per_bit));
    }
}
