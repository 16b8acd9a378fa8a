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

    src/flux/kryoflux.rs

    A flux source for the KryoFlux STREAM format, as read directly from the
    device. A set of files named <base>NN.H.raw, one per track, represents a
    complete disk.
*/

use crate::{
    flux::{FluxEvent, FluxSource},
    DiskError,
};
use regex::Regex;
use std::path::Path;

pub const KFX_MCK_FREQ: u64 = ((18_432_000 * 73) / 14) / 2;
pub const KFX_SCK_FREQ: u64 = KFX_MCK_FREQ / 2;
pub const KFX_SCK_PS_PER_TICK: u64 = 1_000_000_000 / (KFX_SCK_FREQ / 1000);

/// Out-of-band block types embedded in the sample stream.
const OOB_STREAM_READ: u8 = 0x01;
const OOB_INDEX: u8 = 0x02;
const OOB_STREAM_END: u8 = 0x03;

pub struct KfxSource {
    basename: String,

    /// Current track number.
    track: Option<usize>,

    /// Raw track data.
    dat: Vec<u8>,

    dat_idx: usize,    // current index into dat[]
    stream_idx: usize, // current index into non-OOB data in dat[]
    index_pos: usize,  // stream_idx position of next index pulse
}

impl KfxSource {
    /// Open a stream set. `path` may be the common basename of the set, a
    /// directory containing it, or any one member file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<KfxSource, DiskError> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();

        // A member filename selects the whole set it belongs to.
        let re = Regex::new(r"^(.*?)(\d{2})\.(\d)\.raw$").unwrap();
        let mut basename = match re.captures(&name) {
            Some(caps) => caps[1].to_string(),
            None => name.clone(),
        };

        if !Path::new(&KfxSource::track_name(&basename, 0)).exists() {
            basename.push('/');
            if !Path::new(&KfxSource::track_name(&basename, 0)).exists() {
                return Err(DiskError::UnknownFormat);
            }
        }

        Ok(KfxSource {
            basename,
            track: None,
            dat: Vec::new(),
            dat_idx: 0,
            stream_idx: 0,
            index_pos: usize::MAX,
        })
    }

    fn track_name(basename: &str, tracknr: usize) -> String {
        format!("{}{:02}.{}.raw", basename, crate::cyl(tracknr), crate::hd(tracknr))
    }
}

impl FluxSource for KfxSource {
    fn select_track(&mut self, tracknr: usize) -> Result<(), DiskError> {
        if self.track == Some(tracknr) && !self.dat.is_empty() {
            return Ok(());
        }

        let name = KfxSource::track_name(&self.basename, tracknr);
        self.dat = std::fs::read(&name).map_err(|_| DiskError::SeekError)?;
        self.track = Some(tracknr);
        self.rewind();
        Ok(())
    }

    fn rewind(&mut self) {
        self.dat_idx = 0;
        self.stream_idx = 0;
        self.index_pos = usize::MAX;
    }

    fn next_event(&mut self) -> FluxEvent {
        if self.stream_idx >= self.index_pos {
            self.index_pos = usize::MAX;
            return FluxEvent::Index;
        }

        let dat = &self.dat;
        let mut i = self.dat_idx;
        let mut val: u32 = 0;
        let mut done = false;

        while !done && i < dat.len() {
            match dat[i] {
                op @ 0x00..=0x07 => {
                    // Two-byte sample, high bits in the opcode.
                    if i + 1 >= dat.len() {
                        break;
                    }
                    val += ((op as u32) << 8) + dat[i + 1] as u32;
                    i += 2;
                    self.stream_idx += 2;
                    done = true;
                }
                0x08 => {
                    i += 1;
                    self.stream_idx += 1;
                }
                0x09 => {
                    i += 2;
                    self.stream_idx += 2;
                }
                0x0a => {
                    i += 3;
                    self.stream_idx += 3;
                }
                0x0b => {
                    // Overflow: add 0x10000 to the next sample.
                    val += 0x10000;
                    i += 1;
                    self.stream_idx += 1;
                }
                0x0c => {
                    // 16-bit sample in the following two bytes.
                    if i + 2 >= dat.len() {
                        break;
                    }
                    val += ((dat[i + 1] as u32) << 8) + dat[i + 2] as u32;
                    i += 3;
                    self.stream_idx += 3;
                    done = true;
                }
                0x0d => {
                    // Out-of-band block: type, 16-bit length, payload.
                    if i + 4 > dat.len() {
                        break;
                    }
                    let typ = dat[i + 1];
                    let sz = u16::from_le_bytes([dat[i + 2], dat[i + 3]]) as usize;
                    i += 4;
                    if i + sz > dat.len() {
                        break;
                    }
                    let pos = if sz >= 4 {
                        u32::from_le_bytes([dat[i], dat[i + 1], dat[i + 2], dat[i + 3]]) as usize
                    }
                    else {
                        0
                    };
                    match typ {
                        OOB_STREAM_READ | OOB_STREAM_END => {
                            if pos != self.stream_idx {
                                log::warn!(
                                    "KfxSource::next_event(): out-of-sync during track read ({} != {})",
                                    pos,
                                    self.stream_idx
                                );
                            }
                        }
                        OOB_INDEX => {
                            self.index_pos = pos;
                        }
                        _ => {}
                    }
                    i += sz;
                }
                sample => {
                    // One-byte sample.
                    val += sample as u32;
                    i += 1;
                    self.stream_idx += 1;
                    done = true;
                }
            }

            // A pending index fires as soon as the stream position reaches it.
            if self.stream_idx >= self.index_pos && !done {
                self.dat_idx = i;
                self.index_pos = usize::MAX;
                return FluxEvent::Index;
            }
        }

        self.dat_idx = i;

        if !done {
            return FluxEvent::End;
        }

        let flux_ns = (val as u64 * KFX_SCK_PS_PER_TICK) / 1000;
        FluxEvent::Flux(flux_ns as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(src: &mut KfxSource) -> Vec<FluxEvent> {
        let mut out = Vec::new();
        loop {
            let ev = src.next_event();
            if ev == FluxEvent::End {
                break;
            }
            out.push(ev);
        }
        out
    }

    fn source_from(dat: Vec<u8>) -> KfxSource {
        KfxSource {
            basename: String::new(),
            track: Some(0),
            dat,
            dat_idx: 0,
            stream_idx: 0,
            index_pos: usize::MAX,
        }
    }

    #[test]
    fn decodes_sample_opcodes() {
        // 1-byte sample, nop1, overflow + 1-byte sample, 2-byte sample.
        let mut src = source_from(vec![0x30, 0x08, 0x0b, 0x10, 0x02, 0x00]);
        let evs = drain(&mut src);
        let ns: Vec<u32> = evs
            .iter()
            .map(|e| match e {
                FluxEvent::Flux(ns) => *ns,
                _ => panic!("unexpected event"),
            })
            .collect();
        let expect: Vec<u32> = [0x30u64, 0x10010, 0x200]
            .iter()
            .map(|t| (t * KFX_SCK_PS_PER_TICK / 1000) as u32)
            .collect();
        assert_eq!(ns, expect);
    }

    #[test]
    fn oob_index_block_fires_index() {
        // Two 1-byte samples with an index recorded at stream position 1.
        let mut src = source_from(vec![
            0x40, // sample, stream_idx 0->1
            0x0d, 0x02, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00, // OOB index @ pos 1
            0x40, // sample
        ]);
        let evs = drain(&mut src);
        assert_eq!(evs.len(), 3);
        assert!(matches!(evs[0], FluxEvent::Flux(_)));
        assert_eq!(evs[1], FluxEvent::Index);
        assert!(matches!(evs[2], FluxEvent::Flux(_)));
    }
}
