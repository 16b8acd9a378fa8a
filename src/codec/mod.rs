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

    src/codec/mod.rs

    Pure bitcell codec helpers shared by format handlers: MFM and FM clock
    insertion and stripping, the Amiga even/odd block interleave, and the
    AmigaDOS longword checksum. No allocation beyond the caller's buffers,
    no I/O.
*/

pub mod ibm;

/// How a run of data bits is laid out in the raw bitcell stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitcellEncoding {
    /// Emit all bits verbatim; no clock bits are inserted or stripped.
    Raw,
    /// Sequential data bits, MFM clock bits interleaved.
    Mfm,
    /// Even-numbered data bits only (counting from the most significant).
    MfmEven,
    /// Odd-numbered data bits only.
    MfmOdd,
    /// All even-numbered bits, then all odd-numbered bits. This is the
    /// "Amiga block" interleave AmigaDOS uses for 512-byte sectors.
    MfmEvenOdd,
    /// All odd-numbered bits, then all even-numbered bits.
    MfmOddEven,
    /// Sequential data bits, FM: every clock bit is 1.
    Fm,
}

/// The MFM clock rule: a clock bit is 1 iff both neighbouring data bits
/// are 0.
#[inline]
pub fn mfm_clock_bit(prev_data: bool, next_data: bool) -> bool {
    !prev_data && !next_data
}

/// Strip the clock bits from 32 raw MFM bitcells, yielding 16 data bits.
pub fn mfm_decode_word(w: u32) -> u16 {
    let mut x: u16 = 0;
    for i in 0..16 {
        x = (x << 1) | (((w >> (30 - 2 * i)) & 1) as u16);
    }
    x
}

/// Encode 16 data bits to 32 raw MFM bitcells. Bit 16 of the input is the
/// data bit preceding the run, needed to compute the first clock bit.
pub fn mfm_encode_word(w: u32) -> u32 {
    let mut prev = (w >> 16) & 1 != 0;
    let mut out: u32 = 0;
    for i in 0..16 {
        let dat = (w >> (15 - i)) & 1 != 0;
        out = (out << 2) | ((mfm_clock_bit(prev, dat) as u32) << 1) | (dat as u32);
        prev = dat;
    }
    out
}

/// Encode 8 data bits to 16 raw FM bitcells: clock bits are all 1.
pub fn fm_encode_byte(b: u8) -> u16 {
    let mut out: u16 = 0;
    for i in 0..8 {
        let dat = (b >> (7 - i)) & 1 != 0;
        out = (out << 2) | 0b10 | (dat as u16);
    }
    out
}

/// Strip the clock bits from 16 raw FM bitcells.
pub fn fm_decode_byte(w: u16) -> u8 {
    let mut x: u8 = 0;
    for i in 0..8 {
        x = (x << 1) | (((w >> (14 - 2 * i)) & 1) as u8);
    }
    x
}

fn byte_bits(b: u8) -> impl Iterator<Item = bool> {
    (0..8).map(move |i| (b >> (7 - i)) & 1 != 0)
}

/// Split a data-bit sequence into the order it appears on the track under
/// the given encoding.
fn sequence_bits(enc: BitcellEncoding, input: &[u8]) -> Vec<bool> {
    let bits: Vec<bool> = input.iter().copied().flat_map(byte_bits).collect();
    match enc {
        BitcellEncoding::Raw | BitcellEncoding::Mfm | BitcellEncoding::Fm => bits,
        BitcellEncoding::MfmEven => bits.iter().copied().step_by(2).collect(),
        BitcellEncoding::MfmOdd => bits.iter().copied().skip(1).step_by(2).collect(),
        BitcellEncoding::MfmEvenOdd => {
            let mut v: Vec<bool> = bits.iter().copied().step_by(2).collect();
            v.extend(bits.iter().copied().skip(1).step_by(2));
            v
        }
        BitcellEncoding::MfmOddEven => {
            let mut v: Vec<bool> = bits.iter().copied().skip(1).step_by(2).collect();
            v.extend(bits.iter().copied().step_by(2));
            v
        }
    }
}

/// Reassemble track-order data bits into in-memory byte order.
fn unsequence_bits(enc: BitcellEncoding, bits: &[bool], nbytes: usize) -> Vec<u8> {
    let nbits = nbytes * 8;
    let mut data = vec![false; nbits];
    match enc {
        BitcellEncoding::Raw | BitcellEncoding::Mfm | BitcellEncoding::Fm => {
            data.copy_from_slice(&bits[..nbits]);
        }
        BitcellEncoding::MfmEven => {
            for (i, &b) in bits.iter().take(nbits / 2).enumerate() {
                data[i * 2] = b;
            }
        }
        BitcellEncoding::MfmOdd => {
            for (i, &b) in bits.iter().take(nbits / 2).enumerate() {
                data[i * 2 + 1] = b;
            }
        }
        BitcellEncoding::MfmEvenOdd => {
            for i in 0..nbits / 2 {
                data[i * 2] = bits[i];
                data[i * 2 + 1] = bits[nbits / 2 + i];
            }
        }
        BitcellEncoding::MfmOddEven => {
            for i in 0..nbits / 2 {
                data[i * 2 + 1] = bits[i];
                data[i * 2] = bits[nbits / 2 + i];
            }
        }
    }
    let mut out = vec![0u8; nbytes];
    for (i, &b) in data.iter().enumerate() {
        if b {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

/// Decode `nbytes` data bytes from raw bitcells under the given encoding.
///
/// For `Raw` the input length equals `nbytes`; for every other encoding the
/// input is `2 * nbytes` raw bytes. Input and output may not alias; decode
/// in place by passing the same slice is deliberately not supported here -
/// handlers own their scratch buffers.
pub fn mfm_decode_bytes(enc: BitcellEncoding, nbytes: usize, input: &[u8], out: &mut [u8]) {
    if enc == BitcellEncoding::Raw {
        out[..nbytes].copy_from_slice(&input[..nbytes]);
        return;
    }

    // Strip clocks: data bits sit at even raw positions (clock first).
    let raw: Vec<bool> = input[..nbytes * 2].iter().copied().flat_map(byte_bits).collect();
    let stripped: Vec<bool> = raw.iter().copied().skip(1).step_by(2).collect();
    let bytes = unsequence_bits(enc, &stripped, nbytes);
    out[..nbytes].copy_from_slice(&bytes);
}

/// Encode `nbytes` data bytes into raw bitcells under the given encoding.
///
/// `prev_bit` is the data bit immediately preceding the run, used for the
/// first clock bit. The output is `2 * nbytes` raw bytes (or `nbytes` for
/// `Raw`).
pub fn mfm_encode_bytes(enc: BitcellEncoding, nbytes: usize, input: &[u8], out: &mut [u8], prev_bit: u8) {
    if enc == BitcellEncoding::Raw {
        out[..nbytes].copy_from_slice(&input[..nbytes]);
        return;
    }

    let data = sequence_bits(enc, &input[..nbytes]);
    let mut prev = prev_bit != 0;
    let mut raw = Vec::with_capacity(data.len() * 2);
    for &dat in &data {
        let clock = match enc {
            BitcellEncoding::Fm => true,
            _ => mfm_clock_bit(prev, dat),
        };
        raw.push(clock);
        raw.push(dat);
        prev = dat;
    }

    for b in out[..nbytes * 2].iter_mut() {
        *b = 0;
    }
    for (i, &b) in raw.iter().enumerate() {
        if b {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
}

/// The standard AmigaDOS checksum: XOR of all big-endian longwords, folded
/// and masked to the data-bit positions.
pub fn amigados_checksum(dat: &[u8]) -> u32 {
    let mut csum: u32 = 0;
    for lw in dat.chunks_exact(4) {
        csum ^= u32::from_be(bytemuck::pod_read_unaligned::<u32>(lw));
    }
    csum ^= csum >> 1;
    csum & 0x5555_5555
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfm_word_strip_clocks() {
        // 0x4489 is the classic A1 sync byte with a missing clock bit.
        assert_eq!(mfm_decode_word(0x4489_4489), 0xA1A1);
        assert_eq!(mfm_decode_word(0xAAAA_AAAA), 0x0000);
        assert_eq!(mfm_decode_word(0x5555_5555), 0xFFFF);
    }

    #[test]
    fn mfm_word_round_trip() {
        for w in [0x0000u32, 0xFFFF, 0xA1A1, 0x1234, 0xFEDC] {
            for prev in 0..2u32 {
                let raw = mfm_encode_word((prev << 16) | w);
                assert_eq!(mfm_decode_word(raw), w as u16);
            }
        }
    }

    #[test]
    fn mfm_encode_inserts_legal_clocks() {
        // All-zero data with preceding 0 bit encodes to 0xAAAA.
        assert_eq!(mfm_encode_word(0x0000), 0xAAAA_AAAA);
        // All-ones data has no clock bits at all.
        assert_eq!(mfm_encode_word(0xFFFF), 0x5555_5555);
    }

    #[test]
    fn fm_byte_round_trip() {
        for b in [0x00u8, 0xFF, 0xFE, 0xDB, 0x6D] {
            assert_eq!(fm_decode_byte(fm_encode_byte(b)), b);
        }
        // FM 0x00: clock-only cells.
        assert_eq!(fm_encode_byte(0x00), 0xAAAA);
    }

    #[test]
    fn even_odd_matches_amiga_interleave() {
        // Raw even longword & 0x55.. shifted left one, OR raw odd longword
        // & 0x55.. is the canonical AmigaDOS decode.
        let raw: [u8; 8] = [0x44, 0x89, 0x44, 0x89, 0x2A, 0xA4, 0x92, 0x54];
        let mut out = [0u8; 4];
        mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 4, &raw, &mut out);
        for i in 0..4 {
            let expect = ((raw[i] & 0x55) << 1) | (raw[4 + i] & 0x55);
            assert_eq!(out[i], expect);
        }
    }

    #[test]
    fn byte_codec_round_trips() {
        let data: Vec<u8> = (0u8..=255).collect();
        for enc in [
            BitcellEncoding::Mfm,
            BitcellEncoding::MfmEvenOdd,
            BitcellEncoding::MfmOddEven,
            BitcellEncoding::Fm,
        ] {
            let mut raw = vec![0u8; data.len() * 2];
            mfm_encode_bytes(enc, data.len(), &data, &mut raw, 0);
            let mut back = vec![0u8; data.len()];
            mfm_decode_bytes(enc, data.len(), &raw, &mut back);
            assert_eq!(back, data, "{enc:?}");
        }
    }

    #[test]
    fn amigados_checksum_folds_to_data_bits() {
        assert_eq!(amigados_checksum(&[0u8; 512]), 0);
        let mut sec = [0u8; 512];
        sec[0] = 0xFF;
        let csum = amigados_checksum(&sec);
        assert_eq!(csum & !0x5555_5555, 0);
        // XOR-ing a buffer with itself is always clean.
        let mut double = sec.to_vec();
        double.extend_from_slice(&sec);
        assert_eq!(amigados_checksum(&double), 0);
    }
}
