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

    src/codec/ibm.rs

    IBM System/34 address-mark scanners: the lingua franca shared by the
    IBM-PC, Atari ST, Sega System 24 and related handlers. MFM marks are
    hunted as the canonical 0x4489 triple-sync sequences; FM marks as the
    clock-violating 16-bitcell patterns.
*/

use crate::{
    codec::{fm_decode_byte, mfm_decode_word},
    flux::FluxStream,
};

pub const IBM_MARK_IAM: u8 = 0xFC;
pub const IBM_MARK_IDAM: u8 = 0xFE;
pub const IBM_MARK_DAM: u8 = 0xFB;
pub const IBM_MARK_DDAM: u8 = 0xF8;

/// FM marks carry their distinctive missing-clock patterns in the raw
/// bitcells directly.
pub const FM_RAW_IAM: u16 = 0xF77A; // 0xFC, clock 0xD7
pub const FM_RAW_IDAM: u16 = 0xF57E; // 0xFE, clock 0xC7
pub const FM_RAW_DAM: u16 = 0xF56F; // 0xFB, clock 0xC7
pub const FM_RAW_DDAM: u16 = 0xF56A; // 0xF8, clock 0xC7

/// A decoded IBM sector address mark.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IbmIdam {
    pub cyl: u8,
    pub head: u8,
    pub sec: u8,
    pub no: u8,
}

/// Hunt for three consecutive 0xA1 sync bytes followed by a mark byte.
/// Returns the mark and the index offset of the first sync bitcell, and
/// restarts the stream CRC seeded with the sync and mark bytes.
pub fn scan_mark(s: &mut FluxStream, max_scan: u32) -> Option<(u8, u32)> {
    let mut scanned = 0u32;

    loop {
        s.next_bit()?;
        scanned += 1;
        if scanned > max_scan {
            return None;
        }
        if s.word != 0x4489_4489 {
            continue;
        }
        let idx_off = s.index_offset_bc.wrapping_sub(31);

        // Absorb the remaining sync words, then take the next byte as mark.
        loop {
            s.next_bits(16)?;
            if (s.word & 0xFFFF) != 0x4489 {
                break;
            }
        }
        let mark = (mfm_decode_word(s.word) & 0xFF) as u8;
        s.start_crc_with(&[0xA1, 0xA1, 0xA1, mark]);
        return Some((mark, idx_off));
    }
}

/// Read the four IDAM header bytes plus CRC following an already-consumed
/// IDAM mark. The caller checks `s.crc16_ccitt == 0` for validity.
pub fn read_idam(s: &mut FluxStream) -> Option<IbmIdam> {
    let mut raw = [0u8; 2 * 6];
    s.next_bytes(&mut raw)?;

    let mut dec = [0u8; 6];
    crate::codec::mfm_decode_bytes(crate::codec::BitcellEncoding::Mfm, 6, &raw, &mut dec);
    Some(IbmIdam {
        cyl: dec[0],
        head: dec[1],
        sec: dec[2],
        no: dec[3],
    })
}

/// Scan to the next IDAM and decode its header. CRC validity is reported
/// through the stream's running CRC, which is zero after a good header.
pub fn scan_idam(s: &mut FluxStream) -> Option<(IbmIdam, u32)> {
    loop {
        let (mark, idx_off) = scan_mark(s, u32::MAX)?;
        if mark != IBM_MARK_IDAM {
            continue;
        }
        let idam = read_idam(s)?;
        return Some((idam, idx_off));
    }
}

/// Scan to the next data mark. Returns the mark byte so callers can
/// distinguish deleted data, or `None` if no mark arrives within the scan
/// window.
pub fn scan_dam(s: &mut FluxStream) -> Option<u8> {
    let (mark, _) = scan_mark(s, 1000)?;
    (mark == IBM_MARK_DAM || mark == IBM_MARK_DDAM).then_some(mark)
}

/// Hunt for an FM address mark. Returns the decoded mark byte and the index
/// offset of its first bitcell; restarts the stream CRC seeded with the mark.
pub fn scan_mark_fm(s: &mut FluxStream, max_scan: u32) -> Option<(u8, u32)> {
    let mut scanned = 0u32;

    loop {
        s.next_bit()?;
        scanned += 1;
        if scanned > max_scan {
            return None;
        }
        let raw = s.word as u16;
        if raw == FM_RAW_IAM || raw == FM_RAW_IDAM || raw == FM_RAW_DAM || raw == FM_RAW_DDAM {
            let idx_off = s.index_offset_bc.wrapping_sub(15);
            let mark = fm_decode_byte(raw);
            s.start_crc_with(&[mark]);
            return Some((mark, idx_off));
        }
    }
}

/// FM variant of `scan_idam`.
pub fn scan_idam_fm(s: &mut FluxStream) -> Option<(IbmIdam, u32)> {
    loop {
        let (mark, idx_off) = scan_mark_fm(s, u32::MAX)?;
        if mark != IBM_MARK_IDAM {
            continue;
        }
        let idam = read_idam(s)?;
        return Some((idam, idx_off));
    }
}

/// FM variant of `scan_dam`.
pub fn scan_dam_fm(s: &mut FluxStream) -> Option<u8> {
    let (mark, _) = scan_mark_fm(s, 1000)?;
    (mark == IBM_MARK_DAM || mark == IBM_MARK_DDAM).then_some(mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fm_mark_constants_decode() {
        assert_eq!(fm_decode_byte(FM_RAW_IDAM), IBM_MARK_IDAM);
        assert_eq!(fm_decode_byte(FM_RAW_DAM), IBM_MARK_DAM);
        assert_eq!(fm_decode_byte(FM_RAW_DDAM), IBM_MARK_DDAM);
        assert_eq!(fm_decode_byte(FM_RAW_IAM), IBM_MARK_IAM);
    }
}
