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

//! The `util` module provides various utility functions.

/// The initial seed value for CRC-CCITT and related checksums.
pub const CRC_CCITT_INITIAL: u16 = 0xFFFF;

/// Calculate a 16-bit CRC-CCITT checksum over a byte slice.
/// Polynomial 0x1021, MSB first.
/// See: https://reveng.sourceforge.io/crc-catalogue/16.htm
pub fn crc16_ccitt(data: &[u8], start: u16) -> u16 {
    let mut crc: u16 = start;

    for &byte in data {
        crc = crc16_ccitt_byte(byte, crc);
    }
    crc
}

/// Calculate a 16-bit CRC-CCITT checksum one byte at a time.
pub fn crc16_ccitt_byte(byte: u8, crc: u16) -> u16 {
    const POLY: u16 = 0x1021; // Polynomial x^16 + x^12 + x^5 + 1
    let mut crc = crc;

    crc ^= (byte as u16) << 8;
    for _ in 0..8 {
        if (crc & 0x8000) != 0 {
            crc = (crc << 1) ^ POLY;
        }
        else {
            crc <<= 1;
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_ccitt_known_vector() {
        // "123456789" with seed 0xFFFF is the classic CCITT-FALSE check value.
        let crc = crc16_ccitt(b"123456789", CRC_CCITT_INITIAL);
        assert_eq!(crc, 0x29B1);
    }

    #[test]
    fn crc16_ccitt_self_check() {
        // Appending the stored CRC must bring the running value to zero.
        let data = [0xA1, 0xA1, 0xA1, 0xFE, 0x28, 0x01, 0x03, 0x02];
        let crc = crc16_ccitt(&data, CRC_CCITT_INITIAL);
        let mut full = data.to_vec();
        full.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(crc16_ccitt(&full, CRC_CCITT_INITIAL), 0);
    }
}
