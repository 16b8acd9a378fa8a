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

    src/containers/hfe.rs

    HxC Floppy Emulator (HFE) images, v1 and v3. Bit order is LSB first on
    disk; tracks are stored in 512-byte blocks interleaving sides 0 and 1 in
    256-byte halves. v3 adds an opcode byte-stream (nop, index, bitrate,
    skip-bits) for non-uniform tracks.
*/

use crate::{
    disk::Disk,
    formats::{
        raw::{set_raw_track_speeds, setup_uniform_raw_track},
        TrackType,
    },
    io::{Read, ReadWriteSeek, Seek, SeekFrom, Write},
    DiskError, SPEED_AVG,
};
use binrw::{binrw, BinRead, BinWrite};

/* HFEv3 opcodes */
const OP_NOP: u8 = 0;
const OP_INDEX: u8 = 1;
const OP_BITRATE: u8 = 2;
const OP_SKIP: u8 = 3;

/* track_encoding */
const ENC_ISOIBM_MFM: u8 = 0x00;
const ENC_AMIGA_MFM: u8 = 0x01;

/* interface_mode */
const IFM_ATARIST_DD: u8 = 0x02;
const IFM_AMIGA_DD: u8 = 0x04;
const IFM_GENERIC_SHUGART_DD: u8 = 0x07;

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct DiskHeader {
    sig: [u8; 8],
    formatrevision: u8,
    nr_tracks: u8,
    nr_sides: u8,
    track_encoding: u8,
    bitrate: u16, // kbit/s, approx
    rpm: u16,     // unused, can be zero
    interface_mode: u8,
    rsvd: u8,
    track_list_offset: u16,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct TrackHeader {
    offset: u16,
    len: u16,
}

const fn reverse_bits(mut byte: u8) -> u8 {
    byte = (byte >> 4) | (byte << 4);
    byte = ((byte & 0x33) << 2) | ((byte & 0xCC) >> 2);
    byte = ((byte & 0x55) << 1) | ((byte & 0xAA) >> 1);
    byte
}

const fn generate_reverse_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = reverse_bits(i as u8);
        i += 1;
    }
    table
}

/// HFE bit order is LSB first. Switch to/from MSB first.
static REVERSE_TABLE: [u8; 256] = generate_reverse_table();

fn bit_reverse(block: &mut [u8]) {
    for b in block.iter_mut() {
        *b = REVERSE_TABLE[*b as usize];
    }
}

fn bit_copy(dst: &mut [u8], mut dst_off: usize, src: &[u8], mut src_off: usize, nr: usize) {
    for _ in 0..nr {
        let x = (src[src_off / 8] >> (7 - (src_off & 7))) & 1;
        dst[dst_off / 8] |= x << (7 - (dst_off & 7));
        src_off += 1;
        dst_off += 1;
    }
}

pub struct HfeContainer;

pub static CONTAINER_HFE: HfeContainer = HfeContainer;

impl super::Container for HfeContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(166);
    }

    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut r = file;
        let dhdr = DiskHeader::read(&mut r)?;
        if dhdr.formatrevision != 0 {
            return Err(DiskError::ImageCorruptError(
                "Unsupported HFE format revision".to_string(),
            ));
        }
        let v3 = match &dhdr.sig {
            b"HXCHFEV3" => true,
            b"HXCPICFE" => false,
            _ => return Err(DiskError::ImageCorruptError("Bad signature in HFE header".to_string())),
        };

        let nr_cyls = dhdr.nr_tracks as usize;
        d.init_tracks(nr_cyls * 2);

        for i in 0..nr_cyls {
            r.seek(SeekFrom::Start(dhdr.track_list_offset as u64 * 512 + i as u64 * 4))?;
            let thdr = TrackHeader::read(&mut r)?;

            // Read into a track buffer, padded up to a 512-byte boundary.
            let len = (thdr.len as usize + 0x1ff) & !0x1ff;
            let mut tbuf = vec![0u8; len];
            r.seek(SeekFrom::Start(thdr.offset as u64 * 512))?;
            r.read_exact(&mut tbuf)?;
            bit_reverse(&mut tbuf);

            // Demux the sides: 256-byte halves of each 512-byte block.
            let mut raw_dat = [vec![0u8; len / 2], vec![0u8; len / 2]];
            for j in (0..len).step_by(512) {
                raw_dat[0][j / 2..j / 2 + 256].copy_from_slice(&tbuf[j..j + 256]);
                raw_dat[1][j / 2..j / 2 + 256].copy_from_slice(&tbuf[j + 256..j + 512]);
            }

            for (side, dat) in raw_dat.iter().enumerate() {
                let tracknr = i * 2 + side;
                if v3 {
                    hfe_v3_track(d, tracknr, dat)?;
                }
                else {
                    setup_uniform_raw_track(d, tracknr, TrackType::RawDd, thdr.len as u32 * 4, dat);
                }
            }
        }

        Ok(())
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut w = file;
        let nr_tracks = d.di.nr_tracks();
        let nr_cyls = nr_tracks / 2;

        let is_st = nr_tracks != 0 && d.di.tracks[0].ttype == TrackType::AtariSt720kb;
        let is_amiga = nr_tracks != 0 && d.di.tracks[0].ttype == TrackType::Amigados;

        let mut raws = Vec::with_capacity(nr_tracks);
        for tracknr in 0..nr_tracks {
            let mut raw = d.track_read_raw(tracknr);
            if d.di.tracks[tracknr].ttype == TrackType::Unformatted {
                // Random-length tracks do not share the cylinder buffer well
                // with their neighbour; truncate to a default length.
                raw.bitlen = raw.bitlen.min(crate::default_bits_per_track(d.rpm) as usize);
            }
            else if raw.speed.iter().take(raw.bitlen).any(|&sp| sp != SPEED_AVG) {
                log::warn!(
                    "T{}.{}: Variable-density track cannot be correctly written to an HFE file",
                    crate::cyl(tracknr),
                    crate::hd(tracknr)
                );
            }
            raws.push(raw);
        }

        // Block 0: disk info.
        let mut block = [0xFFu8; 512];
        let dhdr = DiskHeader {
            sig: *b"HXCPICFE",
            formatrevision: 0,
            nr_tracks: nr_cyls as u8,
            nr_sides: 2,
            track_encoding: if is_amiga { ENC_AMIGA_MFM } else { ENC_ISOIBM_MFM },
            bitrate: 250,
            rpm: 0,
            interface_mode: if is_amiga {
                IFM_AMIGA_DD
            }
            else if is_st {
                IFM_ATARIST_DD
            }
            else {
                IFM_GENERIC_SHUGART_DD
            },
            rsvd: 1,
            track_list_offset: 1,
        };
        {
            let mut cur = crate::io::Cursor::new(&mut block[..]);
            dhdr.write(&mut cur)?;
        }
        w.write_all(&block)?;

        // Block 1: track LUT.
        let mut block = [0xFFu8; 512];
        {
            let mut cur = crate::io::Cursor::new(&mut block[..]);
            let mut off = 2u16;
            for i in 0..nr_cyls {
                let bitlen = raws[i * 2].bitlen.max(raws[i * 2 + 1].bitlen);
                let bytelen = (bitlen + 7) / 8 * 2;
                TrackHeader {
                    offset: off,
                    len: bytelen as u16,
                }
                .write(&mut cur)?;
                off += ((bytelen + 0x1ff) >> 9) as u16;
            }
        }
        w.write_all(&block)?;

        for i in 0..nr_cyls {
            let bitlen = raws[i * 2].bitlen.max(raws[i * 2 + 1].bitlen);
            let bytelen = (bitlen + 7) / 8 * 2;
            let len = (bytelen + 0x1ff) & !0x1ff;
            let mut tbuf = vec![0u8; len];

            write_bits(&raws[i * 2], &mut tbuf, 0, len / 2);
            write_bits(&raws[i * 2 + 1], &mut tbuf, 256, len / 2);

            bit_reverse(&mut tbuf);
            w.write_all(&tbuf)?;
        }

        Ok(())
    }
}

/// HFEv3: process the opcode byte-stream into plain bitcells plus per-byte
/// bitrates, rotate the track so the index lands at bit 0, and install it as
/// a raw track with the recovered speeds.
fn hfe_v3_track(d: &mut Disk, tracknr: usize, raw_dat: &[u8]) -> Result<(), DiskError> {
    let len = raw_dat.len();
    let mut new_dat = vec![0u8; len];
    let mut brs = vec![0u8; len + 1];
    let mut br: u8 = 0;

    let mut inb = 0usize; // input cursor, bits
    let mut outb = 0usize; // output cursor, bits
    let mut index_bc = 0usize;

    while inb / 8 < len {
        brs[outb / 8] = br;
        debug_assert!(inb % 8 == 0);
        let opc = raw_dat[inb / 8];
        if (opc & 0xf0) == 0xf0 {
            match opc & 0x0f {
                OP_NOP => {
                    inb += 8;
                }
                OP_INDEX => {
                    inb += 8;
                    index_bc = outb;
                }
                OP_BITRATE => {
                    if inb / 8 + 1 >= len {
                        break;
                    }
                    br = raw_dat[inb / 8 + 1];
                    inb += 2 * 8;
                }
                OP_SKIP => {
                    if inb / 8 + 1 >= len {
                        break;
                    }
                    let skip = raw_dat[inb / 8 + 1] as usize;
                    if skip > 8 {
                        return Err(DiskError::ImageCorruptError(format!(
                            "Bad HFEv3 skip count {skip}"
                        )));
                    }
                    inb += 2 * 8 + skip;
                    if inb + (8 - skip) > len * 8 {
                        break;
                    }
                    bit_copy(&mut new_dat, outb, raw_dat, inb, 8 - skip);
                    inb += 8 - skip;
                    outb += 8 - skip;
                }
                _ => {
                    return Err(DiskError::ImageCorruptError(format!(
                        "Unknown HFEv3 opcode {opc:02x}"
                    )));
                }
            }
        }
        else {
            bit_copy(&mut new_dat, outb, raw_dat, inb, 8);
            inb += 8;
            outb += 8;
        }
    }

    brs[outb / 8] = br;
    let len_bc = outb;
    if len_bc == 0 {
        d.track_mark_unformatted(tracknr);
        return Ok(());
    }

    // Rotate the track so the index pulse is at bit 0.
    let mut rotated = vec![0u8; len];
    bit_copy(&mut rotated, 0, &new_dat, index_bc, len_bc - index_bc);
    bit_copy(&mut rotated, len_bc - index_bc, &new_dat, 0, index_bc);

    setup_uniform_raw_track(d, tracknr, TrackType::RawDd, len_bc as u32, &rotated);

    // Recover the non-uniform speed values from the bitrate opcodes.
    let nr_bytes = (outb + 7) / 8;
    let av_br = ((7_200_000 + len_bc / 2) / len_bc) as u32;
    let mut speeds = Vec::with_capacity(nr_bytes);
    for k in 0..nr_bytes {
        let cur_br = brs[(k + index_bc / 8) % nr_bytes] as u32;
        speeds.push(if cur_br != 0 {
            ((cur_br * SPEED_AVG as u32 + av_br / 2) / av_br) as u16
        }
        else {
            SPEED_AVG
        });
    }
    set_raw_track_speeds(d, tracknr, &speeds);

    Ok(())
}

/// Serialise one side into the 256-byte half-blocks of the cylinder buffer,
/// rotating the track so the gap sits at the index.
fn write_bits(raw: &crate::tbuf::TrackRaw, dst: &mut [u8], half_offset: usize, len: usize) {
    let mut bit = raw.write_splice_bc;
    if bit > raw.data_start_bc {
        bit = 0; // don't mess with an already-aligned track
    }

    let mut out_idx = half_offset;
    let mut x: u8 = 0;
    let mut i = 0usize;
    while i < len * 8 {
        // Consume a bit.
        x <<= 1;
        x |= raw.bit(bit) as u8;
        // Deal with byte and block boundaries.
        i += 1;
        if i % 8 == 0 {
            dst[out_idx] = x;
            out_idx += 1;
            // Only half of each 512-byte block belongs to this side.
            if i % (256 * 8) == 0 {
                out_idx += 256;
            }
        }
        // Deal with wrap.
        bit += 1;
        if bit >= raw.bitlen {
            bit = 0;
        }
        // If we consumed all bits then repeat the last 16 bits as extra gap.
        if i >= raw.bitlen && (i - raw.bitlen) % 16 == 0 {
            bit = if bit >= 16 { bit - 16 } else { bit + raw.bitlen - 16 };
        }
    }
}
