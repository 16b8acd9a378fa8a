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

    src/formats/rnc_pdos.rs

    Rob Northen Computing Protected DOS (RNC PDOS) format.

    Raw track layout:
     u16 0x1448     :: MFM sync
     12 back-to-back sectors, 0x40a MFM bytes each
    Decoded sector:
     u8 --          :: sector marker MFM sync 0x4891
     u8 sector      :: 0-11
     u8 track       :: 0-159
     u16 csum
     u8 data[512]
     u8 gap_words   :: usually 28(decimal), 0 on last sector
    Sector fields use the even/odd interleave. The header long is EORed with
    the disk key with bit 31 set; data longs are chain EORed with the disk
    key. The key is recovered by brute force from the first good sector and
    published as a disk tag.

    Timings: long track (~105500 bits), uniform density.

    Decoded data layout: u8 sector_data[12][512].
*/

use crate::{
    codec::{amigados_checksum, mfm_decode_bytes, mfm_decode_word, BitcellEncoding},
    disk::{Disk, DiskTag, SectorBitmap, TrackLength, DSKTAG_RNC_PDOS_KEY},
    flux::FluxStream,
    formats::{HandlerData, TrackDensity, TrackHandler},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

const SEC_SIZE: usize = 512;

fn pdos_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let nr_sectors = d.di.tracks[tracknr].nr_sectors as usize;
    let mut block = vec![0u8; SEC_SIZE * nr_sectors];
    let mut key: Option<u32> = match d.get_tag_by_id(DSKTAG_RNC_PDOS_KEY) {
        Some(DiskTag::RncPdosKey(k)) => Some(*k),
        _ => None,
    };

    let mut valid = SectorBitmap::default();
    let mut nr_valid_blocks = 0usize;
    let mut data_bitoff = 0u32;

    'hunt: while s.next_bit().is_some() {
        if s.word as u16 != 0x1448 {
            continue;
        }
        data_bitoff = s.index_offset_bc.wrapping_sub(15);

        for i in 0..nr_sectors {
            // Per-sector sync.
            if s.next_bits(16).is_none() {
                break 'hunt;
            }
            if s.word as u16 != 0x4891 {
                break;
            }

            let mut hdr_raw = [0u8; 2 * 4];
            let mut dat_raw = [0u8; 2 * SEC_SIZE];
            if s.next_bytes(&mut hdr_raw).is_none() || s.next_bytes(&mut dat_raw).is_none() {
                break 'hunt;
            }
            let mut hdr = [0u8; 4];
            let mut dat = [0u8; SEC_SIZE];
            mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, 4, &hdr_raw, &mut hdr);
            mfm_decode_bytes(BitcellEncoding::MfmEvenOdd, SEC_SIZE, &dat_raw, &mut dat);

            let csum32 = amigados_checksum(&dat);
            let csum = (csum32 | (csum32 >> 15)) as u16;

            let k = match key {
                None => {
                    // Brute-force the key from the expected header fields.
                    let k = ((((hdr[0] ^ i as u8) & 0x7f) as u32) << 24)
                        | (((hdr[1] ^ tracknr as u8) as u32) << 16)
                        | (((hdr[2] ^ (csum >> 8) as u8) as u32) << 8)
                        | ((hdr[3] ^ csum as u8) as u32);
                    d.set_tag(DiskTag::RncPdosKey(k));
                    key = Some(k);
                    k
                }
                Some(k) => {
                    let kb = k.to_be_bytes();
                    if hdr[0] ^ kb[0] ^ 0x80 != i as u8
                        || hdr[1] ^ kb[1] != tracknr as u8
                        || hdr[2] ^ kb[2] != (csum >> 8) as u8
                        || hdr[3] ^ kb[3] != csum as u8
                    {
                        break;
                    }
                    k
                }
            };

            if !valid.is_valid(i) {
                // Decrypt and stash the data block.
                let mut kk = k;
                for j in 0..SEC_SIZE / 4 {
                    let enc = u32::from_be(bytemuck::pod_read_unaligned::<u32>(&dat[j * 4..j * 4 + 4]));
                    block[i * SEC_SIZE + j * 4..i * SEC_SIZE + j * 4 + 4]
                        .copy_from_slice(&(enc ^ kk).to_be_bytes());
                    kk = enc;
                }

                valid.set_valid(i);
                nr_valid_blocks += 1;
                if nr_valid_blocks == nr_sectors {
                    break 'hunt;
                }
            }

            // Skip the sector gap.
            if s.next_bits(16).is_none() {
                break 'hunt;
            }
            let skip = (mfm_decode_word(s.word) & 0xFF) as u32;
            if s.next_bits(skip * 16).is_none() {
                break 'hunt;
            }
        }
    }

    if nr_valid_blocks < 3 {
        return None;
    }

    let ti = &mut d.di.tracks[tracknr];
    ti.valid_sectors = valid;
    ti.data_bitoff = data_bitoff;
    ti.total_bits = TrackLength::Fixed(105_500);

    Some(block)
}

fn pdos_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let key = match d.get_tag_by_id(DSKTAG_RNC_PDOS_KEY) {
        Some(DiskTag::RncPdosKey(k)) => *k,
        _ => {
            log::error!("T{}.{}: No PDOS disk key tag; cannot encode", crate::cyl(tracknr), crate::hd(tracknr));
            return;
        }
    };

    tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, 0x1448);

    let nr_sectors = ti.nr_sectors as usize;
    let mut emitted = 0usize;
    for i in 0..nr_sectors {
        if !ti.is_valid_sector(i) {
            break;
        }
        emitted += 1;

        // sync
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, 0x4891);

        // encrypt data
        let mut enc = [0u8; SEC_SIZE];
        let mut k = key;
        for j in 0..SEC_SIZE / 4 {
            let lw = &ti.dat[i * SEC_SIZE + j * 4..i * SEC_SIZE + j * 4 + 4];
            k ^= u32::from_be(bytemuck::pod_read_unaligned::<u32>(lw));
            enc[j * 4..j * 4 + 4].copy_from_slice(&k.to_be_bytes());
        }

        // header
        let csum = amigados_checksum(&enc);
        let mut hdr = ((i as u32) << 24) | ((tracknr as u32) << 16);
        hdr |= (csum & 0x5555) | ((csum >> 15) & 0xaaaa);
        hdr ^= key ^ (1u32 << 31);
        tbuf.bits(SPEED_AVG, BitcellEncoding::MfmEvenOdd, 32, hdr);

        // data
        tbuf.bytes(SPEED_AVG, BitcellEncoding::MfmEvenOdd, &enc);

        // gap
        let gap_words = if i == nr_sectors - 1 { 0 } else { 28 };
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, gap_words);
        for _ in 0..28 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0);
        }
    }

    // If the tail of the track is bad, fill it with gap.
    let tail = nr_sectors - emitted;
    if tail != 0 {
        let bytes = tail * (1 + 4 + SEC_SIZE + 1 + 28) - 28;
        for _ in 0..bytes {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0);
        }
    }
}

pub(crate) static RNC_PDOS_HANDLER: TrackHandler = TrackHandler {
    density: TrackDensity::Double,
    bytes_per_sector: SEC_SIZE as u32,
    nr_sectors: 12,
    write_raw: Some(pdos_write_raw),
    read_raw: Some(pdos_read_raw),
    write_sectors: None,
    read_sectors: None,
    extra: HandlerData::None,
};
