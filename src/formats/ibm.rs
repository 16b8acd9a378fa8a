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

    src/formats/ibm.rs

    IBM System/34 track formats.

    Two families share this module:

    - The clean-geometry family (ibm_pc_dd and friends): 9/18/36 512-byte
      sectors (plus the Siemens, Acorn, DMF and Trace registrations), with
      sector ids in natural order. Decoded data layout: sector payloads in id
      order plus a trailing IAM-present byte.

    - The metadata-carrying family (ibm_mfm_* / ibm_fm_*): every IDAM/DAM on
      the track is recorded with its id fields, mark and CRC, preserving
      sector order and odd geometry. This is the layout the ImageDisk
      container round-trips through. Decoded data layout: one 7-byte map
      entry per sector (sec, cyl, head, no, mark, crc) followed by the
      concatenated payloads.
*/

use crate::{
    codec::{
        ibm::{
            read_idam, scan_dam, scan_dam_fm, scan_idam, scan_idam_fm, scan_mark, IbmIdam, FM_RAW_IAM,
            IBM_MARK_DAM, IBM_MARK_DDAM, IBM_MARK_IDAM,
        },
        mfm_decode_bytes, BitcellEncoding,
    },
    disk::{Disk, TrackLength},
    flux::FluxStream,
    formats::{handler, init_track_info, HandlerData, TrackDensity, TrackHandler, TrackType},
    tbuf::TrackBuffer,
    SPEED_AVG,
};

fn sector_base(ttype: TrackType) -> u8 {
    match handler(ttype).extra {
        HandlerData::SectorBase(base) => base,
        HandlerData::IbmScan { sector_base, .. } => sector_base,
        _ => 0,
    }
}

fn is_fm(ttype: TrackType) -> bool {
    matches!(handler(ttype).extra, HandlerData::IbmScan { fm: true, .. })
}

/* ------------------------------------------------------------------------
 * Clean-geometry family
 */

fn ibm_img_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let (nr_sectors, bytes_per_sector, ttype) = {
        let ti = &d.di.tracks[tracknr];
        (ti.nr_sectors as usize, ti.bytes_per_sector as usize, ti.ttype)
    };
    let base = sector_base(ttype);

    let mut block = vec![0u8; nr_sectors * bytes_per_sector];
    let mut valid = crate::disk::SectorBitmap::default();
    let mut nr_valid_blocks = 0usize;

    // IAM
    let mut iam = false;
    while !iam && s.next_bit().is_some() {
        if s.word != 0x5224_5224 {
            continue;
        }
        if s.next_bits(32).is_none() {
            break;
        }
        iam = s.word == 0x5224_5552;
    }

    s.reset();

    'sector_scan: while nr_valid_blocks != nr_sectors {
        let Some((mut idam, _)) = scan_idam(s) else {
            break;
        };

        loop {
            if s.crc16_ccitt != 0 {
                continue 'sector_scan;
            }

            // PCs start numbering sectors at 1, other platforms at 0.
            let sec = idam.sec.wrapping_sub(base) as usize;

            if sec >= nr_sectors
                || idam.cyl as usize != crate::cyl(tracknr)
                || idam.head as usize != crate::hd(tracknr)
                || idam.no > 7
            {
                log::warn!(
                    "T{}.{}: Unexpected IDAM sec={:02x} cyl={:02x} hd={:02x} no={:02x}",
                    crate::cyl(tracknr),
                    crate::hd(tracknr),
                    idam.sec,
                    idam.cyl,
                    idam.head,
                    idam.no
                );
                continue 'sector_scan;
            }

            // Is the sector size valid for this format?
            let sec_sz = 128usize << idam.no;
            if sec_sz != bytes_per_sector {
                log::warn!(
                    "T{}.{}: Unexpected IDAM sector size sec={:02x} secsz={} wanted={}",
                    crate::cyl(tracknr),
                    crate::hd(tracknr),
                    idam.sec,
                    sec_sz,
                    bytes_per_sector
                );
                continue 'sector_scan;
            }

            if valid.is_valid(sec) {
                continue 'sector_scan;
            }

            // DAM
            let Some((mark, _)) = scan_mark(s, 1000) else {
                continue 'sector_scan;
            };
            if mark == IBM_MARK_IDAM {
                if let Some(new_idam) = read_idam(s) {
                    idam = new_idam;
                    continue; // redo with the new header
                }
                continue 'sector_scan;
            }
            if mark != IBM_MARK_DAM {
                continue 'sector_scan;
            }

            let mut raw = vec![0u8; 2 * sec_sz];
            if s.next_bytes(&mut raw).is_none() || s.next_bits(32).is_none() || s.crc16_ccitt != 0 {
                continue 'sector_scan;
            }

            mfm_decode_bytes(
                BitcellEncoding::Mfm,
                sec_sz,
                &raw,
                &mut block[sec * sec_sz..(sec + 1) * sec_sz],
            );
            valid.set_valid(sec);
            nr_valid_blocks += 1;
            continue 'sector_scan;
        }
    }

    if nr_valid_blocks == 0 {
        return None;
    }

    block.push(iam as u8);

    let ti = &mut d.di.tracks[tracknr];
    ti.valid_sectors = valid;
    ti.data_bitoff = 80 * 16; // Gap 4A

    Some(block)
}

/// Gap 3 length in bytes, clamped so the track always fits the canvas.
fn gap3_bytes(preferred: u32, total_bits: u32, data_bitoff: u32, iam_bytes: u32, nr: u32, fixed_bytes: u32) -> u32 {
    let budget = (total_bits / 16).saturating_sub(data_bitoff / 16 + iam_bytes + nr * fixed_bytes);
    preferred.min((budget / nr.max(1)).max(2))
}

fn ibm_img_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let base = sector_base(ti.ttype);
    let cyl = crate::cyl(tracknr) as u32;
    let hd = crate::hd(tracknr) as u32;
    let iam = *ti.dat.last().unwrap_or(&0) != 0;
    let sec_sz = ti.bytes_per_sector as usize;

    tbuf.set_gap_fill_byte(0x4e);

    let mut no = 0u32;
    while (128 << no) != ti.bytes_per_sector {
        no += 1;
    }

    let preferred = match ti.ttype {
        TrackType::IbmPcDd | TrackType::AtariSt720kb => 84,
        TrackType::IbmPcDd10Sec => 30,
        _ => 108,
    };
    let total_bits = ti.total_bits.fixed().unwrap_or(crate::default_bits_per_track(d.rpm));
    let fixed_bytes = (12 + 8 + 4 + 2 + 22 + 12 + 8 + 2) as u32 + ti.bytes_per_sector;
    let iam_bytes = if iam { 12 + 8 + 50 } else { 0 };
    let gap3 = gap3_bytes(
        preferred,
        total_bits,
        ti.data_bitoff,
        iam_bytes,
        ti.nr_sectors as u32,
        fixed_bytes,
    );

    // Gap 4A is included in the data start offset.

    // IAM
    if iam {
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x5224_5224);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x5224_5552);
        for _ in 0..50 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }
    }

    for sec in 0..ti.nr_sectors as u32 {
        // IDAM
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_5554);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, cyl);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, hd);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, sec + base as u32);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, no);
        tbuf.emit_crc16_ccitt(SPEED_AVG);
        for _ in 0..22 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }

        // DAM
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.start_crc();
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_5545);
        tbuf.bytes(
            SPEED_AVG,
            BitcellEncoding::Mfm,
            &ti.dat[sec as usize * sec_sz..(sec as usize + 1) * sec_sz],
        );
        tbuf.emit_crc16_ccitt(SPEED_AVG);
        for _ in 0..gap3 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }
    }
}

fn ibm_img_write_sectors(d: &mut Disk, tracknr: usize, sectors: &[u8]) -> Option<Vec<u8>> {
    let rpm = d.rpm;
    let ti = &mut d.di.tracks[tracknr];
    let len = ti.nr_sectors as usize * ti.bytes_per_sector as usize;
    if sectors.len() < len {
        return None;
    }

    let iam = ti.ttype != TrackType::AtariSt720kb;

    let mut block = sectors[..len].to_vec();
    block.push(iam as u8);

    let ns_per_cell = handler(ti.ttype).density.ns_per_cell();
    ti.total_bits =
        TrackLength::Fixed((crate::default_bits_per_track(rpm) as u64 * 2000 / ns_per_cell as u64) as u32);
    ti.set_all_sectors_valid();
    ti.data_bitoff = 80 * 16; // Gap 4A

    Some(block)
}

fn ibm_img_read_sectors(d: &Disk, tracknr: usize) -> Option<Vec<u8>> {
    let ti = &d.di.tracks[tracknr];
    if ti.dat.is_empty() {
        return None;
    }
    Some(ti.dat[..ti.dat.len() - 1].to_vec())
}

/* ------------------------------------------------------------------------
 * Metadata-carrying family
 */

const META_ENTRY: usize = 7; // sec, cyl, head, no, mark, crc_hi, crc_lo

/// Unmarshalled view of a metadata-carrying IBM track.
pub struct IbmTrackMeta {
    pub secs: Vec<u8>,
    pub cyls: Vec<u8>,
    pub heads: Vec<u8>,
    pub nos: Vec<u8>,
    pub marks: Vec<u8>,
    pub crcs: Vec<u16>,
    pub dat: Vec<u8>,
}

impl IbmTrackMeta {
    pub fn nr_sectors(&self) -> usize {
        self.secs.len()
    }

    fn marshal(&self) -> Vec<u8> {
        let nr = self.nr_sectors();
        let mut out = Vec::with_capacity(nr * META_ENTRY + self.dat.len());
        for i in 0..nr {
            out.push(self.secs[i]);
            out.push(self.cyls[i]);
            out.push(self.heads[i]);
            out.push(self.nos[i]);
            out.push(self.marks[i]);
            out.extend_from_slice(&self.crcs[i].to_be_bytes());
        }
        out.extend_from_slice(&self.dat);
        out
    }

    fn unmarshal(dat: &[u8], nr: usize) -> IbmTrackMeta {
        let mut meta = IbmTrackMeta {
            secs: Vec::with_capacity(nr),
            cyls: Vec::with_capacity(nr),
            heads: Vec::with_capacity(nr),
            nos: Vec::with_capacity(nr),
            marks: Vec::with_capacity(nr),
            crcs: Vec::with_capacity(nr),
            dat: dat[nr * META_ENTRY..].to_vec(),
        };
        for i in 0..nr {
            let e = &dat[i * META_ENTRY..(i + 1) * META_ENTRY];
            meta.secs.push(e[0]);
            meta.cyls.push(e[1]);
            meta.heads.push(e[2]);
            meta.nos.push(e[3]);
            meta.marks.push(e[4]);
            meta.crcs.push(u16::from_be_bytes([e[5], e[6]]));
        }
        meta
    }
}

/// Export the per-sector metadata of an `ibm_mfm_*`/`ibm_fm_*` track.
pub fn retrieve_ibm_track(d: &Disk, tracknr: usize) -> Option<IbmTrackMeta> {
    let ti = &d.di.tracks[tracknr];
    match ti.ttype {
        TrackType::IbmMfmDd | TrackType::IbmMfmHd | TrackType::IbmFmSd | TrackType::IbmFmDd => {
            Some(IbmTrackMeta::unmarshal(&ti.dat, ti.nr_sectors as usize))
        }
        _ => None,
    }
}

/// Install a metadata-carrying IBM track from explicit per-sector maps, as
/// the ImageDisk container does when no flux is involved.
pub fn setup_ibm_track(
    d: &mut Disk,
    tracknr: usize,
    ttype: TrackType,
    sec_sz_log: u8,
    secs: &[u8],
    cyls: &[u8],
    heads: &[u8],
    marks: &[u8],
    dat: &[u8],
) {
    let nr = secs.len();
    let sec_sz = 128usize << sec_sz_log;
    let mut meta = IbmTrackMeta {
        secs: secs.to_vec(),
        cyls: cyls.to_vec(),
        heads: heads.to_vec(),
        nos: vec![sec_sz_log; nr],
        marks: marks.to_vec(),
        crcs: Vec::with_capacity(nr),
        dat: dat.to_vec(),
    };
    for i in 0..nr {
        let mut crc = crate::util::crc16_ccitt(&[0xA1, 0xA1, 0xA1, marks[i]], 0xFFFF);
        crc = crate::util::crc16_ccitt(&dat[i * sec_sz..(i + 1) * sec_sz], crc);
        meta.crcs.push(crc);
    }

    let ns_per_cell = handler(ttype).density.ns_per_cell();
    let total_bits = (crate::default_bits_per_track(d.rpm) as u64 * 2000 / ns_per_cell as u64) as u32;

    let ti = &mut d.di.tracks[tracknr];
    *ti = crate::disk::TrackInfo::default();
    init_track_info(ti, ttype);
    ti.nr_sectors = nr as u16;
    ti.bytes_per_sector = sec_sz as u32;
    ti.valid_sectors.set_all(nr);
    ti.data_bitoff = if is_fm(ttype) { 40 * 16 } else { 80 * 16 };
    ti.total_bits = TrackLength::Fixed(total_bits);
    ti.dat = meta.marshal();
}

fn ibm_meta_write_raw(d: &mut Disk, tracknr: usize, s: &mut FluxStream) -> Option<Vec<u8>> {
    let ttype = d.di.tracks[tracknr].ttype;
    let fm = is_fm(ttype);

    let mut meta = IbmTrackMeta {
        secs: Vec::new(),
        cyls: Vec::new(),
        heads: Vec::new(),
        nos: Vec::new(),
        marks: Vec::new(),
        crcs: Vec::new(),
        dat: Vec::new(),
    };
    let mut seen: Vec<IbmIdam> = Vec::new();

    loop {
        let idam = if fm { scan_idam_fm(s) } else { scan_idam(s) };
        let Some((idam, _)) = idam else {
            break;
        };
        if s.crc16_ccitt != 0 || idam.no > 7 {
            continue;
        }
        if seen.contains(&idam) {
            break; // wrapped into the second revolution
        }
        if seen.len() >= 256 {
            break;
        }
        seen.push(idam);

        let mark = if fm { scan_dam_fm(s) } else { scan_dam(s) };
        let Some(mark) = mark else {
            continue;
        };

        let sec_sz = 128usize << idam.no;
        let mut raw = vec![0u8; 2 * sec_sz];
        if s.next_bytes(&mut raw).is_none() || s.next_bits(32).is_none() {
            break;
        }
        if s.crc16_ccitt != 0 {
            log::warn!(
                "T{}.{}: Data CRC error in sector {:02x}; skipped",
                crate::cyl(tracknr),
                crate::hd(tracknr),
                idam.sec
            );
            continue;
        }

        let mut dec = vec![0u8; sec_sz];
        mfm_decode_bytes(BitcellEncoding::Mfm, sec_sz, &raw, &mut dec);

        let mut crc = if fm {
            crate::util::crc16_ccitt(&[mark], 0xFFFF)
        }
        else {
            crate::util::crc16_ccitt(&[0xA1, 0xA1, 0xA1, mark], 0xFFFF)
        };
        crc = crate::util::crc16_ccitt(&dec, crc);

        meta.secs.push(idam.sec);
        meta.cyls.push(idam.cyl);
        meta.heads.push(idam.head);
        meta.nos.push(idam.no);
        meta.marks.push(mark);
        meta.crcs.push(crc);
        meta.dat.extend_from_slice(&dec);
    }

    if meta.nr_sectors() == 0 {
        return None;
    }

    let uniform = meta.nos.iter().all(|&n| n == meta.nos[0]);
    let nr = meta.nr_sectors();

    let ti = &mut d.di.tracks[tracknr];
    ti.nr_sectors = nr as u16;
    ti.bytes_per_sector = if uniform { 128 << meta.nos[0] } else { 0 };
    ti.valid_sectors.set_all(nr);
    ti.data_bitoff = if fm { 40 * 16 } else { 80 * 16 };

    Some(meta.marshal())
}

fn ibm_meta_read_raw(d: &Disk, tracknr: usize, tbuf: &mut TrackBuffer) {
    let ti = &d.di.tracks[tracknr];
    let fm = is_fm(ti.ttype);
    let Some(meta) = retrieve_ibm_track(d, tracknr) else {
        return;
    };
    let nr = meta.nr_sectors() as u32;

    tbuf.set_gap_fill_byte(if fm { 0xFF } else { 0x4E });

    let total_bits = ti.total_bits.fixed().unwrap_or(crate::default_bits_per_track(d.rpm));
    let payload: u32 = meta.nos.iter().map(|&n| 128u32 << n).sum();
    let per_sector_overhead: u32 = if fm { 6 + 1 + 4 + 2 + 11 + 6 + 1 + 2 } else { 12 + 8 + 4 + 2 + 22 + 12 + 8 + 2 };
    let iam_bytes: u32 = if fm { 6 + 1 + 11 } else { 12 + 8 + 50 };
    let budget = (total_bits / 16).saturating_sub(ti.data_bitoff / 16 + iam_bytes + nr * per_sector_overhead + payload);
    let gap3 = (budget / nr.max(1)).clamp(2, 108);

    // IAM
    if fm {
        for _ in 0..6 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0x00);
        }
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, FM_RAW_IAM as u32);
        for _ in 0..11 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0xFF);
        }
    }
    else {
        for _ in 0..12 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
        }
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x5224_5224);
        tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x5224_5552);
        for _ in 0..50 {
            tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
        }
    }

    let mut dat_off = 0usize;
    for i in 0..nr as usize {
        let sec_sz = 128usize << meta.nos[i];
        let dam_raw: u32 = if meta.marks[i] == IBM_MARK_DDAM { 0x4489_554A } else { 0x4489_5545 };

        if fm {
            // IDAM
            for _ in 0..6 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0x00);
            }
            tbuf.start_crc();
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, crate::codec::ibm::FM_RAW_IDAM as u32);
            for &b in &[meta.cyls[i], meta.heads[i], meta.secs[i], meta.nos[i]] {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, b as u32);
            }
            tbuf.emit_crc16_ccitt(SPEED_AVG);
            for _ in 0..11 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0xFF);
            }

            // DAM
            for _ in 0..6 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0x00);
            }
            tbuf.start_crc();
            let raw_mark: u32 = if meta.marks[i] == IBM_MARK_DDAM {
                crate::codec::ibm::FM_RAW_DDAM as u32
            }
            else {
                crate::codec::ibm::FM_RAW_DAM as u32
            };
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 16, raw_mark);
            for &b in &meta.dat[dat_off..dat_off + sec_sz] {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, b as u32);
            }
            tbuf.emit_crc16_ccitt(SPEED_AVG);
            for _ in 0..gap3 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Fm, 8, 0xFF);
            }
        }
        else {
            // IDAM
            for _ in 0..12 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
            }
            tbuf.start_crc();
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_5554);
            for &b in &[meta.cyls[i], meta.heads[i], meta.secs[i], meta.nos[i]] {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, b as u32);
            }
            tbuf.emit_crc16_ccitt(SPEED_AVG);
            for _ in 0..22 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
            }

            // DAM
            for _ in 0..12 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x00);
            }
            tbuf.start_crc();
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, 0x4489_4489);
            tbuf.bits(SPEED_AVG, BitcellEncoding::Raw, 32, dam_raw);
            tbuf.bytes(SPEED_AVG, BitcellEncoding::Mfm, &meta.dat[dat_off..dat_off + sec_sz]);
            tbuf.emit_crc16_ccitt(SPEED_AVG);
            for _ in 0..gap3 {
                tbuf.bits(SPEED_AVG, BitcellEncoding::Mfm, 8, 0x4e);
            }
        }

        dat_off += sec_sz;
    }
}

/* ------------------------------------------------------------------------
 * Registrations
 */

const fn ibm_img(density: TrackDensity, bytes_per_sector: u32, nr_sectors: u16, base: u8) -> TrackHandler {
    TrackHandler {
        density,
        bytes_per_sector,
        nr_sectors,
        write_raw: Some(ibm_img_write_raw),
        read_raw: Some(ibm_img_read_raw),
        write_sectors: Some(ibm_img_write_sectors),
        read_sectors: Some(ibm_img_read_sectors),
        extra: HandlerData::SectorBase(base),
    }
}

const fn ibm_meta(density: TrackDensity, fm: bool) -> TrackHandler {
    TrackHandler {
        density,
        bytes_per_sector: 0,
        nr_sectors: 0,
        write_raw: Some(ibm_meta_write_raw),
        read_raw: Some(ibm_meta_read_raw),
        write_sectors: None,
        read_sectors: None,
        extra: HandlerData::IbmScan { sector_base: 1, fm },
    }
}

/* IBM PC 3.5in 720K (80 track) and 5.25in 360K (40 track) */
pub(crate) static IBM_PC_DD_HANDLER: TrackHandler = ibm_img(TrackDensity::Double, 512, 9, 1);

/* Non-standard 10-sector version of the above, with reduced sector gap. */
pub(crate) static IBM_PC_DD_10SEC_HANDLER: TrackHandler = ibm_img(TrackDensity::Double, 512, 10, 1);

/* IBM PC 5.25in HD 1200K */
pub(crate) static IBM_PC_HD_5_25_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 512, 15, 1);

pub(crate) static IBM_PC_HD_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 512, 18, 1);

pub(crate) static IBM_PC_ED_HANDLER: TrackHandler = ibm_img(TrackDensity::Extra, 512, 36, 1);

pub(crate) static ATARI_ST_720KB_HANDLER: TrackHandler = ibm_img(TrackDensity::Double, 512, 9, 1);

/* Microsoft DMF: 21 spt, 512 bytes/sector, 80 tracks */
pub(crate) static MICROSOFT_DMF_HD_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 512, 21, 1);

/* Siemens iSDX telephone exchange. 80 tracks. */
pub(crate) static SIEMENS_ISDX_HD_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 256, 32, 1);

/* Trace Mountain Products "TRACEBACK" duplicator info. Always stored on
 * phys cyl 80, heads 0 & 1, identical data on both sides. */
pub(crate) static TRACE_TRACEBACK_HD_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 2048, 1, 1);

/* Acorn ADFS: S is 40 tracks single sided, M is 80 single sided, L is 80
 * double sided, all DD. */
pub(crate) static ACORN_ADFS_S_M_L_HANDLER: TrackHandler = ibm_img(TrackDensity::Double, 256, 16, 0);

/* Acorn ADFS "D" or "E": 80 track double sided DD */
pub(crate) static ACORN_ADFS_D_E_HANDLER: TrackHandler = ibm_img(TrackDensity::Double, 1024, 5, 0);

/* Acorn ADFS "F": 80 track double sided HD */
pub(crate) static ACORN_ADFS_F_HANDLER: TrackHandler = ibm_img(TrackDensity::High, 1024, 10, 0);

pub(crate) static IBM_MFM_DD_HANDLER: TrackHandler = ibm_meta(TrackDensity::Double, false);
pub(crate) static IBM_MFM_HD_HANDLER: TrackHandler = ibm_meta(TrackDensity::High, false);
pub(crate) static IBM_FM_SD_HANDLER: TrackHandler = ibm_meta(TrackDensity::Single, true);
pub(crate) static IBM_FM_DD_HANDLER: TrackHandler = ibm_meta(TrackDensity::Double, true);
