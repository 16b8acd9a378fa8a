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

    src/containers/imd.rs

    ImageDisk (IMD) images: IBM-format sectors with per-sector run-length
    compression, behind an ASCII comment terminated by 0x1A.
*/

use crate::{
    disk::Disk,
    formats::{
        ibm::{retrieve_ibm_track, setup_ibm_track},
        TrackType,
    },
    io::{Read, ReadWriteSeek, Write},
    DiskError,
};
use crate::codec::ibm::{IBM_MARK_DAM, IBM_MARK_DDAM};

const MODE_FM_500KBPS: u8 = 0;
const MODE_FM_300KBPS: u8 = 1;
const MODE_FM_250KBPS: u8 = 2;
const MODE_MFM_500KBPS: u8 = 3;
const MODE_MFM_300KBPS: u8 = 4;
const MODE_MFM_250KBPS: u8 = 5;

pub struct ImdContainer;

pub static CONTAINER_IMD: ImdContainer = ImdContainer;

impl super::Container for ImdContainer {
    fn init(&self, d: &mut Disk) {
        d.init_tracks(168);
    }

    fn open(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let mut img = Vec::new();
        file.read_to_end(&mut img)?;

        if !img.starts_with(b"IMD ") {
            return Err(DiskError::ImageCorruptError("Bad signature in IMD header".to_string()));
        }
        let Some(comment_end) = img.iter().position(|&b| b == 0x1a) else {
            return Err(DiskError::ImageCorruptError(
                "IMD: Cannot find comment terminator char".to_string(),
            ));
        };

        d.init_tracks(168);

        let mut off = comment_end + 1;
        while off < img.len() {
            if off + 5 > img.len() {
                return Err(DiskError::ImageCorruptError("IMD: Unexpected EOF".to_string()));
            }
            let mode = img[off];
            let cyl = img[off + 1];
            let head = img[off + 2];
            let nr_secs = img[off + 3] as usize;
            let sec_sz_log = img[off + 4];
            off += 5;

            let ttype = match mode {
                MODE_FM_500KBPS => TrackType::IbmFmDd,
                // 300kbps modes are assumed written on a 360 RPM drive.
                MODE_FM_300KBPS | MODE_FM_250KBPS => TrackType::IbmFmSd,
                MODE_MFM_500KBPS => TrackType::IbmMfmHd,
                MODE_MFM_300KBPS | MODE_MFM_250KBPS => TrackType::IbmMfmDd,
                _ => {
                    return Err(DiskError::ImageCorruptError(format!(
                        "IMD: Unknown track mode/density {mode:#04x}"
                    )))
                }
            };

            let trk = cyl as usize * 2 + (head & 1) as usize;
            if trk >= d.di.nr_tracks() {
                return Err(DiskError::ImageCorruptError(format!("IMD: Track {trk} out of range")));
            }
            if sec_sz_log > 7 {
                return Err(DiskError::ImageCorruptError(format!(
                    "IMD: Sector size {sec_sz_log} out of range"
                )));
            }
            if head & 0x3e != 0 {
                return Err(DiskError::ImageCorruptError(format!(
                    "IMD: Unexpected track head value {head:#04x}"
                )));
            }
            let sec_sz = 128usize << sec_sz_log;

            let take = |off: &mut usize, n: usize| -> Result<Vec<u8>, DiskError> {
                if *off + n > img.len() {
                    return Err(DiskError::ImageCorruptError("IMD: Unexpected EOF".to_string()));
                }
                let v = img[*off..*off + n].to_vec();
                *off += n;
                Ok(v)
            };

            let secs = take(&mut off, nr_secs)?;
            let cyls = if head & 0x80 != 0 {
                take(&mut off, nr_secs)?
            }
            else {
                vec![cyl; nr_secs]
            };
            let heads = if head & 0x40 != 0 {
                take(&mut off, nr_secs)?
            }
            else {
                vec![head & 1; nr_secs]
            };

            let mut marks = vec![IBM_MARK_DAM; nr_secs];
            let mut dat = vec![0u8; nr_secs * sec_sz];
            for i in 0..nr_secs {
                let mut c = take(&mut off, 1)?[0];
                if c > 8 {
                    return Err(DiskError::ImageCorruptError(format!(
                        "IMD: trk {trk}, sec {i}: Bad data tag {c:#04x}"
                    )));
                }
                if c > 4 {
                    log::warn!("IMD: trk {trk}, sec {i}: Data CRC error");
                    c -= 4;
                }
                if c > 2 {
                    marks[i] = IBM_MARK_DDAM;
                    c -= 2;
                }
                match c {
                    0 => {
                        log::warn!("IMD: trk {trk}, sec {i}: Sector data unavailable");
                    }
                    1 => {
                        let sec = take(&mut off, sec_sz)?;
                        dat[i * sec_sz..(i + 1) * sec_sz].copy_from_slice(&sec);
                    }
                    2 => {
                        let fill = take(&mut off, 1)?[0];
                        dat[i * sec_sz..(i + 1) * sec_sz].fill(fill);
                    }
                    _ => unreachable!(),
                }
            }

            setup_ibm_track(d, trk, ttype, sec_sz_log, &secs, &cyls, &heads, &marks, &dat);
        }

        Ok(())
    }

    fn close(&self, d: &mut Disk, file: &mut dyn ReadWriteSeek) -> Result<(), DiskError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|t| t.as_secs())
            .unwrap_or(0);
        let (year, month, day, hh, mm, ss) = civil_from_epoch(now);
        let sig = format!(
            "IMD 1.16: {day:02}/{month:02}/{year:04} {hh:02}:{mm:02}:{ss:02}\r\nCreated by fluxforge\r\n\x1a"
        );
        file.write_all(sig.as_bytes())?;

        for trk in 0..d.di.nr_tracks() {
            let ti = &d.di.tracks[trk];
            let mode = match ti.ttype {
                TrackType::IbmFmSd => MODE_FM_250KBPS,
                TrackType::IbmFmDd => MODE_FM_500KBPS,
                TrackType::IbmMfmDd => MODE_MFM_250KBPS,
                TrackType::IbmMfmHd => MODE_MFM_500KBPS,
                TrackType::Unformatted => continue,
                _ => {
                    log::warn!(
                        "T{}.{}: Ignoring track format '{}' while writing IMD file",
                        crate::cyl(trk),
                        crate::hd(trk),
                        ti.typename
                    );
                    continue;
                }
            };
            if ti.nr_sectors == 0 {
                continue;
            }

            let Some(meta) = retrieve_ibm_track(d, trk) else {
                continue;
            };
            let nr_secs = meta.nr_sectors();
            let sec_sz_log = meta.nos[0];
            let sec_sz = 128usize << sec_sz_log;

            if meta.nos.iter().any(|&n| n != sec_sz_log) {
                log::warn!(
                    "T{}.{}: Cannot write mixed-sized sectors to IMD file",
                    crate::cyl(trk),
                    crate::hd(trk)
                );
                continue;
            }

            let mut head = crate::hd(trk) as u8;
            if meta.cyls.iter().any(|&c| c as usize != crate::cyl(trk)) {
                head |= 0x80;
            }
            if meta.heads.iter().any(|&h| h != head & 1) {
                head |= 0x40;
            }

            file.write_all(&[mode, crate::cyl(trk) as u8, head, nr_secs as u8, sec_sz_log])?;
            file.write_all(&meta.secs)?;
            if head & 0x80 != 0 {
                file.write_all(&meta.cyls)?;
            }
            if head & 0x40 != 0 {
                file.write_all(&meta.heads)?;
            }

            for i in 0..nr_secs {
                let sec = &meta.dat[i * sec_sz..(i + 1) * sec_sz];
                let c: u8 = if meta.marks[i] == IBM_MARK_DAM { 1 } else { 3 };
                if sec.iter().all(|&b| b == sec[0]) {
                    // All bytes match: write a compressed sector.
                    file.write_all(&[c + 1, sec[0]])?;
                }
                else {
                    file.write_all(&[c])?;
                    file.write_all(sec)?;
                }
            }
        }

        Ok(())
    }
}

/// Civil date/time from seconds since the Unix epoch (Howard Hinnant's
/// days-from-civil algorithm, inverted).
fn civil_from_epoch(secs: u64) -> (u32, u32, u32, u32, u32, u32) {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hh, mm, ss) = ((rem / 3600) as u32, ((rem % 3600) / 60) as u32, (rem % 60) as u32);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (if month <= 2 { y + 1 } else { y }) as u32;

    (year, month, day, hh, mm, ss)
}

#[cfg(test)]
mod tests {
    use super::civil_from_epoch;

    #[test]
    fn epoch_conversion() {
        assert_eq!(civil_from_epoch(0), (1970, 1, 1, 0, 0, 0));
        // 2000-03-01 00:00:00 UTC
        assert_eq!(civil_from_epoch(951_868_800), (2000, 3, 1, 0, 0, 0));
    }
}
