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

    src/disk/mod.rs

    The in-memory disk model: per-track decoded state, disk-wide metadata
    tags, and the analyse/encode dispatch shared by every container.
*/

use crate::{
    containers::{self, Container},
    default_bits_per_track,
    flux::FluxStream,
    formats::{self, init_track_info, TrackType},
    tbuf::{TrackBuffer, TrackRaw},
    DiskError, DEFAULT_RPM, SPEED_WEAK,
};
use bit_vec::BitVec;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Tag ids as serialised in the native container.
pub const DSKTAG_RNC_PDOS_KEY: u16 = 1;
pub const DSKTAG_DISK_NR: u16 = 2;
pub const DSKTAG_END: u16 = 0xFFFF;

/// Disk-wide metadata produced by handlers (e.g. encryption keys, disk
/// serial numbers). Ids are unique per disk; a second writer consults the
/// existing tag rather than replacing it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiskTag {
    RncPdosKey(u32),
    DiskNr(u32),
}

impl DiskTag {
    pub fn id(&self) -> u16 {
        match self {
            DiskTag::RncPdosKey(_) => DSKTAG_RNC_PDOS_KEY,
            DiskTag::DiskNr(_) => DSKTAG_DISK_NR,
        }
    }

    /// Serialise the payload; multi-byte fields are byte-swapped to big
    /// endian for the on-disk tag list.
    pub fn payload_be(&self) -> Vec<u8> {
        match self {
            DiskTag::RncPdosKey(key) => key.to_be_bytes().to_vec(),
            DiskTag::DiskNr(nr) => nr.to_be_bytes().to_vec(),
        }
    }

    pub fn from_wire(id: u16, payload: &[u8]) -> Option<DiskTag> {
        let word = |p: &[u8]| -> Option<u32> {
            Some(u32::from_be_bytes([
                *p.first()?,
                *p.get(1)?,
                *p.get(2)?,
                *p.get(3)?,
            ]))
        };
        match id {
            DSKTAG_RNC_PDOS_KEY => Some(DiskTag::RncPdosKey(word(payload)?)),
            DSKTAG_DISK_NR => Some(DiskTag::DiskNr(word(payload)?)),
            _ => None,
        }
    }
}

/// Total bit length of one physical revolution.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TrackLength {
    /// Length still to be measured from the stream.
    #[default]
    Unknown,
    /// Exact bitcell count, modulo jitter at the write splice.
    Fixed(u32),
    /// Flakey-bit track: data and length may change every revolution.
    Weak,
}

impl TrackLength {
    pub fn fixed(&self) -> Option<u32> {
        match self {
            TrackLength::Fixed(n) => Some(*n),
            _ => None,
        }
    }
}

/// Bitmap of authoritative sectors, bit per sector, MSB first per byte.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SectorBitmap(pub [u8; 8]);

impl SectorBitmap {
    pub fn is_valid(&self, sec: usize) -> bool {
        (self.0[sec >> 3] >> (7 - (sec & 7))) & 1 != 0
    }

    pub fn set_valid(&mut self, sec: usize) {
        self.0[sec >> 3] |= 0x80 >> (sec & 7);
    }

    pub fn set_all(&mut self, nr: usize) {
        self.0 = [0; 8];
        for sec in 0..nr {
            self.set_valid(sec);
        }
    }

    pub fn clear_all(&mut self) {
        self.0 = [0; 8];
    }

    pub fn nr_valid(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn all_valid(&self, nr: usize) -> bool {
        (0..nr).all(|sec| self.is_valid(sec))
    }
}

/// Decoded representation of one physical track, exclusively owning its
/// payload blob.
#[derive(Clone, Debug)]
pub struct TrackInfo {
    pub ttype: TrackType,
    pub typename: &'static str,
    pub flags: u16,
    pub nr_sectors: u16,
    pub bytes_per_sector: u32,
    pub valid_sectors: SectorBitmap,
    pub dat: Vec<u8>,
    /// Full bitcells between the index pulse and the first data bitcell.
    pub data_bitoff: u32,
    pub total_bits: TrackLength,
}

impl Default for TrackInfo {
    fn default() -> TrackInfo {
        TrackInfo {
            ttype: TrackType::Unformatted,
            typename: TrackType::Unformatted.name(),
            flags: 0,
            nr_sectors: 0,
            bytes_per_sector: 0,
            valid_sectors: SectorBitmap::default(),
            dat: Vec::new(),
            data_bitoff: 0,
            total_bits: TrackLength::Unknown,
        }
    }
}

impl TrackInfo {
    pub fn is_valid_sector(&self, sec: usize) -> bool {
        self.valid_sectors.is_valid(sec)
    }

    pub fn set_sector_valid(&mut self, sec: usize) {
        self.valid_sectors.set_valid(sec);
    }

    pub fn set_all_sectors_valid(&mut self) {
        let nr = self.nr_sectors as usize;
        self.valid_sectors.set_all(nr);
    }

    pub fn set_all_sectors_invalid(&mut self) {
        self.valid_sectors.clear_all();
    }
}

/// Per-disk track array plus disk-wide flags.
#[derive(Clone, Debug, Default)]
pub struct DiskInfo {
    pub flags: u16,
    pub tracks: Vec<TrackInfo>,
}

impl DiskInfo {
    pub fn nr_tracks(&self) -> usize {
        self.tracks.len()
    }
}

/// A top-level open container.
pub struct Disk {
    pub(crate) path: PathBuf,
    pub rpm: u32,
    pub di: DiskInfo,
    pub(crate) tags: Vec<DiskTag>,
    pub(crate) container: &'static dyn Container,
}

impl Disk {
    /// Create a brand new empty container for `path`. Nothing is written
    /// until `close`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Disk, DiskError> {
        let path = path.as_ref().to_path_buf();
        let container = containers::container_for_path(&path)?;
        let mut disk = Disk {
            path,
            rpm: DEFAULT_RPM,
            di: DiskInfo::default(),
            tags: Vec::new(),
            container,
        };
        container.init(&mut disk);
        Ok(disk)
    }

    /// Open an existing container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Disk, DiskError> {
        let path = path.as_ref().to_path_buf();
        let container = containers::container_for_path(&path)?;
        let mut file = std::fs::File::open(&path)?;
        let mut disk = Disk {
            path,
            rpm: DEFAULT_RPM,
            di: DiskInfo::default(),
            tags: Vec::new(),
            container,
        };
        container.open(&mut disk, &mut file)?;
        Ok(disk)
    }

    /// Close the disk, rewriting the target file wholesale.
    pub fn close(mut self) -> Result<(), DiskError> {
        let container = self.container;
        let path = self.path.clone();
        let mut file = std::fs::File::create(path)?;
        container.close(&mut self, &mut file)
    }

    pub fn nr_tracks(&self) -> usize {
        self.di.nr_tracks()
    }

    /// Initialise `nr_tracks` unformatted tracks. Shared by container init
    /// implementations.
    pub(crate) fn init_tracks(&mut self, nr_tracks: usize) {
        self.di.tracks = vec![TrackInfo::default(); nr_tracks];
        for tracknr in 0..nr_tracks {
            self.track_mark_unformatted(tracknr);
        }
    }

    /// Mark a track unformatted: flakey random bitcells of random length.
    pub fn track_mark_unformatted(&mut self, tracknr: usize) {
        let ti = &mut self.di.tracks[tracknr];
        *ti = TrackInfo::default();
        ti.total_bits = TrackLength::Weak;
    }

    /// Analyse the flux stream as the given format and store the result.
    /// Returns false if the handler rejected the track, in which case it is
    /// left marked unformatted.
    pub fn write_raw_track(&mut self, tracknr: usize, ttype: TrackType, s: &mut FluxStream) -> bool {
        let h = formats::handler(ttype);
        let ns_per_cell = h.density.ns_per_cell();
        s.set_density(ns_per_cell);
        let default_len = (default_bits_per_track(self.rpm) as u64 * 2000 / ns_per_cell as u64) as u32;

        {
            let ti = &mut self.di.tracks[tracknr];
            *ti = TrackInfo::default();
            init_track_info(ti, ttype);
            ti.total_bits = TrackLength::Fixed(default_len);
        }

        if ttype == TrackType::Unformatted {
            self.track_mark_unformatted(tracknr);
            return true;
        }

        let mut dat = None;
        if s.select_track(tracknr).is_ok() {
            if let Some(write_raw) = h.write_raw {
                dat = write_raw(self, tracknr, s);
            }
        }

        let Some(dat) = dat else {
            self.track_mark_unformatted(tracknr);
            self.di.tracks[tracknr].typename = "Unformatted*";
            return false;
        };

        // Measure the observed revolution length for sanity and for
        // handlers that left the length open.
        s.reset();
        let _ = s.next_index();
        if s.track_len_bc == 0 {
            let _ = s.next_index();
        }
        let observed = s.track_len_bc;

        let ti = &mut self.di.tracks[tracknr];
        ti.dat = dat;
        match ti.total_bits {
            TrackLength::Unknown => {
                ti.total_bits = TrackLength::Fixed(if observed != 0 { observed } else { default_len });
            }
            TrackLength::Weak => {}
            TrackLength::Fixed(n) => {
                if observed != 0 && (observed - observed / 50 > n || observed + observed / 50 < n) {
                    log::warn!(
                        "T{}.{}: Unexpected track length (seen {}, expected {})",
                        crate::cyl(tracknr),
                        crate::hd(tracknr),
                        observed,
                        n
                    );
                }
            }
        }

        if let TrackLength::Fixed(n) = ti.total_bits {
            let mut off = (ti.data_bitoff as i32) % (n as i32);
            if off < 0 {
                off += n as i32;
            }
            ti.data_bitoff = off as u32;
        }

        true
    }

    /// The disk-analyser entry point: invoke the candidate formats in order
    /// and accept the first whose analyser succeeds.
    pub fn try_types(&mut self, tracknr: usize, candidates: &[TrackType], s: &mut FluxStream) -> bool {
        for &ttype in candidates {
            if self.write_raw_track(tracknr, ttype, s) {
                return true;
            }
        }
        log::warn!(
            "T{}.{}: No matching format; track left unformatted",
            crate::cyl(tracknr),
            crate::hd(tracknr)
        );
        false
    }

    /// Render one track to its raw bitcell view.
    pub fn track_read_raw(&self, tracknr: usize) -> TrackRaw {
        let ti = &self.di.tracks[tracknr];

        let bitlen = match ti.total_bits {
            TrackLength::Fixed(n) if ti.ttype != TrackType::Unformatted => n,
            _ => {
                // Unformatted and flakey tracks render as random flux of
                // roughly nominal length.
                let mut rng = rand::thread_rng();
                let bitlen = default_bits_per_track(self.rpm) as usize + rng.gen_range(0..700);
                let mut bits = BitVec::from_elem(bitlen, false);
                for i in 0..bitlen {
                    bits.set(i, rng.gen_bool(0.5));
                }
                return TrackRaw {
                    bits,
                    speed: vec![SPEED_WEAK; bitlen],
                    bitlen,
                    data_start_bc: 0,
                    write_splice_bc: 0,
                };
            }
        };

        let mut tbuf = TrackBuffer::new(ti.data_bitoff, bitlen);
        if let Some(read_raw) = formats::handler(ti.ttype).read_raw {
            read_raw(self, tracknr, &mut tbuf);
        }
        tbuf.finalise()
    }

    /// Look up a disk tag by id.
    pub fn get_tag_by_id(&self, id: u16) -> Option<&DiskTag> {
        self.tags.iter().find(|t| t.id() == id)
    }

    /// Insert a tag if no tag with that id exists; either way, return the
    /// tag now present. A conflicting writer never mutates the original.
    pub fn set_tag(&mut self, tag: DiskTag) -> &DiskTag {
        let id = tag.id();
        if self.get_tag_by_id(id).is_none() {
            self.tags.push(tag);
        }
        self.get_tag_by_id(id).unwrap()
    }

    pub fn tags(&self) -> &[DiskTag] {
        &self.tags
    }
}
