mod common;

use common::{flux_capture, init, install_raw_payload};
use fluxforge::{
    disk::{DiskTag, DSKTAG_RNC_PDOS_KEY},
    Disk, TrackType,
};

/// Keys are 31-bit: the mastered header sets bit 31 unconditionally, so the
/// brute-force recovery always reports it clear.
const DISK_KEY: u32 = 0x5EAD_BEEF;

fn reference_payload() -> Vec<u8> {
    (0..12 * 512).map(|i| (i as u8).wrapping_mul(7).wrapping_add(i as u8 >> 3)).collect()
}

#[test]
fn pdos_key_is_recovered_as_disk_tag() {
    init();

    let mut master = Disk::create("master.dsk").unwrap();
    master.set_tag(DiskTag::RncPdosKey(DISK_KEY));
    install_raw_payload(&mut master, 1, TrackType::RncPdos, reference_payload(), 105_500, 700);

    let mut s = flux_capture(&master, 1);

    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.write_raw_track(1, TrackType::RncPdos, &mut s));

    // The key was brute-forced from the first good sector and published.
    assert_eq!(
        decoded.get_tag_by_id(DSKTAG_RNC_PDOS_KEY),
        Some(&DiskTag::RncPdosKey(DISK_KEY))
    );

    let ti = &decoded.di.tracks[1];
    assert_eq!(ti.valid_sectors.nr_valid(), 12);
    assert_eq!(ti.dat, reference_payload());
    assert_eq!(ti.total_bits.fixed(), Some(105_500));
}

#[test]
fn pdos_decode_validates_against_existing_key() {
    init();

    let mut master = Disk::create("master.dsk").unwrap();
    master.set_tag(DiskTag::RncPdosKey(DISK_KEY));
    install_raw_payload(&mut master, 1, TrackType::RncPdos, reference_payload(), 105_500, 700);

    let mut s = flux_capture(&master, 1);

    // A reader that already carries the key takes the validation path.
    let mut decoded = Disk::create("decoded.dsk").unwrap();
    decoded.set_tag(DiskTag::RncPdosKey(DISK_KEY));
    assert!(decoded.write_raw_track(1, TrackType::RncPdos, &mut s));
    assert_eq!(decoded.di.tracks[1].dat, reference_payload());
}

#[test]
fn conflicting_tag_write_consults_existing() {
    let mut d = Disk::create("tags.dsk").unwrap();
    d.set_tag(DiskTag::RncPdosKey(0x1234));
    // A second writer with the same id must not replace the original.
    let tag = d.set_tag(DiskTag::RncPdosKey(0x9999));
    assert_eq!(tag, &DiskTag::RncPdosKey(0x1234));
    assert_eq!(d.tags().len(), 1);
}
