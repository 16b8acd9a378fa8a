mod common;

use common::{init, install_sector_track};
use fluxforge::{
    disk::{DiskTag, TrackLength, DSKTAG_DISK_NR},
    Disk, TrackType,
};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("fluxforge_{}_{}", std::process::id(), name))
}

#[test]
fn dsk_container_round_trips() {
    init();

    let path = temp_path("roundtrip.dsk");
    let sectors: Vec<u8> = (0..11 * 512).map(|i| (i as u8).wrapping_mul(31)).collect();

    let mut d = Disk::create(&path).unwrap();
    install_sector_track(&mut d, 0, TrackType::Amigados, &sectors);
    // Track 1 stays unformatted.
    d.set_tag(DiskTag::DiskNr(3));

    let written = (
        d.di.tracks[0].clone(),
        d.di.tracks[1].clone(),
        d.di.nr_tracks(),
    );
    d.close().unwrap();

    let reopened = Disk::open(&path).unwrap();
    assert_eq!(reopened.di.nr_tracks(), written.2);

    let t0 = &reopened.di.tracks[0];
    assert_eq!(t0.ttype, TrackType::Amigados);
    assert_eq!(t0.nr_sectors, written.0.nr_sectors);
    assert_eq!(t0.bytes_per_sector, written.0.bytes_per_sector);
    assert_eq!(t0.valid_sectors, written.0.valid_sectors);
    assert_eq!(t0.dat, written.0.dat);
    assert_eq!(t0.data_bitoff, written.0.data_bitoff);
    assert_eq!(t0.total_bits, written.0.total_bits);

    let t1 = &reopened.di.tracks[1];
    assert_eq!(t1.ttype, TrackType::Unformatted);
    assert_eq!(t1.total_bits, TrackLength::Weak);
    assert!(t1.dat.is_empty());

    assert_eq!(reopened.tags(), &[DiskTag::DiskNr(3)]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn dsk_open_rejects_bad_signature() {
    init();

    let path = temp_path("badsig.dsk");
    std::fs::write(&path, b"NOTADSKFILE.....").unwrap();
    assert!(Disk::open(&path).is_err());
    let _ = std::fs::remove_file(&path);
}
