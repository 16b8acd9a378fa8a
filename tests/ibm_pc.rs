mod common;

use common::{flux_capture, init, install_sector_track};
use fluxforge::{Disk, TrackType};

/// Cylinder 40, head 1.
const TRACKNR: usize = 81;

fn reference_sectors() -> Vec<u8> {
    (0..9 * 512).map(|i| (i as u8).wrapping_add((i >> 9) as u8)).collect()
}

#[test]
fn ibm_pc_dd_track_survives_flux_round_trip() {
    init();

    let mut master = Disk::create("master.dsk").unwrap();
    install_sector_track(&mut master, TRACKNR, TrackType::IbmPcDd, &reference_sectors());

    let mut s = flux_capture(&master, TRACKNR);

    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.write_raw_track(TRACKNR, TrackType::IbmPcDd, &mut s));

    let ti = &decoded.di.tracks[TRACKNR];
    assert_eq!(ti.nr_sectors, 9);
    assert_eq!(ti.bytes_per_sector, 512);
    assert!(ti.valid_sectors.all_valid(9));
    // Payload plus the trailing IAM-present flag.
    assert_eq!(&ti.dat[..9 * 512], &reference_sectors()[..]);
    assert_eq!(*ti.dat.last().unwrap(), 1);
}

#[test]
fn ibm_pc_dd_rejects_wrong_cylinder() {
    init();

    let mut master = Disk::create("master.dsk").unwrap();
    install_sector_track(&mut master, TRACKNR, TrackType::IbmPcDd, &reference_sectors());

    // Present cylinder 40 flux as track 0: every IDAM reports the wrong
    // cylinder and no sector is accepted.
    let mut s = flux_capture(&master, TRACKNR);
    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(!decoded.write_raw_track(0, TrackType::IbmPcDd, &mut s));
    assert_eq!(decoded.di.tracks[0].ttype, TrackType::Unformatted);
}

#[test]
fn sega_system_24_mixed_geometry_round_trips() {
    init();

    let track_len = 5 * 2048 + 1024 + 256;
    let sectors: Vec<u8> = (0..track_len).map(|i| (i as u8).wrapping_mul(13)).collect();

    let mut master = Disk::create("master.dsk").unwrap();
    install_sector_track(&mut master, 2, TrackType::SegaSystem24, &sectors);

    let mut s = flux_capture(&master, 2);

    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.write_raw_track(2, TrackType::SegaSystem24, &mut s));

    let ti = &decoded.di.tracks[2];
    assert_eq!(ti.nr_sectors, 7);
    assert!(ti.valid_sectors.all_valid(7));
    assert_eq!(ti.dat, sectors);
}
