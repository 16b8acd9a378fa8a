mod common;

use common::{compute_slice_hash, flux_capture, init};
use fluxforge::{containers::adf::CONTAINER_ADF, containers::Container, disk::TrackLength, Disk, TrackType};
use std::io::Cursor;

const TRACK_BYTES: usize = 11 * 512;

fn reference_adf() -> Vec<u8> {
    // 160 tracks of rolling byte pattern, distinct per track and sector.
    let mut img = vec![0u8; 160 * TRACK_BYTES];
    for (i, b) in img.iter_mut().enumerate() {
        *b = ((i / 512) as u8) ^ (i as u8).rotate_left(3);
    }
    img
}

#[test]
fn amigados_track_survives_flux_round_trip() {
    init();

    let img = reference_adf();
    let mut master = Disk::create("master.adf").unwrap();
    CONTAINER_ADF.open(&mut master, &mut Cursor::new(img.clone())).unwrap();

    let mut s = flux_capture(&master, 0);

    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.write_raw_track(0, TrackType::Amigados, &mut s));

    let ti = &decoded.di.tracks[0];
    assert_eq!(ti.ttype, TrackType::Amigados);
    assert_eq!(ti.nr_sectors, 11);
    assert_eq!(ti.valid_sectors.nr_valid(), 11);
    assert!(ti.valid_sectors.all_valid(11));
    assert_eq!(ti.total_bits, TrackLength::Fixed(100_150));
    assert_eq!(
        compute_slice_hash(&ti.dat),
        compute_slice_hash(&img[..TRACK_BYTES]),
        "decoded payload differs from the mastered sector image"
    );
}

#[test]
fn amigados_rejects_foreign_flux() {
    init();

    // An IBM track carries no 0x4489 Amiga sector structure that survives
    // the checksum, so the analyser must report NotMyFormat.
    let mut master = Disk::create("master.dsk").unwrap();
    let sectors: Vec<u8> = (0..9 * 512).map(|i| i as u8).collect();
    common::install_sector_track(&mut master, 0, TrackType::IbmPcDd, &sectors);

    let mut s = flux_capture(&master, 0);
    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(!decoded.write_raw_track(0, TrackType::Amigados, &mut s));
    assert_eq!(decoded.di.tracks[0].ttype, TrackType::Unformatted);
}

#[test]
fn analyser_accepts_first_matching_candidate() {
    init();

    let img = reference_adf();
    let mut master = Disk::create("master.adf").unwrap();
    CONTAINER_ADF.open(&mut master, &mut Cursor::new(img)).unwrap();

    let mut s = flux_capture(&master, 2);
    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.try_types(
        2,
        &[TrackType::IbmPcDd, TrackType::RncPdos, TrackType::Amigados],
        &mut s
    ));
    assert_eq!(decoded.di.tracks[2].ttype, TrackType::Amigados);
}
