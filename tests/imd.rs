mod common;

use common::init;
use fluxforge::{
    containers::{imd::CONTAINER_IMD, Container},
    formats::ibm::retrieve_ibm_track,
    Disk, TrackType,
};
use std::io::Cursor;

/// One MFM 250kbps track: cyl 0 head 0, three 512-byte sectors in
/// interleaved order, the second stored compressed.
fn build_imd() -> Vec<u8> {
    let mut img = Vec::new();
    img.extend_from_slice(b"IMD 1.18: 01/02/2024 12:00:00\r\n");
    img.push(0x1a);

    img.push(5); // mode: MFM 250kbps
    img.push(0); // cyl
    img.push(0); // head
    img.push(3); // sectors
    img.push(2); // 512 bytes per sector
    img.extend_from_slice(&[1, 3, 2]); // sector map

    // Sector 1: literal data.
    img.push(1);
    img.extend((0..512).map(|i| i as u8));
    // Sector 3: compressed fill.
    img.push(2);
    img.push(0xE5);
    // Sector 2: literal data.
    img.push(1);
    img.extend((0..512).map(|i| (i as u8).wrapping_mul(3)));

    img
}

#[test]
fn imd_open_preserves_sector_order_and_compression() {
    init();

    let mut d = Disk::create("image.imd").unwrap();
    CONTAINER_IMD.open(&mut d, &mut Cursor::new(build_imd())).unwrap();

    let ti = &d.di.tracks[0];
    assert_eq!(ti.ttype, TrackType::IbmMfmDd);
    assert_eq!(ti.nr_sectors, 3);
    assert_eq!(ti.bytes_per_sector, 512);

    let meta = retrieve_ibm_track(&d, 0).unwrap();
    assert_eq!(meta.secs, vec![1, 3, 2]);
    assert!(meta.dat[512..1024].iter().all(|&b| b == 0xE5));
    assert_eq!(meta.dat[0], 0);
    assert_eq!(meta.dat[1024], 0);
    assert_eq!(meta.dat[1025], 3);
}

#[test]
fn imd_close_round_trips() {
    init();

    let mut d = Disk::create("image.imd").unwrap();
    CONTAINER_IMD.open(&mut d, &mut Cursor::new(build_imd())).unwrap();

    let mut out = Cursor::new(Vec::new());
    CONTAINER_IMD.close(&mut d, &mut out).unwrap();

    let mut reopened = Disk::create("copy.imd").unwrap();
    CONTAINER_IMD.open(&mut reopened, &mut Cursor::new(out.into_inner())).unwrap();

    let a = retrieve_ibm_track(&d, 0).unwrap();
    let b = retrieve_ibm_track(&reopened, 0).unwrap();
    assert_eq!(a.secs, b.secs);
    assert_eq!(a.marks, b.marks);
    assert_eq!(a.dat, b.dat);
}

#[test]
fn imd_track_survives_flux_round_trip() {
    init();

    let mut master = Disk::create("image.imd").unwrap();
    CONTAINER_IMD.open(&mut master, &mut Cursor::new(build_imd())).unwrap();

    let mut s = common::flux_capture(&master, 0);

    let mut decoded = Disk::create("decoded.dsk").unwrap();
    assert!(decoded.write_raw_track(0, TrackType::IbmMfmDd, &mut s));

    let a = retrieve_ibm_track(&master, 0).unwrap();
    let b = retrieve_ibm_track(&decoded, 0).unwrap();
    assert_eq!(a.secs, b.secs, "sector interleave must survive the flux round trip");
    assert_eq!(a.dat, b.dat);
}
