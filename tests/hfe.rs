mod common;

use common::init;
use fluxforge::{
    containers::{hfe::CONTAINER_HFE, Container},
    Disk, TrackType, SPEED_AVG,
};
use std::io::Cursor;

const fn reverse_bits(mut byte: u8) -> u8 {
    byte = (byte >> 4) | (byte << 4);
    byte = ((byte & 0x33) << 2) | ((byte & 0xCC) >> 2);
    byte = ((byte & 0x55) << 1) | ((byte & 0xAA) >> 1);
    byte
}

/// Build an HFEv3 image with one cylinder. Each side carries a bitrate
/// opcode stream: nominal rate for the first half of the track, a slower
/// cell for the second half.
fn build_hfe_v3() -> Vec<u8> {
    // Side stream in MSB-first domain; the file stores LSB-first.
    let mut side: Vec<u8> = Vec::new();
    side.push(0xF2); // OP_bitrate
    side.push(72); // nominal for a 100k-bit track
    side.extend(std::iter::repeat(0x4E).take(6250));
    side.push(0xF2); // OP_bitrate
    side.push(79); // ~10% slow
    side.extend(std::iter::repeat(0x4E).take(6250));

    let len = side.len() * 2;
    let len512 = (len + 0x1ff) & !0x1ff;
    let side_bytes = len512 / 2;
    let mut side0 = side.clone();
    let mut side1 = side;
    side0.resize(side_bytes, 0xF0); // pad with nops
    side1.resize(side_bytes, 0xF0);

    let mut file = vec![0xFFu8; 1024 + len512];

    // Header block.
    file[0..8].copy_from_slice(b"HXCHFEV3");
    file[8] = 0; // format revision
    file[9] = 1; // nr_tracks
    file[10] = 2; // nr_sides
    file[11] = 0; // track_encoding: ISOIBM MFM
    file[12..14].copy_from_slice(&250u16.to_le_bytes()); // bitrate
    file[14..16].copy_from_slice(&0u16.to_le_bytes()); // rpm
    file[16] = 7; // generic shugart
    file[17] = 1;
    file[18..20].copy_from_slice(&1u16.to_le_bytes()); // track list at block 1

    // Track LUT.
    file[512..514].copy_from_slice(&2u16.to_le_bytes()); // data at block 2
    file[514..516].copy_from_slice(&(len as u16).to_le_bytes());

    // Track data: 512-byte blocks interleaving sides in 256-byte halves.
    for (blk, chunk0) in side0.chunks(256).enumerate() {
        let base = 1024 + blk * 512;
        for (i, &b) in chunk0.iter().enumerate() {
            file[base + i] = reverse_bits(b);
        }
        let chunk1 = &side1[blk * 256..(blk * 256 + 256).min(side1.len())];
        for (i, &b) in chunk1.iter().enumerate() {
            file[base + 256 + i] = reverse_bits(b);
        }
    }

    file
}

#[test]
fn hfe_v3_bitrate_opcodes_yield_variable_speeds() {
    init();

    let mut d = Disk::create("image.hfe").unwrap();
    CONTAINER_HFE.open(&mut d, &mut Cursor::new(build_hfe_v3())).unwrap();

    assert_eq!(d.di.tracks[0].ttype, TrackType::RawDd);
    let raw = d.track_read_raw(0);

    // First half of the track decodes at nominal speed, second half slower.
    let early = raw.speed[1000];
    let late = raw.speed[60_000];
    assert!(
        (early as i32 - SPEED_AVG as i32).abs() <= 20,
        "early speed {early} not nominal"
    );
    assert!(late >= 1050, "late speed {late} does not reflect the bitrate opcode");
    assert!(raw.bitlen > 90_000);
}

#[test]
fn hfe_v1_round_trips_bit_length() {
    init();

    // Master an AmigaDOS disk, write it out as HFE v1, and reopen it.
    let sectors: Vec<u8> = (0..11 * 512).map(|i| (i as u8).wrapping_mul(5)).collect();
    let mut master = Disk::create("master.hfe").unwrap();
    for tracknr in 0..master.di.nr_tracks() {
        common::install_sector_track(&mut master, tracknr, TrackType::Amigados, &sectors);
    }

    let mut out = Cursor::new(Vec::new());
    CONTAINER_HFE.close(&mut master, &mut out).unwrap();

    let mut reopened = Disk::create("copy.hfe").unwrap();
    CONTAINER_HFE.open(&mut reopened, &mut Cursor::new(out.into_inner())).unwrap();

    let ti = &reopened.di.tracks[0];
    assert_eq!(ti.ttype, TrackType::RawDd);
    // Bit length survives modulo byte padding in the cylinder buffer.
    let bitlen = ti.total_bits.fixed().unwrap();
    assert!((100_150..=100_160).contains(&bitlen), "bitlen {bitlen}");
}
