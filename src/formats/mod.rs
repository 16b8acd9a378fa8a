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

    src/formats/mod.rs

    The format-handler registry. Each track type maps to a static handler
    record carrying density, nominal sector geometry, the four analyse/encode
    callbacks and an immutable handler-specific parameter record.
*/

pub mod amigados;
pub mod federation_of_free_traders;
pub mod ibm;
pub mod raw;
pub mod rnc_pdos;
pub mod sega_system_24;

use crate::{
    disk::{Disk, TrackInfo},
    flux::FluxStream,
    tbuf::TrackBuffer,
};
use strum::{EnumIter, FromRepr, IntoStaticStr};

/// The closed set of track formats this engine recognises. The numeric
/// values are the wire encoding used by the native `.dsk` container.
#[repr(u16)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumIter, FromRepr, IntoStaticStr)]
pub enum TrackType {
    #[default]
    Unformatted = 0,
    Amigados = 1,
    AmigadosExtended = 2,
    AmigadosVarrate = 3,
    AmigadosLong102200 = 4,
    AmigadosLong103300 = 5,
    AmigadosLong104400 = 6,
    AmigadosLong105500 = 7,
    AmigadosLong106600 = 8,
    AmigadosLong108800 = 9,
    AmigadosLong111000 = 10,
    AmigadosUnknownLength = 11,
    RncPdos = 12,
    FederationOfFreeTraders = 13,
    IbmPcDd = 14,
    IbmPcDd10Sec = 15,
    IbmPcHd = 16,
    IbmPcHd525 = 17,
    IbmPcEd = 18,
    AtariSt720kb = 19,
    MicrosoftDmfHd = 20,
    SiemensIsdxHd = 21,
    TraceTracebackHd = 22,
    AcornAdfsSML = 23,
    AcornAdfsDE = 24,
    AcornAdfsF = 25,
    IbmMfmDd = 26,
    IbmMfmHd = 27,
    IbmFmSd = 28,
    IbmFmDd = 29,
    SegaSystem24 = 30,
    RawSd = 31,
    RawDd = 32,
    RawHd = 33,
    RawEd = 34,
    VariableRawSd = 35,
    VariableRawDd = 36,
    VariableRawHd = 37,
    VariableRawEd = 38,
}

impl TrackType {
    /// Human-readable format name, as surfaced by `--list-formats` style
    /// tooling and stored in no file.
    pub fn name(self) -> &'static str {
        use TrackType::*;
        match self {
            Unformatted => "Unformatted",
            Amigados => "AmigaDOS",
            AmigadosExtended => "AmigaDOS Extended",
            AmigadosVarrate => "AmigaDOS Variable Rate",
            AmigadosLong102200 => "AmigaDOS Long Track (102200 Bits)",
            AmigadosLong103300 => "AmigaDOS Long Track (103300 Bits)",
            AmigadosLong104400 => "AmigaDOS Long Track (104400 Bits)",
            AmigadosLong105500 => "AmigaDOS Long Track (105500 Bits)",
            AmigadosLong106600 => "AmigaDOS Long Track (106600 Bits)",
            AmigadosLong108800 => "AmigaDOS Long Track (108800 Bits)",
            AmigadosLong111000 => "AmigaDOS Long Track (111000 Bits)",
            AmigadosUnknownLength => "AmigaDOS (Unknown Length)",
            RncPdos => "RNC PDOS",
            FederationOfFreeTraders => "Federation Of Free Traders",
            IbmPcDd => "IBM-PC DD (720kB)",
            IbmPcDd10Sec => "IBM-PC DD (800kB)",
            IbmPcHd => "IBM-PC HD (1.44MB)",
            IbmPcHd525 => "IBM-PC HD 5.25in",
            IbmPcEd => "IBM-PC ED",
            AtariSt720kb => "Atari ST 720kB",
            MicrosoftDmfHd => "Microsoft DMF",
            SiemensIsdxHd => "Siemens iSDX high-density",
            TraceTracebackHd => "Trace TRACEBACK duplicator info (HD)",
            AcornAdfsSML => "Acorn ADFS '160K S', '320K M' or '640K L'",
            AcornAdfsDE => "Acorn ADFS '800K D' or '800K E'",
            AcornAdfsF => "Acorn ADFS '1600K F'",
            IbmMfmDd => "IBM-MFM DD",
            IbmMfmHd => "IBM-MFM HD",
            IbmFmSd => "IBM-FM SD",
            IbmFmDd => "IBM-FM DD",
            SegaSystem24 => "Sega System 24",
            RawSd => "Raw SD",
            RawDd => "Raw DD",
            RawHd => "Raw HD",
            RawEd => "Raw ED",
            VariableRawSd => "Variable-Rate Raw SD",
            VariableRawDd => "Variable-Rate Raw DD",
            VariableRawHd => "Variable-Rate Raw HD",
            VariableRawEd => "Variable-Rate Raw ED",
        }
    }
}

/// Recording density of a track, setting the nominal bitcell time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TrackDensity {
    Single,
    #[default]
    Double,
    High,
    Extra,
}

impl TrackDensity {
    pub const fn ns_per_cell(self) -> u32 {
        match self {
            TrackDensity::Single => 4000,
            TrackDensity::Double => 2000,
            TrackDensity::High => 1000,
            TrackDensity::Extra => 500,
        }
    }
}

/// Handler-specific immutable parameters, shared by related registrations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HandlerData {
    #[default]
    None,
    /// First sector number on the track (PCs count from 1).
    SectorBase(u8),
    /// Fixed track bit length for long-track variants.
    TotalBits(u32),
    /// IBM scan parameters: sector base plus FM encoding flag.
    IbmScan { sector_base: u8, fm: bool },
}

/// Flux analyser: decode one track from the stream, or report "not my
/// format" by returning `None`.
pub type WriteRawFn = fn(&mut Disk, usize, &mut FluxStream) -> Option<Vec<u8>>;

/// Encoder: append one revolution of raw bitcells to the track buffer.
pub type ReadRawFn = fn(&Disk, usize, &mut TrackBuffer);

/// Filesystem-level import: build the decoded payload from a plain sector
/// image slice.
pub type WriteSectorsFn = fn(&mut Disk, usize, &[u8]) -> Option<Vec<u8>>;

/// Filesystem-level export: flatten the decoded payload to plain sectors.
pub type ReadSectorsFn = fn(&Disk, usize) -> Option<Vec<u8>>;

/// One entry of the handler registry.
pub struct TrackHandler {
    pub density: TrackDensity,
    pub bytes_per_sector: u32,
    pub nr_sectors: u16,
    pub write_raw: Option<WriteRawFn>,
    pub read_raw: Option<ReadRawFn>,
    pub write_sectors: Option<WriteSectorsFn>,
    pub read_sectors: Option<ReadSectorsFn>,
    pub extra: HandlerData,
}

impl TrackHandler {
    pub const fn unformatted() -> TrackHandler {
        TrackHandler {
            density: TrackDensity::Double,
            bytes_per_sector: 0,
            nr_sectors: 0,
            write_raw: None,
            read_raw: None,
            write_sectors: None,
            read_sectors: None,
            extra: HandlerData::None,
        }
    }
}

static UNFORMATTED_HANDLER: TrackHandler = TrackHandler::unformatted();

/// Look up the static handler record for a track type. The registry is
/// read-only after static initialisation.
pub fn handler(ttype: TrackType) -> &'static TrackHandler {
    use TrackType::*;
    match ttype {
        Unformatted => &UNFORMATTED_HANDLER,
        Amigados => &amigados::AMIGADOS_HANDLER,
        AmigadosExtended => &amigados::AMIGADOS_EXTENDED_HANDLER,
        AmigadosVarrate => &amigados::AMIGADOS_VARRATE_HANDLER,
        AmigadosLong102200 => &amigados::AMIGADOS_LONG_102200_HANDLER,
        AmigadosLong103300 => &amigados::AMIGADOS_LONG_103300_HANDLER,
        AmigadosLong104400 => &amigados::AMIGADOS_LONG_104400_HANDLER,
        AmigadosLong105500 => &amigados::AMIGADOS_LONG_105500_HANDLER,
        AmigadosLong106600 => &amigados::AMIGADOS_LONG_106600_HANDLER,
        AmigadosLong108800 => &amigados::AMIGADOS_LONG_108800_HANDLER,
        AmigadosLong111000 => &amigados::AMIGADOS_LONG_111000_HANDLER,
        AmigadosUnknownLength => &amigados::AMIGADOS_UNKNOWN_LENGTH_HANDLER,
        RncPdos => &rnc_pdos::RNC_PDOS_HANDLER,
        FederationOfFreeTraders => &federation_of_free_traders::FEDERATION_OF_FREE_TRADERS_HANDLER,
        IbmPcDd => &ibm::IBM_PC_DD_HANDLER,
        IbmPcDd10Sec => &ibm::IBM_PC_DD_10SEC_HANDLER,
        IbmPcHd => &ibm::IBM_PC_HD_HANDLER,
        IbmPcHd525 => &ibm::IBM_PC_HD_5_25_HANDLER,
        IbmPcEd => &ibm::IBM_PC_ED_HANDLER,
        AtariSt720kb => &ibm::ATARI_ST_720KB_HANDLER,
        MicrosoftDmfHd => &ibm::MICROSOFT_DMF_HD_HANDLER,
        SiemensIsdxHd => &ibm::SIEMENS_ISDX_HD_HANDLER,
        TraceTracebackHd => &ibm::TRACE_TRACEBACK_HD_HANDLER,
        AcornAdfsSML => &ibm::ACORN_ADFS_S_M_L_HANDLER,
        AcornAdfsDE => &ibm::ACORN_ADFS_D_E_HANDLER,
        AcornAdfsF => &ibm::ACORN_ADFS_F_HANDLER,
        IbmMfmDd => &ibm::IBM_MFM_DD_HANDLER,
        IbmMfmHd => &ibm::IBM_MFM_HD_HANDLER,
        IbmFmSd => &ibm::IBM_FM_SD_HANDLER,
        IbmFmDd => &ibm::IBM_FM_DD_HANDLER,
        SegaSystem24 => &sega_system_24::SEGA_SYSTEM_24_HANDLER,
        RawSd => &raw::RAW_SD_HANDLER,
        RawDd => &raw::RAW_DD_HANDLER,
        RawHd => &raw::RAW_HD_HANDLER,
        RawEd => &raw::RAW_ED_HANDLER,
        VariableRawSd => &raw::VARIABLE_RAW_SD_HANDLER,
        VariableRawDd => &raw::VARIABLE_RAW_DD_HANDLER,
        VariableRawHd => &raw::VARIABLE_RAW_HD_HANDLER,
        VariableRawEd => &raw::VARIABLE_RAW_ED_HANDLER,
    }
}

/// Set up a track with defaults for a given track format.
pub fn init_track_info(ti: &mut TrackInfo, ttype: TrackType) {
    let h = handler(ttype);
    ti.ttype = ttype;
    ti.typename = ttype.name();
    ti.nr_sectors = h.nr_sectors;
    ti.bytes_per_sector = h.bytes_per_sector;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn registry_is_closed_and_total() {
        // Every enum member resolves to a handler, and the dsk wire values
        // round-trip through FromRepr.
        for t in TrackType::iter() {
            let _ = handler(t);
            assert_eq!(TrackType::from_repr(t as u16), Some(t));
        }
    }

    #[test]
    fn handler_geometry_is_sane() {
        assert_eq!(handler(TrackType::Amigados).nr_sectors, 11);
        assert_eq!(handler(TrackType::Amigados).bytes_per_sector, 512);
        assert_eq!(handler(TrackType::IbmPcDd).nr_sectors, 9);
        assert_eq!(handler(TrackType::IbmPcHd).density, TrackDensity::High);
        assert_eq!(handler(TrackType::RncPdos).nr_sectors, 12);
    }
}
