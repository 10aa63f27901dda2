//! ABF2 file header and section map.
//!
//! Layout (all little-endian, from byte 0): `fFileSignature` (4 bytes,
//! must equal `"ABF2"`), a 4-byte version quad (revision, build, minor,
//! major), `uFileInfoSize`, `lActualEpisodes`, `uFileStartDate`,
//! `uFileStartTimeMS`, `uStopwatchTime`, `nFileType`, `nDataFormat`,
//! `nSimultaneousScan`, `nCRCEnable`, `uFileCRC`, a 16-byte `FileGUID`,
//! creator/modifier version and name indices, and `uProtocolPathIndex`.
//! The Section Map begins at byte 76.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::io::reader::ByteReader;
use crate::io::struct_map::{self, SectionPointer};
use crate::strings::StringIndex;

pub const ABF2_SIGNATURE: &[u8; 4] = b"ABF2";
pub const ABF1_SIGNATURE: &[u8; 4] = b"ABF ";

/// Index into the 18-slot ABF2 section map.
///
/// Named per the reference reader's `SECTIONS` struct-map string; sections
/// this crate does not further interpret (everything after `EpochPerDAC`
/// other than `Strings`, `Data`, `Tag`, and `SynchArray`) are still kept as
/// raw pointers so the map remains a complete, inspectable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SectionId {
    Protocol = 0,
    Adc = 1,
    Dac = 2,
    Epoch = 3,
    AdcPerDac = 4,
    EpochPerDac = 5,
    UserList = 6,
    StatsRegion = 7,
    Math = 8,
    Strings = 9,
    Data = 10,
    Tag = 11,
    Scope = 12,
    Delta = 13,
    VoiceTag = 14,
    SynchArray = 15,
    Annotation = 16,
    Stats = 17,
}

pub const SECTION_COUNT: usize = 18;

/// The full 18-entry section map.
#[derive(Debug, Clone, Copy)]
pub struct SectionMap {
    pub entries: [SectionPointer; SECTION_COUNT],
}

impl SectionMap {
    pub fn get(&self, id: SectionId) -> SectionPointer {
        self.entries[id as usize]
    }
}

/// Parsed ABF2 file-level header, excluding the section map.
#[derive(Debug, Clone)]
pub struct Abf2FileHeader {
    pub version: (u8, u8, u8, u8),
    pub file_info_size: u32,
    pub actual_episodes: u32,
    pub file_start_date: u32,
    pub file_start_time_ms: u32,
    pub stopwatch_time: u32,
    pub file_type: u16,
    pub data_format: u16,
    pub simultaneous_scan: u16,
    pub crc_enable: u16,
    pub file_crc: u32,
    pub file_guid: [u8; 16],
    pub creator_version: u32,
    pub creator_name_index: StringIndex,
    pub modifier_version: u32,
    pub modifier_name_index: StringIndex,
    pub protocol_path_index: StringIndex,
}

/// Parses the ABF2 file header and section map from offset 0.
///
/// Returns `Error::UnsupportedDialect` if the signature is `"ABF "`
/// (callers should dispatch to the ABF1 header parser instead), or
/// `Error::Format` for any other signature mismatch.
pub fn read_header<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<(Abf2FileHeader, SectionMap)> {
    let signature = reader.read_bytes(0, 4)?;

    if signature == ABF1_SIGNATURE {
        return Err(Error::UnsupportedDialect(
            "file uses the ABF1 signature; use the ABF1 header parser".to_string(),
        ));
    }
    if signature != ABF2_SIGNATURE {
        return Err(Error::format(
            0,
            format!("unrecognized file signature {:?}", signature),
        ));
    }

    let version = (
        reader.read_u8(4)?,
        reader.read_u8(5)?,
        reader.read_u8(6)?,
        reader.read_u8(7)?,
    );

    let header = Abf2FileHeader {
        version,
        file_info_size: reader.read_u32(8)?,
        actual_episodes: reader.read_u32(12)?,
        file_start_date: reader.read_u32(16)?,
        file_start_time_ms: reader.read_u32(20)?,
        stopwatch_time: reader.read_u32(24)?,
        file_type: reader.read_u16(28)?,
        data_format: reader.read_u16(30)?,
        simultaneous_scan: reader.read_u16(32)?,
        crc_enable: reader.read_u16(34)?,
        file_crc: reader.read_u32(36)?,
        file_guid: reader.read_bytes(40, 16)?.try_into().unwrap(),
        creator_version: reader.read_u32(56)?,
        creator_name_index: StringIndex(reader.read_u32(60)?),
        modifier_version: reader.read_u32(64)?,
        modifier_name_index: StringIndex(reader.read_u32(68)?),
        protocol_path_index: StringIndex(reader.read_u32(72)?),
    };

    let section_map = read_section_map(reader)?;

    Ok((header, section_map))
}

/// Reads the 18-entry section map starting at byte 76.
///
/// Each 16-byte slot holds `(u32 blockIndex, u32 bytesPerEntry, i32
/// entryCount)` — 12 bytes — with 4 bytes of padding to reach the 16-byte
/// stride (the reference reader reads this with a `fixedOffset=16` pad
/// after a 12-byte `IIl` struct, not a genuine 8-byte entry count).
fn read_section_map<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<SectionMap> {
    const SECTION_MAP_START: u64 = 76;
    const SLOT_SIZE: u64 = 16;

    let mut entries = [SectionPointer::default(); SECTION_COUNT];
    for (i, entry) in entries.iter_mut().enumerate() {
        let start = SECTION_MAP_START + i as u64 * SLOT_SIZE;
        *entry = SectionPointer {
            first_block: reader.read_u32(start)?,
            bytes_per_entry: reader.read_u32(start + 4)?,
            entry_count: reader.read_i32(start + 8)? as i64,
        };
    }

    Ok(SectionMap { entries })
}

pub use struct_map::SectionPointer as RawSectionPointer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn blank_abf2() -> Vec<u8> {
        let mut data = vec![0u8; 76 + 18 * 16];
        data[0..4].copy_from_slice(ABF2_SIGNATURE);
        data
    }

    #[test]
    fn rejects_abf1_signature_as_unsupported_dialect() {
        let mut data = vec![0u8; 76 + 18 * 16];
        data[0..4].copy_from_slice(ABF1_SIGNATURE);
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let err = read_header(&mut r).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect(_)));
    }

    #[test]
    fn rejects_garbage_signature() {
        let mut data = vec![0u8; 76 + 18 * 16];
        data[0..4].copy_from_slice(b"XYZZ");
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let err = read_header(&mut r).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn parses_section_map_slot_with_padding() {
        let mut data = blank_abf2();
        // Protocol section: block 5, 100 bytes/entry, 1 entry, then 4 junk padding bytes.
        let off = 76;
        data[off..off + 4].copy_from_slice(&5u32.to_le_bytes());
        data[off + 4..off + 8].copy_from_slice(&100u32.to_le_bytes());
        data[off + 8..off + 12].copy_from_slice(&1i32.to_le_bytes());
        data[off + 12..off + 16].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());

        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let (_header, map) = read_header(&mut r).unwrap();
        let p = map.get(SectionId::Protocol);
        assert_eq!(p.first_block, 5);
        assert_eq!(p.bytes_per_entry, 100);
        assert_eq!(p.entry_count, 1);
    }
}
