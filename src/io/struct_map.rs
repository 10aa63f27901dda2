//! Declarative struct-map decoding.
//!
//! A *struct map* is an ordered list of `(fieldName, format)` pairs read
//! sequentially from a fixed start offset. This mirrors the `HEADER`,
//! `PROTO`, `ADC`, `DAC`, ... struct-map strings in the reference reader:
//! each section of an ABF file is just a flat list of typed fields, and a
//! section is a repeated application of the same list at a stride either
//! implied by the fields themselves or padded out to a fixed entry size
//! (the section-map table pads every entry to 16 bytes, for instance).

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::io::reader::ByteReader;

/// One field's on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    /// `l` alias: decodes identically to `I32`, kept distinct so field
    /// tables read the same as the reference struct-map strings.
    I32Alias,
    /// `L` alias: decodes identically to `U32`.
    U32Alias,
    I64,
    F32,
    /// `Nf`: a fixed-length vector of `N` little-endian `f32`s.
    F32Vec(usize),
    /// `Ns`: a fixed-length byte string of `N` bytes.
    Str(usize),
}

impl FieldFormat {
    pub fn size(self) -> usize {
        match self {
            FieldFormat::I8 | FieldFormat::U8 => 1,
            FieldFormat::I16 | FieldFormat::U16 => 2,
            FieldFormat::I32
            | FieldFormat::U32
            | FieldFormat::I32Alias
            | FieldFormat::U32Alias
            | FieldFormat::F32 => 4,
            FieldFormat::I64 => 8,
            FieldFormat::F32Vec(n) => 4 * n,
            FieldFormat::Str(n) => n,
        }
    }
}

/// A single named field in a struct map.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub format: FieldFormat,
}

pub const fn field(name: &'static str, format: FieldFormat) -> FieldSpec {
    FieldSpec { name, format }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F32Vec(Vec<f32>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_i32(&self) -> i32 {
        match *self {
            FieldValue::I8(v) => v as i32,
            FieldValue::U8(v) => v as i32,
            FieldValue::I16(v) => v as i32,
            FieldValue::U16(v) => v as i32,
            FieldValue::I32(v) => v,
            FieldValue::U32(v) => v as i32,
            FieldValue::I64(v) => v as i32,
            _ => 0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            FieldValue::I64(v) => v,
            FieldValue::U32(v) => v as i64,
            _ => self.as_i32() as i64,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match *self {
            FieldValue::U32(v) => v,
            FieldValue::I32(v) => v as u32,
            _ => self.as_i32() as u32,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match *self {
            FieldValue::U16(v) => v,
            FieldValue::I16(v) => v as u16,
            _ => self.as_i32() as u16,
        }
    }

    pub fn as_i16(&self) -> i16 {
        match *self {
            FieldValue::I16(v) => v,
            FieldValue::U16(v) => v as i16,
            _ => self.as_i32() as i16,
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            FieldValue::F32(v) => *v,
            _ => 0.0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Bytes(b) => b,
            _ => &[],
        }
    }
}

/// An ordered collection of decoded fields, keyed by name.
///
/// Preserves declaration order (mirroring the reference's use of an
/// `OrderedDict`) even though lookups are by name; typed section structs
/// pull fields out of the map once and never carry it further.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(&'static str, FieldValue)>,
}

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn i32(&self, name: &str) -> i32 {
        self.get(name).map(FieldValue::as_i32).unwrap_or(0)
    }

    pub fn i64(&self, name: &str) -> i64 {
        self.get(name).map(FieldValue::as_i64).unwrap_or(0)
    }

    pub fn u32(&self, name: &str) -> u32 {
        self.get(name).map(FieldValue::as_u32).unwrap_or(0)
    }

    pub fn u16(&self, name: &str) -> u16 {
        self.get(name).map(FieldValue::as_u16).unwrap_or(0)
    }

    pub fn i16(&self, name: &str) -> i16 {
        self.get(name).map(FieldValue::as_i16).unwrap_or(0)
    }

    pub fn f32(&self, name: &str) -> f32 {
        self.get(name).map(FieldValue::as_f32).unwrap_or(0.0)
    }

    pub fn bytes(&self, name: &str) -> &[u8] {
        self.get(name).map(FieldValue::as_bytes).unwrap_or(&[])
    }
}

fn read_field<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    offset: u64,
    format: FieldFormat,
) -> Result<FieldValue> {
    Ok(match format {
        FieldFormat::I8 => FieldValue::I8(reader.read_i8(offset)?),
        FieldFormat::U8 => FieldValue::U8(reader.read_u8(offset)?),
        FieldFormat::I16 => FieldValue::I16(reader.read_i16(offset)?),
        FieldFormat::U16 => FieldValue::U16(reader.read_u16(offset)?),
        FieldFormat::I32 | FieldFormat::I32Alias => FieldValue::I32(reader.read_i32(offset)?),
        FieldFormat::U32 | FieldFormat::U32Alias => FieldValue::U32(reader.read_u32(offset)?),
        FieldFormat::I64 => FieldValue::I64(reader.read_i64(offset)?),
        FieldFormat::F32 => FieldValue::F32(reader.read_f32(offset)?),
        FieldFormat::F32Vec(n) => {
            let mut v = Vec::with_capacity(n);
            for k in 0..n {
                v.push(reader.read_f32(offset + 4 * k as u64)?);
            }
            FieldValue::F32Vec(v)
        }
        FieldFormat::Str(n) => FieldValue::Bytes(reader.read_bytes(offset, n)?),
    })
}

/// Reads a struct map once, starting at `start_byte`.
///
/// If `fixed_stride` is given, each field is padded out to that many
/// bytes before the next one is read (used for the 16-byte-per-entry
/// section-map table).
pub fn read_map<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    specs: &[FieldSpec],
    start_byte: u64,
    fixed_stride: Option<u64>,
) -> Result<FieldMap> {
    let mut offset = start_byte;
    let mut entries = Vec::with_capacity(specs.len());

    for spec in specs {
        let value = read_field(reader, offset, spec.format)?;
        entries.push((spec.name, value));
        offset += fixed_stride.unwrap_or(spec.format.size() as u64);
    }

    Ok(FieldMap { entries })
}

/// The raw `(blockIndex, bytesPerEntry, entryCount)` triple pointing at a
/// variable-length ABF2 section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionPointer {
    pub first_block: u32,
    pub bytes_per_entry: u32,
    pub entry_count: i64,
}

/// The fixed ABF block size, in bytes.
pub const BLOCK_SIZE: u64 = 512;

impl SectionPointer {
    pub fn byte_start(&self) -> u64 {
        self.first_block as u64 * BLOCK_SIZE
    }
}

/// Reads a section: `entryCount` repetitions of `specs`, each starting at
/// `firstBlock*512 + k*bytesPerEntry`.
pub fn read_section<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    specs: &[FieldSpec],
    pointer: SectionPointer,
) -> Result<Vec<FieldMap>> {
    if pointer.entry_count < 0 {
        return Err(Error::format(
            pointer.byte_start(),
            format!("negative entry count {}", pointer.entry_count),
        ));
    }

    let entry_count = pointer.entry_count as usize;

    if entry_count > 0 && pointer.byte_start() >= reader.len() {
        return Err(Error::format(
            pointer.byte_start(),
            "section's first block lies past end of file",
        ));
    }

    let declared_size: usize = specs.iter().map(|s| s.format.size()).sum();
    if entry_count > 0 && (pointer.bytes_per_entry as usize) < declared_size {
        return Err(Error::format(
            pointer.byte_start(),
            format!(
                "section entry size {} is smaller than the {} bytes its fields declare",
                pointer.bytes_per_entry, declared_size
            ),
        ));
    }

    let mut records = Vec::with_capacity(entry_count);
    for k in 0..entry_count {
        let start = pointer.byte_start() + k as u64 * pointer.bytes_per_entry as u64;
        records.push(read_map(reader, specs, start, None)?);
    }

    Ok(records)
}
