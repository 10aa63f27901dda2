//! Byte-level I/O utilities for ABF parsing.
//!
//! Provides random-access, little-endian primitive decoding against a
//! file-backed or in-memory buffer, plus fixed-width string extraction
//! used directly by the header parsers (not via the struct-map layer).

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Random-access little-endian reader over a known-length byte source.
#[derive(Debug)]
pub struct ByteReader<R: Read + Seek> {
    inner: R,
    len: u64,
}

/// A `ByteReader` over an in-memory slice, used once a section's raw bytes
/// have been sliced out of the file.
pub type SliceReader<'a> = ByteReader<Cursor<&'a [u8]>>;

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(inner: R, len: u64) -> Self {
        Self { inner, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io_at(offset, e))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    fn check_room(&self, offset: u64, width: u64) -> Result<()> {
        if offset + width > self.len {
            return Err(Error::format(
                offset,
                format!("read of {width} bytes would extend past end of file ({} bytes)", self.len),
            ));
        }
        Ok(())
    }

    /// Reads `width` bytes at `offset` via `read_fn`, translating I/O errors
    /// into `Error::Io` tagged with the failing offset.
    fn at<T>(&mut self, offset: u64, width: u64, read_fn: impl FnOnce(&mut R) -> io::Result<T>) -> Result<T> {
        self.check_room(offset, width)?;
        self.seek(offset)?;
        read_fn(&mut self.inner).map_err(|e| Error::io_at(offset, e))
    }

    pub fn read_i8(&mut self, offset: u64) -> Result<i8> {
        self.at(offset, 1, |r| r.read_i8())
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        self.at(offset, 1, |r| r.read_u8())
    }

    pub fn read_i16(&mut self, offset: u64) -> Result<i16> {
        self.at(offset, 2, |r| r.read_i16::<LittleEndian>())
    }

    pub fn read_u16(&mut self, offset: u64) -> Result<u16> {
        self.at(offset, 2, |r| r.read_u16::<LittleEndian>())
    }

    pub fn read_i32(&mut self, offset: u64) -> Result<i32> {
        self.at(offset, 4, |r| r.read_i32::<LittleEndian>())
    }

    pub fn read_u32(&mut self, offset: u64) -> Result<u32> {
        self.at(offset, 4, |r| r.read_u32::<LittleEndian>())
    }

    pub fn read_i64(&mut self, offset: u64) -> Result<i64> {
        self.at(offset, 8, |r| r.read_i64::<LittleEndian>())
    }

    pub fn read_f32(&mut self, offset: u64) -> Result<f32> {
        self.at(offset, 4, |r| r.read_f32::<LittleEndian>())
    }

    pub fn read_f64(&mut self, offset: u64) -> Result<f64> {
        self.at(offset, 8, |r| r.read_f64::<LittleEndian>())
    }

    /// Reads `len` raw bytes starting at `offset`.
    pub fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.check_room(offset, len as u64)?;
        self.seek(offset)?;
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| Error::io_at(offset, e))?;
        Ok(buf)
    }

    /// Reads a fixed-width field meant to hold ASCII text, trimming
    /// trailing NUL bytes and whitespace (leading whitespace is preserved,
    /// matching the string-pool trimming rule).
    pub fn read_cstring_fixed(&mut self, offset: u64, len: usize) -> Result<String> {
        let raw = self.read_bytes(offset, len)?;
        Ok(trim_fixed_string(&raw))
    }
}

/// Trims a fixed-width ASCII field at its first NUL byte, then trims
/// trailing whitespace. Leading whitespace is preserved.
pub fn trim_fixed_string(raw: &[u8]) -> String {
    let nul_pos = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..nul_pos]);
    text.trim_end().to_string()
}

impl<'a> ByteReader<Cursor<&'a [u8]>> {
    pub fn from_slice(data: &'a [u8]) -> Self {
        let len = data.len() as u64;
        Self::new(Cursor::new(data), len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_primitives() {
        let data: Vec<u8> = vec![0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x3f];
        let mut r = ByteReader::from_slice(&data);
        assert_eq!(r.read_u16(0).unwrap(), 1);
        assert_eq!(r.read_u32(2).unwrap(), 2);
        assert_eq!(r.read_f32(6).unwrap(), 1.0);
    }

    #[test]
    fn short_read_is_format_error() {
        let data: Vec<u8> = vec![0x01, 0x02];
        let mut r = ByteReader::from_slice(&data);
        let err = r.read_u32(0).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn straddling_eof_is_format_error() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03];
        let mut r = ByteReader::from_slice(&data);
        let err = r.read_u32(1).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn fixed_string_trims_nul_and_trailing_space() {
        let data = b"mV  \0\0\0\0".to_vec();
        let mut r = ByteReader::from_slice(&data);
        assert_eq!(r.read_cstring_fixed(0, data.len()).unwrap(), "mV");
    }

    #[test]
    fn fixed_string_preserves_leading_space() {
        let data = b" mV\0".to_vec();
        let mut r = ByteReader::from_slice(&data);
        assert_eq!(r.read_cstring_fixed(0, data.len()).unwrap(), " mV");
    }
}
