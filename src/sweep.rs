//! Sweep data codec.
//!
//! Samples are channel-interleaved: one block read gets the whole
//! sweep's bytes across all channels, after which a single channel's
//! samples are pulled out in memory at a fixed stride, rather than
//! reseeking the underlying reader once per sample.

use std::io::{Read, Seek};

use crate::error::Result;
use crate::io::reader::ByteReader;
use crate::model::DataFormat;

/// Decodes one channel's samples for one sweep.
///
/// `data_byte_start` is the byte offset of the data section's first
/// block; `sweep_index`/`channel` are assumed already validated against
/// the recording's dimensions by the caller.
pub fn read_sweep_channel<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    data_byte_start: u64,
    format: DataFormat,
    channel_count: usize,
    samples_per_sweep: usize,
    sweep_index: usize,
    channel: usize,
) -> Result<Vec<f32>> {
    let bytes_per_sample = format.byte_width();
    let sweep_byte_len = samples_per_sweep * channel_count * bytes_per_sample;
    let sweep_start = data_byte_start + sweep_index as u64 * sweep_byte_len as u64;

    let raw = reader.read_bytes(sweep_start, sweep_byte_len)?;

    let stride = channel_count * bytes_per_sample;
    let channel_offset = channel * bytes_per_sample;

    let mut out = Vec::with_capacity(samples_per_sweep);
    for i in 0..samples_per_sweep {
        let at = i * stride + channel_offset;
        let value = match format {
            DataFormat::Int16 => i16::from_le_bytes([raw[at], raw[at + 1]]) as f32,
            DataFormat::Float32 => f32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]),
        };
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader_from(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        let len = bytes.len() as u64;
        ByteReader::new(Cursor::new(bytes), len)
    }

    #[test]
    fn extracts_interleaved_int16_channel() {
        // 2 channels, 3 samples: ch0 = [1,2,3], ch1 = [10,20,30]
        let mut data = Vec::new();
        for (a, b) in [(1i16, 10i16), (2, 20), (3, 30)] {
            data.extend_from_slice(&a.to_le_bytes());
            data.extend_from_slice(&b.to_le_bytes());
        }
        let mut r = reader_from(data);
        let ch1 = read_sweep_channel(&mut r, 0, DataFormat::Int16, 2, 3, 0, 1).unwrap();
        assert_eq!(ch1, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn reads_second_sweep_at_correct_offset() {
        let mut data = Vec::new();
        for sweep in 0..2i16 {
            for sample in 0..4i16 {
                data.extend_from_slice(&(sweep * 100 + sample).to_le_bytes());
            }
        }
        let mut r = reader_from(data);
        let sweep1 = read_sweep_channel(&mut r, 0, DataFormat::Int16, 1, 4, 1, 0).unwrap();
        assert_eq!(sweep1, vec![100.0, 101.0, 102.0, 103.0]);
    }

    #[test]
    fn decodes_float32_samples() {
        let mut data = Vec::new();
        for v in [1.5f32, -2.25, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = reader_from(data);
        let y = read_sweep_channel(&mut r, 0, DataFormat::Float32, 1, 3, 0, 0).unwrap();
        assert_eq!(y, vec![1.5, -2.25, 3.0]);
    }
}
