//! ABF1 file header.
//!
//! ABF1 stores every field at a fixed byte offset within the first four
//! 512-byte blocks, rather than through a section map. Per-channel values
//! live in fixed-length-16 arrays indexed by physical channel number; the
//! channel count is the number of sampling-sequence entries that are not
//! `-1`, not a field of its own.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::io::reader::ByteReader;

pub const ABF1_SIGNATURE: &[u8; 4] = b"ABF ";
pub const ABF2_SIGNATURE: &[u8; 4] = b"ABF2";

/// Maximum number of physical ADC channels ABF1 headers reserve room for.
pub const MAX_ADC_CHANNELS: usize = 16;

/// One physical channel's per-channel header fields.
#[derive(Debug, Clone)]
pub struct Abf1ChannelFields {
    pub adc_sampling_seq: i16,
    pub adc_ptol_channel_map: i16,
    pub adc_channel_name: String,
    pub adc_units: String,
    pub adc_programmable_gain: f32,
    pub instrument_scale_factor: f32,
    pub signal_gain: f32,
    /// Offset 1258 + i*4, immediately after the 16-entry `fSignalGain`
    /// block. `abfWriter.py` never addresses this offset when writing an
    /// ABF1 file, so a file produced by that writer reads back as 0.0 —
    /// the natural default for an unset offset.
    pub signal_offset: f32,
}

/// Parsed ABF1 file header.
#[derive(Debug, Clone)]
pub struct Abf1FileHeader {
    pub version: f32,
    pub operation_mode: i16,
    pub actual_acq_length: i32,
    pub actual_episodes: i32,
    pub data_section_ptr: i32,
    pub data_format: i16,
    pub adc_num_channels: i16,
    pub adc_sample_interval_us: f32,
    pub samples_per_episode: i32,
    pub adc_range: f32,
    pub adc_resolution: i32,
    pub channels: Vec<Abf1ChannelFields>,
}

impl Abf1FileHeader {
    /// Physical channels whose sampling-sequence entry is not `-1`, i.e.
    /// the channels actually sampled, in acquisition order.
    pub fn active_channel_indices(&self) -> Vec<usize> {
        let mut pairs: Vec<(usize, i16)> = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.adc_sampling_seq != -1)
            .map(|(i, c)| (i, c.adc_sampling_seq))
            .collect();
        pairs.sort_by_key(|(_, seq)| *seq);
        pairs.into_iter().map(|(i, _)| i).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.active_channel_indices().len()
    }
}

/// Parses the flat ABF1 header at offset 0.
///
/// Returns `Error::UnsupportedDialect` if the signature is `"ABF2"`
/// (callers should dispatch to the ABF2 header parser instead), or
/// `Error::Format` for any other signature mismatch.
pub fn read_header<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<Abf1FileHeader> {
    let signature = reader.read_bytes(0, 4)?;

    if signature == ABF2_SIGNATURE {
        return Err(Error::UnsupportedDialect(
            "file uses the ABF2 signature; use the ABF2 header parser".to_string(),
        ));
    }
    if signature != ABF1_SIGNATURE {
        return Err(Error::format(0, format!("unrecognized file signature {:?}", signature)));
    }

    let mut channels = Vec::with_capacity(MAX_ADC_CHANNELS);
    for i in 0..MAX_ADC_CHANNELS {
        let i = i as u64;
        channels.push(Abf1ChannelFields {
            adc_sampling_seq: reader.read_i16(410 + i * 2)?,
            adc_ptol_channel_map: reader.read_i16(378 + i * 2)?,
            adc_channel_name: reader.read_cstring_fixed(442 + i * 10, 10)?,
            adc_units: reader.read_cstring_fixed(602 + i * 8, 8)?,
            adc_programmable_gain: reader.read_f32(730 + i * 4)?,
            instrument_scale_factor: reader.read_f32(922 + i * 4)?,
            signal_gain: reader.read_f32(1050 + i * 4)?,
            signal_offset: reader.read_f32(1258 + i * 4)?,
        });
    }

    Ok(Abf1FileHeader {
        version: reader.read_f32(4)?,
        operation_mode: reader.read_i16(8)?,
        actual_acq_length: reader.read_i32(10)?,
        actual_episodes: reader.read_i32(16)?,
        data_section_ptr: reader.read_i32(40)?,
        data_format: reader.read_i16(100)?,
        adc_num_channels: reader.read_i16(120)?,
        adc_sample_interval_us: reader.read_f32(122)?,
        samples_per_episode: reader.read_i32(138)?,
        adc_range: reader.read_f32(244)?,
        adc_resolution: reader.read_i32(252)?,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn blank_abf1() -> Vec<u8> {
        let mut data = vec![0u8; 2048];
        data[0..4].copy_from_slice(ABF1_SIGNATURE);
        for i in 0..MAX_ADC_CHANNELS {
            let off = 410 + i * 2;
            data[off..off + 2].copy_from_slice(&(-1i16).to_le_bytes());
        }
        data
    }

    #[test]
    fn rejects_abf2_signature_as_unsupported_dialect() {
        let mut data = blank_abf1();
        data[0..4].copy_from_slice(ABF2_SIGNATURE);
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let err = read_header(&mut r).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect(_)));
    }

    #[test]
    fn rejects_garbage_signature() {
        let mut data = blank_abf1();
        data[0..4].copy_from_slice(b"XYZZ");
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let err = read_header(&mut r).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn two_active_channels_in_sampling_sequence_order() {
        let mut data = blank_abf1();
        data[120..122].copy_from_slice(&2i16.to_le_bytes());
        // Channel 1 samples first (seq 0), channel 0 samples second (seq 1).
        data[410..412].copy_from_slice(&1i16.to_le_bytes());
        data[412..414].copy_from_slice(&0i16.to_le_bytes());
        data[442..452].copy_from_slice(b"IN 0\0\0\0\0\0\0");
        data[452..462].copy_from_slice(b"IN 1\0\0\0\0\0\0");

        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let header = read_header(&mut r).unwrap();
        assert_eq!(header.channel_count(), 2);
        assert_eq!(header.active_channel_indices(), vec![1, 0]);
        assert_eq!(header.channels[1].adc_channel_name, "IN 0");
    }

    #[test]
    fn unset_signal_offset_defaults_to_zero() {
        let data = blank_abf1();
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let header = read_header(&mut r).unwrap();
        assert_eq!(header.channels[0].signal_offset, 0.0);
    }
}
