//! ABF1 writer.
//!
//! Synthesizes a minimal ABF1 file from an in-memory `(sweep, channel,
//! sample)` array. Grounded directly in the reference writer's single
//! `bytearray` + `struct.pack_into` approach: the whole file is sized and
//! zero-filled once, header fields are written at their fixed offsets,
//! and the sample data is packed in afterward — there is no incremental
//! "open, write header, append data" pass.

use std::path::Path;

use crate::error::{Error, Result};
use crate::io::struct_map::BLOCK_SIZE;

const HEADER_BLOCKS: u64 = 4;
const MAX_ADC_CHANNELS: usize = 16;

/// Writer-side configuration. `units`/`channel_names` are indexed by
/// physical channel; if shorter than the channel count the last entry is
/// reused, matching the reference writer's fallback.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub sample_rate_hz: f64,
    pub units: Vec<String>,
    pub channel_names: Vec<String>,
    pub float32_mode: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: 20_000.0,
            units: vec!["pA".to_string()],
            channel_names: Vec::new(),
            float32_mode: false,
        }
    }
}

fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put_i16(buf: &mut [u8], offset: usize, v: i16) {
    put_bytes(buf, offset, &v.to_le_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, v: i32) {
    put_bytes(buf, offset, &v.to_le_bytes());
}

fn put_f32(buf: &mut [u8], offset: usize, v: f32) {
    put_bytes(buf, offset, &v.to_le_bytes());
}

fn padded(s: &str, width: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.truncate(width);
    bytes.resize(width, b' ');
    bytes
}

fn pick<'a>(items: &'a [String], i: usize, fallback: &'a str) -> &'a str {
    items.get(i).or_else(|| items.last()).map(|s| s.as_str()).unwrap_or(fallback)
}

/// Interleaves a `(sweep, channel, sample)` array into the flat
/// per-sweep sample order the data section expects: for each sample
/// position, every channel's value in physical-channel order.
fn interleave(samples: &[Vec<Vec<f32>>], channel_count: usize, samples_per_channel: usize) -> Vec<Vec<f32>> {
    samples
        .iter()
        .map(|sweep| {
            let mut flat = Vec::with_capacity(channel_count * samples_per_channel);
            for s in 0..samples_per_channel {
                for ch in sweep.iter().take(channel_count) {
                    flat.push(ch[s]);
                }
            }
            flat
        })
        .collect()
}

/// Searches descending powers of ten (10 down to 1e-10) for the largest
/// instrument scale factor under which every sample still fits in the
/// signed 16-bit range.
fn choose_instrument_scale_factor(max_abs: f32, adc_resolution: f32, adc_range: f32) -> f32 {
    let mut scale = 100.0f32;
    let mut chosen = 1e-10f32;
    for _ in 0..12 {
        scale /= 10.0;
        chosen = scale;
        let value_scale = adc_resolution / adc_range * scale;
        let max_deviation = 32767.0 / value_scale;
        if max_deviation >= max_abs {
            break;
        }
    }
    chosen
}

/// Writes `samples` (`[sweep][channel][sample]`, one slice per sweep, one
/// inner slice per channel, all channels within a sweep equal length) to
/// a new ABF1 file at `path`.
pub fn write_abf1(samples: &[Vec<Vec<f32>>], options: &WriteOptions, path: impl AsRef<Path>) -> Result<()> {
    if samples.is_empty() || samples[0].is_empty() || samples[0][0].is_empty() {
        return Err(Error::InvalidInput("sample array must be non-empty in all three dimensions".to_string()));
    }

    let sweep_count = samples.len();
    let channel_count = samples[0].len();
    let samples_per_channel = samples[0][0].len();

    if channel_count == 0 || channel_count > MAX_ADC_CHANNELS {
        return Err(Error::InvalidInput(format!(
            "channel count {channel_count} outside supported range 1..={MAX_ADC_CHANNELS}"
        )));
    }
    for sweep in samples {
        if sweep.len() != channel_count {
            return Err(Error::InvalidInput("every sweep must have the same channel count".to_string()));
        }
        for ch in sweep {
            if ch.len() != samples_per_channel {
                return Err(Error::InvalidInput("every channel within a sweep must have the same sample count".to_string()));
            }
        }
    }
    if options.sample_rate_hz <= 0.0 {
        return Err(Error::InvalidInput("sample rate must be positive".to_string()));
    }

    let bytes_per_sample: u64 = if options.float32_mode { 4 } else { 2 };
    let interleaved = interleave(samples, channel_count, samples_per_channel);
    let samples_per_episode = (samples_per_channel * channel_count) as u64;
    let total_samples = samples_per_episode * sweep_count as u64;

    let data_blocks = (total_samples * bytes_per_sample).div_ceil(BLOCK_SIZE);
    let total_len = ((HEADER_BLOCKS + data_blocks) * BLOCK_SIZE) as usize;
    let mut buf = vec![0u8; total_len];

    put_bytes(&mut buf, 0, b"ABF ");
    put_f32(&mut buf, 4, 1.3);
    put_i16(&mut buf, 8, 5); // episodic stimulation
    put_i32(&mut buf, 10, total_samples as i32);
    put_i32(&mut buf, 16, sweep_count as i32);
    put_i32(&mut buf, 40, HEADER_BLOCKS as i32);
    put_i16(&mut buf, 100, if options.float32_mode { 1 } else { 0 });
    put_i16(&mut buf, 120, channel_count as i16);
    put_f32(&mut buf, 122, (1_000_000.0 / options.sample_rate_hz) as f32);
    put_i32(&mut buf, 138, samples_per_episode as i32);

    let adc_resolution = 32768.0f32;
    let adc_range = 10.0f32;
    put_i32(&mut buf, 252, adc_resolution as i32);
    put_f32(&mut buf, 244, adc_range);

    let max_abs = interleaved.iter().flatten().fold(0.0f32, |acc, &v| acc.max(v.abs()));
    let instrument_scale_factor = if options.float32_mode {
        1.0
    } else {
        choose_instrument_scale_factor(max_abs.max(f32::EPSILON), adc_resolution, adc_range)
    };
    let value_scale = adc_resolution / adc_range * instrument_scale_factor;
    log::debug!("writing ABF1 file with instrument scale factor {instrument_scale_factor}, max|sample|={max_abs}");

    for i in 0..MAX_ADC_CHANNELS {
        put_f32(&mut buf, 922 + i * 4, instrument_scale_factor);
        put_f32(&mut buf, 1050 + i * 4, 1.0);
        put_f32(&mut buf, 730 + i * 4, 1.0);
        put_bytes(&mut buf, 602 + i * 8, &padded(pick(&options.units, i, "pA"), 8));
        let default_name = format!("V{i}");
        put_bytes(&mut buf, 442 + i * 10, &padded(pick(&options.channel_names, i, &default_name), 10));
        put_i16(&mut buf, 378 + i * 2, i as i16);
        put_i16(&mut buf, 410 + i * 2, if i < channel_count { i as i16 } else { -1 });
    }

    let data_byte_offset = (HEADER_BLOCKS * BLOCK_SIZE) as usize;
    for (sweep_idx, flat) in interleaved.iter().enumerate() {
        let sweep_byte_offset = sweep_idx * flat.len() * bytes_per_sample as usize;
        for (value_idx, &value) in flat.iter().enumerate() {
            let at = data_byte_offset + sweep_byte_offset + value_idx * bytes_per_sample as usize;
            if options.float32_mode {
                put_f32(&mut buf, at, value);
            } else {
                let scaled = (value * value_scale).round().clamp(i16::MIN as f32, i16::MAX as f32);
                put_i16(&mut buf, at, scaled as i16);
            }
        }
    }

    std::fs::write(path, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abf1::header;
    use crate::io::reader::ByteReader;
    use std::fs::File;

    #[test]
    fn rejects_ragged_channel_lengths() {
        let samples = vec![vec![vec![0.0, 1.0], vec![0.0]]];
        let err = write_abf1(&samples, &WriteOptions::default(), "/tmp/should-not-be-created.abf").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_too_many_channels() {
        let samples = vec![vec![vec![0.0]; 17]];
        let err = write_abf1(&samples, &WriteOptions::default(), "/tmp/should-not-be-created.abf").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn round_trips_int16_two_channel_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_chan.abf");

        let samples = vec![
            vec![vec![0.0, 1.0, -1.0, 0.5], vec![2.0, -2.0, 0.0, 1.0]],
            vec![vec![0.1, 0.2, 0.3, 0.4], vec![-0.1, -0.2, -0.3, -0.4]],
        ];
        let options = WriteOptions {
            sample_rate_hz: 10_000.0,
            units: vec!["V".to_string(), "pA".to_string()],
            channel_names: vec!["IN 0".to_string(), "IN 1".to_string()],
            float32_mode: false,
        };
        write_abf1(&samples, &options, &path).unwrap();

        let file = File::open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        let mut reader = ByteReader::new(file, len);
        let parsed = header::read_header(&mut reader).unwrap();

        assert_eq!(parsed.adc_num_channels, 2);
        assert_eq!(parsed.channel_count(), 2);
        assert_eq!(parsed.channels[0].adc_units, "V");
        assert_eq!(parsed.channels[1].adc_channel_name, "IN 1");
    }

    #[test]
    fn float32_mode_sets_data_format_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.abf");
        let samples = vec![vec![vec![1.0, 2.0, 3.0]]];
        let options = WriteOptions {
            float32_mode: true,
            ..WriteOptions::default()
        };
        write_abf1(&samples, &options, &path).unwrap();

        let file = File::open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        let mut reader = ByteReader::new(file, len);
        let parsed = header::read_header(&mut reader).unwrap();
        assert_eq!(parsed.data_format, 1);
    }
}
