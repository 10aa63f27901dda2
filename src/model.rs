//! The logical recording model.
//!
//! This is where raw ABF1/ABF2 header tables become the dialect-agnostic
//! view callers actually want: a channel list with names, units and
//! scaling factors; a DAC/epoch table capable of reconstructing the
//! stimulus waveform that was presented on a given sweep; and the digital
//! output pattern derived from the same epoch timing.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::abf1::header::{Abf1FileHeader, MAX_ADC_CHANNELS};
use crate::abf2::header::{Abf2FileHeader, SectionMap};
use crate::abf2::sections::Abf2Sections;
use crate::error::{Error, Result};
use crate::io::reader::ByteReader;
use crate::strings::StringPool;
use crate::sweep;

/// On-disk dialect a [`Recording`] was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Abf1,
    Abf2,
}

/// Sample encoding used in the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Int16,
    Float32,
}

impl DataFormat {
    pub fn byte_width(self) -> usize {
        match self {
            DataFormat::Int16 => 2,
            DataFormat::Float32 => 4,
        }
    }
}

/// The six operation modes named in `nOperationMode`. `EpisodicStimulation`
/// (code 5) is confirmed by the reference writer, which always emits that
/// value under the comment "5 is episodic"; the remaining codes follow the
/// order the format's documentation lists them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    VariableLengthEvent,
    Oscilloscope,
    GapFree,
    HighSpeedOscilloscope,
    EpisodicStimulation,
    WaveformFixedLength,
    Unknown(i16),
}

impl From<i16> for OperationMode {
    fn from(v: i16) -> Self {
        match v {
            1 => OperationMode::VariableLengthEvent,
            2 => OperationMode::Oscilloscope,
            3 => OperationMode::GapFree,
            4 => OperationMode::HighSpeedOscilloscope,
            5 => OperationMode::EpisodicStimulation,
            6 => OperationMode::WaveformFixedLength,
            other => OperationMode::Unknown(other),
        }
    }
}

impl OperationMode {
    pub fn is_gap_free(self) -> bool {
        matches!(self, OperationMode::GapFree)
    }
}

/// One ADC input channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub physical_index: usize,
    pub sampling_seq: i16,
    pub name: String,
    pub units: String,
    pub instrument_scale_factor: f32,
    pub programmable_gain: f32,
    pub signal_gain: f32,
    pub signal_offset: f32,
    /// `Some` only when the channel's telegraph is enabled; ABF1 channels
    /// never populate this (see `abf1::header`'s module doc comment).
    pub telegraph_addit_gain: Option<f32>,
    pub telegraph_filter: Option<f32>,
    pub lowpass_filter: Option<f32>,
    pub highpass_filter: Option<f32>,
    pub adc_range: f32,
    pub adc_resolution: i32,
}

impl Channel {
    /// `adcRange / adcResolution / (instrumentScaleFactor * signalGain *
    /// programmableGain * telegraphAdditGain_if_enabled)`.
    pub fn scale_multiplier(&self) -> f32 {
        let telegraph = self.telegraph_addit_gain.unwrap_or(1.0);
        self.adc_range
            / self.adc_resolution as f32
            / (self.instrument_scale_factor * self.signal_gain * self.programmable_gain * telegraph)
    }

    pub fn to_engineering_units(&self, raw: f32) -> f32 {
        self.scale_multiplier() * raw + self.signal_offset
    }
}

/// Whether a DAC's waveform is driven by the epoch table, a DAC file, or
/// nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformSource {
    Disabled,
    EpochTable,
    DacFile,
}

impl WaveformSource {
    fn from_codes(enabled: bool, source: i16) -> Self {
        if !enabled {
            return WaveformSource::Disabled;
        }
        match source {
            2 => WaveformSource::DacFile,
            _ => WaveformSource::EpochTable,
        }
    }
}

/// One DAC (stimulus output) channel.
#[derive(Debug, Clone)]
pub struct Dac {
    pub index: usize,
    pub name: String,
    pub units: String,
    pub holding_level: f32,
    pub waveform_source: WaveformSource,
    /// `true`: after the epoch table ends, hold the final epoch's level.
    /// `false`: fall back to `holding_level`.
    pub hold_last_level: bool,
    pub membrane_test_enable: bool,
    pub leak_subtract_type: i16,
}

/// An epoch's waveform shape. Codes follow the order the data model
/// enumerates them in (`disabled, step, ramp, pulse-train, triangle,
/// cosine, biphasic`); unmatched codes are preserved rather than
/// coerced into a default shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochType {
    Disabled,
    Step,
    Ramp,
    PulseTrain,
    Triangle,
    Cosine,
    Biphasic,
    Unknown(i16),
}

impl From<i16> for EpochType {
    fn from(v: i16) -> Self {
        match v {
            0 => EpochType::Disabled,
            1 => EpochType::Step,
            2 => EpochType::Ramp,
            3 => EpochType::PulseTrain,
            4 => EpochType::Triangle,
            5 => EpochType::Cosine,
            6 => EpochType::Biphasic,
            other => EpochType::Unknown(other),
        }
    }
}

/// One `(dacIndex, epochIndex)` row of the epoch table.
#[derive(Debug, Clone)]
pub struct EpochEntry {
    pub dac_index: usize,
    pub epoch_index: usize,
    pub epoch_type: EpochType,
    pub init_level: f32,
    pub level_inc: f32,
    pub init_duration: i32,
    pub duration_inc: i32,
    pub pulse_period: i32,
    pub pulse_width: i32,
}

impl EpochEntry {
    fn level_at(&self, sweep: usize) -> f32 {
        self.init_level + sweep as f32 * self.level_inc
    }

    fn duration_at(&self, sweep: usize) -> usize {
        (self.init_duration + sweep as i32 * self.duration_inc).max(0) as usize
    }
}

/// A tag's recorded category. Exact numeric codes are not documented in
/// any available reference source (`header.py` reads `nTagType` but never
/// maps its values to names); these follow the enumeration order given
/// for the `Tag` entity (`time | external | voice | annotation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Time,
    External,
    Voice,
    Annotation,
    Unknown(i16),
}

impl From<i16> for TagType {
    fn from(v: i16) -> Self {
        match v {
            0 => TagType::Time,
            1 => TagType::External,
            2 => TagType::Voice,
            3 => TagType::Annotation,
            other => TagType::Unknown(other),
        }
    }
}

/// A user-inserted comment tag.
#[derive(Debug, Clone)]
pub struct Tag {
    pub sample_index: i64,
    pub comment: String,
    pub tag_type: TagType,
}

/// Per-recording automatic baseline-subtraction configuration. Both
/// bounds `None` means baseline subtraction is disabled; a `SweepView`
/// records the configuration it was produced under, so a caller cannot
/// accidentally treat a baselined sweep as raw after reconfiguring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaselineConfig {
    pub t1_sec: Option<f64>,
    pub t2_sec: Option<f64>,
}

/// The result of `Recording::set_sweep`.
#[derive(Debug, Clone)]
pub struct SweepView {
    pub x: Vec<f64>,
    pub y: Vec<f32>,
    pub c: Vec<f32>,
    pub label_x: String,
    pub label_y: String,
    pub label_c: String,
    pub baseline: BaselineConfig,
}

/// The root entity produced by opening a file.
#[derive(Debug, Clone)]
pub struct Recording {
    pub dialect: Dialect,
    path: PathBuf,
    pub creator_version: (u8, u8, u8, u8),
    pub file_guid: Option<[u8; 16]>,
    pub start_time: DateTime<Utc>,
    pub operation_mode: OperationMode,
    pub sample_rate_hz: f64,
    pub channel_count: usize,
    pub sweep_count: usize,
    pub samples_per_sweep: usize,
    pub data_format: DataFormat,
    data_byte_start: u64,
    pub channels: Vec<Channel>,
    pub dacs: Vec<Dac>,
    pub epochs: Vec<EpochEntry>,
    /// `(epochIndex, digitalOutputBitmask)`, used alongside `epochs` to
    /// reconstruct digital waveforms for the active DAC's epoch timing.
    digital_epochs: Vec<(usize, u8)>,
    pub tags: Vec<Tag>,
    active_dac: usize,
    pub abf_id: String,
    pub protocol_path: String,
    baseline: BaselineConfig,
}

impl Recording {
    pub fn protocol(&self) -> &str {
        &self.protocol_path
    }

    pub fn adc_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn adc_units(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.units.clone()).collect()
    }

    pub fn sweep_length_sec(&self) -> f64 {
        self.samples_per_sweep as f64 / self.sample_rate_hz
    }

    /// Configures (or, with both arguments `None`, disables) automatic
    /// per-sweep baseline subtraction.
    pub fn set_baseline(&mut self, t1_sec: Option<f64>, t2_sec: Option<f64>) {
        self.baseline = BaselineConfig { t1_sec, t2_sec };
    }

    fn baseline_window_samples(&self) -> Option<(usize, usize)> {
        let t1 = self.baseline.t1_sec?;
        let start = ((t1 * self.sample_rate_hz).round().max(0.0) as usize).min(self.samples_per_sweep);
        let end = match self.baseline.t2_sec {
            Some(t2) => ((t2 * self.sample_rate_hz).round() as usize).min(self.samples_per_sweep),
            None => self.samples_per_sweep,
        };
        Some((start, end.max(start)))
    }

    /// Validates indices, decodes the sweep's samples, applies channel
    /// scaling, the configured baseline, and reconstructs the active
    /// DAC's command waveform for the same sweep.
    pub fn set_sweep(&self, sweep_index: usize, channel: usize, absolute_time: bool) -> Result<SweepView> {
        if sweep_index >= self.sweep_count {
            return Err(Error::out_of_range("sweep", sweep_index, self.sweep_count));
        }
        if channel >= self.channel_count {
            return Err(Error::out_of_range("channel", channel, self.channel_count));
        }

        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let mut reader = ByteReader::new(file, len);
        let mut y = sweep::read_sweep_channel(
            &mut reader,
            self.data_byte_start,
            self.data_format,
            self.channel_count,
            self.samples_per_sweep,
            sweep_index,
            channel,
        )?;

        let ch = &self.channels[channel];
        for v in y.iter_mut() {
            *v = ch.to_engineering_units(*v);
        }

        if let Some((start, end)) = self.baseline_window_samples() {
            if end > start {
                let mean = y[start..end].iter().sum::<f32>() / (end - start) as f32;
                for v in y.iter_mut() {
                    *v -= mean;
                }
            }
        }

        let dt = 1.0 / self.sample_rate_hz;
        let x0 = if absolute_time {
            sweep_index as f64 * self.sweep_length_sec()
        } else {
            0.0
        };
        let x: Vec<f64> = (0..self.samples_per_sweep).map(|i| x0 + i as f64 * dt).collect();

        let (c, label_c) = match self.dacs.get(self.active_dac) {
            Some(dac) => (self.command_waveform(dac, sweep_index), dac.units.clone()),
            None => (vec![0.0; self.samples_per_sweep], String::new()),
        };

        Ok(SweepView {
            x,
            y,
            c,
            label_x: "s".to_string(),
            label_y: ch.units.clone(),
            label_c,
            baseline: self.baseline,
        })
    }

    /// Synthesized digital output level (0 or 1) for digital line `bit`
    /// over the given sweep, using the active DAC's epoch timing.
    pub fn sweep_d(&self, bit: u8, sweep_index: usize) -> Result<Vec<u8>> {
        if bit > 7 {
            return Err(Error::out_of_range("digital bit", bit as usize, 8));
        }
        if sweep_index >= self.sweep_count {
            return Err(Error::out_of_range("sweep", sweep_index, self.sweep_count));
        }

        let n = self.samples_per_sweep;
        let mut d = vec![0u8; n];
        for (start, len, entry) in self.epoch_spans(self.active_dac, sweep_index) {
            let mask = self
                .digital_epochs
                .iter()
                .find(|(idx, _)| *idx == entry.epoch_index)
                .map(|(_, m)| *m)
                .unwrap_or(0);
            let level = (mask >> bit) & 1;
            for v in d.iter_mut().skip(start).take(len) {
                *v = level;
            }
        }
        Ok(d)
    }

    pub fn tag_times_sec(&self) -> Vec<f64> {
        self.tags.iter().map(|t| t.sample_index as f64 / self.sample_rate_hz).collect()
    }

    pub fn tag_comments(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.comment.clone()).collect()
    }

    pub fn tag_sweeps(&self) -> Vec<usize> {
        let per_sweep = (self.samples_per_sweep * self.channel_count).max(1) as i64;
        self.tags.iter().map(|t| (t.sample_index / per_sweep).max(0) as usize).collect()
    }

    /// Epoch spans for `dac_index` on `sweep_index`, as `(startSample,
    /// length, entry)`, accumulated from a pre-epoch offset of
    /// `samplesPerSweep / 64` (an unconfirmed but documented convention
    /// of the reference reader) and clamped at the sweep boundary.
    fn epoch_spans(&self, dac_index: usize, sweep_index: usize) -> Vec<(usize, usize, &EpochEntry)> {
        let mut entries: Vec<&EpochEntry> = self.epochs.iter().filter(|e| e.dac_index == dac_index).collect();
        entries.sort_by_key(|e| e.epoch_index);

        let mut start = self.samples_per_sweep / 64;
        let mut spans = Vec::with_capacity(entries.len());
        for entry in entries {
            let duration = entry.duration_at(sweep_index);
            let clamped_start = start.min(self.samples_per_sweep);
            let end = (start + duration).min(self.samples_per_sweep);
            spans.push((clamped_start, end.saturating_sub(clamped_start), entry));
            start += duration;
        }
        spans
    }

    fn command_waveform(&self, dac: &Dac, sweep_index: usize) -> Vec<f32> {
        let n = self.samples_per_sweep;
        let mut c = vec![dac.holding_level; n];
        let mut prev_level = dac.holding_level;
        let mut tail_start = 0;

        for (start, len, entry) in self.epoch_spans(dac.index, sweep_index) {
            let level = entry.level_at(sweep_index);
            if len > 0 {
                fill_epoch(&mut c[start..start + len], entry.epoch_type, prev_level, level, entry.pulse_period, entry.pulse_width);
            }
            prev_level = level;
            tail_start = start + len;
        }

        let tail_level = if dac.hold_last_level { prev_level } else { dac.holding_level };
        for v in c.iter_mut().skip(tail_start) {
            *v = tail_level;
        }
        c
    }
}

fn fill_epoch(slice: &mut [f32], kind: EpochType, prev_level: f32, level: f32, pulse_period: i32, pulse_width: i32) {
    let len = slice.len();
    match kind {
        EpochType::Disabled => {}
        EpochType::Step => slice.fill(level),
        EpochType::Ramp => {
            for (k, v) in slice.iter_mut().enumerate() {
                let t = if len > 1 { k as f32 / (len - 1) as f32 } else { 1.0 };
                *v = prev_level + (level - prev_level) * t;
            }
        }
        EpochType::PulseTrain => {
            let period = pulse_period.max(1) as usize;
            let width = pulse_width.max(0) as usize;
            for (k, v) in slice.iter_mut().enumerate() {
                *v = if k % period < width { level } else { prev_level };
            }
        }
        EpochType::Triangle => {
            let period = pulse_period.max(1) as usize;
            for (k, v) in slice.iter_mut().enumerate() {
                let phase = (k % period) as f32 / period as f32;
                let shape = 1.0 - (phase - 0.5).abs() * 2.0;
                *v = prev_level + (level - prev_level) * shape;
            }
        }
        EpochType::Cosine => {
            let period = pulse_period.max(1) as usize;
            for (k, v) in slice.iter_mut().enumerate() {
                let phase = (k % period) as f32 / period as f32;
                let shape = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * phase).cos();
                *v = prev_level + (level - prev_level) * shape;
            }
        }
        // Biphasic's two-phase waveform shape isn't specified; fall back to a
        // flat fill at `level`, same as an unrecognized epoch type.
        EpochType::Biphasic | EpochType::Unknown(_) => slice.fill(level),
    }
}

fn parse_start_time(date_yyyymmdd: u32, time_ms_after_midnight: u32) -> DateTime<Utc> {
    let year = (date_yyyymmdd / 10_000) as i32;
    let month = (date_yyyymmdd / 100 % 100).max(1);
    let day = (date_yyyymmdd % 100).max(1);
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    let secs = time_ms_after_midnight / 1000;
    let nanos = (time_ms_after_midnight % 1000) * 1_000_000;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(time))
}

fn abf_id_from_path(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Builds a [`Recording`] from a parsed ABF2 header, section map, and
/// section records.
pub(crate) fn from_abf2(
    path: &Path,
    header: Abf2FileHeader,
    _map: SectionMap,
    sections: Abf2Sections,
) -> Result<Recording> {
    if header.version.3 >= 3 {
        return Err(Error::UnsupportedDialect(format!(
            "ABF file version {}.{}.{}.{} is not supported (this crate reads ABF2 v2.x only)",
            header.version.3, header.version.2, header.version.1, header.version.0
        )));
    }

    let strings = StringPool::parse(&sections.strings_raw);
    let protocol = sections
        .protocol
        .as_ref()
        .ok_or_else(|| Error::format(0, "ABF2 file has no ProtocolSection entry"))?;

    let channels: Vec<Channel> = sections
        .adc
        .iter()
        .map(|adc| Channel {
            physical_index: adc.adc_ptol_channel_map.max(0) as usize,
            sampling_seq: adc.adc_sampling_seq,
            name: strings.get(adc.adc_channel_name_index),
            units: strings.get(adc.adc_units_index),
            instrument_scale_factor: adc.instrument_scale_factor,
            programmable_gain: adc.adc_programmable_gain,
            signal_gain: adc.signal_gain,
            signal_offset: adc.signal_offset,
            telegraph_addit_gain: adc.telegraph_enable.then_some(adc.telegraph_addit_gain),
            telegraph_filter: adc.telegraph_enable.then_some(adc.telegraph_filter),
            lowpass_filter: Some(adc.signal_lowpass_filter),
            highpass_filter: Some(adc.signal_highpass_filter),
            adc_range: protocol.adc_range,
            adc_resolution: protocol.adc_resolution,
        })
        .collect();

    let dacs: Vec<Dac> = sections
        .dac
        .iter()
        .map(|dac| Dac {
            index: dac.dac_num.max(0) as usize,
            name: strings.get(dac.channel_name_index),
            units: strings.get(dac.channel_units_index),
            holding_level: dac.holding_level,
            waveform_source: WaveformSource::from_codes(dac.waveform_enable, dac.waveform_source),
            hold_last_level: dac.inter_episode_level != 0,
            membrane_test_enable: dac.membrane_test_enable,
            leak_subtract_type: dac.leak_subtract_type,
        })
        .collect();

    let epochs: Vec<EpochEntry> = sections
        .epoch_per_dac
        .iter()
        .map(|e| EpochEntry {
            dac_index: e.dac_num.max(0) as usize,
            epoch_index: e.epoch_num.max(0) as usize,
            epoch_type: EpochType::from(e.epoch_type),
            init_level: e.init_level,
            level_inc: e.level_inc,
            init_duration: e.init_duration,
            duration_inc: e.duration_inc,
            pulse_period: e.pulse_period,
            pulse_width: e.pulse_width,
        })
        .collect();

    let digital_epochs = sections
        .epoch_digital
        .iter()
        .map(|e| (e.epoch_num.max(0) as usize, e.digital_output))
        .collect();

    let tags: Vec<Tag> = sections
        .tags
        .iter()
        .map(|t| Tag {
            sample_index: t.tag_time as i64,
            comment: t.comment.clone(),
            tag_type: TagType::from(t.tag_type),
        })
        .collect();

    let channel_count = channels.len().max(1);
    let operation_mode = OperationMode::from(protocol.operation_mode);
    let sample_rate_hz = if protocol.adc_sequence_interval_us > 0.0 {
        1_000_000.0 / protocol.adc_sequence_interval_us as f64
    } else {
        0.0
    };

    let data = sections
        .data
        .ok_or_else(|| Error::format(0, "ABF2 file has no DataSection entry"))?;

    let (sweep_count, samples_per_sweep) = if operation_mode.is_gap_free() {
        (1usize, (data.sample_count as usize) / channel_count)
    } else {
        let episodes = (header.actual_episodes.max(1)) as usize;
        (episodes, (protocol.samples_per_episode.max(0) as usize) / channel_count)
    };

    let data_format = match header.data_format {
        0 => DataFormat::Int16,
        1 => DataFormat::Float32,
        other => {
            return Err(Error::UnsupportedDialect(format!(
                "nDataFormat {other} is not supported (only int16 and float32 sample data are decoded)"
            )));
        }
    };

    let active_dac = dacs.iter().position(|d| d.index == protocol.active_dac_channel.max(0) as usize).unwrap_or_else(|| {
        if !dacs.is_empty() {
            log::warn!(
                "active DAC channel {} not found among {} DACSection entries, defaulting to index 0",
                protocol.active_dac_channel,
                dacs.len()
            );
        }
        0
    });

    Ok(Recording {
        dialect: Dialect::Abf2,
        path: path.to_path_buf(),
        creator_version: (header.version.3, header.version.2, header.version.1, header.version.0),
        file_guid: Some(header.file_guid),
        start_time: parse_start_time(header.file_start_date, header.file_start_time_ms),
        operation_mode,
        sample_rate_hz,
        channel_count,
        sweep_count: sweep_count.max(1),
        samples_per_sweep,
        data_format,
        data_byte_start: data.first_block as u64 * crate::io::struct_map::BLOCK_SIZE,
        channels,
        dacs,
        epochs,
        digital_epochs,
        tags,
        active_dac,
        abf_id: abf_id_from_path(path),
        protocol_path: strings.get(header.protocol_path_index),
        baseline: BaselineConfig::default(),
    })
}

/// Builds a [`Recording`] from a parsed ABF1 header.
///
/// ABF1's fixed-offset header layout only covers ADC configuration; it
/// carries no grounded offset table for DAC/epoch/tag data, so an ABF1
/// `Recording` exposes a single disabled DAC and empty epoch/tag tables
/// rather than guessing at undocumented offsets.
pub(crate) fn from_abf1(path: &Path, header: Abf1FileHeader) -> Result<Recording> {
    let active = header.active_channel_indices();
    let channel_count = active.len().max(1);

    let channels: Vec<Channel> = active
        .iter()
        .map(|&i| {
            let c = &header.channels[i.min(MAX_ADC_CHANNELS - 1)];
            Channel {
                physical_index: i,
                sampling_seq: c.adc_sampling_seq,
                name: c.adc_channel_name.clone(),
                units: c.adc_units.clone(),
                instrument_scale_factor: c.instrument_scale_factor,
                programmable_gain: c.adc_programmable_gain,
                signal_gain: c.signal_gain,
                signal_offset: c.signal_offset,
                telegraph_addit_gain: None,
                telegraph_filter: None,
                lowpass_filter: None,
                highpass_filter: None,
                adc_range: header.adc_range,
                adc_resolution: header.adc_resolution,
            }
        })
        .collect();

    let operation_mode = OperationMode::from(header.operation_mode);
    let sample_rate_hz = if header.adc_sample_interval_us > 0.0 {
        1_000_000.0 / header.adc_sample_interval_us as f64
    } else {
        0.0
    };

    let (sweep_count, samples_per_sweep) = if operation_mode.is_gap_free() {
        (1usize, (header.actual_acq_length.max(0) as usize) / channel_count)
    } else {
        let episodes = header.actual_episodes.max(1) as usize;
        (episodes, (header.samples_per_episode.max(0) as usize) / channel_count)
    };

    let data_format = match header.data_format {
        0 => DataFormat::Int16,
        1 => DataFormat::Float32,
        other => {
            return Err(Error::UnsupportedDialect(format!(
                "nDataFormat {other} is not supported (only int16 and float32 sample data are decoded)"
            )));
        }
    };

    let dacs = vec![Dac {
        index: 0,
        name: String::new(),
        units: String::new(),
        holding_level: 0.0,
        waveform_source: WaveformSource::Disabled,
        hold_last_level: false,
        membrane_test_enable: false,
        leak_subtract_type: 0,
    }];

    Ok(Recording {
        dialect: Dialect::Abf1,
        path: path.to_path_buf(),
        creator_version: (0, 0, 0, (header.version * 100.0) as u8),
        file_guid: None,
        start_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        operation_mode,
        sample_rate_hz,
        channel_count,
        sweep_count: sweep_count.max(1),
        samples_per_sweep,
        data_format,
        data_byte_start: header.data_section_ptr as u64 * crate::io::struct_map::BLOCK_SIZE,
        channels,
        dacs,
        epochs: Vec::new(),
        digital_epochs: Vec::new(),
        tags: Vec::new(),
        active_dac: 0,
        abf_id: abf_id_from_path(path),
        protocol_path: String::new(),
        baseline: BaselineConfig::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abf2::sections::{DataSection, ProtocolSection};
    use crate::io::struct_map::FieldMap;

    fn blank_abf2_header(version_major: u8, data_format: u16) -> Abf2FileHeader {
        Abf2FileHeader {
            version: (0, 0, 0, version_major),
            file_info_size: 512,
            actual_episodes: 1,
            file_start_date: 20230101,
            file_start_time_ms: 0,
            stopwatch_time: 0,
            file_type: 0,
            data_format,
            simultaneous_scan: 0,
            crc_enable: 0,
            file_crc: 0,
            file_guid: [0u8; 16],
            creator_version: 0,
            creator_name_index: crate::strings::StringIndex::NONE,
            modifier_version: 0,
            modifier_name_index: crate::strings::StringIndex::NONE,
            protocol_path_index: crate::strings::StringIndex::NONE,
        }
    }

    fn minimal_sections() -> Abf2Sections {
        let mut sections = Abf2Sections::default();
        sections.protocol = Some(ProtocolSection {
            operation_mode: 5,
            adc_sequence_interval_us: 100.0,
            samples_per_episode: 10,
            pre_trigger_samples: 0,
            episodes_per_run: 1,
            adc_range: 10.0,
            dac_range: 10.0,
            adc_resolution: 32768,
            dac_resolution: 32768,
            experiment_type: 0,
            digital_enable: 0,
            active_dac_channel: 0,
            digital_holding: 0,
            digital_inter_episode: 0,
            digital_dac_channel: 0,
            digital_train_active_logic: 0,
            comments_enable: 0,
            raw: FieldMap::default(),
        });
        sections.data = Some(DataSection {
            first_block: 4,
            bytes_per_sample: 2,
            sample_count: 10,
        });
        sections
    }

    #[test]
    fn abf2_rejects_version_three_as_unsupported_dialect() {
        let header = blank_abf2_header(3, 0);
        let err = from_abf2(Path::new("x.abf"), header, SectionMap {
            entries: [crate::io::struct_map::SectionPointer::default(); crate::abf2::header::SECTION_COUNT],
        }, minimal_sections()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect(_)));
    }

    #[test]
    fn abf2_rejects_float64_data_format_as_unsupported_dialect() {
        let header = blank_abf2_header(2, 2);
        let err = from_abf2(Path::new("x.abf"), header, SectionMap {
            entries: [crate::io::struct_map::SectionPointer::default(); crate::abf2::header::SECTION_COUNT],
        }, minimal_sections()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDialect(_)));
    }

    fn flat_dac(holding: f32, hold_last: bool) -> Dac {
        Dac {
            index: 0,
            name: "Cmd 0".to_string(),
            units: "mV".to_string(),
            holding_level: holding,
            waveform_source: WaveformSource::EpochTable,
            hold_last_level: hold_last,
            membrane_test_enable: false,
            leak_subtract_type: 0,
        }
    }

    fn rec_with_epochs(epochs: Vec<EpochEntry>, samples_per_sweep: usize, dac: Dac) -> Recording {
        Recording {
            dialect: Dialect::Abf2,
            path: PathBuf::new(),
            creator_version: (0, 0, 0, 0),
            file_guid: None,
            start_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            operation_mode: OperationMode::EpisodicStimulation,
            sample_rate_hz: 10_000.0,
            channel_count: 1,
            sweep_count: 3,
            samples_per_sweep,
            data_format: DataFormat::Int16,
            data_byte_start: 0,
            channels: Vec::new(),
            dacs: vec![dac],
            epochs,
            digital_epochs: Vec::new(),
            tags: Vec::new(),
            active_dac: 0,
            abf_id: String::new(),
            protocol_path: String::new(),
            baseline: BaselineConfig::default(),
        }
    }

    #[test]
    fn step_epoch_fills_its_range_and_tail_holds_holding_level() {
        let epoch = EpochEntry {
            dac_index: 0,
            epoch_index: 0,
            epoch_type: EpochType::Step,
            init_level: 5.0,
            level_inc: 0.0,
            init_duration: 100,
            duration_inc: 0,
            pulse_period: 1,
            pulse_width: 1,
        };
        let rec = rec_with_epochs(vec![epoch], 1000, flat_dac(0.0, false));
        let c = rec.command_waveform(&rec.dacs[0], 0);
        let pre = rec.samples_per_sweep / 64;
        assert_eq!(c[0], 0.0);
        assert_eq!(c[pre], 5.0);
        assert_eq!(c[pre + 50], 5.0);
        assert_eq!(*c.last().unwrap(), 0.0);
    }

    #[test]
    fn hold_last_level_keeps_final_epoch_value_in_tail() {
        let epoch = EpochEntry {
            dac_index: 0,
            epoch_index: 0,
            epoch_type: EpochType::Step,
            init_level: 7.0,
            level_inc: 0.0,
            init_duration: 10,
            duration_inc: 0,
            pulse_period: 1,
            pulse_width: 1,
        };
        let rec = rec_with_epochs(vec![epoch], 200, flat_dac(0.0, true));
        let c = rec.command_waveform(&rec.dacs[0], 0);
        assert_eq!(*c.last().unwrap(), 7.0);
    }

    #[test]
    fn level_increments_per_sweep() {
        let epoch = EpochEntry {
            dac_index: 0,
            epoch_index: 0,
            epoch_type: EpochType::Step,
            init_level: 1.0,
            level_inc: 2.0,
            init_duration: 50,
            duration_inc: 0,
            pulse_period: 1,
            pulse_width: 1,
        };
        let rec = rec_with_epochs(vec![epoch], 500, flat_dac(0.0, false));
        let sweep0 = rec.command_waveform(&rec.dacs[0], 0);
        let sweep2 = rec.command_waveform(&rec.dacs[0], 2);
        let pre = rec.samples_per_sweep / 64;
        assert_eq!(sweep0[pre], 1.0);
        assert_eq!(sweep2[pre], 5.0);
    }

    #[test]
    fn channel_scale_multiplier_matches_formula() {
        let ch = Channel {
            physical_index: 0,
            sampling_seq: 0,
            name: String::new(),
            units: String::new(),
            instrument_scale_factor: 2.0,
            programmable_gain: 1.0,
            signal_gain: 1.0,
            signal_offset: 0.5,
            telegraph_addit_gain: Some(4.0),
            telegraph_filter: None,
            lowpass_filter: None,
            highpass_filter: None,
            adc_range: 10.0,
            adc_resolution: 32768,
        };
        let m = ch.scale_multiplier();
        assert!((m - 10.0 / 32768.0 / (2.0 * 1.0 * 1.0 * 4.0)).abs() < 1e-9);
        assert_eq!(ch.to_engineering_units(0.0), 0.5);
    }

    #[test]
    fn tag_sweep_derivation_matches_sample_arithmetic() {
        let mut rec = rec_with_epochs(Vec::new(), 1000, flat_dac(0.0, false));
        rec.channel_count = 2;
        rec.tags = vec![Tag {
            sample_index: 2500,
            comment: "stim on".to_string(),
            tag_type: TagType::Time,
        }];
        assert_eq!(rec.tag_sweeps(), vec![1]);
        assert_eq!(rec.tag_comments(), vec!["stim on".to_string()]);
    }

    #[test]
    fn date_yyyymmdd_decomposition() {
        let dt = parse_start_time(20230615, 3_723_000);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-06-15 01:02:03");
    }
}
