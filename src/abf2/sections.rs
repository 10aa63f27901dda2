//! ABF2 section parsers.
//!
//! Each named section is read with [`struct_map::read_section`] against a
//! declarative field list. Per the reference reader's `PROTO`/`ADC`/`DAC`
//! struct-map strings, several sections carry far more fields than this
//! crate interprets (trigger/statistics configuration in particular) —
//! those are kept in a `raw` side-table on the section struct rather than
//! promoted to named members, so nothing is silently dropped even though
//! only a subset of fields drives the logical view.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::io::reader::ByteReader;
use crate::io::struct_map::{self, field, FieldFormat, FieldMap, SectionPointer};
use crate::strings::StringIndex;

fn protocol_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![
        field("nOperationMode", I16),
        field("fADCSequenceInterval", F32),
        field("bEnableFileCompression", U8),
        field("sUnused", Str(3)),
        field("uFileCompressionRatio", U32),
        field("fSynchTimeUnit", F32),
        field("fSecondsPerRun", F32),
        field("lNumSamplesPerEpisode", I32),
        field("lPreTriggerSamples", I32),
        field("lEpisodesPerRun", I32),
        field("lRunsPerTrial", I32),
        field("lNumberOfTrials", I32),
        field("nAveragingMode", I16),
        field("nUndoRunCount", I16),
        field("nFirstEpisodeInRun", I16),
        field("fTriggerThreshold", F32),
        field("nTriggerSource", I16),
        field("nTriggerAction", I16),
        field("nTriggerPolarity", I16),
        field("fScopeOutputInterval", F32),
        field("fEpisodeStartToStart", F32),
        field("fRunStartToStart", F32),
        field("lAverageCount", I32),
        field("fTrialStartToStart", F32),
        field("nAutoTriggerStrategy", I16),
        field("fFirstRunDelayS", F32),
        field("nChannelStatsStrategy", I16),
        field("lSamplesPerTrace", I32),
        field("lStartDisplayNum", I32),
        field("lFinishDisplayNum", I32),
        field("nShowPNRawData", I16),
        field("fStatisticsPeriod", F32),
        field("lStatisticsMeasurements", I32),
        field("nStatisticsSaveStrategy", I16),
        field("fADCRange", F32),
        field("fDACRange", F32),
        field("lADCResolution", I32),
        field("lDACResolution", I32),
        field("nExperimentType", I16),
        field("nManualInfoStrategy", I16),
        field("nCommentsEnable", I16),
        field("lFileCommentIndex", I32),
        field("nAutoAnalyseEnable", I16),
        field("nSignalType", I16),
        field("nDigitalEnable", I16),
        field("nActiveDACChannel", I16),
        field("nDigitalHolding", I16),
        field("nDigitalInterEpisode", I16),
        field("nDigitalDACChannel", I16),
        field("nDigitalTrainActiveLogic", I16),
        field("nStatsEnable", I16),
        field("nStatisticsClearStrategy", I16),
        field("nLevelHysteresis", I16),
        field("lTimeHysteresis", I32),
        field("nAllowExternalTags", I16),
        field("nAverageAlgorithm", I16),
        field("fAverageWeighting", F32),
        field("nUndoPromptStrategy", I16),
        field("nTrialTriggerSource", I16),
        field("nStatisticsDisplayStrategy", I16),
        field("nExternalTagType", I16),
        field("nScopeTriggerOut", I16),
        field("nLTPType", I16),
        field("nAlternateDACOutputState", I16),
        field("nAlternateDigitalOutputState", I16),
        field("fCellID", F32Vec(3)),
        field("nDigitizerADCs", I16),
        field("nDigitizerDACs", I16),
        field("nDigitizerTotalDigitalOuts", I16),
        field("nDigitizerSynchDigitalOuts", I16),
        field("nDigitizerType", I16),
    ]
}

/// The protocol (acquisition configuration) section: one entry per file.
#[derive(Debug, Clone)]
pub struct ProtocolSection {
    pub operation_mode: i16,
    pub adc_sequence_interval_us: f32,
    pub samples_per_episode: i32,
    pub pre_trigger_samples: i32,
    pub episodes_per_run: i32,
    pub adc_range: f32,
    pub dac_range: f32,
    pub adc_resolution: i32,
    pub dac_resolution: i32,
    pub experiment_type: i16,
    pub digital_enable: i16,
    pub active_dac_channel: i16,
    pub digital_holding: i16,
    pub digital_inter_episode: i16,
    pub digital_dac_channel: i16,
    pub digital_train_active_logic: i16,
    pub comments_enable: i16,
    /// Trigger/statistics configuration and everything else PROTO
    /// declares: recorded but not otherwise interpreted by this crate.
    pub raw: FieldMap,
}

impl From<FieldMap> for ProtocolSection {
    fn from(m: FieldMap) -> Self {
        Self {
            operation_mode: m.i16("nOperationMode"),
            adc_sequence_interval_us: m.f32("fADCSequenceInterval"),
            samples_per_episode: m.i32("lNumSamplesPerEpisode"),
            pre_trigger_samples: m.i32("lPreTriggerSamples"),
            episodes_per_run: m.i32("lEpisodesPerRun"),
            adc_range: m.f32("fADCRange"),
            dac_range: m.f32("fDACRange"),
            adc_resolution: m.i32("lADCResolution"),
            dac_resolution: m.i32("lDACResolution"),
            experiment_type: m.i16("nExperimentType"),
            digital_enable: m.i16("nDigitalEnable"),
            active_dac_channel: m.i16("nActiveDACChannel"),
            digital_holding: m.i16("nDigitalHolding"),
            digital_inter_episode: m.i16("nDigitalInterEpisode"),
            digital_dac_channel: m.i16("nDigitalDACChannel"),
            digital_train_active_logic: m.i16("nDigitalTrainActiveLogic"),
            comments_enable: m.i16("nCommentsEnable"),
            raw: m,
        }
    }
}

fn adc_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![
        field("nADCNum", I16),
        field("nTelegraphEnable", I16),
        field("nTelegraphInstrument", I16),
        field("fTelegraphAdditGain", F32),
        field("fTelegraphFilter", F32),
        field("fTelegraphMembraneCap", F32),
        field("nTelegraphMode", I16),
        field("fTelegraphAccessResistance", F32),
        field("nADCPtoLChannelMap", I16),
        field("nADCSamplingSeq", I16),
        field("fADCProgrammableGain", F32),
        field("fADCDisplayAmplification", F32),
        field("fADCDisplayOffset", F32),
        field("fInstrumentScaleFactor", F32),
        field("fInstrumentOffset", F32),
        field("fSignalGain", F32),
        field("fSignalOffset", F32),
        field("fSignalLowpassFilter", F32),
        field("fSignalHighpassFilter", F32),
        field("nLowpassFilterType", I8),
        field("nHighpassFilterType", I8),
        field("fPostProcessLowpassFilter", F32),
        field("nPostProcessLowpassFilterType", I8),
        field("bEnabledDuringPN", I8),
        field("nStatsChannelPolarity", I16),
        field("lADCChannelNameIndex", I32),
        field("lADCUnitsIndex", I32),
    ]
}

/// One ADC (input channel) configuration entry.
#[derive(Debug, Clone)]
pub struct AdcSection {
    pub adc_num: i16,
    pub telegraph_enable: bool,
    pub telegraph_addit_gain: f32,
    pub telegraph_filter: f32,
    pub adc_ptol_channel_map: i16,
    pub adc_sampling_seq: i16,
    pub adc_programmable_gain: f32,
    pub instrument_scale_factor: f32,
    pub signal_gain: f32,
    pub signal_offset: f32,
    pub signal_lowpass_filter: f32,
    pub signal_highpass_filter: f32,
    pub adc_channel_name_index: StringIndex,
    pub adc_units_index: StringIndex,
    pub raw: FieldMap,
}

impl From<FieldMap> for AdcSection {
    fn from(m: FieldMap) -> Self {
        Self {
            adc_num: m.i16("nADCNum"),
            telegraph_enable: m.i16("nTelegraphEnable") != 0,
            telegraph_addit_gain: m.f32("fTelegraphAdditGain"),
            telegraph_filter: m.f32("fTelegraphFilter"),
            adc_ptol_channel_map: m.i16("nADCPtoLChannelMap"),
            adc_sampling_seq: m.i16("nADCSamplingSeq"),
            adc_programmable_gain: m.f32("fADCProgrammableGain"),
            instrument_scale_factor: m.f32("fInstrumentScaleFactor"),
            signal_gain: m.f32("fSignalGain"),
            signal_offset: m.f32("fSignalOffset"),
            signal_lowpass_filter: m.f32("fSignalLowpassFilter"),
            signal_highpass_filter: m.f32("fSignalHighpassFilter"),
            adc_channel_name_index: StringIndex(m.i32("lADCChannelNameIndex").max(0) as u32),
            adc_units_index: StringIndex(m.i32("lADCUnitsIndex").max(0) as u32),
            raw: m,
        }
    }
}

fn dac_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![
        field("nDACNum", I16),
        field("nTelegraphDACScaleFactorEnable", I16),
        field("fInstrumentHoldingLevel", F32),
        field("fDACScaleFactor", F32),
        field("fDACHoldingLevel", F32),
        field("fDACCalibrationFactor", F32),
        field("fDACCalibrationOffset", F32),
        field("lDACChannelNameIndex", I32),
        field("lDACChannelUnitsIndex", I32),
        field("lDACFilePtr", I32),
        field("lDACFileNumEpisodes", I32),
        field("nWaveformEnable", I16),
        field("nWaveformSource", I16),
        field("nInterEpisodeLevel", I16),
        field("fDACFileScale", F32),
        field("fDACFileOffset", F32),
        field("lDACFileEpisodeNum", I32),
        field("nDACFileADCNum", I16),
        field("nConditEnable", I16),
        field("lConditNumPulses", I32),
        field("fBaselineDuration", F32),
        field("fBaselineLevel", F32),
        field("fStepDuration", F32),
        field("fStepLevel", F32),
        field("fPostTrainPeriod", F32),
        field("fPostTrainLevel", F32),
        field("nMembTestEnable", I16),
        field("nLeakSubtractType", I16),
        field("nPNPolarity", I16),
        field("fPNHoldingLevel", F32),
        field("nPNNumADCChannels", I16),
        field("nPNPosition", I16),
        field("nPNNumPulses", I16),
        field("fPNSettlingTime", F32),
        field("fPNInterpulse", F32),
        field("nLTPUsageOfDAC", I16),
        field("nLTPPresynapticPulses", I16),
        field("lDACFilePathIndex", I32),
        field("fMembTestPreSettlingTimeMS", F32),
        field("fMembTestPostSettlingTimeMS", F32),
        field("nLeakSubtractADCIndex", I16),
    ]
}

/// One DAC (output channel) configuration entry.
#[derive(Debug, Clone)]
pub struct DacSection {
    pub dac_num: i16,
    pub holding_level: f32,
    pub dac_scale_factor: f32,
    pub channel_name_index: StringIndex,
    pub channel_units_index: StringIndex,
    pub waveform_enable: bool,
    pub waveform_source: i16,
    pub inter_episode_level: i16,
    pub membrane_test_enable: bool,
    pub leak_subtract_type: i16,
    pub raw: FieldMap,
}

impl From<FieldMap> for DacSection {
    fn from(m: FieldMap) -> Self {
        Self {
            dac_num: m.i16("nDACNum"),
            holding_level: m.f32("fDACHoldingLevel"),
            dac_scale_factor: m.f32("fDACScaleFactor"),
            channel_name_index: StringIndex(m.i32("lDACChannelNameIndex").max(0) as u32),
            channel_units_index: StringIndex(m.i32("lDACChannelUnitsIndex").max(0) as u32),
            waveform_enable: m.i16("nWaveformEnable") != 0,
            waveform_source: m.i16("nWaveformSource"),
            inter_episode_level: m.i16("nInterEpisodeLevel"),
            membrane_test_enable: m.i16("nMembTestEnable") != 0,
            leak_subtract_type: m.i16("nLeakSubtractType"),
            raw: m,
        }
    }
}

fn epoch_per_dac_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![
        field("nEpochNum", I16),
        field("nDACNum", I16),
        field("nEpochType", I16),
        field("fEpochInitLevel", F32),
        field("fEpochLevelInc", F32),
        field("lEpochInitDuration", I32),
        field("lEpochDurationInc", I32),
        field("lEpochPulsePeriod", I32),
        field("lEpochPulseWidth", I32),
    ]
}

/// One `(dacIndex, epochIndex)` row of the epoch table.
#[derive(Debug, Clone, Copy)]
pub struct EpochPerDacSection {
    pub epoch_num: i16,
    pub dac_num: i16,
    pub epoch_type: i16,
    pub init_level: f32,
    pub level_inc: f32,
    pub init_duration: i32,
    pub duration_inc: i32,
    pub pulse_period: i32,
    pub pulse_width: i32,
}

impl From<FieldMap> for EpochPerDacSection {
    fn from(m: FieldMap) -> Self {
        Self {
            epoch_num: m.i16("nEpochNum"),
            dac_num: m.i16("nDACNum"),
            epoch_type: m.i16("nEpochType"),
            init_level: m.f32("fEpochInitLevel"),
            level_inc: m.f32("fEpochLevelInc"),
            init_duration: m.i32("lEpochInitDuration"),
            duration_inc: m.i32("lEpochDurationInc"),
            pulse_period: m.i32("lEpochPulsePeriod"),
            pulse_width: m.i32("lEpochPulseWidth"),
        }
    }
}

fn epoch_digital_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![field("nEpochNum", I16), field("nEpochDigitalOutput", I16)]
}

/// One epoch's 8-bit digital output pattern.
#[derive(Debug, Clone, Copy)]
pub struct EpochDigitalSection {
    pub epoch_num: i16,
    pub digital_output: u8,
}

impl From<FieldMap> for EpochDigitalSection {
    fn from(m: FieldMap) -> Self {
        Self {
            epoch_num: m.i16("nEpochNum"),
            digital_output: (m.i16("nEpochDigitalOutput") & 0xFF) as u8,
        }
    }
}

fn tag_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![
        field("lTagTime", I32),
        field("sComment", Str(56)),
        field("nTagType", I16),
        field("nVoiceTagNumberorAnnotationIndex", I16),
    ]
}

/// One user-inserted comment tag.
#[derive(Debug, Clone)]
pub struct TagSection {
    pub tag_time: i32,
    pub comment: String,
    pub tag_type: i16,
    pub voice_or_annotation_index: i16,
}

impl From<FieldMap> for TagSection {
    fn from(m: FieldMap) -> Self {
        let raw = m.bytes("sComment");
        Self {
            tag_time: m.i32("lTagTime"),
            comment: crate::io::reader::trim_fixed_string(raw),
            tag_type: m.i16("nTagType"),
            voice_or_annotation_index: m.i16("nVoiceTagNumberorAnnotationIndex"),
        }
    }
}

fn synch_array_fields() -> Vec<struct_map::FieldSpec> {
    use FieldFormat::*;
    vec![field("lStart", I32), field("lLength", I32)]
}

/// One `(startSample, length)` pair describing an episode's position in
/// the flat acquisition stream.
#[derive(Debug, Clone, Copy)]
pub struct SynchArrayEntry {
    pub start_sample: i32,
    pub length: i32,
}

impl From<FieldMap> for SynchArrayEntry {
    fn from(m: FieldMap) -> Self {
        Self {
            start_sample: m.i32("lStart"),
            length: m.i32("lLength"),
        }
    }
}

/// The data section's three numbers: first block, bytes per sample, and
/// total sample count across all channels.
#[derive(Debug, Clone, Copy)]
pub struct DataSection {
    pub first_block: u32,
    pub bytes_per_sample: u32,
    pub sample_count: i64,
}

impl From<SectionPointer> for DataSection {
    fn from(p: SectionPointer) -> Self {
        Self {
            first_block: p.first_block,
            bytes_per_sample: p.bytes_per_entry,
            sample_count: p.entry_count,
        }
    }
}

/// All of the ABF2 sections this crate interprets.
#[derive(Debug, Clone, Default)]
pub struct Abf2Sections {
    pub protocol: Option<ProtocolSection>,
    pub adc: Vec<AdcSection>,
    pub dac: Vec<DacSection>,
    pub epoch_per_dac: Vec<EpochPerDacSection>,
    pub epoch_digital: Vec<EpochDigitalSection>,
    pub tags: Vec<TagSection>,
    pub synch_array: Vec<SynchArrayEntry>,
    pub strings_raw: Vec<u8>,
    pub data: Option<DataSection>,
}

/// Section-map slots this crate never reads into a typed record.
const UNMODELED_SECTIONS: [super::header::SectionId; 9] = {
    use super::header::SectionId::*;
    [AdcPerDac, UserList, StatsRegion, Math, Scope, Delta, VoiceTag, Annotation, Stats]
};

/// Reads every modeled section named in a [`SectionMap`].
///
/// Sections the crate does not model (UserList, StatsRegion, Math,
/// ADCPerDAC, Scope, Delta, VoiceTag, Annotation, Stats) are simply never
/// read. With `strict == false` an unmodeled section with a nonzero entry
/// count is logged and otherwise ignored, implementing "unknown fields
/// are ignored silently" at the section-map level rather than just the
/// field level; with `strict == true` the same condition is reported as
/// `Error::Format` instead.
pub fn read_sections<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    map: &super::header::SectionMap,
    strict: bool,
) -> Result<Abf2Sections> {
    use super::header::SectionId::*;

    for &id in UNMODELED_SECTIONS.iter() {
        let ptr = map.get(id);
        if ptr.entry_count > 0 {
            if strict {
                return Err(Error::format(
                    ptr.byte_start(),
                    format!("unmodeled section {id:?} has {} entries", ptr.entry_count),
                ));
            }
            log::warn!("ignoring unmodeled section {id:?} ({} entries)", ptr.entry_count);
        }
    }

    let mut out = Abf2Sections::default();

    let protocol_records = struct_map::read_section(reader, &protocol_fields(), map.get(Protocol))?;
    out.protocol = protocol_records.into_iter().next().map(ProtocolSection::from);

    out.adc = struct_map::read_section(reader, &adc_fields(), map.get(Adc))?
        .into_iter()
        .map(AdcSection::from)
        .collect();

    out.dac = struct_map::read_section(reader, &dac_fields(), map.get(Dac))?
        .into_iter()
        .map(DacSection::from)
        .collect();

    out.epoch_per_dac = struct_map::read_section(reader, &epoch_per_dac_fields(), map.get(EpochPerDac))?
        .into_iter()
        .map(EpochPerDacSection::from)
        .collect();

    out.epoch_digital = struct_map::read_section(reader, &epoch_digital_fields(), map.get(Epoch))?
        .into_iter()
        .map(EpochDigitalSection::from)
        .collect();

    out.tags = struct_map::read_section(reader, &tag_fields(), map.get(Tag))?
        .into_iter()
        .map(TagSection::from)
        .collect();

    out.synch_array = struct_map::read_section(reader, &synch_array_fields(), map.get(SynchArray))?
        .into_iter()
        .map(SynchArrayEntry::from)
        .collect();

    let strings_ptr = map.get(Strings);
    if strings_ptr.entry_count > 0 {
        let total = strings_ptr.entry_count as usize * strings_ptr.bytes_per_entry as usize;
        out.strings_raw = reader.read_bytes(strings_ptr.byte_start(), total)?;
    }

    out.data = Some(DataSection::from(map.get(Data)));

    log::debug!(
        "read {} ADC, {} DAC, {} epoch rows, {} tags",
        out.adc.len(),
        out.dac.len(),
        out.epoch_per_dac.len(),
        out.tags.len()
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abf2::header::SectionMap;
    use std::io::Cursor;

    #[test]
    fn reads_single_protocol_entry() {
        let specs = protocol_fields();
        let size: usize = specs.iter().map(|s| s.format.size()).sum();
        let mut data = vec![0u8; 512 + size];
        // nOperationMode at offset 0 of the entry
        data[512..514].copy_from_slice(&5i16.to_le_bytes());
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let pointer = SectionPointer {
            first_block: 1,
            bytes_per_entry: size as u32,
            entry_count: 1,
        };
        let records = struct_map::read_section(&mut r, &specs, pointer).unwrap();
        let proto = ProtocolSection::from(records.into_iter().next().unwrap());
        assert_eq!(proto.operation_mode, 5);
    }

    #[test]
    fn unmodeled_sections_do_not_block_read_sections() {
        // A minimal, otherwise-empty section map: every pointer has zero entries.
        let map = SectionMap {
            entries: [SectionPointer::default(); super::super::header::SECTION_COUNT],
        };
        let data = vec![0u8; 16];
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let sections = read_sections(&mut r, &map, false).unwrap();
        assert!(sections.adc.is_empty());
        assert!(sections.protocol.is_none());
    }

    #[test]
    fn strict_mode_rejects_nonempty_unmodeled_section() {
        let mut entries = [SectionPointer::default(); super::super::header::SECTION_COUNT];
        entries[super::super::header::SectionId::Math as usize] = SectionPointer {
            first_block: 1,
            bytes_per_entry: 4,
            entry_count: 1,
        };
        let map = SectionMap { entries };
        let data = vec![0u8; 16];
        let len = data.len() as u64;
        let mut r = ByteReader::new(Cursor::new(data), len);
        let err = read_sections(&mut r, &map, true).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }
}
