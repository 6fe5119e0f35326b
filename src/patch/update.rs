//! Partial patches.
//!
//! `applyPatch` accepts any subset of the schema. Each `*Update` struct
//! mirrors one section with every field optional, and `merge_into` copies
//! only the fields that are present. Nested sections merge field by field as
//! well, so `{"filter": {"cutoff": 800}}` never resets the filter type.

use serde::{Deserialize, Serialize};

use super::names::*;
use super::types::*;

/// Copy every present field of an update onto its target.
macro_rules! merge_fields {
    ($update:expr => $target:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$update.$field {
                $target.$field = value.clone();
            }
        )+
    };
}

/// Merge every present nested update onto its target section.
macro_rules! merge_sections {
    ($update:expr => $target:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(section) = &$update.$field {
                section.merge_into(&mut $target.$field);
            }
        )+
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchUpdate {
    pub name: Option<String>,
    pub engine: Option<EngineMode>,
    pub osc1: Option<OscillatorUpdate>,
    pub osc2: Option<OscillatorUpdate>,
    pub sub: Option<SubOscUpdate>,
    pub fm: Option<FmUpdate>,
    pub ring: Option<RingModUpdate>,
    pub filter: Option<FilterUpdate>,
    pub envelope: Option<EnvelopeUpdate>,
    pub lfo1: Option<LfoUpdate>,
    pub lfo2: Option<LfoUpdate>,
    #[serde(rename = "macro")]
    pub macro_osc: Option<MacroUpdate>,
    pub sampler: Option<SamplerUpdate>,
    pub arp: Option<ArpUpdate>,
    pub sequencer: Option<SequencerUpdate>,
    pub master_gain: Option<f64>,
    pub effects: Option<EffectsUpdate>,
}

impl PatchUpdate {
    pub fn from_json(json: &str) -> Result<PatchUpdate, crate::error::EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Produce the merged and sanitized patch without touching `base`.
    pub fn applied_to(&self, base: &Patch) -> Patch {
        let mut next = base.clone();
        self.merge_into(&mut next);
        next.sanitize();
        next
    }

    pub fn merge_into(&self, target: &mut Patch) {
        merge_fields!(self => target; name, engine, master_gain);
        merge_sections!(self => target;
            osc1, osc2, sub, fm, ring, filter, envelope, lfo1, lfo2,
            macro_osc, sampler, arp, sequencer, effects,
        );
    }
}

/// A whole patch is also a complete update.
impl From<&Patch> for PatchUpdate {
    fn from(patch: &Patch) -> Self {
        // Every field serializes, so the round trip yields `Some` everywhere.
        serde_json::to_value(patch)
            .and_then(serde_json::from_value)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OscillatorUpdate {
    pub mode: Option<OscMode>,
    pub waveform: Option<Waveform>,
    pub octave: Option<i32>,
    pub detune: Option<f64>,
    pub fine: Option<f64>,
    pub level: Option<f64>,
    pub pulse_width: Option<f64>,
    #[serde(rename = "macro")]
    pub macro_osc: Option<MacroUpdate>,
}

impl OscillatorUpdate {
    pub fn merge_into(&self, target: &mut OscillatorSettings) {
        merge_fields!(self => target; mode, waveform, octave, detune, fine, level, pulse_width);
        merge_sections!(self => target; macro_osc);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubOscUpdate {
    pub enabled: Option<bool>,
    pub waveform: Option<Waveform>,
    pub octave: Option<i32>,
    pub level: Option<f64>,
}

impl SubOscUpdate {
    pub fn merge_into(&self, target: &mut SubOscSettings) {
        merge_fields!(self => target; enabled, waveform, octave, level);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FmUpdate {
    pub enabled: Option<bool>,
    pub ratio: Option<f64>,
    pub amount: Option<f64>,
}

impl FmUpdate {
    pub fn merge_into(&self, target: &mut FmSettings) {
        merge_fields!(self => target; enabled, ratio, amount);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RingModUpdate {
    pub enabled: Option<bool>,
    pub amount: Option<f64>,
}

impl RingModUpdate {
    pub fn merge_into(&self, target: &mut RingModSettings) {
        merge_fields!(self => target; enabled, amount);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    #[serde(rename = "type")]
    pub filter_type: Option<FilterType>,
    pub cutoff: Option<f64>,
    pub resonance: Option<f64>,
}

impl FilterUpdate {
    pub fn merge_into(&self, target: &mut FilterSettings) {
        merge_fields!(self => target; filter_type, cutoff, resonance);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeUpdate {
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
}

impl EnvelopeUpdate {
    pub fn merge_into(&self, target: &mut EnvelopeSettings) {
        merge_fields!(self => target; attack, decay, sustain, release);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LfoUpdate {
    pub enabled: Option<bool>,
    pub waveform: Option<LfoWaveform>,
    pub destination: Option<LfoDestination>,
    pub rate_hz: Option<f64>,
    pub amount: Option<f64>,
}

impl LfoUpdate {
    pub fn merge_into(&self, target: &mut LfoSettings) {
        merge_fields!(self => target; enabled, waveform, destination, rate_hz, amount);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MacroUpdate {
    pub model: Option<MacroModel>,
    pub harmonics: Option<f64>,
    pub timbre: Option<f64>,
    pub morph: Option<f64>,
    pub level: Option<f64>,
}

impl MacroUpdate {
    pub fn merge_into(&self, target: &mut MacroSettings) {
        merge_fields!(self => target; model, harmonics, timbre, morph, level);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerUpdate {
    pub id: Option<String>,
    pub name: Option<String>,
    pub audio: Option<SamplePayload>,
    pub root_midi: Option<u8>,
    #[serde(rename = "loop")]
    pub looped: Option<bool>,
    pub duration: Option<f64>,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
}

impl SamplerUpdate {
    pub fn merge_into(&self, target: &mut SamplerSettings) {
        merge_fields!(self => target; id, name, root_midi, looped, duration, trim_start, trim_end);
        if let Some(audio) = &self.audio {
            target.audio = Some(audio.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArpUpdate {
    pub enabled: Option<bool>,
    pub latch: Option<bool>,
    pub mode: Option<ArpMode>,
    pub octaves: Option<u8>,
    pub chord_source: Option<ChordSource>,
    pub chord: Option<ChordPreset>,
    pub division: Option<Division>,
    pub bpm: Option<f64>,
    pub bpm_sync: Option<bool>,
    pub rate_hz: Option<f64>,
    pub gate: Option<f64>,
    pub swing: Option<f64>,
    pub repeats: Option<u8>,
    pub pattern_len: Option<usize>,
}

impl ArpUpdate {
    pub fn merge_into(&self, target: &mut ArpSettings) {
        merge_fields!(self => target;
            enabled, latch, mode, octaves, chord_source, chord, division,
            bpm, bpm_sync, rate_hz, gate, swing, repeats, pattern_len,
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencerUpdate {
    pub length: Option<usize>,
    /// Replaces the whole step list when present.
    pub steps: Option<Vec<SeqStep>>,
}

impl SequencerUpdate {
    pub fn merge_into(&self, target: &mut SequencerSettings) {
        merge_fields!(self => target; length, steps);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectsUpdate {
    pub delay: Option<DelayUpdate>,
    pub reverb: Option<ReverbUpdate>,
}

impl EffectsUpdate {
    pub fn merge_into(&self, target: &mut EffectsSettings) {
        merge_sections!(self => target; delay, reverb);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelayUpdate {
    pub enabled: Option<bool>,
    pub time: Option<f64>,
    pub feedback: Option<f64>,
    pub mix: Option<f64>,
}

impl DelayUpdate {
    pub fn merge_into(&self, target: &mut DelaySettings) {
        merge_fields!(self => target; enabled, time, feedback, mix);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbUpdate {
    pub enabled: Option<bool>,
    pub room_size: Option<f64>,
    pub damping: Option<f64>,
    pub mix: Option<f64>,
}

impl ReverbUpdate {
    pub fn merge_into(&self, target: &mut ReverbSettings) {
        merge_fields!(self => target; enabled, room_size, damping, mix);
    }
}
