//! The patch schema: a complete, serializable instrument description.
//!
//! Every struct is `#[serde(default)]`, so a document that omits a section or
//! a field resolves to the documented default before the engine sees it.
//! `sanitize` clamps numeric fields into range; it is idempotent.

use serde::{Deserialize, Serialize};

use super::names::*;
use crate::error::EngineError;

/// Smallest trim window kept open once a sample has a non-zero duration.
pub const MIN_TRIM_SECS: f64 = 0.001;

// ── Patch (top-level) ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patch {
    /// Display name. Default: "Init".
    pub name: String,
    /// Default: classic.
    pub engine: EngineMode,
    pub osc1: OscillatorSettings,
    /// Default differs from `osc1`: detuned +7 cents at half level.
    pub osc2: OscillatorSettings,
    pub sub: SubOscSettings,
    pub fm: FmSettings,
    pub ring: RingModSettings,
    pub filter: FilterSettings,
    pub envelope: EnvelopeSettings,
    /// Default: vibrato routing (pitch, 5 Hz), disabled.
    pub lfo1: LfoSettings,
    /// Default: filter sweep routing (filter, 0.5 Hz), disabled.
    pub lfo2: LfoSettings,
    #[serde(rename = "macro")]
    pub macro_osc: MacroSettings,
    pub sampler: SamplerSettings,
    pub arp: ArpSettings,
    pub sequencer: SequencerSettings,
    /// Output gain before effects, 0..=1.5. Default 0.8.
    pub master_gain: f64,
    pub effects: EffectsSettings,
}

impl Default for Patch {
    fn default() -> Self {
        Patch {
            name: "Init".to_string(),
            engine: EngineMode::Classic,
            osc1: OscillatorSettings::default(),
            osc2: OscillatorSettings {
                detune: 7.0,
                level: 0.5,
                ..OscillatorSettings::default()
            },
            sub: SubOscSettings::default(),
            fm: FmSettings::default(),
            ring: RingModSettings::default(),
            filter: FilterSettings::default(),
            envelope: EnvelopeSettings::default(),
            lfo1: LfoSettings::default(),
            lfo2: LfoSettings {
                destination: LfoDestination::Filter,
                rate_hz: 0.5,
                ..LfoSettings::default()
            },
            macro_osc: MacroSettings::default(),
            sampler: SamplerSettings::default(),
            arp: ArpSettings::default(),
            sequencer: SequencerSettings::default(),
            master_gain: 0.8,
            effects: EffectsSettings::default(),
        }
    }
}

impl Patch {
    /// Parse a patch document and clamp it into range.
    pub fn from_json(json: &str) -> Result<Patch, EngineError> {
        let mut patch: Patch = serde_json::from_str(json)?;
        patch.sanitize();
        Ok(patch)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Clamp every numeric field into its documented range.
    pub fn sanitize(&mut self) {
        self.osc1.sanitize();
        self.osc2.sanitize();
        self.sub.sanitize();
        self.fm.sanitize();
        self.ring.sanitize();
        self.filter.sanitize();
        self.envelope.sanitize();
        self.lfo1.sanitize();
        self.lfo2.sanitize();
        self.macro_osc.sanitize();
        self.sampler.sanitize();
        self.arp.sanitize();
        self.sequencer.sanitize();
        self.master_gain = clamp_or(self.master_gain, 0.0, 1.5, 0.8);
        self.effects.sanitize();
    }
}

/// Clamp `value` into `[min, max]`, replacing NaN with `fallback`.
pub(crate) fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

// ── Oscillators ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OscillatorSettings {
    /// Source used in classic engine mode. Default: analog.
    pub mode: OscMode,
    /// Default: sawtooth.
    pub waveform: Waveform,
    /// Octave shift, -3..=3. Default 0.
    pub octave: i32,
    /// Detune in cents, -1200..=1200. Default 0.
    pub detune: f64,
    /// Fine scaling of the detune, -100..=100. Default 0.
    pub fine: f64,
    /// Mix level, 0..=1. Default 0.8.
    pub level: f64,
    /// Duty cycle for the pulse wave, 0.05..=0.95. Default 0.5.
    pub pulse_width: f64,
    /// Macro parameters when `mode` is macro.
    #[serde(rename = "macro")]
    pub macro_osc: MacroSettings,
}

impl Default for OscillatorSettings {
    fn default() -> Self {
        OscillatorSettings {
            mode: OscMode::Analog,
            waveform: Waveform::Sawtooth,
            octave: 0,
            detune: 0.0,
            fine: 0.0,
            level: 0.8,
            pulse_width: 0.5,
            macro_osc: MacroSettings::default(),
        }
    }
}

impl OscillatorSettings {
    pub fn sanitize(&mut self) {
        self.octave = self.octave.clamp(-3, 3);
        self.detune = clamp_or(self.detune, -1200.0, 1200.0, 0.0);
        self.fine = clamp_or(self.fine, -100.0, 100.0, 0.0);
        self.level = clamp_or(self.level, 0.0, 1.0, 0.8);
        self.pulse_width = clamp_or(self.pulse_width, 0.05, 0.95, 0.5);
        self.macro_osc.sanitize();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubOscSettings {
    /// Default: false.
    pub enabled: bool,
    /// Default: square.
    pub waveform: Waveform,
    /// Octaves below the note, -2..=-1. Default -1.
    pub octave: i32,
    /// 0..=1. Default 0.5.
    pub level: f64,
}

impl Default for SubOscSettings {
    fn default() -> Self {
        SubOscSettings {
            enabled: false,
            waveform: Waveform::Square,
            octave: -1,
            level: 0.5,
        }
    }
}

impl SubOscSettings {
    pub fn sanitize(&mut self) {
        self.octave = self.octave.clamp(-2, -1);
        self.level = clamp_or(self.level, 0.0, 1.0, 0.5);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FmSettings {
    /// Default: false.
    pub enabled: bool,
    /// Modulator frequency as a multiple of the carrier, 0.25..=16. Default 2.
    pub ratio: f64,
    /// Peak frequency deviation in Hz, 0..=2000. Default 100.
    pub amount: f64,
}

impl Default for FmSettings {
    fn default() -> Self {
        FmSettings {
            enabled: false,
            ratio: 2.0,
            amount: 100.0,
        }
    }
}

impl FmSettings {
    pub fn sanitize(&mut self) {
        self.ratio = clamp_or(self.ratio, 0.25, 16.0, 2.0);
        self.amount = clamp_or(self.amount, 0.0, 2000.0, 100.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RingModSettings {
    /// Default: false.
    pub enabled: bool,
    /// Crossfade from the plain mix to the ring product, 0..=1. Default 0.5.
    pub amount: f64,
}

impl Default for RingModSettings {
    fn default() -> Self {
        RingModSettings {
            enabled: false,
            amount: 0.5,
        }
    }
}

impl RingModSettings {
    pub fn sanitize(&mut self) {
        self.amount = clamp_or(self.amount, 0.0, 1.0, 0.5);
    }
}

// ── Filter / Envelope ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    /// Default: lowpass.
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    /// Hz, 20..=20000. Default 2000.
    pub cutoff: f64,
    /// Q, 0.1..=30. Default 1.
    pub resonance: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            filter_type: FilterType::Lowpass,
            cutoff: 2000.0,
            resonance: 1.0,
        }
    }
}

impl FilterSettings {
    pub fn sanitize(&mut self) {
        self.cutoff = clamp_or(self.cutoff, 20.0, 20_000.0, 2000.0);
        self.resonance = clamp_or(self.resonance, 0.1, 30.0, 1.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeSettings {
    /// Seconds, 0.001..=10. Default 0.01.
    pub attack: f64,
    /// Seconds, 0.001..=10. Default 0.2.
    pub decay: f64,
    /// Level, 0..=1. Default 0.7.
    pub sustain: f64,
    /// Seconds, 0.001..=10. Default 0.3.
    pub release: f64,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        EnvelopeSettings {
            attack: 0.01,
            decay: 0.2,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

impl EnvelopeSettings {
    pub fn sanitize(&mut self) {
        self.attack = clamp_or(self.attack, 0.001, 10.0, 0.01);
        self.decay = clamp_or(self.decay, 0.001, 10.0, 0.2);
        self.sustain = clamp_or(self.sustain, 0.0, 1.0, 0.7);
        self.release = clamp_or(self.release, 0.001, 10.0, 0.3);
    }
}

// ── Modulation ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LfoSettings {
    /// Default: false.
    pub enabled: bool,
    /// Default: sine.
    pub waveform: LfoWaveform,
    /// Default: pitch.
    pub destination: LfoDestination,
    /// Hz, 0.01..=50. Default 5.
    pub rate_hz: f64,
    /// Normalized depth, 0..=1. Default 0.2.
    pub amount: f64,
}

impl Default for LfoSettings {
    fn default() -> Self {
        LfoSettings {
            enabled: false,
            waveform: LfoWaveform::Sine,
            destination: LfoDestination::Pitch,
            rate_hz: 5.0,
            amount: 0.2,
        }
    }
}

impl LfoSettings {
    pub fn sanitize(&mut self) {
        self.rate_hz = clamp_or(self.rate_hz, 0.01, 50.0, 5.0);
        self.amount = clamp_or(self.amount, 0.0, 1.0, 0.2);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MacroSettings {
    /// Default: va.
    pub model: MacroModel,
    /// 0..=1. Default 0.5.
    pub harmonics: f64,
    /// 0..=1. Default 0.5.
    pub timbre: f64,
    /// 0..=1. Default 0.5.
    pub morph: f64,
    /// Output level, 0..=1. Default 0.8.
    pub level: f64,
}

impl Default for MacroSettings {
    fn default() -> Self {
        MacroSettings {
            model: MacroModel::Va,
            harmonics: 0.5,
            timbre: 0.5,
            morph: 0.5,
            level: 0.8,
        }
    }
}

impl MacroSettings {
    pub fn sanitize(&mut self) {
        self.harmonics = clamp_or(self.harmonics, 0.0, 1.0, 0.5);
        self.timbre = clamp_or(self.timbre, 0.0, 1.0, 0.5);
        self.morph = clamp_or(self.morph, 0.0, 1.0, 0.5);
        self.level = clamp_or(self.level, 0.0, 1.0, 0.8);
    }
}

// ── Sampler ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerSettings {
    /// Sample-bank key. Default: empty (nothing loaded).
    pub id: String,
    /// Display name. Default: empty.
    pub name: String,
    /// Inline audio. When absent the buffer is looked up in the bank by `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<SamplePayload>,
    /// MIDI note the sample plays back unshifted at. Default 60.
    pub root_midi: u8,
    /// Loop the trim window while the note is held. Default: false.
    #[serde(rename = "loop")]
    pub looped: bool,
    /// Seconds. Default 0.
    pub duration: f64,
    /// Seconds, `0 <= trim_start < trim_end <= duration`. Default 0.
    pub trim_start: f64,
    /// Seconds. Default 0.
    pub trim_end: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings {
            id: String::new(),
            name: String::new(),
            audio: None,
            root_midi: 60,
            looped: false,
            duration: 0.0,
            trim_start: 0.0,
            trim_end: 0.0,
        }
    }
}

/// Audio data carried inside a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SamplePayload {
    /// Mono little-endian PCM, base64 encoded.
    InlinePcm {
        data: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        #[serde(rename = "bitsPerSample", default = "default_bits_per_sample")]
        bits_per_sample: u8,
    },
}

fn default_bits_per_sample() -> u8 {
    16
}

impl SamplerSettings {
    pub fn sanitize(&mut self) {
        self.root_midi = self.root_midi.min(127);
        self.duration = clamp_or(self.duration, 0.0, f64::MAX, 0.0);
        let (start, end) = (self.trim_start, self.trim_end);
        self.set_trim(start, end);
    }

    /// True when a non-degenerate trim window exists.
    pub fn has_audio_window(&self) -> bool {
        self.duration > 0.0 && self.trim_end > self.trim_start
    }

    /// Set both trim points, keeping `0 <= start < end <= duration`.
    ///
    /// A zero duration collapses the window to `[0, 0)`.
    pub fn set_trim(&mut self, start: f64, end: f64) {
        if self.duration <= 0.0 {
            self.trim_start = 0.0;
            self.trim_end = 0.0;
            return;
        }
        let gap = MIN_TRIM_SECS.min(self.duration);
        let end = if end.is_nan() || end <= 0.0 { self.duration } else { end };
        let end = end.clamp(gap, self.duration);
        let start = clamp_or(start, 0.0, end - gap, 0.0);
        self.trim_start = start;
        self.trim_end = end;
    }

    /// Move the start handle. Dragging past the end stops just short of it.
    pub fn set_trim_start(&mut self, start: f64) {
        self.set_trim(self.trim_start, self.trim_end);
        if self.duration <= 0.0 {
            return;
        }
        let gap = MIN_TRIM_SECS.min(self.duration);
        self.trim_start = clamp_or(start, 0.0, self.trim_end - gap, 0.0);
    }

    /// Move the end handle. Dragging before the start stops just after it.
    pub fn set_trim_end(&mut self, end: f64) {
        self.set_trim(self.trim_start, self.trim_end);
        if self.duration <= 0.0 {
            return;
        }
        let gap = MIN_TRIM_SECS.min(self.duration);
        self.trim_end = clamp_or(end, self.trim_start + gap, self.duration, self.duration);
    }
}

// ── Arpeggiator / Sequencer ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArpSettings {
    /// Default: false.
    pub enabled: bool,
    /// Keep the held-note set after all keys are released. Default: false.
    pub latch: bool,
    /// Default: up.
    pub mode: ArpMode,
    /// Octave layers, 1..=4. Default 1.
    pub octaves: u8,
    /// Default: preset.
    pub chord_source: ChordSource,
    /// Interval set used with the preset chord source. Default: none.
    pub chord: ChordPreset,
    /// Default: 1/16.
    pub division: Division,
    /// Tempo used when no shared transport is attached, 20..=300. Default 120.
    pub bpm: f64,
    /// Derive step length from tempo and division. Default: true.
    pub bpm_sync: bool,
    /// Free-running step rate when not tempo-synced, 0.1..=50 Hz. Default 8.
    pub rate_hz: f64,
    /// Fraction of a step a note stays held, 0.05..=1. Default 0.5.
    pub gate: f64,
    /// Percentage of a step that every other step is delayed by, 0..=75.
    /// Only applied when `bpm_sync` is on; the stored value is kept either way.
    pub swing: f64,
    /// Retriggers per step, 1..=8. Default 1.
    pub repeats: u8,
    /// Explicit cycle length, 0..=64. 0 derives it from the held notes.
    pub pattern_len: usize,
}

impl Default for ArpSettings {
    fn default() -> Self {
        ArpSettings {
            enabled: false,
            latch: false,
            mode: ArpMode::Up,
            octaves: 1,
            chord_source: ChordSource::Preset,
            chord: ChordPreset::None,
            division: Division::Sixteenth,
            bpm: 120.0,
            bpm_sync: true,
            rate_hz: 8.0,
            gate: 0.5,
            swing: 0.0,
            repeats: 1,
            pattern_len: 0,
        }
    }
}

impl ArpSettings {
    pub fn sanitize(&mut self) {
        self.octaves = self.octaves.clamp(1, 4);
        self.bpm = clamp_or(self.bpm, 20.0, 300.0, 120.0);
        self.rate_hz = clamp_or(self.rate_hz, 0.1, 50.0, 8.0);
        self.gate = clamp_or(self.gate, 0.05, 1.0, 0.5);
        self.swing = clamp_or(self.swing, 0.0, 75.0, 0.0);
        self.repeats = self.repeats.clamp(1, 8);
        self.pattern_len = self.pattern_len.min(64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeqStep {
    /// Default: false (rest).
    pub on: bool,
    /// Semitones relative to the sounding root, -24..=24. Default 0.
    pub offset: i32,
}

impl Default for SeqStep {
    fn default() -> Self {
        SeqStep { on: false, offset: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencerSettings {
    /// Active step count, 1..=64. Default 8.
    pub length: usize,
    /// Steps beyond `length` are kept but inactive. Default: 8 ON steps at offset 0.
    pub steps: Vec<SeqStep>,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        SequencerSettings {
            length: 8,
            steps: vec![SeqStep { on: true, offset: 0 }; 8],
        }
    }
}

impl SequencerSettings {
    pub fn sanitize(&mut self) {
        self.length = self.length.clamp(1, 64);
        if self.steps.len() < self.length {
            self.steps.resize(self.length, SeqStep::default());
        }
        for step in &mut self.steps {
            step.offset = step.offset.clamp(-24, 24);
        }
    }
}

// ── Effects ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectsSettings {
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
}

impl EffectsSettings {
    pub fn sanitize(&mut self) {
        self.delay.sanitize();
        self.reverb.sanitize();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelaySettings {
    /// Default: false.
    pub enabled: bool,
    /// Seconds, 0.01..=2. Default 0.25.
    pub time: f64,
    /// 0..=0.95. Default 0.3.
    pub feedback: f64,
    /// Dry/wet, 0..=1. Default 0.2.
    pub mix: f64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        DelaySettings {
            enabled: false,
            time: 0.25,
            feedback: 0.3,
            mix: 0.2,
        }
    }
}

impl DelaySettings {
    pub fn sanitize(&mut self) {
        self.time = clamp_or(self.time, 0.01, 2.0, 0.25);
        self.feedback = clamp_or(self.feedback, 0.0, 0.95, 0.3);
        self.mix = clamp_or(self.mix, 0.0, 1.0, 0.2);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbSettings {
    /// Default: false.
    pub enabled: bool,
    /// 0..=1. Default 0.5.
    pub room_size: f64,
    /// 0..=1. Default 0.5.
    pub damping: f64,
    /// Dry/wet, 0..=1. Default 0.2.
    pub mix: f64,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        ReverbSettings {
            enabled: false,
            room_size: 0.5,
            damping: 0.5,
            mix: 0.2,
        }
    }
}

impl ReverbSettings {
    pub fn sanitize(&mut self) {
        self.room_size = clamp_or(self.room_size, 0.0, 1.0, 0.5);
        self.damping = clamp_or(self.damping, 0.0, 1.0, 0.5);
        self.mix = clamp_or(self.mix, 0.0, 1.0, 0.2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default_patch() {
        let patch = Patch::from_json("{}").unwrap();
        assert_eq!(patch, Patch::default());
        assert_eq!(patch.osc2.detune, 7.0);
        assert_eq!(patch.lfo2.destination, LfoDestination::Filter);
    }

    #[test]
    fn missing_fields_inside_a_section_use_section_defaults() {
        let patch = Patch::from_json(r#"{"filter": {"cutoff": 500}}"#).unwrap();
        assert_eq!(patch.filter.cutoff, 500.0);
        assert_eq!(patch.filter.resonance, 1.0);
        assert_eq!(patch.filter.filter_type, FilterType::Lowpass);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut patch = Patch::default();
        patch.name = "Acid".to_string();
        patch.engine = EngineMode::Macro;
        patch.macro_osc.model = MacroModel::Unknown("granular".to_string());
        patch.filter.cutoff = 312.5;
        patch.arp.mode = ArpMode::Sequence;
        patch.arp.swing = 33.3;
        patch.sequencer.steps[1] = SeqStep { on: false, offset: -5 };
        patch.sampler.duration = 2.0;
        patch.sampler.set_trim(0.25, 1.5);

        let json = patch.to_json().unwrap();
        let back = Patch::from_json(&json).unwrap();
        assert_eq!(back, patch);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut patch = Patch::from_json(
            r#"{"filter": {"cutoff": 99999, "resonance": -3},
                "arp": {"octaves": 9, "swing": 120, "repeats": 0},
                "sequencer": {"length": 0, "steps": [{"on": true, "offset": 99}]},
                "sampler": {"duration": 1.0, "trimStart": 0.9, "trimEnd": 0.2}}"#,
        )
        .unwrap();
        let once = patch.clone();
        patch.sanitize();
        assert_eq!(patch, once);
        assert_eq!(once.filter.cutoff, 20_000.0);
        assert_eq!(once.arp.octaves, 4);
        assert_eq!(once.arp.swing, 75.0);
        assert_eq!(once.sequencer.length, 1);
        assert_eq!(once.sequencer.steps[0].offset, 24);
    }

    #[test]
    fn trim_window_never_inverts() {
        let mut s = SamplerSettings {
            duration: 2.0,
            ..Default::default()
        };
        s.set_trim(0.0, 2.0);
        s.set_trim_start(5.0);
        assert!(0.0 <= s.trim_start && s.trim_start < s.trim_end && s.trim_end <= 2.0);
        s.set_trim_end(-1.0);
        assert!(0.0 <= s.trim_start && s.trim_start < s.trim_end && s.trim_end <= 2.0);
        s.set_trim(1.5, 0.5);
        assert!(s.trim_start < s.trim_end, "{} < {}", s.trim_start, s.trim_end);
    }

    #[test]
    fn trim_window_drag_sweep_holds_invariant() {
        let mut s = SamplerSettings {
            duration: 0.5,
            ..Default::default()
        };
        s.set_trim(0.0, 0.5);
        for i in -20..40 {
            let t = i as f64 * 0.05;
            s.set_trim_start(t);
            assert!(0.0 <= s.trim_start && s.trim_start < s.trim_end && s.trim_end <= 0.5);
            s.set_trim_end(0.5 - t);
            assert!(0.0 <= s.trim_start && s.trim_start < s.trim_end && s.trim_end <= 0.5);
        }
    }

    #[test]
    fn zero_duration_collapses_window() {
        let mut s = SamplerSettings::default();
        s.set_trim(0.3, 0.8);
        assert_eq!((s.trim_start, s.trim_end), (0.0, 0.0));
        assert!(!s.has_audio_window());
    }

    #[test]
    fn sequencer_pads_short_step_lists() {
        let mut seq = SequencerSettings {
            length: 4,
            steps: vec![SeqStep { on: true, offset: 0 }],
        };
        seq.sanitize();
        assert_eq!(seq.steps.len(), 4);
        assert!(!seq.steps[3].on);
    }

    #[test]
    fn inline_pcm_payload_parses() {
        let patch = Patch::from_json(
            r#"{"sampler": {"id": "kick", "audio": {"type": "inline-pcm", "data": "AAA=", "sampleRate": 44100}}}"#,
        )
        .unwrap();
        assert_eq!(
            patch.sampler.audio,
            Some(SamplePayload::InlinePcm {
                data: "AAA=".to_string(),
                sample_rate: 44100,
                bits_per_sample: 16,
            })
        );
    }
}
