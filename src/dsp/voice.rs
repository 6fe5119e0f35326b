//! Voice: one sounding note, from raw oscillators to the VCA.
//!
//! Signal order inside a voice is fixed: raw oscillators, FM and ring
//! interaction, sub oscillator, filter, envelope-controlled VCA, then the
//! LFO amp multiplier. Continuous controls arrive every sample in a
//! [`VoiceFrame`]; discrete configuration lives in a shared
//! [`VoiceSettings`] and is swapped under a short fade.

use std::sync::Arc;

use super::envelope::{Envelope, EnvelopePhase};
use super::filter::BiquadFilter;
use super::macro_osc::{MacroOscillator, MacroParams};
use super::modulation::{ModFrame, SubOscillator, fm_frequency, ring_mix};
use super::oscillator::{Oscillator, analog_frequency, cents_to_ratio};
use super::sampler::{SampleBuffer, SamplePlayer, midi_to_freq};
use super::smoother::ParamSmoother;
use crate::patch::{
    EngineMode, EnvelopeSettings, FilterType, FmSettings, MacroSettings, OscMode,
    OscillatorSettings, Patch, RingModSettings, SamplerSettings, SubOscSettings,
};

/// Filter coefficients are recomputed this often, in samples.
const FILTER_UPDATE_INTERVAL: u32 = 16;
/// Fade time for swapping a sounding voice's source, in ms.
const SOURCE_FADE_MS: f64 = 3.0;
/// Source gain below which the swap happens.
const SOURCE_SWAP_THRESHOLD: f64 = 1e-3;

/// Discrete voice configuration derived from a patch.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub engine: EngineMode,
    pub osc1: OscillatorSettings,
    pub osc2: OscillatorSettings,
    pub macro_osc: MacroSettings,
    pub sub: SubOscSettings,
    pub fm: FmSettings,
    pub ring: RingModSettings,
    pub filter_type: FilterType,
    pub envelope: EnvelopeSettings,
    pub sampler: SamplerSettings,
    /// Buffer resolved for `sampler`, if any.
    pub sample: Option<Arc<SampleBuffer>>,
}

impl VoiceSettings {
    pub fn from_patch(patch: &Patch, sample: Option<Arc<SampleBuffer>>) -> Self {
        VoiceSettings {
            engine: patch.engine.clone(),
            osc1: patch.osc1.clone(),
            osc2: patch.osc2.clone(),
            macro_osc: patch.macro_osc.clone(),
            sub: patch.sub.clone(),
            fm: patch.fm.clone(),
            ring: patch.ring.clone(),
            filter_type: patch.filter.filter_type.clone(),
            envelope: patch.envelope.clone(),
            sampler: patch.sampler.clone(),
            sample,
        }
    }

    /// True when moving to `other` changes which nodes render audio, so the
    /// voice source has to be built again.
    ///
    /// Macro model and filter type changes are not rebuilds: the existing
    /// oscillator and filter take them in place.
    pub fn needs_rebuild(&self, other: &VoiceSettings) -> bool {
        let osc_changed =
            |a: &OscillatorSettings, b: &OscillatorSettings| a.mode != b.mode || a.waveform != b.waveform;
        let sample_changed = self.sampler.id != other.sampler.id
            || self.sampler.root_midi != other.sampler.root_midi
            || self.sampler.looped != other.sampler.looped
            || self.sampler.trim_start != other.sampler.trim_start
            || self.sampler.trim_end != other.sampler.trim_end
            || !same_buffer(&self.sample, &other.sample);

        self.engine != other.engine
            || osc_changed(&self.osc1, &other.osc1)
            || osc_changed(&self.osc2, &other.osc2)
            || self.sub.enabled != other.sub.enabled
            || self.sub.waveform != other.sub.waveform
            || (self.uses_sample() && sample_changed)
    }

    /// True when a sounding voice should fade out before taking `other`:
    /// a source rebuild, or a model or filter type switch that would click
    /// if made mid-waveform.
    pub fn needs_fade(&self, other: &VoiceSettings) -> bool {
        self.needs_rebuild(other)
            || self.filter_type != other.filter_type
            || self.macro_osc.model != other.macro_osc.model
            || self.osc1.macro_osc.model != other.osc1.macro_osc.model
            || self.osc2.macro_osc.model != other.osc2.macro_osc.model
    }

    fn uses_sample(&self) -> bool {
        match self.engine {
            EngineMode::Sampler => true,
            EngineMode::Classic => {
                self.osc1.mode == OscMode::Sample || self.osc2.mode == OscMode::Sample
            }
            _ => false,
        }
    }
}

fn same_buffer(a: &Option<Arc<SampleBuffer>>, b: &Option<Arc<SampleBuffer>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Continuous, engine-wide controls for one sample.
#[derive(Debug, Clone, Copy)]
pub struct VoiceFrame {
    pub mods: ModFrame,
    /// Semitones added to every voice's note.
    pub pitch_bend: f64,
    pub osc1_level: f64,
    pub osc2_level: f64,
    pub sub_level: f64,
    pub fm_amount: f64,
    pub ring_amount: f64,
    pub cutoff: f64,
    pub resonance: f64,
    pub osc1_macro: MacroParams,
    pub osc2_macro: MacroParams,
    pub engine_macro: MacroParams,
}

impl VoiceFrame {
    /// The unmodulated frame a patch describes.
    pub fn from_patch(patch: &Patch) -> Self {
        VoiceFrame {
            mods: ModFrame::default(),
            pitch_bend: 0.0,
            osc1_level: patch.osc1.level,
            osc2_level: patch.osc2.level,
            sub_level: patch.sub.level,
            fm_amount: patch.fm.amount,
            ring_amount: patch.ring.amount,
            cutoff: patch.filter.cutoff,
            resonance: patch.filter.resonance,
            osc1_macro: MacroParams::from(&patch.osc1.macro_osc),
            osc2_macro: MacroParams::from(&patch.osc2.macro_osc),
            engine_macro: MacroParams::from(&patch.macro_osc),
        }
    }
}

/// One oscillator position in classic mode.
#[derive(Debug, Clone)]
enum OscSlot {
    Analog(Oscillator),
    Macro(MacroOscillator),
    Sample(SamplePlayer),
    Silent,
}

impl OscSlot {
    fn build(osc: &OscillatorSettings, settings: &VoiceSettings, sample_rate: f64, seed: u64) -> Self {
        match osc.mode {
            OscMode::Analog => {
                let mut o = Oscillator::new(osc.waveform.clone(), sample_rate).with_seed(seed);
                o.pulse_width = osc.pulse_width;
                OscSlot::Analog(o)
            }
            OscMode::Macro => OscSlot::Macro(
                MacroOscillator::new(osc.macro_osc.model.clone(), sample_rate).with_seed(seed),
            ),
            OscMode::Sample => OscSlot::Sample(SamplePlayer::new(
                settings.sample.clone(),
                &settings.sampler,
                sample_rate,
            )),
            OscMode::Unknown(_) => OscSlot::Silent,
        }
    }

    fn trigger(&mut self, frequency: f64, params: &MacroParams) {
        match self {
            OscSlot::Analog(o) => o.reset(),
            OscSlot::Macro(m) => {
                m.reset();
                m.trigger(frequency, params);
            }
            OscSlot::Sample(s) => s.trigger(),
            OscSlot::Silent => {}
        }
    }

    fn update(&mut self, osc: &OscillatorSettings) {
        match self {
            OscSlot::Analog(o) => o.pulse_width = osc.pulse_width,
            OscSlot::Macro(m) => m.set_model(osc.macro_osc.model.clone()),
            OscSlot::Sample(_) | OscSlot::Silent => {}
        }
    }

    fn next_sample(&mut self, frequency: f64, params: &MacroParams) -> f64 {
        match self {
            OscSlot::Analog(o) => {
                o.frequency = frequency;
                o.next_sample()
            }
            OscSlot::Macro(m) => m.next_sample(frequency, params),
            OscSlot::Sample(s) => s.next_sample(frequency),
            OscSlot::Silent => 0.0,
        }
    }
}

/// The sound source a voice renders, by engine mode.
#[derive(Debug, Clone)]
enum VoiceSource {
    Classic { osc1: OscSlot, osc2: OscSlot },
    Macro(MacroOscillator),
    Sampler(SamplePlayer),
    Silent,
}

impl VoiceSource {
    fn build(settings: &VoiceSettings, sample_rate: f64, seed: u64) -> Self {
        match settings.engine {
            EngineMode::Classic => VoiceSource::Classic {
                osc1: OscSlot::build(&settings.osc1, settings, sample_rate, seed),
                osc2: OscSlot::build(&settings.osc2, settings, sample_rate, seed.wrapping_add(1)),
            },
            EngineMode::Macro => VoiceSource::Macro(
                MacroOscillator::new(settings.macro_osc.model.clone(), sample_rate).with_seed(seed),
            ),
            EngineMode::Sampler => VoiceSource::Sampler(SamplePlayer::new(
                settings.sample.clone(),
                &settings.sampler,
                sample_rate,
            )),
            EngineMode::Unknown(_) => VoiceSource::Silent,
        }
    }
}

/// A single note instance.
#[derive(Debug, Clone)]
pub struct Voice {
    note: u8,
    velocity: f64,
    /// Engine sample clock at the last note-on, for stealing order.
    started_at: u64,
    /// Samples spent releasing.
    release_samples: u64,
    settings: Arc<VoiceSettings>,
    pending: Option<Arc<VoiceSettings>>,
    source: VoiceSource,
    sub: SubOscillator,
    filter: BiquadFilter,
    filter_counter: u32,
    envelope: Envelope,
    source_gain: ParamSmoother,
    sample_rate: f64,
    seed: u64,
}

impl Voice {
    pub fn new(settings: Arc<VoiceSettings>, sample_rate: f64, seed: u64) -> Self {
        let mut envelope = Envelope::new(sample_rate);
        envelope.set_adsr(&settings.envelope);
        Voice {
            note: 0,
            velocity: 1.0,
            started_at: 0,
            release_samples: 0,
            source: VoiceSource::build(&settings, sample_rate, seed),
            sub: SubOscillator::new(&settings.sub, sample_rate),
            filter: BiquadFilter::new(settings.filter_type.clone(), sample_rate),
            filter_counter: 0,
            envelope,
            source_gain: ParamSmoother::new(1.0, SOURCE_FADE_MS, sample_rate),
            settings,
            pending: None,
            sample_rate,
            seed,
        }
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.envelope.phase()
    }

    pub fn is_released(&self) -> bool {
        self.envelope.phase() == EnvelopePhase::Releasing
    }

    /// Done sounding; the slot can be reclaimed.
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    pub fn release_elapsed(&self) -> u64 {
        self.release_samples
    }

    /// Start (or restart) a note. A voice that is still sounding continues
    /// from its current amplitude and oscillator phase.
    pub fn note_on(&mut self, note: u8, velocity: f64, now: u64, frame: &VoiceFrame) {
        let fresh = self.envelope.is_finished();
        self.note = note;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.started_at = now;
        self.release_samples = 0;

        if fresh {
            if let Some(next) = self.pending.take() {
                self.rebuild(next);
            }
            self.source_gain.set_immediate(1.0);
            self.filter.reset();
            self.filter_counter = 0;
            self.trigger_source(frame, true);
        } else {
            self.trigger_source(frame, false);
        }
        self.envelope.gate_on();
    }

    pub fn note_off(&mut self) {
        self.envelope.gate_off();
    }

    /// Silence at once. Only for teardown and stealing.
    pub fn kill(&mut self) {
        self.envelope.kill();
        self.pending = None;
    }

    /// Take new discrete settings. Idle voices switch immediately; a sounding
    /// voice fades its source out, swaps, and fades back in.
    pub fn apply(&mut self, settings: Arc<VoiceSettings>) {
        self.envelope.set_adsr(&settings.envelope);
        if !self.settings.needs_fade(&settings) {
            self.update_in_place(settings);
            self.pending = None;
            return;
        }
        if self.envelope.is_finished() {
            self.rebuild(settings);
        } else {
            self.pending = Some(settings);
            self.source_gain.set_target(0.0);
        }
    }

    /// Move to `settings`, building a new source only when the old one
    /// cannot render them. The filter keeps its memory; a fresh note-on
    /// clears it.
    fn rebuild(&mut self, settings: Arc<VoiceSettings>) {
        if self.settings.needs_rebuild(&settings) {
            self.source = VoiceSource::build(&settings, self.sample_rate, self.seed);
        }
        self.update_in_place(settings);
    }

    fn update_in_place(&mut self, settings: Arc<VoiceSettings>) {
        match &mut self.source {
            VoiceSource::Classic { osc1, osc2 } => {
                osc1.update(&settings.osc1);
                osc2.update(&settings.osc2);
            }
            VoiceSource::Macro(m) => m.set_model(settings.macro_osc.model.clone()),
            VoiceSource::Sampler(_) | VoiceSource::Silent => {}
        }
        self.sub.apply(&settings.sub);
        self.filter.set_type(settings.filter_type.clone());
        self.settings = settings;
    }

    fn trigger_source(&mut self, frame: &VoiceFrame, fresh: bool) {
        let freq = midi_to_freq(self.note as f64 + frame.pitch_bend);
        match &mut self.source {
            VoiceSource::Classic { osc1, osc2 } => {
                // Analog slots keep running through a retrigger.
                let restart = |slot: &OscSlot| fresh || !matches!(slot, OscSlot::Analog(_));
                if restart(&*osc1) {
                    osc1.trigger(freq, &frame.osc1_macro);
                }
                if restart(&*osc2) {
                    osc2.trigger(freq, &frame.osc2_macro);
                }
                if fresh {
                    self.sub.sync();
                }
            }
            VoiceSource::Macro(m) => {
                if fresh {
                    m.reset();
                    self.sub.sync();
                }
                m.trigger(freq, &frame.engine_macro);
            }
            VoiceSource::Sampler(s) => s.trigger(),
            VoiceSource::Silent => {}
        }
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self, frame: &VoiceFrame) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }

        let gain = self.source_gain.next();
        if gain < SOURCE_SWAP_THRESHOLD {
            if let Some(next) = self.pending.take() {
                self.rebuild(next);
                self.trigger_source(frame, true);
                self.source_gain.set_target(1.0);
            }
        }

        let settings = &self.settings;
        let note_freq =
            midi_to_freq(self.note as f64 + frame.pitch_bend) * cents_to_ratio(frame.mods.pitch_cents);

        let mut mix = match &mut self.source {
            VoiceSource::Classic { osc1, osc2 } => {
                let o1 = &settings.osc1;
                let o2 = &settings.osc2;
                let f1 = analog_frequency(note_freq, o1.octave, o1.detune, o1.fine);
                let f2 = if settings.fm.enabled {
                    f1 * settings.fm.ratio
                } else {
                    analog_frequency(note_freq, o2.octave, o2.detune, o2.fine)
                };
                let s2 = osc2.next_sample(f2, &frame.osc2_macro);
                let f1 = if settings.fm.enabled {
                    fm_frequency(f1, s2, frame.fm_amount)
                } else {
                    f1
                };
                let s1 = osc1.next_sample(f1, &frame.osc1_macro);
                let (a, b) = (s1 * frame.osc1_level, s2 * frame.osc2_level);
                if settings.ring.enabled {
                    ring_mix(a, b, frame.ring_amount)
                } else {
                    a + b
                }
            }
            VoiceSource::Macro(m) => m.next_sample(note_freq, &frame.engine_macro),
            VoiceSource::Sampler(s) => {
                let out = s.next_sample(note_freq);
                if s.is_finished() {
                    // One-shot ran out: nothing left to shape.
                    self.envelope.kill();
                }
                out
            }
            VoiceSource::Silent => 0.0,
        };

        if settings.sub.enabled
            && matches!(self.source, VoiceSource::Classic { .. } | VoiceSource::Macro(_))
        {
            mix += self.sub.next_sample(note_freq) * frame.sub_level;
        }

        if self.filter_counter == 0 {
            self.filter
                .set_params(frame.cutoff + frame.mods.cutoff_hz, frame.resonance);
        }
        self.filter_counter = (self.filter_counter + 1) % FILTER_UPDATE_INTERVAL;
        let filtered = self.filter.process(mix);

        let env = self.envelope.next_sample();
        if self.envelope.phase() == EnvelopePhase::Releasing {
            self.release_samples += 1;
        }

        filtered * env * self.velocity * gain * frame.mods.amp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{MacroModel, Waveform};

    const SR: f64 = 44100.0;

    fn patch() -> Patch {
        let mut p = Patch::default();
        p.envelope = EnvelopeSettings {
            attack: 0.001,
            decay: 0.001,
            sustain: 0.5,
            release: 0.01,
        };
        p.filter.cutoff = 20_000.0;
        p
    }

    fn voice_for(p: &Patch) -> (Voice, VoiceFrame) {
        let settings = Arc::new(VoiceSettings::from_patch(p, None));
        (Voice::new(settings, SR, 1), VoiceFrame::from_patch(p))
    }

    fn render(v: &mut Voice, frame: &VoiceFrame, n: usize) -> Vec<f64> {
        (0..n).map(|_| v.next_sample(frame)).collect()
    }

    fn peak(buf: &[f64]) -> f64 {
        buf.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
    }

    #[test]
    fn voice_produces_sound() {
        let (mut v, frame) = voice_for(&patch());
        v.note_on(69, 0.8, 0, &frame);
        assert!(peak(&render(&mut v, &frame, 4410)) > 0.01, "Voice should produce non-zero output");
    }

    #[test]
    fn voice_silent_after_release() {
        let (mut v, frame) = voice_for(&patch());
        v.note_on(69, 1.0, 0, &frame);
        render(&mut v, &frame, 500);
        v.note_off();
        assert!(v.is_released());
        render(&mut v, &frame, 2000);
        assert!(v.is_finished(), "Voice should be finished after release");
        assert_eq!(v.next_sample(&frame), 0.0);
    }

    #[test]
    fn every_engine_mode_sounds() {
        for engine in [EngineMode::Classic, EngineMode::Macro] {
            let mut p = patch();
            p.engine = engine.clone();
            let (mut v, frame) = voice_for(&p);
            v.note_on(57, 1.0, 0, &frame);
            assert!(peak(&render(&mut v, &frame, 4410)) > 0.01, "{engine} should sound");
        }
    }

    #[test]
    fn unknown_engine_is_silent() {
        let mut p = patch();
        p.engine = EngineMode::Unknown("granular".into());
        let (mut v, frame) = voice_for(&p);
        v.note_on(60, 1.0, 0, &frame);
        assert_eq!(peak(&render(&mut v, &frame, 1000)), 0.0);
    }

    #[test]
    fn sampler_without_buffer_is_silent() {
        let mut p = patch();
        p.engine = EngineMode::Sampler;
        let (mut v, frame) = voice_for(&p);
        v.note_on(60, 1.0, 0, &frame);
        assert_eq!(peak(&render(&mut v, &frame, 1000)), 0.0);
        assert!(v.is_finished(), "a sampler voice with nothing to play ends");
    }

    #[test]
    fn sampler_plays_buffer() {
        let mut p = patch();
        p.engine = EngineMode::Sampler;
        p.sampler.duration = 0.5;
        p.sampler.set_trim(0.0, 0.5);
        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 22050], 44100));
        let settings = Arc::new(VoiceSettings::from_patch(&p, Some(buffer)));
        let frame = VoiceFrame::from_patch(&p);
        let mut v = Voice::new(settings, SR, 1);
        v.note_on(60, 1.0, 0, &frame);
        assert!(peak(&render(&mut v, &frame, 4410)) > 0.1);
    }

    #[test]
    fn retrigger_is_continuous() {
        let mut p = patch();
        p.osc1.waveform = Waveform::Sine;
        p.osc2.waveform = Waveform::Sine;
        let (mut v, frame) = voice_for(&p);
        v.note_on(60, 1.0, 0, &frame);
        let before = render(&mut v, &frame, 3000);
        let last = *before.last().unwrap();
        v.note_on(60, 1.0, 3000, &frame);
        assert_eq!(v.phase(), EnvelopePhase::Attacking);
        let next = v.next_sample(&frame);
        assert!((next - last).abs() < 0.1, "retrigger jumped from {last} to {next}");
    }

    #[test]
    fn velocity_scales_output() {
        let (mut loud, frame) = voice_for(&patch());
        let (mut quiet, _) = voice_for(&patch());
        loud.note_on(60, 1.0, 0, &frame);
        quiet.note_on(60, 0.5, 0, &frame);
        let a = peak(&render(&mut loud, &frame, 2000));
        let b = peak(&render(&mut quiet, &frame, 2000));
        assert!((b - 0.5 * a).abs() < 1e-9);
    }

    #[test]
    fn waveform_swap_fades_instead_of_jumping() {
        let mut p = patch();
        p.osc1.waveform = Waveform::Sine;
        p.osc2.level = 0.0;
        let (mut v, frame) = voice_for(&p);
        v.note_on(60, 1.0, 0, &frame);
        render(&mut v, &frame, 2000);

        p.osc1.waveform = Waveform::Square;
        v.apply(Arc::new(VoiceSettings::from_patch(&p, None)));
        let out = render(&mut v, &frame, 4000);
        // The old sine fades out and the square enters from near silence.
        let max_step = out[..950].windows(2).map(|w| (w[1] - w[0]).abs()).fold(0.0, f64::max);
        assert!(max_step < 0.05, "swap should not click, max step {max_step}");
        assert!(peak(&out[3000..]) > 0.1, "new source should fade back in");
    }

    #[test]
    fn continuous_edit_does_not_rebuild() {
        let mut p = patch();
        let a = VoiceSettings::from_patch(&p, None);
        p.osc1.detune = 30.0;
        p.envelope.release = 2.0;
        p.macro_osc.model = MacroModel::Pluck;
        p.filter.filter_type = FilterType::Highpass;
        let b = VoiceSettings::from_patch(&p, None);
        assert!(!a.needs_rebuild(&b));
        assert!(a.needs_fade(&b), "model and filter switches still fade");
        p.osc1.waveform = Waveform::Triangle;
        assert!(a.needs_rebuild(&VoiceSettings::from_patch(&p, None)));
    }

    #[test]
    fn model_swap_keeps_source_and_filter_running() {
        let mut p = patch();
        p.engine = EngineMode::Macro;
        p.filter.cutoff = 800.0;
        p.filter.resonance = 4.0;
        let (mut v, frame) = voice_for(&p);
        v.note_on(48, 1.0, 0, &frame);
        render(&mut v, &frame, 2000);

        p.macro_osc.model = MacroModel::Supersaw;
        v.apply(Arc::new(VoiceSettings::from_patch(&p, None)));
        let before = v.clone();
        let next = v.pending.take().expect("a sounding voice fades before the swap");
        v.rebuild(next);
        match &v.source {
            VoiceSource::Macro(m) => assert_eq!(m.model(), &MacroModel::Supersaw),
            other => panic!("unexpected source {other:?}"),
        }
        // Same filter memory: both ring out identically on silence.
        let (mut a, mut b) = (before.filter.clone(), v.filter.clone());
        let ring_a: Vec<f64> = (0..8).map(|_| a.process(0.0)).collect();
        let ring_b: Vec<f64> = (0..8).map(|_| b.process(0.0)).collect();
        assert!(ring_a.iter().any(|s| s.abs() > 1e-6));
        assert_eq!(ring_a, ring_b);

        let out = render(&mut v, &frame, 4000);
        assert!(peak(&out[2000..]) > 0.01, "the new model sounds");
    }

    #[test]
    fn classic_macro_slot_swaps_model_in_place() {
        let mut p = patch();
        p.osc1.mode = OscMode::Macro;
        let settings = Arc::new(VoiceSettings::from_patch(&p, None));
        let mut v = Voice::new(settings, SR, 1);

        p.osc1.macro_osc.model = MacroModel::Fold;
        v.apply(Arc::new(VoiceSettings::from_patch(&p, None)));
        assert!(v.pending.is_none(), "an idle voice switches at once");
        match &v.source {
            VoiceSource::Classic { osc1: OscSlot::Macro(m), .. } => {
                assert_eq!(m.model(), &MacroModel::Fold)
            }
            other => panic!("unexpected source {other:?}"),
        }
        let frame = VoiceFrame::from_patch(&p);
        v.note_on(60, 1.0, 0, &frame);
        assert!(peak(&render(&mut v, &frame, 2000)) > 0.01);
    }

    #[test]
    fn release_elapsed_counts_only_release() {
        let mut p = patch();
        p.envelope.release = 1.0;
        let (mut v, frame) = voice_for(&p);
        v.note_on(60, 1.0, 0, &frame);
        render(&mut v, &frame, 100);
        assert_eq!(v.release_elapsed(), 0);
        v.note_off();
        render(&mut v, &frame, 100);
        assert_eq!(v.release_elapsed(), 100);
    }
}
