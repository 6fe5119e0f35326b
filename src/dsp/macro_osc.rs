//! Macro oscillator: nine synthesis algorithms behind three knobs.
//!
//! Each model reads the same normalized controls (`harmonics`, `timbre`,
//! `morph`, all 0..=1) plus an output `level`, and renders one sample per
//! call from the note frequency and its own phase state. Switching models
//! only resets the oscillator's internal state; the surrounding voice (filter,
//! envelope) keeps running.

use std::f64::consts::{FRAC_PI_2, TAU};

use super::oscillator::{poly_blep, pulse, saw, triangle};
use crate::patch::{MacroModel, MacroSettings};

/// Detune pattern for the seven supersaw voices, in units of the spread.
const SUPERSAW_OFFSETS: [f64; 7] = [-1.0, -0.63, -0.29, 0.0, 0.29, 0.63, 1.0];
/// Frequency ratios selectable by `harmonics` in the two-operator model.
const FM_RATIOS: [f64; 10] = [0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
/// Chord shapes selectable by `harmonics` in the chord model.
const CHORD_SHAPES: [&[f64]; 7] = [
    &[0.0, 7.0, 12.0],
    &[0.0, 4.0, 7.0],
    &[0.0, 3.0, 7.0],
    &[0.0, 5.0, 7.0],
    &[0.0, 4.0, 7.0, 11.0],
    &[0.0, 3.0, 7.0, 10.0],
    &[0.0, 4.0, 7.0, 14.0],
];
const MAX_PARTIALS: usize = 32;
/// Lowest pitch the pluck delay line is sized for.
const PLUCK_MIN_FREQ: f64 = 20.0;

/// The three macro controls plus output level, sampled once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacroParams {
    pub harmonics: f64,
    pub timbre: f64,
    pub morph: f64,
    pub level: f64,
}

impl From<&MacroSettings> for MacroParams {
    fn from(s: &MacroSettings) -> Self {
        MacroParams {
            harmonics: s.harmonics,
            timbre: s.timbre,
            morph: s.morph,
            level: s.level,
        }
    }
}

/// A single oscillator whose timbre is steered by the macro controls.
#[derive(Debug, Clone)]
pub struct MacroOscillator {
    model: MacroModel,
    sample_rate: f64,
    phase: f64,
    /// Extra phase accumulators for multi-voice models.
    phases: [f64; 7],
    /// Modulator / internal LFO phase.
    aux_phase: f64,
    /// Previous modulator output, for fm2op feedback.
    feedback: f64,
    /// One-pole lowpass state shared by models that darken their output.
    tone: f64,
    pluck: PluckString,
    rng: fastrand::Rng,
}

impl MacroOscillator {
    pub fn new(model: MacroModel, sample_rate: f64) -> Self {
        MacroOscillator {
            model,
            sample_rate,
            phase: 0.0,
            phases: [0.0; 7],
            aux_phase: 0.0,
            feedback: 0.0,
            tone: 0.0,
            pluck: PluckString::new(sample_rate),
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn model(&self) -> &MacroModel {
        &self.model
    }

    /// Swap the algorithm. Resets model state only when the model changes.
    pub fn set_model(&mut self, model: MacroModel) {
        if model == self.model {
            return;
        }
        self.model = model;
        self.feedback = 0.0;
        self.tone = 0.0;
        self.pluck.clear();
        // Spread the supersaw phases so the voices don't start in unison.
        for (i, p) in self.phases.iter_mut().enumerate() {
            *p = i as f64 / 7.0;
        }
    }

    /// Note start. Excites the pluck model; other models keep their phase.
    pub fn trigger(&mut self, frequency: f64, params: &MacroParams) {
        if self.model == MacroModel::Pluck {
            self.pluck.excite(frequency, params.timbre, &mut self.rng);
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.aux_phase = 0.0;
        self.feedback = 0.0;
        self.tone = 0.0;
        for (i, p) in self.phases.iter_mut().enumerate() {
            *p = i as f64 / 7.0;
        }
        self.pluck.clear();
    }

    /// Render one sample at `frequency`.
    ///
    /// An unknown model renders silence.
    pub fn next_sample(&mut self, frequency: f64, p: &MacroParams) -> f64 {
        let inc = (frequency / self.sample_rate).clamp(0.0, 0.5);
        let out = match self.model {
            MacroModel::Va => self.render_va(inc, p),
            MacroModel::Fold => self.render_fold(p),
            MacroModel::Pluck => self.pluck.next_sample(p.harmonics, p.morph),
            MacroModel::Supersaw => self.render_supersaw(inc, p),
            MacroModel::Pwm => self.render_pwm(inc, p),
            MacroModel::Fm2op => self.render_fm2op(frequency, p),
            MacroModel::Wavetable => self.render_wavetable(inc, p),
            MacroModel::Harmonic => self.render_harmonic(inc, p),
            MacroModel::Chord => self.render_chord(frequency, p),
            MacroModel::Unknown(_) => 0.0,
        };
        self.phase = wrap(self.phase + inc);
        out * p.level
    }

    /// Saw morphing into a pulse (narrowed by timbre), with a detuned
    /// partner saw faded in by harmonics.
    fn render_va(&mut self, inc: f64, p: &MacroParams) -> f64 {
        let width = 0.5 - 0.45 * p.timbre;
        let base = lerp(saw(self.phase, inc), pulse(self.phase, inc, width), p.morph);
        let partner_inc = inc * (1.0 + 0.02 * p.harmonics);
        let partner = saw(self.phases[0], partner_inc);
        self.phases[0] = wrap(self.phases[0] + partner_inc);
        base * (1.0 - 0.5 * p.harmonics) + partner * 0.5 * p.harmonics
    }

    /// Sine/triangle source driven into a sine wavefolder.
    fn render_fold(&mut self, p: &MacroParams) -> f64 {
        let source = lerp((TAU * self.phase).sin(), triangle(self.phase), p.morph);
        let drive = 1.0 + 7.0 * p.harmonics;
        let bias = (p.timbre - 0.5) * 0.8;
        (FRAC_PI_2 * (source * drive + bias)).sin()
    }

    /// Seven saws spread by harmonics; timbre raises the side voices, morph
    /// opens a gentle lowpass.
    fn render_supersaw(&mut self, inc: f64, p: &MacroParams) -> f64 {
        let spread = 0.06 * p.harmonics;
        let side = p.timbre;
        let mut sum = 0.0;
        for (i, offset) in SUPERSAW_OFFSETS.iter().enumerate() {
            let voice_inc = (inc * (1.0 + offset * spread)).min(0.5);
            let gain = if i == 3 { 1.0 - 0.5 * side } else { side };
            sum += saw(self.phases[i], voice_inc) * gain;
            self.phases[i] = wrap(self.phases[i] + voice_inc);
        }
        let norm = (1.0 - 0.5 * side) + 6.0 * side;
        let raw = sum / norm.max(1.0);
        let coeff = 0.05 + 0.95 * p.morph;
        self.tone += (raw - self.tone) * coeff;
        self.tone
    }

    /// Pulse whose width (set by timbre) is swept by an internal LFO whose
    /// rate follows morph and depth follows harmonics.
    fn render_pwm(&mut self, inc: f64, p: &MacroParams) -> f64 {
        let lfo_rate = 0.1 + 8.0 * p.morph;
        self.aux_phase = wrap(self.aux_phase + lfo_rate / self.sample_rate);
        let width = (0.05 + 0.9 * p.timbre + 0.4 * p.harmonics * (TAU * self.aux_phase).sin())
            .clamp(0.05, 0.95);
        pulse(self.phase, inc, width)
    }

    /// Two sine operators: modulator ratio from harmonics, index from
    /// timbre, modulator self-feedback from morph.
    fn render_fm2op(&mut self, frequency: f64, p: &MacroParams) -> f64 {
        let ratio = FM_RATIOS[quantize(p.harmonics, FM_RATIOS.len())];
        let modulator = (TAU * self.aux_phase + 1.5 * p.morph * self.feedback).sin();
        self.feedback = modulator;
        self.aux_phase = wrap(self.aux_phase + frequency * ratio / self.sample_rate);
        let index = 6.0 * p.timbre;
        (TAU * self.phase + index * modulator).sin()
    }

    /// Scan sine → triangle → saw → square with morph. Timbre bends the
    /// phase, harmonics blends in the same table an octave up.
    fn render_wavetable(&mut self, inc: f64, p: &MacroParams) -> f64 {
        let warped = self.phase.powf(1.0 + 3.0 * p.timbre);
        let upper = wrap(warped * 2.0);
        let read = |phase: f64| -> f64 {
            let position = p.morph * 3.0;
            let index = (position.floor() as usize).min(2);
            let frac = position - index as f64;
            lerp(table(index, phase, inc), table(index + 1, phase, inc), frac)
        };
        lerp(read(warped), read(upper), 0.5 * p.harmonics)
    }

    /// Additive partials: harmonics sets the count, morph the rolloff,
    /// timbre the odd/even balance.
    fn render_harmonic(&mut self, inc: f64, p: &MacroParams) -> f64 {
        let count = 1 + (p.harmonics * (MAX_PARTIALS - 1) as f64).round() as usize;
        let rolloff = 0.5 + 1.5 * p.morph;
        let odd_weight = (p.timbre * 2.0).min(1.0);
        let even_weight = ((1.0 - p.timbre) * 2.0).min(1.0);
        let mut sum = 0.0;
        let mut norm = 0.0;
        for k in 1..=count {
            if inc * k as f64 >= 0.5 {
                break;
            }
            let weight = if k == 1 {
                1.0
            } else if k % 2 == 1 {
                odd_weight
            } else {
                even_weight
            };
            let amp = weight / (k as f64).powf(rolloff);
            sum += amp * (TAU * wrap(self.phase * k as f64)).sin();
            norm += amp;
        }
        if norm > 0.0 { sum / norm } else { 0.0 }
    }

    /// A chord shape chosen by harmonics. Timbre lifts upper notes by an
    /// octave to open the voicing, morph blends sine into saw.
    fn render_chord(&mut self, frequency: f64, p: &MacroParams) -> f64 {
        let shape = CHORD_SHAPES[quantize(p.harmonics, CHORD_SHAPES.len())];
        let notes = shape.len();
        let mut sum = 0.0;
        for (i, semis) in shape.iter().enumerate() {
            let lift = if i > 0 && p.timbre > i as f64 / notes as f64 { 12.0 } else { 0.0 };
            let f = frequency * 2.0_f64.powf((semis + lift) / 12.0);
            let inc = (f / self.sample_rate).min(0.5);
            let phase = self.phases[i];
            sum += lerp((TAU * phase).sin(), saw(phase, inc), p.morph);
            self.phases[i] = wrap(phase + inc);
        }
        sum / notes as f64
    }
}

/// Karplus-Strong string: a noise burst circulating through a damped,
/// fractionally tuned delay loop.
#[derive(Debug, Clone)]
struct PluckString {
    line: Vec<f64>,
    len: usize,
    pos: usize,
    /// First-order allpass for the fractional part of the period.
    allpass_coeff: f64,
    allpass_x1: f64,
    allpass_y1: f64,
    sample_rate: f64,
}

impl PluckString {
    fn new(sample_rate: f64) -> Self {
        let capacity = (sample_rate / PLUCK_MIN_FREQ).ceil() as usize + 2;
        PluckString {
            line: vec![0.0; capacity],
            len: 2,
            pos: 0,
            allpass_coeff: 0.0,
            allpass_x1: 0.0,
            allpass_y1: 0.0,
            sample_rate,
        }
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.allpass_x1 = 0.0;
        self.allpass_y1 = 0.0;
    }

    /// Load the loop with a burst whose brightness follows `timbre`.
    fn excite(&mut self, frequency: f64, timbre: f64, rng: &mut fastrand::Rng) {
        let period = (self.sample_rate / frequency.max(PLUCK_MIN_FREQ)).max(2.0);
        let whole = (period.floor() as usize).clamp(2, self.line.len() - 1);
        // Half a sample is lost in the averaging filter.
        let frac = (period - whole as f64 - 0.5).clamp(0.0, 0.999);
        self.len = whole;
        self.allpass_coeff = (1.0 - frac) / (1.0 + frac);
        self.allpass_x1 = 0.0;
        self.allpass_y1 = 0.0;
        self.pos = 0;

        let brightness = 0.1 + 0.9 * timbre;
        let mut smoothed = 0.0;
        for slot in self.line[..self.len].iter_mut() {
            let noise = rng.f64() * 2.0 - 1.0;
            smoothed += (noise - smoothed) * brightness;
            *slot = smoothed;
        }
    }

    /// `damping` (harmonics) darkens the loop, `decay` (morph) lengthens it.
    fn next_sample(&mut self, damping: f64, decay: f64) -> f64 {
        let out = self.line[self.pos];
        let next = self.line[(self.pos + 1) % self.len];
        let averaged = lerp(out, 0.5 * (out + next), 0.3 + 0.7 * damping);
        let tuned = self.allpass_coeff * averaged + self.allpass_x1
            - self.allpass_coeff * self.allpass_y1;
        self.allpass_x1 = averaged;
        self.allpass_y1 = tuned;
        let feedback = 0.95 + 0.0499 * decay;
        self.line[self.pos] = tuned * feedback;
        self.pos = (self.pos + 1) % self.len;
        out
    }
}

/// Single-cycle tables used by the wavetable model, in scan order.
fn table(index: usize, phase: f64, inc: f64) -> f64 {
    match index {
        0 => (TAU * phase).sin(),
        1 => triangle(phase),
        2 => saw(phase, inc),
        _ => {
            let mut v = if phase < 0.5 { 1.0 } else { -1.0 };
            v += poly_blep(phase, inc);
            v -= poly_blep((phase + 0.5) % 1.0, inc);
            v
        }
    }
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[inline]
fn wrap(phase: f64) -> f64 {
    phase - phase.floor()
}

/// Map a 0..=1 control onto `n` discrete slots.
#[inline]
fn quantize(value: f64, n: usize) -> usize {
    ((value.clamp(0.0, 1.0) * (n - 1) as f64).round() as usize).min(n - 1)
}
