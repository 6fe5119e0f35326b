//! Anti-aliased analog-style oscillators using PolyBLEP.

use std::f64::consts::PI;

use crate::patch::Waveform;

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
///
/// The caller sets `frequency` (already including octave and detune) before
/// each sample, so pitch modulation and FM are applied sample-accurately
/// without the oscillator knowing about them.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    /// Duty cycle of the pulse wave, (0, 1).
    pub pulse_width: f64,
    phase: f64,
    sample_rate: f64,
    rng: fastrand::Rng,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            pulse_width: 0.5,
            phase: 0.0,
            sample_rate,
            rng: fastrand::Rng::new(),
        }
    }

    /// Reseed the noise source, for reproducible renders.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        (self.frequency / self.sample_rate).clamp(0.0, 0.5)
    }

    /// An unknown waveform renders silence instead of failing.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match &self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => saw(self.phase, inc),
            Waveform::Square => pulse(self.phase, inc, 0.5),
            Waveform::Pulse => pulse(self.phase, inc, self.pulse_width.clamp(0.05, 0.95)),
            Waveform::Triangle => triangle(self.phase),
            Waveform::Noise => self.rng.f64() * 2.0 - 1.0,
            Waveform::Unknown(_) => 0.0,
        };

        self.phase = (self.phase + inc).fract();
        sample
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Frequency of an analog oscillator relative to the note frequency.
///
/// `note_freq · 2^octave · 2^(detune/1200) · 2^(fine·detune/120000)`
pub fn analog_frequency(note_freq: f64, octave: i32, detune_cents: f64, fine: f64) -> f64 {
    note_freq
        * 2.0_f64.powi(octave)
        * 2.0_f64.powf(detune_cents / 1200.0)
        * 2.0_f64.powf(fine * detune_cents / 120_000.0)
}

/// Frequency ratio for an offset in cents.
#[inline]
pub fn cents_to_ratio(cents: f64) -> f64 {
    2.0_f64.powf(cents / 1200.0)
}

/// Band-limited sawtooth rising from -1 to +1.
#[inline]
pub(crate) fn saw(phase: f64, inc: f64) -> f64 {
    2.0 * phase - 1.0 - poly_blep(phase, inc)
}

/// Band-limited pulse with duty cycle `width`.
#[inline]
pub(crate) fn pulse(phase: f64, inc: f64, width: f64) -> f64 {
    let mut value = if phase < width { 1.0 } else { -1.0 };
    value += poly_blep(phase, inc);
    value -= poly_blep((phase + 1.0 - width) % 1.0, inc);
    value
}

/// Piecewise-linear triangle: -1→+1 over [0, 0.5), +1→-1 over [0.5, 1).
#[inline]
pub(crate) fn triangle(phase: f64) -> f64 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

/// Residual that rounds off a unit step sitting at phase 0, spread over
/// one sample on either side of the wrap.
pub(crate) fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let x = t / dt;
        x + x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + x + x + 1.0
    } else {
        0.0
    }
}
