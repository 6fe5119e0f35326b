//! Modulation routing: the two LFOs, FM, ring modulation and the sub
//! oscillator.
//!
//! LFOs run once per engine and produce a [`ModFrame`] per sample that every
//! voice reads. FM, ring and sub are per-voice and live as small helpers the
//! voice calls in its fixed mix order.

use super::lfo::Lfo;
use super::oscillator::Oscillator;
use super::smoother::ParamSmoother;
use crate::patch::{LfoDestination, LfoSettings, SubOscSettings};

/// Pitch depth at full LFO amount, in cents.
pub const LFO_PITCH_RANGE_CENTS: f64 = 200.0;
/// Cutoff depth at full LFO amount, in Hz.
pub const LFO_CUTOFF_RANGE_HZ: f64 = 5000.0;

/// The modulation every voice applies on one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModFrame {
    /// Added to every oscillator's pitch.
    pub pitch_cents: f64,
    /// Added to filter cutoff before clamping.
    pub cutoff_hz: f64,
    /// Post-envelope gain multiplier.
    pub amp: f64,
}

impl Default for ModFrame {
    fn default() -> Self {
        ModFrame {
            pitch_cents: 0.0,
            cutoff_hz: 0.0,
            amp: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct LfoSlot {
    lfo: Lfo,
    enabled: bool,
    destination: LfoDestination,
    rate: ParamSmoother,
    amount: ParamSmoother,
}

impl LfoSlot {
    fn new(settings: &LfoSettings, sample_rate: f64, smoothing_ms: f64) -> Self {
        LfoSlot {
            lfo: Lfo::new(settings.waveform.clone(), sample_rate),
            enabled: settings.enabled,
            destination: settings.destination.clone(),
            rate: ParamSmoother::new(settings.rate_hz, smoothing_ms, sample_rate),
            amount: ParamSmoother::new(settings.amount, smoothing_ms, sample_rate),
        }
    }

    fn apply(&mut self, settings: &LfoSettings) {
        if !self.enabled && settings.enabled {
            // Start a fresh cycle with no ramp from stale values.
            self.lfo.reset();
            self.rate.set_immediate(settings.rate_hz);
            self.amount.set_immediate(settings.amount);
        }
        self.enabled = settings.enabled;
        self.lfo.waveform = settings.waveform.clone();
        self.destination = settings.destination.clone();
        self.rate.set_target(settings.rate_hz);
        self.amount.set_target(settings.amount);
    }

    fn contribute(&mut self, frame: &mut ModFrame) {
        let rate = self.rate.next();
        let amount = self.amount.next();
        let out = self.lfo.next_sample(rate);
        match self.destination {
            LfoDestination::Pitch => frame.pitch_cents += out * amount * LFO_PITCH_RANGE_CENTS,
            LfoDestination::Filter => frame.cutoff_hz += out * amount * LFO_CUTOFF_RANGE_HZ,
            LfoDestination::Amp => frame.amp *= 1.0 - amount * (1.0 - out) * 0.5,
            LfoDestination::Unknown(_) => {}
        }
    }
}

/// Both LFOs and their routing.
#[derive(Debug, Clone)]
pub struct ModMatrix {
    slots: [LfoSlot; 2],
}

impl ModMatrix {
    pub fn new(lfo1: &LfoSettings, lfo2: &LfoSettings, sample_rate: f64, smoothing_ms: f64) -> Self {
        ModMatrix {
            slots: [
                LfoSlot::new(lfo1, sample_rate, smoothing_ms),
                LfoSlot::new(lfo2, sample_rate, smoothing_ms),
            ],
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.lfo = slot.lfo.clone().with_seed(seed.wrapping_add(i as u64));
        }
        self
    }

    pub fn apply(&mut self, lfo1: &LfoSettings, lfo2: &LfoSettings) {
        self.slots[0].apply(lfo1);
        self.slots[1].apply(lfo2);
    }

    /// True when at least one LFO is running.
    pub fn is_active(&self) -> bool {
        self.slots.iter().any(|s| s.enabled)
    }

    /// Advance one sample. Disabled LFOs are not stepped at all.
    pub fn next_frame(&mut self) -> ModFrame {
        let mut frame = ModFrame::default();
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            slot.contribute(&mut frame);
        }
        frame
    }
}

/// Carrier frequency under FM: offset by the modulator's output in Hz.
#[inline]
pub fn fm_frequency(carrier_hz: f64, modulator: f64, amount_hz: f64) -> f64 {
    carrier_hz + modulator * amount_hz
}

/// Crossfade from the plain sum of two oscillators to their product.
#[inline]
pub fn ring_mix(a: f64, b: f64, amount: f64) -> f64 {
    let dry = a + b;
    dry + (a * b - dry) * amount
}

/// Low-register oscillator locked to the voice's primary pitch.
#[derive(Debug, Clone)]
pub struct SubOscillator {
    osc: Oscillator,
    octave: i32,
}

impl SubOscillator {
    pub fn new(settings: &SubOscSettings, sample_rate: f64) -> Self {
        SubOscillator {
            osc: Oscillator::new(settings.waveform.clone(), sample_rate),
            octave: settings.octave,
        }
    }

    pub fn apply(&mut self, settings: &SubOscSettings) {
        self.osc.waveform = settings.waveform.clone();
        self.octave = settings.octave;
    }

    /// Realign phase with the primary oscillator, which restarts at zero on
    /// every trigger.
    pub fn sync(&mut self) {
        self.osc.reset();
    }

    pub fn next_sample(&mut self, base_hz: f64) -> f64 {
        self.osc.frequency = base_hz * 2.0_f64.powi(self.octave);
        self.osc.next_sample()
    }
}
