//! Low-frequency oscillator for modulation.

use std::f64::consts::TAU;

use super::oscillator::triangle;
use crate::patch::LfoWaveform;

/// Times per cycle the noise shape draws a new random value.
const NOISE_STEPS_PER_CYCLE: f64 = 4.0;

/// A free-running bipolar LFO in [-1, 1].
///
/// Waveform edges are left naive: at modulation rates aliasing is inaudible
/// and a hard square is what users expect.
#[derive(Debug, Clone)]
pub struct Lfo {
    pub waveform: LfoWaveform,
    phase: f64,
    sample_rate: f64,
    /// Current sample-and-hold value for the noise shape.
    held: f64,
    /// Which noise subdivision `held` belongs to.
    held_step: u32,
    rng: fastrand::Rng,
}

impl Lfo {
    pub fn new(waveform: LfoWaveform, sample_rate: f64) -> Self {
        let mut rng = fastrand::Rng::new();
        let held = rng.f64() * 2.0 - 1.0;
        Lfo {
            waveform,
            phase: 0.0,
            sample_rate,
            held,
            held_step: 0,
            rng,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self.held = self.rng.f64() * 2.0 - 1.0;
        self
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.held_step = 0;
    }

    /// Advance one sample at `rate_hz` and return the output.
    ///
    /// An unknown waveform outputs 0, i.e. no modulation.
    pub fn next_sample(&mut self, rate_hz: f64) -> f64 {
        let out = match &self.waveform {
            LfoWaveform::Sine => (TAU * self.phase).sin(),
            LfoWaveform::Triangle => triangle(self.phase),
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::Sawtooth => 2.0 * self.phase - 1.0,
            LfoWaveform::Noise => {
                let step = (self.phase * NOISE_STEPS_PER_CYCLE) as u32;
                if step != self.held_step {
                    self.held_step = step;
                    self.held = self.rng.f64() * 2.0 - 1.0;
                }
                self.held
            }
            LfoWaveform::Unknown(_) => 0.0,
        };

        self.phase += (rate_hz / self.sample_rate).max(0.0);
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        out
    }
}
