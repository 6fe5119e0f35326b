//! Master bus: gain, effects and soft clipping.

use super::delay::Delay;
use super::reverb::Reverb;
use super::smoother::ParamSmoother;
use crate::patch::EffectsSettings;

/// Everything after the voice sum: gain, delay, reverb, clip.
#[derive(Debug, Clone)]
pub struct MasterBus {
    gain: ParamSmoother,
    delay: Delay,
    delay_enabled: bool,
    reverb: Reverb,
    reverb_enabled: bool,
}

impl MasterBus {
    pub fn new(master_gain: f64, effects: &EffectsSettings, sample_rate: f64, smoothing_ms: f64) -> Self {
        MasterBus {
            gain: ParamSmoother::new(master_gain, smoothing_ms, sample_rate),
            delay: Delay::new(sample_rate, &effects.delay, smoothing_ms),
            delay_enabled: effects.delay.enabled,
            reverb: Reverb::new(sample_rate, &effects.reverb, smoothing_ms),
            reverb_enabled: effects.reverb.enabled,
        }
    }

    pub fn apply(&mut self, master_gain: f64, effects: &EffectsSettings) {
        self.gain.set_target(master_gain);
        self.delay.apply(&effects.delay);
        self.reverb.apply(&effects.reverb);
        // A re-enabled effect starts from an empty line, not a stale tail.
        if effects.delay.enabled && !self.delay_enabled {
            self.delay.clear();
        }
        if effects.reverb.enabled && !self.reverb_enabled {
            self.reverb.clear();
        }
        self.delay_enabled = effects.delay.enabled;
        self.reverb_enabled = effects.reverb.enabled;
    }

    /// Take one mono voice sum to a clipped stereo frame.
    #[inline]
    pub fn process(&mut self, mono: f64) -> (f32, f32) {
        let s = (mono * self.gain.next()) as f32;
        let (mut l, mut r) = (s, s);
        if self.delay_enabled {
            (l, r) = self.delay.process(l, r);
        }
        if self.reverb_enabled {
            (l, r) = self.reverb.process(l, r);
        }
        (soft_clip(l), soft_clip(r))
    }

    pub fn clear(&mut self) {
        self.delay.clear();
        self.reverb.clear();
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
#[inline]
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}
