//! Parameter smoothing for click-free parameter writes.
//!
//! Turns an instantaneous write into a short exponential ramp (one-pole
//! lowpass toward the target), so cutoff, gain, and mix edits coming from a
//! knob or a patch never produce a step in the signal.

/// Distance at which the ramp snaps onto its target.
const SNAP_EPSILON: f64 = 1e-6;

/// A value that glides toward its target one sample at a time.
#[derive(Debug, Clone)]
pub struct ParamSmoother {
    current: f64,
    target: f64,
    /// Per-sample retention factor in [0, 1). 0 means no smoothing.
    coeff: f64,
}

impl ParamSmoother {
    pub const DEFAULT_TIME_CONSTANT_MS: f64 = 10.0;

    pub fn new(initial: f64, time_constant_ms: f64, sample_rate: f64) -> Self {
        ParamSmoother {
            current: initial,
            target: initial,
            coeff: coefficient(time_constant_ms, sample_rate),
        }
    }

    pub fn with_default_smoothing(initial: f64, sample_rate: f64) -> Self {
        Self::new(initial, Self::DEFAULT_TIME_CONSTANT_MS, sample_rate)
    }

    #[inline]
    pub fn set_target(&mut self, value: f64) {
        self.target = value;
    }

    /// Jump straight to `value`. For discrete changes and initial setup.
    #[inline]
    pub fn set_immediate(&mut self, value: f64) {
        self.current = value;
        self.target = value;
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        (self.current - self.target).abs() > SNAP_EPSILON
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f64 {
        let diff = self.current - self.target;
        if diff.abs() <= SNAP_EPSILON {
            self.current = self.target;
        } else {
            self.current = self.target + self.coeff * diff;
        }
        self.current
    }
}

fn coefficient(time_constant_ms: f64, sample_rate: f64) -> f64 {
    let samples = time_constant_ms * 0.001 * sample_rate;
    if samples < 1.0 {
        return 0.0;
    }
    (-1.0 / samples).exp()
}
