//! Multi-mode resonant biquad filter.

use std::f64::consts::PI;

use crate::patch::FilterType;

/// Lowest cutoff the filter accepts, in Hz.
pub const MIN_CUTOFF_HZ: f64 = 20.0;
/// Highest cutoff the filter accepts, in Hz, before the Nyquist guard.
pub const MAX_CUTOFF_HZ: f64 = 20_000.0;

/// Keep a (possibly modulated) cutoff inside the audible band and safely
/// below Nyquist.
pub fn clamp_cutoff(frequency: f64, sample_rate: f64) -> f64 {
    let upper = MAX_CUTOFF_HZ.min(0.45 * sample_rate);
    if frequency.is_nan() {
        return upper;
    }
    frequency.clamp(MIN_CUTOFF_HZ, upper)
}

/// Normalized biquad coefficients (a0 divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    const PASSTHROUGH: Coefficients = Coefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ cookbook responses. Unknown types pass audio through.
    fn design(filter_type: &FilterType, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2) = match filter_type {
            FilterType::Lowpass => {
                let side = (1.0 - cos_w0) / 2.0;
                (side, 1.0 - cos_w0, side)
            }
            FilterType::Highpass => {
                let side = (1.0 + cos_w0) / 2.0;
                (side, -(1.0 + cos_w0), side)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
            FilterType::Unknown(_) => return Coefficients::PASSTHROUGH,
        };
        let norm = 1.0 / (1.0 + alpha);
        Coefficients {
            b0: b0 * norm,
            b1: b1 * norm,
            b2: b2 * norm,
            a1: -2.0 * cos_w0 * norm,
            a2: (1.0 - alpha) * norm,
        }
    }
}

/// The per-voice resonant filter: a transposed direct form II biquad whose
/// coefficients are recomputed lazily after a parameter change.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,
    coefs: Coefficients,
    s1: f64,
    s2: f64,
    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: std::f64::consts::FRAC_1_SQRT_2,
            coefs: Coefficients::PASSTHROUGH,
            s1: 0.0,
            s2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn filter_type(&self) -> &FilterType {
        &self.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn update_coefficients(&mut self) {
        self.coefs = Coefficients::design(&self.filter_type, self.frequency, self.q, self.sample_rate);
        self.dirty = false;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let c = self.coefs;
        let out = c.b0 * input + self.s1;
        self.s1 = c.b1 * input - c.a1 * out + self.s2;
        self.s2 = c.b2 * input - c.a2 * out;
        out
    }

    /// Clear the filter memory.
    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }

    /// Set cutoff and Q, clamping both into a stable range.
    pub fn set_params(&mut self, frequency: f64, q: f64) {
        let frequency = clamp_cutoff(frequency, self.sample_rate);
        let q = if q.is_nan() {
            std::f64::consts::FRAC_1_SQRT_2
        } else {
            q.clamp(0.1, 30.0)
        };
        if frequency != self.frequency || q != self.q {
            self.frequency = frequency;
            self.q = q;
            self.dirty = true;
        }
    }

    /// Change the response. Filter memory is kept so the switch is a
    /// coefficient change, not a restart.
    pub fn set_type(&mut self, filter_type: FilterType) {
        if filter_type != self.filter_type {
            self.filter_type = filter_type;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(filter_type: FilterType, frequency: f64) -> BiquadFilter {
        let mut f = BiquadFilter::new(filter_type, 44100.0);
        f.set_params(frequency, 0.707);
        f
    }

    /// Peak output for a sine input, measured after the transient.
    fn steady_amplitude(f: &mut BiquadFilter, freq: f64) -> f64 {
        (0..8820)
            .map(|i| f.process((2.0 * PI * freq * i as f64 / 44100.0).sin()))
            .skip(4410)
            .fold(0.0, |m: f64, x| m.max(x.abs()))
    }

    fn settle_on_dc(f: &mut BiquadFilter) -> f64 {
        (0..1000).map(|_| f.process(1.0)).last().unwrap_or(0.0)
    }

    #[test]
    fn dc_response_by_type() {
        let lp = settle_on_dc(&mut filter(FilterType::Lowpass, 5000.0));
        assert!((lp - 1.0).abs() < 0.001, "lowpass keeps DC, got {lp}");
        let hp = settle_on_dc(&mut filter(FilterType::Highpass, 1000.0));
        assert!(hp.abs() < 0.001, "highpass removes DC, got {hp}");
    }

    #[test]
    fn lowpass_cuts_highs() {
        let mut f = filter(FilterType::Lowpass, 200.0);
        let amp = steady_amplitude(&mut f, 10000.0);
        assert!(amp < 0.01, "10 kHz through a 200 Hz lowpass should vanish, got {amp}");
    }

    #[test]
    fn notch_removes_center_frequency() {
        let mut f = filter(FilterType::Notch, 1000.0);
        let at_center = steady_amplitude(&mut f, 1000.0);
        assert!(at_center < 0.05, "notch should cancel 1kHz, got {at_center}");
    }

    #[test]
    fn bandpass_peaks_at_center() {
        let mut center = filter(FilterType::Bandpass, 1000.0);
        let mut off = filter(FilterType::Bandpass, 1000.0);
        assert!(steady_amplitude(&mut center, 1000.0) > 5.0 * steady_amplitude(&mut off, 100.0));
    }

    #[test]
    fn unknown_type_passes_through() {
        let mut f = filter(FilterType::Unknown("comb".into()), 300.0);
        for x in [0.3, -0.7, 1.0, 0.0] {
            assert_eq!(f.process(x), x);
        }
    }

    #[test]
    fn cutoff_is_clamped_to_safe_range() {
        assert_eq!(clamp_cutoff(5.0, 48000.0), MIN_CUTOFF_HZ);
        assert_eq!(clamp_cutoff(30_000.0, 48000.0), MAX_CUTOFF_HZ);
        assert_eq!(clamp_cutoff(30_000.0, 22050.0), 0.45 * 22050.0);
        assert_eq!(clamp_cutoff(f64::NAN, 48000.0), MAX_CUTOFF_HZ);
        let mut f = filter(FilterType::Lowpass, -4000.0);
        assert_eq!(f.frequency(), MIN_CUTOFF_HZ);
        assert!(f.process(1.0).is_finite());
    }

    #[test]
    fn high_resonance_stays_stable() {
        let mut f = filter(FilterType::Bandpass, 1000.0);
        f.set_params(1000.0, 30.0);
        let impulses = (0..10_000).map(|i| if i % 100 == 0 { 1.0 } else { 0.0 });
        for (i, x) in impulses.enumerate() {
            let out = f.process(x);
            assert!(out.is_finite() && out.abs() < 100.0, "blew up at sample {i}: {out}");
        }
    }
}
