//! Stereo feedback echo on the master bus.

use super::smoother::ParamSmoother;
use crate::patch::DelaySettings;

/// Longest delay time the line is allocated for, in seconds.
pub const MAX_DELAY_SECS: f64 = 2.0;

/// Time glides and the read head interpolates between frames, so dragging
/// the time control bends pitch instead of clicking.
#[derive(Debug, Clone)]
pub struct Delay {
    line: Vec<[f32; 2]>,
    head: usize,
    sample_rate: f64,
    time: ParamSmoother,
    feedback: ParamSmoother,
    mix: ParamSmoother,
}

impl Delay {
    pub fn new(sample_rate: f64, settings: &DelaySettings, smoothing_ms: f64) -> Self {
        let frames = (sample_rate * MAX_DELAY_SECS) as usize + 2;
        Delay {
            line: vec![[0.0; 2]; frames],
            head: 0,
            sample_rate,
            // Slower ramp than the other controls.
            time: ParamSmoother::new(settings.time, smoothing_ms * 5.0, sample_rate),
            feedback: ParamSmoother::new(settings.feedback, smoothing_ms, sample_rate),
            mix: ParamSmoother::new(settings.mix, smoothing_ms, sample_rate),
        }
    }

    pub fn apply(&mut self, settings: &DelaySettings) {
        self.time.set_target(settings.time.clamp(0.0, MAX_DELAY_SECS));
        self.feedback.set_target(settings.feedback.clamp(0.0, 0.95));
        self.mix.set_target(settings.mix.clamp(0.0, 1.0));
    }

    /// Frame `back` samples behind the write head.
    #[inline]
    fn tap(&self, back: usize) -> [f32; 2] {
        let n = self.line.len();
        self.line[(self.head + n - back) % n]
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let n = self.line.len();
        let lag = (self.time.next() * self.sample_rate).clamp(1.0, (n - 2) as f64);
        let gain = self.feedback.next() as f32;
        let wet = self.mix.next() as f32;

        let back = lag as usize;
        let t = lag.fract() as f32;
        let (near, far) = (self.tap(back), self.tap(back + 1));
        let echo = [near[0] + (far[0] - near[0]) * t, near[1] + (far[1] - near[1]) * t];

        self.line[self.head] = [left + echo[0] * gain, right + echo[1] * gain];
        self.head = (self.head + 1) % n;

        let dry = 1.0 - wet;
        (left * dry + echo[0] * wet, right * dry + echo[1] * wet)
    }

    /// Drop any pending echoes.
    pub fn clear(&mut self) {
        self.line.fill([0.0; 2]);
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(sample_rate: f64, time: f64, feedback: f64, mix: f64) -> Delay {
        let settings = DelaySettings {
            enabled: true,
            time,
            feedback,
            mix,
        };
        Delay::new(sample_rate, &settings, 0.0)
    }

    #[test]
    fn zero_mix_is_dry() {
        let mut d = delay(44100.0, 0.5, 0.0, 0.0);
        assert_eq!(d.process(0.5, -0.5), (0.5, -0.5));
    }

    #[test]
    fn echo_arrives_after_the_delay_time() {
        let mut d = delay(1000.0, 0.01, 0.0, 1.0);
        d.process(1.0, -1.0);
        let out: Vec<(f32, f32)> = (0..10).map(|_| d.process(0.0, 0.0)).collect();
        assert!(out[..9].iter().all(|&(l, r)| l == 0.0 && r == 0.0), "echo came early");
        assert_eq!(out[9], (1.0, -1.0), "channels stay separate");
    }

    #[test]
    fn feedback_repeats_attenuated() {
        let mut d = delay(1000.0, 0.01, 0.5, 1.0);
        d.process(1.0, 1.0);
        let out: Vec<f32> = (0..20).map(|_| d.process(0.0, 0.0).0).collect();
        assert!((out[9] - 1.0).abs() < 1e-6, "first echo after 10 samples");
        assert!((out[19] - 0.5).abs() < 1e-6, "second echo halved by feedback");
    }

    #[test]
    fn time_change_glides() {
        let settings = DelaySettings {
            enabled: true,
            time: 0.1,
            feedback: 0.0,
            mix: 1.0,
        };
        let mut d = Delay::new(1000.0, &settings, 10.0);
        d.apply(&DelaySettings { time: 0.5, ..settings });
        d.process(0.0, 0.0);
        assert!(d.time.current() < 0.2, "time should ramp, got {}", d.time.current());
    }
}
