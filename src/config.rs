//! Engine construction settings.
//!
//! These are host-level knobs (sample rate, polyphony, ramp times), separate
//! from the per-instrument [`Patch`](crate::patch::Patch).

use serde::{Deserialize, Serialize};

/// Settings fixed for the lifetime of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum simultaneously sounding voices before stealing kicks in.
    pub max_voices: usize,
    /// Frames per render block used by convenience renderers.
    pub block_size: usize,
    /// Time constant of the parameter smoothers in milliseconds.
    pub smoothing_ms: f64,
    /// Hard upper bound on how long a released voice may keep sounding.
    pub release_timeout_secs: f64,
    /// How far ahead of the render clock arpeggiator steps are queued.
    pub schedule_ahead_secs: f64,
    /// Seed for the arpeggiator's random mode and noise sources.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 48_000.0,
            max_voices: 16,
            block_size: 128,
            smoothing_ms: 10.0,
            release_timeout_secs: 8.0,
            schedule_ahead_secs: 0.1,
            random_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        EngineConfig {
            sample_rate,
            ..Default::default()
        }
    }

    /// Clamp every field into a workable range.
    pub fn sanitize(&mut self) {
        if !self.sample_rate.is_finite() || self.sample_rate < 8_000.0 {
            self.sample_rate = 8_000.0;
        }
        self.sample_rate = self.sample_rate.min(384_000.0);
        self.max_voices = self.max_voices.clamp(1, 128);
        self.block_size = self.block_size.clamp(16, 4096);
        self.smoothing_ms = self.smoothing_ms.clamp(0.0, 200.0);
        self.release_timeout_secs = self.release_timeout_secs.clamp(0.1, 60.0);
        self.schedule_ahead_secs = self.schedule_ahead_secs.clamp(0.005, 1.0);
    }

    pub(crate) fn release_timeout_samples(&self) -> u64 {
        (self.release_timeout_secs * self.sample_rate) as u64
    }

    pub(crate) fn schedule_ahead_samples(&self) -> u64 {
        (self.schedule_ahead_secs * self.sample_rate) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"sampleRate": 44100}"#).unwrap();
        assert_eq!(cfg.sample_rate, 44100.0);
        assert_eq!(cfg.max_voices, 16);
        assert_eq!(cfg.random_seed, None);
    }

    #[test]
    fn sanitize_clamps_nonsense() {
        let mut cfg = EngineConfig {
            sample_rate: f64::NAN,
            max_voices: 0,
            ..Default::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.sample_rate, 8_000.0);
        assert_eq!(cfg.max_voices, 1);
    }
}
