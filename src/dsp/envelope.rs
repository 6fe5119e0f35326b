//! ADSR envelope generator with exponential segments.
//!
//! Each segment is a one-pole curve aimed slightly past its target, so it
//! reaches the target in the configured time while keeping the natural
//! RC-charging shape (fast start, slow finish for decay and release).

use crate::patch::EnvelopeSettings;

/// Overshoot of the attack curve past 1.0. Larger is more linear.
const TARGET_RATIO_ATTACK: f64 = 0.3;
/// Overshoot of the decay/release curves past their targets.
const TARGET_RATIO_DECAY_RELEASE: f64 = 0.0001;
/// Per-sample glide toward a changed sustain level.
const SUSTAIN_GLIDE: f64 = 0.001;

/// Where a voice is in its amplitude lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Idle,
    Attacking,
    Decaying,
    Sustaining,
    Releasing,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    phase: EnvelopePhase,
    level: f64,
    sample_rate: f64,
    sustain: f64,
    attack_coef: f64,
    attack_base: f64,
    decay_coef: f64,
    decay_base: f64,
    release_coef: f64,
    release_base: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        let mut env = Envelope {
            phase: EnvelopePhase::Idle,
            level: 0.0,
            sample_rate,
            sustain: 0.0,
            attack_coef: 0.0,
            attack_base: 0.0,
            decay_coef: 0.0,
            decay_base: 0.0,
            release_coef: 0.0,
            release_base: 0.0,
        };
        env.set_adsr(&EnvelopeSettings::default());
        env
    }

    /// Update times and sustain. Takes effect on the running segment.
    pub fn set_adsr(&mut self, s: &EnvelopeSettings) {
        self.sustain = s.sustain.clamp(0.0, 1.0);

        self.attack_coef = coefficient(s.attack * self.sample_rate, TARGET_RATIO_ATTACK);
        self.attack_base = (1.0 + TARGET_RATIO_ATTACK) * (1.0 - self.attack_coef);

        self.decay_coef = coefficient(s.decay * self.sample_rate, TARGET_RATIO_DECAY_RELEASE);
        self.decay_base = (self.sustain - TARGET_RATIO_DECAY_RELEASE) * (1.0 - self.decay_coef);

        self.release_coef = coefficient(s.release * self.sample_rate, TARGET_RATIO_DECAY_RELEASE);
        self.release_base = -TARGET_RATIO_DECAY_RELEASE * (1.0 - self.release_coef);
    }

    /// Note on. Restarts the attack from the current level, never from zero.
    pub fn gate_on(&mut self) {
        self.phase = EnvelopePhase::Attacking;
    }

    /// Note off. Releases from wherever the envelope currently is.
    pub fn gate_off(&mut self) {
        if matches!(
            self.phase,
            EnvelopePhase::Attacking | EnvelopePhase::Decaying | EnvelopePhase::Sustaining
        ) {
            self.phase = EnvelopePhase::Releasing;
        }
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.phase {
            EnvelopePhase::Idle => {
                self.level = 0.0;
            }
            EnvelopePhase::Attacking => {
                self.level = self.attack_base + self.level * self.attack_coef;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.phase = EnvelopePhase::Decaying;
                }
            }
            EnvelopePhase::Decaying => {
                self.level = self.decay_base + self.level * self.decay_coef;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.phase = EnvelopePhase::Sustaining;
                }
            }
            EnvelopePhase::Sustaining => {
                self.level += (self.sustain - self.level) * SUSTAIN_GLIDE;
            }
            EnvelopePhase::Releasing => {
                self.level = self.release_base + self.level * self.release_coef;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.phase = EnvelopePhase::Idle;
                }
            }
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Returns true if the envelope has finished (idle after release).
    pub fn is_finished(&self) -> bool {
        self.phase == EnvelopePhase::Idle
    }

    /// Drop to silence immediately. Only for teardown.
    pub fn kill(&mut self) {
        self.phase = EnvelopePhase::Idle;
        self.level = 0.0;
    }
}

/// Per-sample multiplier for a segment of `samples` length aimed `ratio`
/// past its target.
fn coefficient(samples: f64, ratio: f64) -> f64 {
    if samples <= 0.0 {
        return 0.0;
    }
    (-((1.0 + ratio) / ratio).ln() / samples).exp()
}
