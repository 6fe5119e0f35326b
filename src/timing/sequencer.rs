//! Step sequencer: a grid of on/off steps with per-step pitch offsets.

use crate::patch::{SeqStep, SequencerSettings};

/// A sanitized, read-only view of a sequencer pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequencer {
    steps: Vec<SeqStep>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Sequencer::from_settings(&SequencerSettings::default())
    }
}

impl Sequencer {
    /// Build from settings. Only the first `length` steps take part.
    pub fn from_settings(settings: &SequencerSettings) -> Self {
        let mut settings = settings.clone();
        settings.sanitize();
        let length = settings.length;
        settings.steps.truncate(length);
        Sequencer {
            steps: settings.steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at `index`, wrapping around the pattern.
    pub fn step(&self, index: usize) -> SeqStep {
        if self.steps.is_empty() {
            return SeqStep::default();
        }
        self.steps[index % self.steps.len()]
    }

    /// Distinct offsets of the ON steps, ascending.
    pub fn active_offsets(&self) -> Vec<i32> {
        let mut offsets: Vec<i32> = self.steps.iter().filter(|s| s.on).map(|s| s.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    pub fn active_count(&self) -> usize {
        self.steps.iter().filter(|s| s.on).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(steps: &[(bool, i32)]) -> SequencerSettings {
        SequencerSettings {
            length: steps.len(),
            steps: steps.iter().map(|&(on, offset)| SeqStep { on, offset }).collect(),
        }
    }

    #[test]
    fn step_wraps_around() {
        let seq = Sequencer::from_settings(&settings(&[(true, 0), (false, 0), (true, 5)]));
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.step(5), SeqStep { on: true, offset: 5 });
    }

    #[test]
    fn length_limits_the_pattern() {
        let mut s = settings(&[(true, 0), (true, 3), (true, 7), (true, 12)]);
        s.length = 2;
        let seq = Sequencer::from_settings(&s);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.active_offsets(), vec![0, 3]);
    }

    #[test]
    fn active_offsets_are_distinct_and_sorted() {
        let seq = Sequencer::from_settings(&settings(&[
            (true, 7),
            (false, 2),
            (true, 0),
            (true, 7),
            (true, -5),
        ]));
        assert_eq!(seq.active_offsets(), vec![-5, 0, 7]);
        assert_eq!(seq.active_count(), 4);
    }

    #[test]
    fn short_step_list_is_padded_with_rests() {
        let s = SequencerSettings {
            length: 4,
            steps: vec![SeqStep { on: true, offset: 0 }],
        };
        let seq = Sequencer::from_settings(&s);
        assert_eq!(seq.len(), 4);
        assert!(!seq.step(3).on);
    }
}
