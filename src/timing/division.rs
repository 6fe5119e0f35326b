//! Step timing for the arpeggiator: step length, swing, gate and repeats.
//!
//! All results are in seconds; callers convert to samples.

use crate::patch::ArpSettings;

/// Length of one arpeggiator step.
///
/// Tempo-synced steps last `60 / bpm` seconds per quarter-note beat times
/// the division's length in beats; free-running steps last `1 / rate_hz`.
pub fn step_seconds(settings: &ArpSettings, bpm: f64) -> f64 {
    if settings.bpm_sync {
        60.0 / bpm.max(1.0) * settings.division.beats()
    } else {
        1.0 / settings.rate_hz.max(0.01)
    }
}

/// How far step number `absolute_step` is pushed back by swing.
///
/// Every odd step is delayed by `swing%` of a step, and only when the arp is
/// tempo-synced. The stored swing value is left alone either way.
pub fn swing_offset(settings: &ArpSettings, absolute_step: u64, step_secs: f64) -> f64 {
    if !settings.bpm_sync || absolute_step % 2 == 0 {
        return 0.0;
    }
    settings.swing.clamp(0.0, 75.0) / 100.0 * step_secs
}

/// One note within a step, relative to the step's (swung) start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSpan {
    pub on: f64,
    pub off: f64,
}

/// The retriggers of one step: `repeats` even subdivisions, each held for
/// `gate` of its slot.
pub fn repeat_spans(settings: &ArpSettings, step_secs: f64) -> Vec<NoteSpan> {
    let repeats = settings.repeats.max(1) as usize;
    let slot = step_secs / repeats as f64;
    let held = settings.gate.clamp(0.05, 1.0) * slot;
    (0..repeats)
        .map(|k| {
            let on = k as f64 * slot;
            NoteSpan { on, off: on + held }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Division;

    fn arp() -> ArpSettings {
        ArpSettings {
            enabled: true,
            ..ArpSettings::default()
        }
    }

    #[test]
    fn sixteenths_at_120_bpm() {
        assert!((step_seconds(&arp(), 120.0) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn division_scales_step() {
        let mut s = arp();
        s.division = Division::Quarter;
        assert!((step_seconds(&s, 60.0) - 1.0).abs() < 1e-12);
        s.division = Division::EighthTriplet;
        assert!((step_seconds(&s, 60.0) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn free_running_uses_rate() {
        let mut s = arp();
        s.bpm_sync = false;
        s.rate_hz = 4.0;
        assert!((step_seconds(&s, 120.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn swing_delays_odd_steps_only_when_synced() {
        let mut s = arp();
        s.swing = 50.0;
        assert_eq!(swing_offset(&s, 0, 0.2), 0.0);
        assert!((swing_offset(&s, 1, 0.2) - 0.1).abs() < 1e-12);
        s.bpm_sync = false;
        assert_eq!(swing_offset(&s, 1, 0.2), 0.0);
        assert_eq!(s.swing, 50.0, "disabled swing keeps its stored value");
    }

    #[test]
    fn gate_sets_note_length() {
        let mut s = arp();
        s.gate = 0.25;
        assert_eq!(repeat_spans(&s, 1.0), vec![NoteSpan { on: 0.0, off: 0.25 }]);
    }

    #[test]
    fn repeats_subdivide_the_step() {
        let mut s = arp();
        s.repeats = 4;
        s.gate = 0.5;
        let spans = repeat_spans(&s, 1.0);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[2], NoteSpan { on: 0.5, off: 0.625 });
    }
}
