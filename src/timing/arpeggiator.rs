//! Arpeggiator: turns the held-note set into a timed stream of notes.
//!
//! The arp works ahead of the render clock. `schedule` is called once per
//! render block with the current sample and a look-ahead horizon; every step
//! that starts before the horizon is expanded into [`ArpNote`]s with absolute
//! on/off sample times, which the engine queues for sample-accurate playback.
//!
//! Each emitted step is also published to subscribers as an [`ArpStepEvent`],
//! so displays can follow the pattern without polling.

use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;

use super::division::{NoteSpan, repeat_spans, step_seconds, swing_offset};
use super::sequencer::Sequencer;
use super::transport::{BeatGrid, TransportClock};
use crate::patch::{ArpMode, ArpSettings, ChordSource, SequencerSettings};

/// One scheduled note with absolute engine-sample times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArpNote {
    pub note: u8,
    pub velocity: f64,
    pub on_at: u64,
    pub off_at: u64,
}

/// The logical content of one step, before timing is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ArpStep {
    pub index: usize,
    pub length: usize,
    /// Empty on a rest.
    pub notes: Vec<u8>,
    pub rest: bool,
}

/// Published to subscribers on every step boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpStepEvent {
    pub step_index: usize,
    pub length: usize,
    pub notes: Vec<u8>,
    /// Engine sample at which the step starts, swing included.
    pub at_sample: u64,
    pub rest: bool,
}

/// Display snapshot. Advisory only; playback never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpStatus {
    pub enabled: bool,
    pub step_index: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Stopped,
    Running,
}

#[derive(Debug)]
pub struct Arpeggiator {
    settings: ArpSettings,
    sequencer: Sequencer,
    sample_rate: f64,
    state: ArpState,

    /// Notes taking part, in order of arrival.
    held: Vec<u8>,
    /// Keys physically down. Differs from `held` only under latch.
    pressed: Vec<u8>,
    velocity: f64,

    /// Root order for the current cycle.
    order: Vec<u8>,
    order_dirty: bool,
    step_index: usize,
    last_step: usize,
    /// Steps emitted since start; drives swing.
    abs_step: u64,
    /// Next root to play in sequence mode.
    note_cursor: usize,
    /// Free-running: engine sample of the next unscheduled step.
    next_step_at: Option<f64>,
    /// On a playing transport: grid number of the next unscheduled step.
    grid_step: Option<u64>,

    rng: fastrand::Rng,
    transport: Option<TransportClock>,
    transport_running: bool,
    cancel_pending: bool,
    observers: Vec<Sender<ArpStepEvent>>,
}

impl Arpeggiator {
    pub fn new(sample_rate: f64) -> Self {
        Arpeggiator {
            settings: ArpSettings::default(),
            sequencer: Sequencer::default(),
            sample_rate,
            state: ArpState::Stopped,
            held: Vec::new(),
            pressed: Vec::new(),
            velocity: 1.0,
            order: Vec::new(),
            order_dirty: true,
            step_index: 0,
            last_step: 0,
            abs_step: 0,
            note_cursor: 0,
            next_step_at: None,
            grid_step: None,
            rng: fastrand::Rng::new(),
            transport: None,
            transport_running: true,
            cancel_pending: false,
            observers: Vec::new(),
        }
    }

    /// Deterministic random mode.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn settings(&self) -> &ArpSettings {
        &self.settings
    }

    pub fn state(&self) -> ArpState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn held_notes(&self) -> &[u8] {
        &self.held
    }

    /// Follow a shared transport's tempo, play state and beat grid. `None`
    /// detaches and falls back to the patch's own bpm.
    pub fn set_transport(&mut self, transport: Option<TransportClock>) {
        self.transport = transport;
        self.transport_running = true;
        self.next_step_at = None;
        self.grid_step = None;
    }

    pub fn transport(&self) -> Option<&TransportClock> {
        self.transport.as_ref()
    }

    /// Receive an [`ArpStepEvent`] for every step emitted from now on.
    pub fn subscribe(&mut self) -> Receiver<ArpStepEvent> {
        let (tx, rx) = channel::unbounded();
        self.observers.push(tx);
        rx
    }

    pub fn apply(&mut self, settings: &ArpSettings, sequencer: &SequencerSettings) {
        let was_enabled = self.settings.enabled;
        let mut settings = settings.clone();
        settings.sanitize();
        if !settings.latch && self.settings.latch {
            // Turning latch off lets go of keys no longer down.
            self.held.retain(|n| self.pressed.contains(n));
        }
        self.settings = settings;
        self.sequencer = Sequencer::from_settings(sequencer);
        self.order_dirty = true;

        if !self.settings.enabled {
            if was_enabled {
                self.stop();
            }
        } else if self.held.is_empty() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: f64) {
        if self.settings.latch && self.pressed.is_empty() {
            // First key after a full release starts a new latched set.
            self.held.clear();
        }
        if !self.pressed.contains(&note) {
            self.pressed.push(note);
        }
        if !self.held.contains(&note) {
            self.held.push(note);
        }
        self.velocity = velocity.clamp(0.0, 1.0);
        self.order_dirty = true;
        if self.settings.enabled {
            self.start();
        }
    }

    pub fn note_off(&mut self, note: u8) {
        self.pressed.retain(|&n| n != note);
        if self.settings.latch {
            return;
        }
        self.held.retain(|&n| n != note);
        self.order_dirty = true;
        if self.held.is_empty() {
            self.stop();
        }
    }

    /// Forget held and latched notes and stop. Settings are kept.
    pub fn clear(&mut self) {
        self.held.clear();
        self.pressed.clear();
        self.order.clear();
        self.order_dirty = true;
        self.stop();
        self.cancel_pending = true;
    }

    pub fn status(&self) -> ArpStatus {
        ArpStatus {
            enabled: self.settings.enabled,
            step_index: self.last_step,
            length: self.length(),
        }
    }

    /// True once after the arp stopped or paused; queued future notes
    /// should then be dropped.
    pub fn take_cancel(&mut self) -> bool {
        std::mem::take(&mut self.cancel_pending)
    }

    fn start(&mut self) {
        if self.state == ArpState::Running {
            return;
        }
        tracing::debug!(held = self.held.len(), "arp start");
        self.state = ArpState::Running;
        self.step_index = 0;
        self.last_step = 0;
        self.abs_step = 0;
        self.note_cursor = 0;
        self.next_step_at = None;
        self.grid_step = None;
        self.order_dirty = true;
    }

    fn stop(&mut self) {
        if self.state == ArpState::Stopped {
            return;
        }
        tracing::debug!("arp stop");
        self.state = ArpState::Stopped;
        self.next_step_at = None;
        self.grid_step = None;
        self.cancel_pending = true;
    }

    /// Steps in one cycle.
    pub fn length(&self) -> usize {
        if self.settings.pattern_len > 0 {
            return self.settings.pattern_len;
        }
        let derived = if self.settings.mode == ArpMode::Sequence {
            self.sequencer.len()
        } else {
            self.root_order().len()
        };
        derived.max(1)
    }

    /// Held notes spread over the octave layers, ordered by mode. Random
    /// mode returns the ascending set; shuffling happens per cycle.
    fn root_order(&self) -> Vec<u8> {
        let octaves = self.settings.octaves.max(1) as i32;
        let spread = |base: &[u8]| -> Vec<u8> {
            (0..octaves)
                .flat_map(|oct| base.iter().filter_map(move |&n| transpose(n, oct * 12)))
                .collect()
        };
        let mut sorted = self.held.clone();
        sorted.sort_unstable();

        match self.settings.mode {
            ArpMode::AsPlayed => spread(&self.held),
            ArpMode::Down => {
                let mut up = spread(&sorted);
                up.reverse();
                up
            }
            ArpMode::UpDown => {
                let up = spread(&sorted);
                if up.len() <= 2 {
                    return up;
                }
                let down = up[1..up.len() - 1].iter().rev().copied().collect::<Vec<_>>();
                up.iter().copied().chain(down).collect()
            }
            ArpMode::Up | ArpMode::Random | ArpMode::Sequence | ArpMode::Unknown(_) => spread(&sorted),
        }
    }

    fn refresh_order(&mut self) {
        self.order = self.root_order();
        if self.settings.mode == ArpMode::Random {
            self.rng.shuffle(&mut self.order);
        }
        self.order_dirty = false;
    }

    /// Semitone offsets stacked on each root outside sequence mode.
    fn intervals(&self) -> Vec<i32> {
        match self.settings.chord_source {
            ChordSource::Sequencer => {
                let mut set = self.sequencer.active_offsets();
                if !set.contains(&0) {
                    set.insert(0, 0);
                }
                set
            }
            ChordSource::Preset | ChordSource::Unknown(_) => self.settings.chord.intervals().to_vec(),
        }
    }

    /// Produce the next step and move the counters on.
    pub fn advance(&mut self) -> ArpStep {
        let length = self.length();
        if self.step_index >= length {
            self.step_index = 0;
        }
        if self.step_index == 0 {
            // Cycle boundary: random mode reselects, sequence mode restarts.
            self.note_cursor = 0;
            self.refresh_order();
        } else if self.order_dirty {
            self.refresh_order();
        }

        let index = self.step_index;
        let notes = if self.order.is_empty() {
            Vec::new()
        } else if self.settings.mode == ArpMode::Sequence {
            let step = self.sequencer.step(index);
            if step.on {
                let root = self.order[self.note_cursor % self.order.len()];
                self.note_cursor += 1;
                let intervals: Vec<i32> = match self.settings.chord_source {
                    ChordSource::Sequencer => vec![0],
                    _ => self.settings.chord.intervals().to_vec(),
                };
                chord(root, step.offset, &intervals)
            } else {
                Vec::new()
            }
        } else {
            let root = self.order[index % self.order.len()];
            chord(root, 0, &self.intervals())
        };

        self.last_step = index;
        self.step_index = (index + 1) % length;
        self.abs_step += 1;
        ArpStep {
            index,
            length,
            rest: notes.is_empty(),
            notes,
        }
    }

    fn bpm(&self) -> f64 {
        match &self.transport {
            Some(clock) => clock.bpm(),
            None => self.settings.bpm,
        }
    }

    /// Emit every step starting before `horizon` into `out`.
    ///
    /// On a playing transport with a tempo-synced arp, steps land on the
    /// transport's beat grid, shared by every lane attached to it. Otherwise
    /// the grid starts at the first scheduled sample. When the caller fell
    /// more than a step behind `now`, the missed steps are skipped (counters
    /// still advance) and playback resumes at the current step.
    pub fn schedule(&mut self, now: u64, horizon: u64, out: &mut Vec<ArpNote>) {
        if self.state != ArpState::Running {
            return;
        }
        let mut grid = None;
        if let Some(clock) = &self.transport {
            if !clock.is_playing() {
                if self.transport_running {
                    tracing::debug!("arp paused by transport");
                    self.transport_running = false;
                    self.next_step_at = None;
                    self.grid_step = None;
                    self.cancel_pending = true;
                }
                return;
            }
            self.transport_running = true;
            if self.settings.bpm_sync {
                grid = Some(clock.grid());
            }
        }
        match grid {
            Some(grid) => self.schedule_on_grid(grid, now, horizon, out),
            None => self.schedule_free(now, horizon, out),
        }
    }

    fn schedule_free(&mut self, now: u64, horizon: u64, out: &mut Vec<ArpNote>) {
        self.grid_step = None;
        let step_secs = step_seconds(&self.settings, self.bpm());
        let step_samples = step_secs * self.sample_rate;
        let now_f = now as f64;
        let mut next = *self.next_step_at.get_or_insert(now_f);

        if now_f - next > step_samples {
            let missed = ((now_f - next) / step_samples).floor() as u64;
            self.skip_steps(missed);
            next = now_f;
        }

        let spans = repeat_spans(&self.settings, step_secs);
        while next < horizon as f64 {
            let swing = swing_offset(&self.settings, self.abs_step, step_secs) * self.sample_rate;
            self.emit_step(next + swing, &spans, out);
            next += step_samples;
        }
        self.next_step_at = Some(next);
    }

    fn schedule_on_grid(&mut self, grid: BeatGrid, now: u64, horizon: u64, out: &mut Vec<ArpNote>) {
        self.next_step_at = None;
        let sr = self.sample_rate;
        let step_beats = self.settings.division.beats();
        let step_secs = step_seconds(&self.settings, grid.bpm);
        let now_beat = grid.beat_at(now as f64 / sr);
        // First grid step at or after `now`.
        let due = ((now_beat / step_beats) - 1e-9).ceil().max(0.0) as u64;
        let mut k = *self.grid_step.get_or_insert(due);

        if now_beat - k as f64 * step_beats > step_beats {
            self.skip_steps(due - k);
            k = due;
        }

        let spans = repeat_spans(&self.settings, step_secs);
        loop {
            let at = grid.secs_at(k as f64 * step_beats);
            if at * sr >= horizon as f64 {
                break;
            }
            let start = (at + swing_offset(&self.settings, k, step_secs)) * sr;
            self.emit_step(start, &spans, out);
            k += 1;
        }
        self.grid_step = Some(k);
    }

    fn skip_steps(&mut self, missed: u64) {
        tracing::warn!(missed, "arpeggiator fell behind; dropping missed steps");
        for _ in 0..missed {
            self.advance();
        }
    }

    /// Advance one step and expand it into notes starting at sample `start`.
    fn emit_step(&mut self, start: f64, spans: &[NoteSpan], out: &mut Vec<ArpNote>) {
        let step = self.advance();
        let start = start.max(0.0);
        for span in spans {
            let on_at = (start + span.on * self.sample_rate).round() as u64;
            let off_at = (start + span.off * self.sample_rate).round() as u64;
            out.extend(step.notes.iter().map(|&note| ArpNote {
                note,
                velocity: self.velocity,
                on_at,
                off_at,
            }));
        }
        self.publish(ArpStepEvent {
            step_index: step.index,
            length: step.length,
            notes: step.notes,
            at_sample: start.round() as u64,
            rest: step.rest,
        });
    }

    fn publish(&mut self, event: ArpStepEvent) {
        if self.observers.is_empty() {
            return;
        }
        // Dropped receivers unsubscribe.
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn transpose(note: u8, semitones: i32) -> Option<u8> {
    let n = note as i32 + semitones;
    (0..=127).contains(&n).then_some(n as u8)
}

/// Root plus offset, stacked with `intervals`, clamped to the MIDI range.
fn chord(root: u8, offset: i32, intervals: &[i32]) -> Vec<u8> {
    let mut notes: Vec<u8> = intervals
        .iter()
        .map(|&i| (root as i32 + offset + i).clamp(0, 127) as u8)
        .collect();
    notes.sort_unstable();
    notes.dedup();
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{ChordPreset, SeqStep};
    use crate::timing::transport::Transport;

    const SR: f64 = 1000.0;

    fn arp_with(settings: ArpSettings) -> Arpeggiator {
        let mut arp = Arpeggiator::new(SR).with_seed(7);
        arp.apply(
            &ArpSettings {
                enabled: true,
                ..settings
            },
            &SequencerSettings::default(),
        );
        arp
    }

    fn hold(arp: &mut Arpeggiator, notes: &[u8]) {
        for &n in notes {
            arp.note_on(n, 1.0);
        }
    }

    fn roots(arp: &mut Arpeggiator, steps: usize) -> Vec<u8> {
        (0..steps).map(|_| arp.advance().notes[0]).collect()
    }

    #[test]
    fn sequence_mode_rests_on_off_steps() {
        let mut arp = Arpeggiator::new(SR);
        let settings = ArpSettings {
            enabled: true,
            mode: ArpMode::Sequence,
            chord_source: ChordSource::Sequencer,
            ..ArpSettings::default()
        };
        let seq = SequencerSettings {
            length: 4,
            steps: [true, false, true, true]
                .iter()
                .map(|&on| SeqStep { on, offset: 0 })
                .collect(),
        };
        arp.apply(&settings, &seq);
        hold(&mut arp, &[67, 60, 64]);

        let steps: Vec<ArpStep> = (0..5).map(|_| arp.advance()).collect();
        let indices: Vec<usize> = steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0], "rests still advance the step index");
        assert_eq!(steps[0].notes, vec![60]);
        assert!(steps[1].rest && steps[1].notes.is_empty());
        assert_eq!(steps[2].notes, vec![64], "the rest did not consume a note");
        assert_eq!(steps[3].notes, vec![67]);
        assert_eq!(steps[4].notes, vec![60], "new cycle restarts the note order");
        assert_eq!(arp.status().length, 4);
    }

    #[test]
    fn sequence_mode_applies_step_offsets() {
        let mut arp = Arpeggiator::new(SR);
        let settings = ArpSettings {
            enabled: true,
            mode: ArpMode::Sequence,
            chord_source: ChordSource::Preset,
            chord: ChordPreset::Power,
            ..ArpSettings::default()
        };
        let seq = SequencerSettings {
            length: 2,
            steps: vec![SeqStep { on: true, offset: 0 }, SeqStep { on: true, offset: 12 }],
        };
        arp.apply(&settings, &seq);
        hold(&mut arp, &[60]);
        assert_eq!(arp.advance().notes, vec![60, 67]);
        assert_eq!(arp.advance().notes, vec![72, 79]);
    }

    #[test]
    fn chord_presets_expand_the_root() {
        let mut arp = arp_with(ArpSettings {
            chord: ChordPreset::Major,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        assert_eq!(arp.advance().notes, vec![60, 64, 67]);

        let mut arp = arp_with(ArpSettings {
            chord: ChordPreset::Power,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        assert_eq!(arp.advance().notes, vec![60, 67]);
    }

    #[test]
    fn sequencer_chord_source_uses_active_offsets() {
        let mut arp = Arpeggiator::new(SR);
        let seq = SequencerSettings {
            length: 4,
            steps: vec![
                SeqStep { on: true, offset: 7 },
                SeqStep { on: false, offset: 5 },
                SeqStep { on: true, offset: 7 },
                SeqStep { on: true, offset: 3 },
            ],
        };
        arp.apply(
            &ArpSettings {
                enabled: true,
                chord_source: ChordSource::Sequencer,
                ..ArpSettings::default()
            },
            &seq,
        );
        hold(&mut arp, &[60]);
        assert_eq!(arp.advance().notes, vec![60, 63, 67]);
    }

    #[test]
    fn up_down_and_as_played_orders() {
        let mut arp = arp_with(ArpSettings::default());
        hold(&mut arp, &[67, 60, 64]);
        assert_eq!(roots(&mut arp, 4), vec![60, 64, 67, 60]);

        let mut arp = arp_with(ArpSettings {
            mode: ArpMode::Down,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[67, 60, 64]);
        assert_eq!(roots(&mut arp, 3), vec![67, 64, 60]);

        let mut arp = arp_with(ArpSettings {
            mode: ArpMode::UpDown,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60, 64, 67]);
        assert_eq!(roots(&mut arp, 6), vec![60, 64, 67, 64, 60, 64]);

        let mut arp = arp_with(ArpSettings {
            mode: ArpMode::AsPlayed,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[67, 60, 64]);
        assert_eq!(roots(&mut arp, 3), vec![67, 60, 64]);
    }

    #[test]
    fn octaves_layer_the_pattern() {
        let mut arp = arp_with(ArpSettings {
            octaves: 2,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[64, 60]);
        assert_eq!(arp.length(), 4);
        assert_eq!(roots(&mut arp, 4), vec![60, 64, 72, 76]);
    }

    #[test]
    fn random_mode_reshuffles_each_cycle() {
        let mut arp = arp_with(ArpSettings {
            mode: ArpMode::Random,
            ..ArpSettings::default()
        });
        let held = [60, 62, 64, 65, 67];
        hold(&mut arp, &held);

        let cycles: Vec<Vec<u8>> = (0..12).map(|_| roots(&mut arp, held.len())).collect();
        for cycle in &cycles {
            let mut sorted = cycle.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, held, "every held note plays once per cycle");
        }
        assert!(
            cycles.windows(2).any(|w| w[0] != w[1]),
            "order should change between cycles"
        );
    }

    #[test]
    fn explicit_pattern_length_loops_the_order() {
        let mut arp = arp_with(ArpSettings {
            pattern_len: 3,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60, 64]);
        assert_eq!(arp.length(), 3);
        assert_eq!(roots(&mut arp, 6), vec![60, 64, 60, 60, 64, 60]);
    }

    #[test]
    fn latch_keeps_notes_until_a_new_press() {
        let mut arp = arp_with(ArpSettings {
            latch: true,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        arp.note_off(60);
        assert_eq!(arp.held_notes(), &[60]);
        assert_eq!(arp.state(), ArpState::Running);

        arp.note_on(64, 1.0);
        assert_eq!(arp.held_notes(), &[64], "a press after full release replaces the set");
        arp.note_on(67, 1.0);
        assert_eq!(arp.held_notes(), &[64, 67]);
    }

    #[test]
    fn releasing_all_notes_stops_and_cancels() {
        let mut arp = arp_with(ArpSettings::default());
        hold(&mut arp, &[60, 64]);
        arp.note_off(60);
        assert_eq!(arp.state(), ArpState::Running);
        arp.note_off(64);
        assert_eq!(arp.state(), ArpState::Stopped);
        assert!(arp.take_cancel());
        assert!(!arp.take_cancel(), "cancel is reported once");
    }

    #[test]
    fn clear_keeps_settings() {
        let mut arp = arp_with(ArpSettings {
            latch: true,
            chord: ChordPreset::Minor,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        arp.clear();
        assert!(arp.held_notes().is_empty());
        assert_eq!(arp.state(), ArpState::Stopped);
        assert_eq!(arp.settings().chord, ChordPreset::Minor);
        assert!(arp.status().enabled);
    }

    #[test]
    fn schedule_spaces_steps_by_division() {
        // 120 BPM sixteenths at 1 kHz: 125 samples per step.
        let mut arp = arp_with(ArpSettings::default());
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        arp.schedule(0, 500, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![0, 125, 250, 375]);
    }

    #[test]
    fn gate_sets_note_off() {
        let mut arp = arp_with(ArpSettings {
            gate: 0.25,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        arp.schedule(0, 1, &mut out);
        assert_eq!((out[0].on_at, out[0].off_at), (0, 31));
    }

    #[test]
    fn repeats_retrigger_within_a_step() {
        let mut arp = arp_with(ArpSettings {
            repeats: 4,
            gate: 0.5,
            ..ArpSettings::default()
        });
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        arp.schedule(0, 1, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons.len(), 4);
        assert_eq!(ons[0], 0);
        assert_eq!(ons[2], 63);
        assert!(out.iter().all(|n| n.off_at > n.on_at && n.note == 60));
    }

    #[test]
    fn swing_only_moves_synced_steps() {
        let mut synced = arp_with(ArpSettings {
            swing: 50.0,
            ..ArpSettings::default()
        });
        hold(&mut synced, &[60, 64]);
        let mut out = Vec::new();
        synced.schedule(0, 500, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![0, 188, 250, 438]);

        let mut free = arp_with(ArpSettings {
            swing: 50.0,
            bpm_sync: false,
            rate_hz: 8.0,
            ..ArpSettings::default()
        });
        hold(&mut free, &[60, 64]);
        let mut free_out = Vec::new();
        free.schedule(0, 500, &mut free_out);
        let free_ons: Vec<u64> = free_out.iter().map(|n| n.on_at).collect();
        assert_eq!(free_ons, vec![0, 125, 250, 375]);

        let pitches = |v: &[ArpNote]| v.iter().map(|n| n.note).collect::<Vec<_>>();
        assert_eq!(pitches(&out), pitches(&free_out), "swing never changes pitch");
        assert_eq!(free.settings().swing, 50.0);
    }

    #[test]
    fn schedule_resumes_where_it_left_off() {
        let mut arp = arp_with(ArpSettings::default());
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        arp.schedule(0, 200, &mut out);
        arp.schedule(100, 300, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![0, 125, 250], "no step is emitted twice");
    }

    #[test]
    fn underrun_drops_missed_steps() {
        let mut arp = arp_with(ArpSettings::default());
        hold(&mut arp, &[60, 62, 64, 65]);
        let mut out = Vec::new();
        arp.schedule(0, 10, &mut out);
        out.clear();

        arp.schedule(10_000, 10_010, &mut out);
        assert_eq!(out.len(), 1, "only the current step is emitted after a stall");
        assert_eq!(out[0].on_at, 10_000);
        // 80 steps elapsed in 10 s; 79 were skipped and one played now.
        assert_eq!(arp.status().step_index, 80 % 4);
    }

    #[test]
    fn follows_transport_tempo_and_play_state() {
        let transport = Transport::new(60.0);
        let mut arp = arp_with(ArpSettings::default());
        arp.set_transport(Some(transport.clock()));
        hold(&mut arp, &[60]);

        let mut out = Vec::new();
        arp.schedule(0, 600, &mut out);
        assert!(out.is_empty(), "a stopped transport holds the arp");
        assert!(arp.take_cancel());

        transport.set_playing(true);
        arp.schedule(0, 600, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![0, 250, 500], "60 BPM sixteenths are 250 ms");
    }

    #[test]
    fn a_late_key_waits_for_the_next_grid_step() {
        let transport = Transport::new(60.0);
        transport.set_playing(true);
        let mut arp = arp_with(ArpSettings::default());
        arp.set_transport(Some(transport.clock()));

        let mut out = Vec::new();
        arp.schedule(0, 380, &mut out);
        hold(&mut arp, &[60]);
        arp.schedule(380, 1000, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![500, 750], "steps stay on the 250-sample grid");
    }

    #[test]
    fn grid_steps_follow_a_tempo_change() {
        let transport = Transport::new(60.0);
        let clock = transport.clock();
        transport.set_playing(true);
        let mut arp = arp_with(ArpSettings::default());
        arp.set_transport(Some(clock.clone()));
        hold(&mut arp, &[60]);

        let mut out = Vec::new();
        arp.schedule(0, 500, &mut out);
        clock.report_position(0.5);
        transport.set_tempo(120.0);
        arp.schedule(500, 1000, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![0, 250, 500, 625, 750, 875]);
    }

    #[test]
    fn swing_follows_the_grid_step_number() {
        let transport = Transport::new(60.0);
        transport.set_playing(true);
        let mut arp = arp_with(ArpSettings {
            swing: 50.0,
            ..ArpSettings::default()
        });
        arp.set_transport(Some(transport.clock()));
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        // Joining on grid step 1, an off-beat.
        arp.schedule(200, 600, &mut out);
        let ons: Vec<u64> = out.iter().map(|n| n.on_at).collect();
        assert_eq!(ons, vec![375, 500]);
    }

    #[test]
    fn observers_receive_step_events() {
        let mut arp = arp_with(ArpSettings::default());
        let rx = arp.subscribe();
        hold(&mut arp, &[60, 64]);
        let mut out = Vec::new();
        arp.schedule(0, 200, &mut out);

        let events: Vec<ArpStepEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].step_index, 1);
        assert_eq!(events[1].notes, vec![64]);
        assert_eq!(events[1].at_sample, 125);

        drop(rx);
        arp.schedule(200, 400, &mut out);
        assert!(arp.observers.is_empty(), "dropped receivers are pruned");
    }

    #[test]
    fn disabled_arp_schedules_nothing() {
        let mut arp = Arpeggiator::new(SR);
        hold(&mut arp, &[60]);
        let mut out = Vec::new();
        arp.schedule(0, 1000, &mut out);
        assert!(out.is_empty());
        assert_eq!(arp.state(), ArpState::Stopped);
    }
}
