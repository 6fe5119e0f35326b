//! Synth Engine: one playable instrument instance.
//!
//! The engine owns a fixed pool of voices, the engine-wide modulation, the
//! master bus, an arpeggiator and a sample-accurate event queue. Hosts drive
//! it with note and patch calls and pull audio with [`SynthEngine::render`].
//!
//! Nothing on the render path blocks, and per-sample work does not
//! allocate; arp steps build their small chord lists once per step. Patch
//! edits are merged, clamped and turned into one shared `Arc<VoiceSettings>`
//! before any voice sees them, so a render never observes half of a patch.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use super::envelope::EnvelopePhase;
use super::macro_osc::MacroParams;
use super::mixer::MasterBus;
use super::modulation::{ModFrame, ModMatrix};
use super::sample_bank::{AudioDecoder, PreparedSample, SampleBank};
use super::smoother::ParamSmoother;
use super::voice::{Voice, VoiceFrame, VoiceSettings};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::patch::{MacroSettings, Patch, PatchUpdate, SamplerSettings};
use crate::timing::{
    ArpNote, ArpStatus, ArpStepEvent, Arpeggiator, EventQueue, NoteEvent, Origin, TransportClock,
};

/// Pitch bend range in semitones, either direction.
pub const PITCH_BEND_RANGE: f64 = 24.0;

/// Whether the engine is producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Renders silence and holds its clock until `resume`.
    Suspended,
    Running,
    /// Torn down; every call is a no-op.
    Closed,
}

/// Smoothed macro controls for one oscillator slot.
#[derive(Debug, Clone)]
struct MacroSmoother {
    harmonics: ParamSmoother,
    timbre: ParamSmoother,
    morph: ParamSmoother,
    level: ParamSmoother,
}

impl MacroSmoother {
    fn new(s: &MacroSettings, sample_rate: f64, smoothing_ms: f64) -> Self {
        let smoother = |v| ParamSmoother::new(v, smoothing_ms, sample_rate);
        MacroSmoother {
            harmonics: smoother(s.harmonics),
            timbre: smoother(s.timbre),
            morph: smoother(s.morph),
            level: smoother(s.level),
        }
    }

    fn apply(&mut self, s: &MacroSettings) {
        self.harmonics.set_target(s.harmonics);
        self.timbre.set_target(s.timbre);
        self.morph.set_target(s.morph);
        self.level.set_target(s.level);
    }

    fn next(&mut self) -> MacroParams {
        MacroParams {
            harmonics: self.harmonics.next(),
            timbre: self.timbre.next(),
            morph: self.morph.next(),
            level: self.level.next(),
        }
    }
}

/// Ramps for every continuous control voices read per sample.
#[derive(Debug, Clone)]
struct FrameSmoothers {
    pitch_bend: ParamSmoother,
    osc1_level: ParamSmoother,
    osc2_level: ParamSmoother,
    sub_level: ParamSmoother,
    fm_amount: ParamSmoother,
    ring_amount: ParamSmoother,
    cutoff: ParamSmoother,
    resonance: ParamSmoother,
    osc1_macro: MacroSmoother,
    osc2_macro: MacroSmoother,
    engine_macro: MacroSmoother,
}

impl FrameSmoothers {
    fn new(patch: &Patch, sample_rate: f64, smoothing_ms: f64) -> Self {
        let smoother = |v| ParamSmoother::new(v, smoothing_ms, sample_rate);
        FrameSmoothers {
            pitch_bend: smoother(0.0),
            osc1_level: smoother(patch.osc1.level),
            osc2_level: smoother(patch.osc2.level),
            sub_level: smoother(patch.sub.level),
            fm_amount: smoother(patch.fm.amount),
            ring_amount: smoother(patch.ring.amount),
            cutoff: smoother(patch.filter.cutoff),
            resonance: smoother(patch.filter.resonance),
            osc1_macro: MacroSmoother::new(&patch.osc1.macro_osc, sample_rate, smoothing_ms),
            osc2_macro: MacroSmoother::new(&patch.osc2.macro_osc, sample_rate, smoothing_ms),
            engine_macro: MacroSmoother::new(&patch.macro_osc, sample_rate, smoothing_ms),
        }
    }

    fn apply(&mut self, patch: &Patch) {
        self.osc1_level.set_target(patch.osc1.level);
        self.osc2_level.set_target(patch.osc2.level);
        self.sub_level.set_target(patch.sub.level);
        self.fm_amount.set_target(patch.fm.amount);
        self.ring_amount.set_target(patch.ring.amount);
        self.cutoff.set_target(patch.filter.cutoff);
        self.resonance.set_target(patch.filter.resonance);
        self.osc1_macro.apply(&patch.osc1.macro_osc);
        self.osc2_macro.apply(&patch.osc2.macro_osc);
        self.engine_macro.apply(&patch.macro_osc);
    }

    fn next(&mut self, mods: ModFrame) -> VoiceFrame {
        VoiceFrame {
            mods,
            pitch_bend: self.pitch_bend.next(),
            osc1_level: self.osc1_level.next(),
            osc2_level: self.osc2_level.next(),
            sub_level: self.sub_level.next(),
            fm_amount: self.fm_amount.next(),
            ring_amount: self.ring_amount.next(),
            cutoff: self.cutoff.next(),
            resonance: self.resonance.next(),
            osc1_macro: self.osc1_macro.next(),
            osc2_macro: self.osc2_macro.next(),
            engine_macro: self.engine_macro.next(),
        }
    }
}

/// Warn about unrecognised names that changed between two patches.
macro_rules! warn_unknown_names {
    ($new:expr, $old:expr; $($field:literal => $($path:ident).+),+ $(,)?) => {
        $(
            let value = &$new.$($path).+;
            if !value.is_known() && *value != $old.$($path).+ {
                tracing::warn!(field = $field, name = value.as_str(), "unknown name in patch");
            }
        )+
    };
}

pub struct SynthEngine {
    config: EngineConfig,
    state: EngineState,
    patch: Patch,
    voice_settings: Arc<VoiceSettings>,
    voices: Vec<Voice>,
    smoothers: FrameSmoothers,
    last_frame: VoiceFrame,
    mods: ModMatrix,
    bus: MasterBus,
    arp: Arpeggiator,
    queue: EventQueue,
    arp_scratch: Vec<ArpNote>,
    /// Keys physically down, with their velocities, whichever way they are
    /// routed. Lets an arp toggle hand held keys across.
    keys: Vec<(u8, f64)>,
    bank: SampleBank,
    /// Position on the engine's timeline, in samples.
    clock: u64,
    release_timeout: u64,
    schedule_ahead: u64,
}

impl SynthEngine {
    pub fn new(config: EngineConfig) -> Self {
        let mut config = config;
        config.sanitize();
        let sr = config.sample_rate;
        let ms = config.smoothing_ms;
        let seed = config.random_seed.unwrap_or_else(|| fastrand::u64(..));

        let patch = Patch::default();
        let voice_settings = Arc::new(VoiceSettings::from_patch(&patch, None));
        let voices = (0..config.max_voices)
            .map(|i| Voice::new(Arc::clone(&voice_settings), sr, seed.wrapping_add(100 + i as u64)))
            .collect();
        let smoothers = FrameSmoothers::new(&patch, sr, ms);

        tracing::info!(
            sample_rate = sr,
            max_voices = config.max_voices,
            "synth engine created"
        );

        SynthEngine {
            state: EngineState::Suspended,
            voice_settings,
            voices,
            last_frame: VoiceFrame::from_patch(&patch),
            smoothers,
            mods: ModMatrix::new(&patch.lfo1, &patch.lfo2, sr, ms).with_seed(seed.wrapping_add(1)),
            bus: MasterBus::new(patch.master_gain, &patch.effects, sr, ms),
            arp: Arpeggiator::new(sr).with_seed(seed),
            queue: EventQueue::new(),
            arp_scratch: Vec::new(),
            keys: Vec::new(),
            bank: SampleBank::new(),
            clock: 0,
            release_timeout: config.release_timeout_samples(),
            schedule_ahead: config.schedule_ahead_samples(),
            patch,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current position in samples.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Unlock audio output. Safe to call repeatedly.
    pub fn resume(&mut self) {
        if self.state == EngineState::Suspended {
            tracing::info!("engine resumed");
            self.state = EngineState::Running;
        }
    }

    pub fn suspend(&mut self) {
        if self.state == EngineState::Running {
            tracing::info!("engine suspended");
            self.state = EngineState::Suspended;
        }
    }

    /// Tear down: silence every voice and drop all pending events.
    pub fn close(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }
        for voice in &mut self.voices {
            voice.kill();
        }
        self.queue.clear();
        self.keys.clear();
        self.arp.clear();
        self.arp.take_cancel();
        self.bus.clear();
        self.state = EngineState::Closed;
        tracing::info!("engine closed");
    }

    fn is_closed(&self) -> bool {
        self.state == EngineState::Closed
    }

    // ── Patch ───────────────────────────────────────────────

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Replace the whole patch. Continuous values ramp; discrete changes
    /// rebuild only the voice sources they affect.
    pub fn apply_patch(&mut self, patch: &Patch) {
        if self.is_closed() {
            return;
        }
        let mut patch = patch.clone();
        patch.sanitize();
        warn_unknown_names!(patch, self.patch;
            "engine" => engine,
            "osc1.mode" => osc1.mode,
            "osc1.waveform" => osc1.waveform,
            "osc1.macro.model" => osc1.macro_osc.model,
            "osc2.mode" => osc2.mode,
            "osc2.waveform" => osc2.waveform,
            "osc2.macro.model" => osc2.macro_osc.model,
            "sub.waveform" => sub.waveform,
            "filter.type" => filter.filter_type,
            "lfo1.waveform" => lfo1.waveform,
            "lfo1.destination" => lfo1.destination,
            "lfo2.waveform" => lfo2.waveform,
            "lfo2.destination" => lfo2.destination,
            "macro.model" => macro_osc.model,
            "arp.mode" => arp.mode,
            "arp.chordSource" => arp.chord_source,
            "arp.chord" => arp.chord,
            "arp.division" => arp.division,
        );

        let sample = self.bank.resolve(&patch.sampler);
        let arp_was_enabled = self.arp.is_enabled();
        let settings = VoiceSettings::from_patch(&patch, sample);
        if self.voice_settings.needs_rebuild(&settings) {
            tracing::info!(
                engine = %settings.engine,
                filter = %settings.filter_type,
                "rebuilding voice sources"
            );
        }
        let settings = Arc::new(settings);
        for voice in &mut self.voices {
            voice.apply(Arc::clone(&settings));
        }
        self.voice_settings = settings;

        self.smoothers.apply(&patch);
        self.mods.apply(&patch.lfo1, &patch.lfo2);
        self.bus.apply(patch.master_gain, &patch.effects);
        self.arp.apply(&patch.arp, &patch.sequencer);
        self.patch = patch;
        match (arp_was_enabled, self.arp.is_enabled()) {
            (false, true) => self.keys_to_arp(),
            (true, false) => self.keys_to_voices(),
            _ => {}
        }
        self.flush_arp_cancel();
    }

    /// Apply a patch whose inline sample was decoded ahead of time, so the
    /// call itself does no decoding.
    pub fn apply_prepared(&mut self, patch: &Patch, sample: Option<PreparedSample>) {
        let Some(sample) = sample else {
            self.apply_patch(patch);
            return;
        };
        let mut patch = patch.clone();
        if patch.sampler.id.is_empty() {
            patch.sampler.id = sample.id().to_string();
        }
        self.bank.insert_prepared(sample);
        self.apply_patch(&patch);
    }

    /// The arp was just switched on: direct voices for held keys release
    /// and the keys become the arp's held set.
    fn keys_to_arp(&mut self) {
        for i in 0..self.keys.len() {
            let (note, velocity) = self.keys[i];
            self.release_voice(note);
            self.arp.note_on(note, velocity);
        }
    }

    /// The arp was just switched off: keys still down play directly.
    fn keys_to_voices(&mut self) {
        self.arp.clear();
        self.flush_arp_cancel();
        for i in 0..self.keys.len() {
            let (note, velocity) = self.keys[i];
            self.start_voice(note, velocity);
        }
    }

    /// Merge a partial patch onto the current one, field by field.
    pub fn apply_update(&mut self, update: &PatchUpdate) {
        let next = update.applied_to(&self.patch);
        self.apply_patch(&next);
    }

    /// Parse and merge a full or partial patch document.
    pub fn apply_patch_json(&mut self, json: &str) -> Result<(), EngineError> {
        let update = PatchUpdate::from_json(json)?;
        self.apply_update(&update);
        Ok(())
    }

    // ── Notes ───────────────────────────────────────────────

    /// Start a note. Routed to the arpeggiator while it is enabled; a zero
    /// velocity is a note-off.
    pub fn note_on(&mut self, note: u8, velocity: f64) {
        if self.is_closed() || note > 127 {
            return;
        }
        if velocity <= 0.0 || velocity.is_nan() {
            self.note_off(note);
            return;
        }
        match self.keys.iter_mut().find(|(n, _)| *n == note) {
            Some(key) => key.1 = velocity,
            None => self.keys.push((note, velocity)),
        }
        if self.arp.is_enabled() {
            self.arp.note_on(note, velocity);
        } else {
            self.start_voice(note, velocity);
        }
    }

    /// Release a note. Unknown notes are ignored.
    pub fn note_off(&mut self, note: u8) {
        if self.is_closed() {
            return;
        }
        self.keys.retain(|(n, _)| *n != note);
        if self.arp.is_enabled() {
            self.arp.note_off(note);
            self.flush_arp_cancel();
        } else {
            self.release_voice(note);
        }
    }

    /// Play a note for `duration_ms`, bypassing the arpeggiator.
    pub fn preview_note(&mut self, note: u8, duration_ms: f64) {
        if self.is_closed() || note > 127 {
            return;
        }
        let length = (duration_ms.max(0.0) / 1000.0 * self.config.sample_rate).round() as u64;
        self.queue
            .push_note(Origin::Preview, note, 1.0, self.clock, self.clock + length);
    }

    /// Bend every voice by `semitones`, clamped to ±24.
    pub fn set_pitch_bend(&mut self, semitones: f64) {
        if semitones.is_nan() {
            return;
        }
        self.smoothers
            .pitch_bend
            .set_target(semitones.clamp(-PITCH_BEND_RANGE, PITCH_BEND_RANGE));
    }

    fn start_voice(&mut self, note: u8, velocity: f64) {
        let clock = self.clock;
        let frame = self.last_frame;

        if let Some(voice) = self
            .voices
            .iter_mut()
            .find(|v| !v.is_finished() && v.note() == note)
        {
            tracing::debug!(note, "retrigger");
            voice.note_on(note, velocity, clock, &frame);
            return;
        }

        let idx = match self.voices.iter().position(|v| v.is_finished()) {
            Some(idx) => idx,
            None => {
                let idx = self.steal_candidate();
                tracing::debug!(note, stolen = self.voices[idx].note(), "voice steal");
                self.voices[idx].kill();
                idx
            }
        };
        tracing::debug!(note, voice = idx, "voice on");
        self.voices[idx].note_on(note, velocity, clock, &frame);
    }

    /// Oldest releasing voice, else the oldest voice.
    fn steal_candidate(&self) -> usize {
        let oldest = |released: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| !released || v.is_released())
                .min_by_key(|(_, v)| v.started_at())
                .map(|(i, _)| i)
        };
        oldest(true).or_else(|| oldest(false)).unwrap_or(0)
    }

    fn release_voice(&mut self, note: u8) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| !v.is_finished() && !v.is_released() && v.note() == note)
        {
            voice.note_off();
        }
    }

    /// Number of voices currently sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_finished()).count()
    }

    /// Note and envelope phase of every sounding voice.
    pub fn voice_states(&self) -> Vec<(u8, EnvelopePhase)> {
        self.voices
            .iter()
            .filter(|v| !v.is_finished())
            .map(|v| (v.note(), v.phase()))
            .collect()
    }

    // ── Arpeggiator / transport ─────────────────────────────

    /// Forget held and latched notes and stop the arp. Sounding notes
    /// release naturally.
    pub fn arp_clear(&mut self) {
        if self.is_closed() {
            return;
        }
        self.arp.clear();
        self.flush_arp_cancel();
    }

    pub fn arp_status(&self) -> ArpStatus {
        self.arp.status()
    }

    pub fn subscribe_arp(&mut self) -> Receiver<ArpStepEvent> {
        self.arp.subscribe()
    }

    /// Follow a shared transport. `None` returns to the patch's own tempo.
    ///
    /// An engine that is behind the transport's position jumps forward to
    /// it, so every lane counts samples on the same timeline.
    pub fn attach_transport(&mut self, clock: Option<TransportClock>) {
        if let Some(transport) = &clock {
            let at = (transport.position_secs() * self.config.sample_rate).round() as u64;
            if at > self.clock {
                tracing::debug!(from = self.clock, to = at, "engine clock joins transport");
                self.clock = at;
            }
        }
        self.arp.set_transport(clock);
        self.report_position();
    }

    fn report_position(&self) {
        if let Some(transport) = self.arp.transport() {
            transport.report_position(self.clock as f64 / self.config.sample_rate);
        }
    }

    /// Drop queued arp notes after a stop and release the ones sounding.
    fn flush_arp_cancel(&mut self) {
        if !self.arp.take_cancel() {
            return;
        }
        for note in self.queue.cancel(Origin::Arp) {
            self.release_voice(note);
        }
    }

    fn schedule_arp(&mut self, horizon: u64) {
        self.flush_arp_cancel();
        self.arp.schedule(self.clock, horizon, &mut self.arp_scratch);
        for n in self.arp_scratch.drain(..) {
            self.queue
                .push_note(Origin::Arp, n.note, n.velocity, n.on_at, n.off_at);
        }
        // The transport may have paused the arp during scheduling.
        self.flush_arp_cancel();
    }

    // ── Samples ─────────────────────────────────────────────

    /// Decode and store a sample, returning a descriptor covering it in full.
    pub fn ingest_sample(
        &mut self,
        name: &str,
        bytes: &[u8],
        decoder: &dyn AudioDecoder,
    ) -> Result<SamplerSettings, EngineError> {
        self.bank.ingest(name, bytes, decoder)
    }

    pub fn sample_bank(&self) -> &SampleBank {
        &self.bank
    }

    pub fn sample_bank_mut(&mut self) -> &mut SampleBank {
        &mut self.bank
    }

    // ── Rendering ───────────────────────────────────────────

    /// Render one block into separate channel buffers. A suspended or
    /// closed engine writes silence and does not advance.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.state != EngineState::Running {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            return;
        }

        self.schedule_arp(self.clock + frames as u64 + self.schedule_ahead);

        for i in 0..frames {
            self.dispatch_due();
            let frame = self.smoothers.next(self.mods.next_frame());
            self.last_frame = frame;

            let mut sum = 0.0;
            for voice in self.voices.iter_mut().filter(|v| !v.is_finished()) {
                sum += voice.next_sample(&frame);
            }
            let (l, r) = self.bus.process(sum);
            left[i] = l;
            right[i] = r;
            self.clock += 1;
        }

        self.reap_voices();
        self.report_position();
    }

    /// Move the clock on by `frames` without rendering, after the host had
    /// to drop a block. Events that fell due fire on the next render.
    pub fn skip(&mut self, frames: u64) {
        if self.state != EngineState::Running || frames == 0 {
            return;
        }
        tracing::debug!(frames, "engine skipped a block");
        self.clock += frames;
        self.report_position();
    }

    /// Render interleaved stereo frames. A trailing half frame is zeroed.
    pub fn render_interleaved(&mut self, out: &mut [f32]) {
        let even = out.len() & !1;
        let (out, tail) = out.split_at_mut(even);
        tail.fill(0.0);
        let mut left = [0.0f32; 256];
        let mut right = [0.0f32; 256];
        for chunk in out.chunks_mut(left.len() * 2) {
            let frames = chunk.len() / 2;
            self.render(&mut left[..frames], &mut right[..frames]);
            for (i, pair) in chunk.chunks_exact_mut(2).enumerate() {
                pair[0] = left[i];
                pair[1] = right[i];
            }
        }
    }

    fn dispatch_due(&mut self) {
        while let Some(event) = self.queue.pop_due(self.clock) {
            match event.event {
                NoteEvent::On { note, velocity } => self.start_voice(note, velocity),
                NoteEvent::Off { note } => self.release_voice(note),
            }
        }
    }

    /// Force-stop voices whose release outlived the timeout.
    fn reap_voices(&mut self) {
        let timeout = self.release_timeout;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| !v.is_finished() && v.release_elapsed() > timeout)
        {
            tracing::warn!(note = voice.note(), "voice reclaimed after release timeout");
            voice.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::sample_bank::PcmDecoder;
    use crate::patch::{ArpMode, EngineMode, FilterType, Waveform};
    use crate::timing::Transport;

    const SR: f64 = 8000.0;

    fn engine() -> SynthEngine {
        let mut e = SynthEngine::new(EngineConfig {
            sample_rate: SR,
            max_voices: 4,
            smoothing_ms: 1.0,
            random_seed: Some(1),
            ..EngineConfig::default()
        });
        e.resume();
        e
    }

    fn render(e: &mut SynthEngine, frames: usize) -> Vec<f32> {
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        e.render(&mut left, &mut right);
        left
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Render in 128-frame blocks, the way an audio callback would.
    fn run(e: &mut SynthEngine, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames);
        let mut left = [0.0f32; 128];
        let mut right = [0.0f32; 128];
        while out.len() < frames {
            let n = (frames - out.len()).min(128);
            e.render(&mut left[..n], &mut right[..n]);
            out.extend_from_slice(&left[..n]);
        }
        out
    }

    #[test]
    fn suspended_engine_is_silent() {
        let mut e = SynthEngine::new(EngineConfig::with_sample_rate(SR));
        e.note_on(60, 1.0);
        assert_eq!(peak(&render(&mut e, 256)), 0.0);
        assert_eq!(e.clock(), 0, "a suspended engine holds its clock");
        e.resume();
        assert!(peak(&render(&mut e, 256)) > 0.01);
    }

    #[test]
    fn note_on_and_off_run_the_envelope() {
        let mut e = engine();
        e.note_on(60, 1.0);
        render(&mut e, 400);
        assert_eq!(e.voice_states(), vec![(60, EnvelopePhase::Decaying)]);
        e.note_off(60);
        assert_eq!(e.voice_states()[0].1, EnvelopePhase::Releasing);
        run(&mut e, SR as usize * 2);
        assert_eq!(e.active_voices(), 0, "released voice is reclaimed");
    }

    #[test]
    fn unknown_note_off_is_a_no_op() {
        let mut e = engine();
        e.note_off(42);
        e.note_on(60, 1.0);
        e.note_off(61);
        assert_eq!(e.active_voices(), 1);
    }

    #[test]
    fn zero_velocity_releases() {
        let mut e = engine();
        e.note_on(60, 1.0);
        e.note_on(60, 0.0);
        assert!(e.voice_states().iter().all(|(_, p)| *p == EnvelopePhase::Releasing));
    }

    #[test]
    fn retrigger_reuses_the_voice() {
        let mut e = engine();
        e.note_on(60, 1.0);
        render(&mut e, 200);
        e.note_on(60, 1.0);
        assert_eq!(e.active_voices(), 1);
    }

    #[test]
    fn steals_oldest_voice_when_full() {
        let mut e = engine();
        for (i, n) in [60, 62, 64, 65].iter().enumerate() {
            e.note_on(*n, 1.0);
            render(&mut e, 10 + i);
        }
        e.note_off(62);
        e.note_on(67, 1.0);
        let notes: Vec<u8> = e.voice_states().iter().map(|(n, _)| *n).collect();
        assert_eq!(notes.len(), 4);
        assert!(!notes.contains(&62), "the releasing voice goes first: {notes:?}");

        e.note_on(69, 1.0);
        let notes: Vec<u8> = e.voice_states().iter().map(|(n, _)| *n).collect();
        assert!(!notes.contains(&60), "then the oldest: {notes:?}");
    }

    #[test]
    fn apply_patch_is_idempotent() {
        let mut e = engine();
        let mut patch = Patch::default();
        patch.filter.filter_type = FilterType::Highpass;
        patch.filter.cutoff = 800.0;
        patch.arp.swing = 30.0;

        e.apply_patch(&patch);
        let once = e.patch().clone();
        let settings = Arc::clone(&e.voice_settings);
        e.apply_patch(&once);
        assert_eq!(e.patch(), &once);
        assert!(!settings.needs_rebuild(&e.voice_settings));
    }

    #[test]
    fn partial_json_merges_field_by_field() {
        let mut e = engine();
        e.apply_patch_json(r#"{"filter": {"type": "bandpass"}}"#).unwrap();
        e.apply_patch_json(r#"{"filter": {"cutoff": 800}}"#).unwrap();
        assert_eq!(e.patch().filter.filter_type, FilterType::Bandpass);
        assert_eq!(e.patch().filter.cutoff, 800.0);
        assert_eq!(e.patch().envelope, Patch::default().envelope);
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut e = engine();
        let err = e.apply_patch_json("{not json").unwrap_err();
        assert!(matches!(err, EngineError::Json(_)));
        assert_eq!(e.patch(), &Patch::default(), "a failed parse changes nothing");
    }

    #[test]
    fn unknown_waveform_renders_silence_without_failing() {
        let mut e = engine();
        e.apply_patch_json(
            r#"{"osc1": {"waveform": "wobble"}, "osc2": {"waveform": "wobble"}}"#,
        )
        .unwrap();
        assert_eq!(e.patch().osc1.waveform, Waveform::Unknown("wobble".into()));
        e.note_on(60, 1.0);
        assert_eq!(peak(&render(&mut e, 512)), 0.0);
    }

    #[test]
    fn preview_note_releases_itself() {
        let mut e = engine();
        e.preview_note(36, 50.0);
        render(&mut e, 100);
        assert_eq!(e.voice_states(), vec![(36, EnvelopePhase::Decaying)]);
        render(&mut e, 400);
        assert_eq!(e.voice_states()[0].1, EnvelopePhase::Releasing);
        run(&mut e, SR as usize * 2);
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn arp_plays_steps_and_stops_on_release() {
        let mut e = engine();
        e.apply_patch_json(r#"{"arp": {"enabled": true, "gate": 0.5}}"#).unwrap();
        e.note_on(60, 1.0);
        e.note_on(64, 1.0);
        assert_eq!(e.active_voices(), 0, "held notes go to the arp, not straight to voices");

        // 120 BPM sixteenths at 8 kHz: 1000 samples per step.
        run(&mut e, 10);
        assert_eq!(e.voice_states(), vec![(60, EnvelopePhase::Attacking)]);
        run(&mut e, 1000);
        assert!(e.voice_states().contains(&(64, EnvelopePhase::Attacking)));
        assert_eq!(e.arp_status().length, 2);

        e.note_off(60);
        e.note_off(64);
        run(&mut e, 4000);
        let notes: Vec<u8> = e.voice_states().iter().map(|(n, _)| *n).collect();
        assert!(
            e.voice_states().iter().all(|(_, p)| *p == EnvelopePhase::Releasing) || notes.is_empty(),
            "no new steps after release: {:?}",
            e.voice_states()
        );
    }

    #[test]
    fn arp_clear_keeps_settings() {
        let mut e = engine();
        e.apply_patch_json(r#"{"arp": {"enabled": true, "latch": true, "mode": "down"}}"#)
            .unwrap();
        e.note_on(60, 1.0);
        e.note_off(60);
        run(&mut e, 3000);
        assert!(e.active_voices() > 0, "latched notes keep playing");
        e.arp_clear();
        assert!(e.arp_status().enabled);
        assert_eq!(e.patch().arp.mode, ArpMode::Down);
        run(&mut e, SR as usize * 2);
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn arp_follows_a_stopped_transport() {
        let transport = Transport::new(120.0);
        let mut e = engine();
        e.attach_transport(Some(transport.clock()));
        e.apply_patch_json(r#"{"arp": {"enabled": true}}"#).unwrap();
        e.note_on(60, 1.0);
        run(&mut e, 2000);
        assert_eq!(e.active_voices(), 0);
        transport.set_playing(true);
        run(&mut e, 10);
        assert_eq!(e.active_voices(), 1);
    }

    #[test]
    fn arp_events_reach_subscribers() {
        let mut e = engine();
        let rx = e.subscribe_arp();
        e.apply_patch_json(r#"{"arp": {"enabled": true, "chord": "major"}}"#).unwrap();
        e.note_on(60, 1.0);
        run(&mut e, 10);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.notes, vec![60, 64, 67]);
        assert_eq!(event.step_index, 0);
    }

    #[test]
    fn close_silences_and_ignores_further_calls() {
        let mut e = engine();
        e.note_on(60, 1.0);
        render(&mut e, 64);
        e.close();
        assert_eq!(e.state(), EngineState::Closed);
        assert_eq!(e.active_voices(), 0);
        e.note_on(62, 1.0);
        e.resume();
        assert_eq!(e.state(), EngineState::Closed);
        assert_eq!(peak(&render(&mut e, 64)), 0.0);
    }

    #[test]
    fn release_timeout_reclaims_long_tails() {
        let mut e = SynthEngine::new(EngineConfig {
            sample_rate: SR,
            release_timeout_secs: 0.1,
            ..EngineConfig::default()
        });
        e.resume();
        e.apply_patch_json(r#"{"envelope": {"release": 10}}"#).unwrap();
        e.note_on(60, 1.0);
        render(&mut e, 100);
        e.note_off(60);
        run(&mut e, 2000);
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn sampler_engine_plays_an_ingested_sample() {
        let mut e = engine();
        let pcm: Vec<u8> = (0..4000)
            .map(|i| ((i as f64 * 0.2).sin() * 20000.0) as i16)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let sampler = e
            .ingest_sample("tone", &pcm, &PcmDecoder::mono16(8000))
            .unwrap();
        assert!((sampler.duration - 0.5).abs() < 1e-9);

        let mut patch = Patch::default();
        patch.engine = EngineMode::Sampler;
        patch.sampler = sampler;
        patch.filter.cutoff = 20_000.0;
        e.apply_patch(&patch);
        e.note_on(60, 1.0);
        assert!(peak(&render(&mut e, 512)) > 0.05);
    }

    #[test]
    fn pitch_bend_is_clamped() {
        let mut e = engine();
        e.set_pitch_bend(100.0);
        assert_eq!(e.smoothers.pitch_bend.target(), PITCH_BEND_RANGE);
    }

    #[test]
    fn render_interleaved_matches_channel_count() {
        let mut e = engine();
        e.note_on(60, 1.0);
        let mut out = vec![0.0f32; 1000];
        e.render_interleaved(&mut out);
        assert_eq!(e.clock(), 500);
        assert!(out.chunks(2).all(|p| p[0] == p[1]), "mono voices feed both channels");
    }

    #[test]
    fn render_interleaved_zeroes_a_trailing_half_frame() {
        let mut e = engine();
        e.note_on(60, 1.0);
        let mut out = vec![7.0f32; 9];
        e.render_interleaved(&mut out);
        assert_eq!(e.clock(), 4);
        assert_eq!(out[8], 0.0);
        assert!(out[..8].iter().all(|s| *s != 7.0));
    }

    #[test]
    fn enabling_the_arp_hands_held_keys_over() {
        let mut e = engine();
        e.note_on(60, 1.0);
        render(&mut e, 1000);
        e.apply_patch_json(r#"{"arp": {"enabled": true}}"#).unwrap();
        assert_eq!(e.arp.held_notes(), &[60]);
        assert!(e.voice_states().iter().all(|(_, p)| *p != EnvelopePhase::Sustaining));

        e.note_off(60);
        run(&mut e, SR as usize * 3);
        assert_eq!(e.active_voices(), 0, "the key's voice released with the key");
    }

    #[test]
    fn disabling_the_arp_hands_held_keys_back() {
        let mut e = engine();
        e.apply_patch_json(r#"{"arp": {"enabled": true}}"#).unwrap();
        e.note_on(60, 1.0);
        run(&mut e, 1000);
        e.apply_patch_json(r#"{"arp": {"enabled": false}}"#).unwrap();
        run(&mut e, SR as usize * 2);
        assert_eq!(e.voice_states(), vec![(60, EnvelopePhase::Sustaining)]);

        e.note_off(60);
        run(&mut e, SR as usize * 3);
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn attaching_late_joins_the_transport_timeline() {
        let transport = Transport::new(120.0);
        let mut first = engine();
        first.attach_transport(Some(transport.clock()));
        run(&mut first, 3000);
        assert_eq!(transport.position_secs(), 3000.0 / SR);

        let mut late = engine();
        late.attach_transport(Some(transport.clock()));
        assert_eq!(late.clock(), 3000);
    }

    #[test]
    fn skip_moves_the_clock_without_rendering() {
        let mut e = engine();
        e.preview_note(60, 10.0);
        e.skip(400);
        assert_eq!(e.clock(), 400);
        render(&mut e, 1);
        assert_eq!(e.voice_states(), vec![(60, EnvelopePhase::Releasing)]);

        e.suspend();
        e.skip(400);
        assert_eq!(e.clock(), 401, "a suspended engine holds its clock");
    }

    #[test]
    fn prepared_sample_is_used_as_is() {
        let mut e = engine();
        let mut patch = Patch::default();
        patch.engine = EngineMode::Sampler;
        patch.sampler.audio = Some(crate::dsp::sample_bank::encode_inline_pcm(&[8000; 800], 8000));
        patch.sampler.duration = 0.1;
        patch.sampler.set_trim(0.0, 0.1);
        let prepared = PreparedSample::decode(&patch.sampler).unwrap();
        let id = prepared.id().to_string();

        e.apply_prepared(&patch, Some(prepared));
        assert_eq!(e.patch().sampler.id, id);
        assert!(!e.sample_bank().needs_decode(&e.patch().sampler));
        e.note_on(60, 1.0);
        assert!(peak(&render(&mut e, 400)) > 0.01);
    }
}
