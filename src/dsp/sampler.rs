//! Sample playback.
//!
//! Plays a decoded buffer through a trim window, pitch-shifted by linear
//! interpolation resampling relative to the sample's root note. Buffers are
//! immutable and shared between voices through `Arc`.

use std::sync::Arc;

use crate::patch::SamplerSettings;

/// Decoded mono audio at its native rate. Never mutated after decode.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<f64>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        match self.sample_rate {
            0 => 0.0,
            sr => self.data.len() as f64 / sr as f64,
        }
    }

    /// Linear interpolation between neighbouring frames. Positions outside
    /// the buffer read as silence; the last frame is held.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if position < 0.0 {
            return 0.0;
        }
        let i = position.floor() as usize;
        match (self.data.get(i), self.data.get(i + 1)) {
            (Some(&a), Some(&b)) => a + (b - a) * position.fract(),
            (Some(&a), None) => a,
            _ => 0.0,
        }
    }
}

/// One voice's read head over a shared buffer.
#[derive(Debug, Clone)]
pub struct SamplePlayer {
    buffer: Option<Arc<SampleBuffer>>,
    /// Window in buffer frames, `start < end` when playable.
    start: f64,
    end: f64,
    looped: bool,
    /// Frequency at which the sample plays at its native speed.
    root_freq: f64,
    /// Buffer rate / engine rate.
    rate_ratio: f64,
    position: f64,
    finished: bool,
}

impl SamplePlayer {
    /// Build a player for `settings`. With no buffer, or a degenerate trim
    /// window, the player is silent.
    pub fn new(
        buffer: Option<Arc<SampleBuffer>>,
        settings: &SamplerSettings,
        engine_sample_rate: f64,
    ) -> Self {
        let mut player = SamplePlayer {
            buffer: None,
            start: 0.0,
            end: 0.0,
            looped: false,
            root_freq: midi_to_freq(settings.root_midi as f64),
            rate_ratio: 1.0,
            position: 0.0,
            finished: true,
        };
        player.configure(buffer, settings, engine_sample_rate);
        player
    }

    /// Apply new settings while keeping the read position where possible.
    pub fn configure(
        &mut self,
        buffer: Option<Arc<SampleBuffer>>,
        settings: &SamplerSettings,
        engine_sample_rate: f64,
    ) {
        self.looped = settings.looped;
        self.root_freq = midi_to_freq(settings.root_midi as f64);
        self.buffer = buffer.filter(|b| !b.is_empty() && b.sample_rate > 0);
        match &self.buffer {
            Some(buf) if settings.has_audio_window() => {
                let sr = buf.sample_rate as f64;
                let frames = buf.len() as f64;
                self.start = (settings.trim_start * sr).clamp(0.0, frames);
                self.end = (settings.trim_end * sr).clamp(0.0, frames);
                self.rate_ratio = sr / engine_sample_rate;
            }
            _ => {
                self.start = 0.0;
                self.end = 0.0;
            }
        }
        if !self.is_playable() {
            self.finished = true;
        } else if !self.finished {
            self.position = self.position.clamp(self.start, self.end);
        }
    }

    pub fn is_playable(&self) -> bool {
        self.buffer.is_some() && self.end > self.start
    }

    /// Restart from the trim start.
    pub fn trigger(&mut self) {
        self.position = self.start;
        self.finished = !self.is_playable();
    }

    /// True once a one-shot has run off the end of its window.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Render one sample at `frequency`; the root note plays unshifted.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        if self.finished {
            return 0.0;
        }
        let Some(buffer) = &self.buffer else {
            return 0.0;
        };

        let sample = buffer.read_interpolated(self.position);
        let step = (frequency / self.root_freq).max(0.0) * self.rate_ratio;
        self.position += step;

        if self.position >= self.end {
            if self.looped {
                let len = self.end - self.start;
                self.position = self.start + (self.position - self.end) % len;
            } else {
                self.finished = true;
            }
        }

        sample
    }
}

/// Equal-tempered frequency of a (possibly fractional) MIDI note.
#[inline]
pub fn midi_to_freq(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}
