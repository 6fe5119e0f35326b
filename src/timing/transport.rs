//! Shared tempo, play state and beat grid.
//!
//! One [`Transport`] owns the clock and is the only handle that can change
//! tempo or play state. Any number of [`TransportClock`] handles can be
//! passed to engine instances so every lane follows the same tempo, step
//! count and beat grid. State lives in atomics, so readers never lock and
//! never block the render callback.
//!
//! Time on the shared timeline is in seconds. Engines report how far they
//! have rendered; the furthest report is the transport's position. The
//! grid places beat 0 at an origin on that timeline, so a lane that joins
//! late still lands its steps on the same beats as the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug)]
struct TransportState {
    /// f64 bits of the tempo.
    bpm: AtomicU64,
    playing: AtomicBool,
    tick: AtomicU64,
    /// f64 bits: where beat 0 falls on the shared timeline, in seconds.
    origin: AtomicU64,
    /// f64 bits: furthest time any reader has rendered to. Never negative,
    /// so the raw bits order the same way as the values.
    position: AtomicU64,
    /// Odd while `bpm` and `origin` are being rewritten together.
    seq: AtomicU64,
}

impl TransportState {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    fn grid(&self) -> BeatGrid {
        loop {
            let before = self.seq.load(Ordering::SeqCst);
            if before % 2 == 0 {
                let grid = BeatGrid {
                    origin_secs: f64::from_bits(self.origin.load(Ordering::SeqCst)),
                    bpm: f64::from_bits(self.bpm.load(Ordering::SeqCst)),
                };
                if self.seq.load(Ordering::SeqCst) == before {
                    return grid;
                }
            }
            std::hint::spin_loop();
        }
    }

    fn write_grid(&self, grid: BeatGrid) {
        loop {
            let seq = self.seq.load(Ordering::SeqCst);
            if seq % 2 == 0
                && self
                    .seq
                    .compare_exchange(seq, seq + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                break;
            }
            std::hint::spin_loop();
        }
        self.bpm.store(grid.bpm.to_bits(), Ordering::SeqCst);
        self.origin.store(grid.origin_secs.to_bits(), Ordering::SeqCst);
        self.seq.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tempo plus the time of beat 0: maps shared-timeline seconds to beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatGrid {
    pub origin_secs: f64,
    pub bpm: f64,
}

impl BeatGrid {
    pub fn beat_at(&self, secs: f64) -> f64 {
        (secs - self.origin_secs) * self.bpm / 60.0
    }

    pub fn secs_at(&self, beat: f64) -> f64 {
        self.origin_secs + beat * 60.0 / self.bpm
    }
}

/// The writable side of the shared clock. Not `Clone`: there is exactly one
/// owner.
#[derive(Debug)]
pub struct Transport {
    state: Arc<TransportState>,
}

/// A handle to a [`Transport`] that can read it and report render progress,
/// but not change tempo or play state.
#[derive(Debug, Clone)]
pub struct TransportClock {
    state: Arc<TransportState>,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::new(DEFAULT_BPM)
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Transport {
            state: Arc::new(TransportState {
                bpm: AtomicU64::new(clamp_bpm(bpm).to_bits()),
                playing: AtomicBool::new(false),
                tick: AtomicU64::new(0),
                origin: AtomicU64::new(0.0f64.to_bits()),
                position: AtomicU64::new(0.0f64.to_bits()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Hand out a reader handle.
    pub fn clock(&self) -> TransportClock {
        TransportClock {
            state: Arc::clone(&self.state),
        }
    }

    /// Set the tempo, clamped to 20..=300 BPM. Returns the stored value.
    ///
    /// While playing, the grid is rebased at the current position so the
    /// beat count carries on without a jump.
    pub fn set_tempo(&self, bpm: f64) -> f64 {
        let bpm = clamp_bpm(bpm);
        let grid = self.state.grid();
        let origin_secs = if self.is_playing() {
            let pos = self.state.position();
            pos - grid.beat_at(pos) * 60.0 / bpm
        } else {
            grid.origin_secs
        };
        self.state.write_grid(BeatGrid { origin_secs, bpm });
        tracing::debug!(bpm, "transport tempo");
        bpm
    }

    /// Start or stop. Starting from a stop puts beat 0 at the current
    /// position.
    pub fn set_playing(&self, playing: bool) {
        if playing && !self.is_playing() {
            let grid = self.state.grid();
            self.state.write_grid(BeatGrid {
                origin_secs: self.state.position(),
                ..grid
            });
        }
        let was = self.state.playing.swap(playing, Ordering::AcqRel);
        if was != playing {
            tracing::info!(playing, "transport play state");
        }
    }

    /// Reset the tick counter to zero. Only while stopped, so running
    /// consumers never see the counter go backwards.
    pub fn rewind(&self) -> bool {
        if self.is_playing() {
            return false;
        }
        self.state.tick.store(0, Ordering::Release);
        true
    }

    /// Advance one tick if playing. Returns the current tick.
    pub fn tick(&self) -> u64 {
        if self.is_playing() {
            self.state.tick.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.state.tick.load(Ordering::Acquire)
        }
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.state.bpm.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.state.tick.load(Ordering::Acquire)
    }

    /// Furthest time any attached engine has rendered to, in seconds.
    pub fn position_secs(&self) -> f64 {
        self.state.position()
    }

    pub fn grid(&self) -> BeatGrid {
        self.state.grid()
    }
}

impl TransportClock {
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.state.bpm.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    pub fn tick(&self) -> u64 {
        self.state.tick.load(Ordering::Acquire)
    }

    /// Tempo and beat origin, read as one consistent pair.
    pub fn grid(&self) -> BeatGrid {
        self.state.grid()
    }

    pub fn position_secs(&self) -> f64 {
        self.state.position()
    }

    /// Record that this reader has rendered up to `secs`. The shared
    /// position only moves forward.
    pub fn report_position(&self, secs: f64) {
        if secs.is_finite() && secs > 0.0 {
            self.state.position.fetch_max(secs.to_bits(), Ordering::AcqRel);
        }
    }

    /// Position in a pattern of `len` steps, one step per tick.
    pub fn step_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.tick() % len as u64) as usize
    }

    /// Both handles refer to the same transport.
    pub fn same_transport(&self, other: &TransportClock) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() {
        DEFAULT_BPM
    } else {
        bpm.clamp(MIN_BPM, MAX_BPM)
    }
}

/// Drives a [`Transport`] from wall-clock time at a fixed number of ticks
/// per beat.
///
/// When the caller falls behind by more than `max_catch_up` ticks, the
/// backlog is dropped and the grid restarts from the current time instead
/// of replaying every missed tick.
#[derive(Debug, Clone)]
pub struct StepClock {
    ticks_per_beat: u32,
    max_catch_up: u32,
    next_tick_secs: Option<f64>,
}

impl StepClock {
    pub fn new(ticks_per_beat: u32) -> Self {
        StepClock {
            ticks_per_beat: ticks_per_beat.max(1),
            max_catch_up: 4,
            next_tick_secs: None,
        }
    }

    pub fn with_max_catch_up(mut self, max_catch_up: u32) -> Self {
        self.max_catch_up = max_catch_up.max(1);
        self
    }

    /// Advance `transport` up to `now_secs`. Returns the ticks emitted.
    pub fn poll(&mut self, transport: &Transport, now_secs: f64) -> u32 {
        if !transport.is_playing() {
            self.next_tick_secs = None;
            return 0;
        }
        let interval = 60.0 / transport.bpm() / self.ticks_per_beat as f64;
        let next = *self.next_tick_secs.get_or_insert(now_secs);

        let due = ((now_secs - next) / interval).floor() as i64 + 1;
        if due <= 0 {
            return 0;
        }
        let due = due as u64;
        if due > self.max_catch_up as u64 {
            tracing::warn!(missed = due - 1, "transport fell behind; resyncing");
            transport.tick();
            self.next_tick_secs = Some(now_secs + interval);
            return 1;
        }
        for _ in 0..due {
            transport.tick();
        }
        self.next_tick_secs = Some(next + due as f64 * interval);
        due as u32
    }
}
