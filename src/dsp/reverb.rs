//! Stereo room reverb for the master bus: eight damped feedback combs in
//! parallel per side, diffused by four allpasses in series.

use super::smoother::ParamSmoother;
use crate::patch::ReverbSettings;

/// Circular buffer shared by the comb and allpass stages.
#[derive(Debug, Clone)]
struct Ring {
    cells: Vec<f32>,
    pos: usize,
}

impl Ring {
    fn with_len(len: usize) -> Self {
        Ring {
            cells: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    /// Read the oldest sample and overwrite it with `write`.
    #[inline]
    fn exchange(&mut self, write: impl FnOnce(f32) -> f32) -> f32 {
        let old = self.cells[self.pos];
        self.cells[self.pos] = write(old);
        self.pos += 1;
        if self.pos == self.cells.len() {
            self.pos = 0;
        }
        old
    }

    fn silence(&mut self) {
        self.cells.fill(0.0);
    }
}

#[derive(Debug, Clone)]
struct Comb {
    ring: Ring,
    gain: f32,
    damp: f32,
    lowpassed: f32,
}

impl Comb {
    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let (gain, damp) = (self.gain, self.damp);
        let lp = &mut self.lowpassed;
        self.ring.exchange(|old| {
            *lp = old + (*lp - old) * damp;
            x + *lp * gain
        })
    }
}

// Delay lengths in samples at 44.1 kHz.
const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const DIFFUSER_LENGTHS: [usize; 4] = [556, 441, 341, 225];
const RIGHT_OFFSET: usize = 23;
const DIFFUSER_GAIN: f32 = 0.5;
const SEND_GAIN: f32 = 0.015;

#[derive(Debug, Clone)]
struct Side {
    combs: Vec<Comb>,
    diffusers: Vec<Ring>,
}

impl Side {
    fn new(scale: f64, offset: usize) -> Self {
        let len = |base: usize| (base as f64 * scale) as usize + offset;
        Side {
            combs: COMB_LENGTHS
                .iter()
                .map(|&b| Comb {
                    ring: Ring::with_len(len(b)),
                    gain: 0.84,
                    damp: 0.2,
                    lowpassed: 0.0,
                })
                .collect(),
            diffusers: DIFFUSER_LENGTHS.iter().map(|&b| Ring::with_len(len(b))).collect(),
        }
    }

    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let sum: f32 = self.combs.iter_mut().map(|c| c.tick(x)).sum();
        self.diffusers.iter_mut().fold(sum, |acc, ring| {
            ring.exchange(|old| acc + old * DIFFUSER_GAIN) - acc
        })
    }

    fn silence(&mut self) {
        for comb in &mut self.combs {
            comb.ring.silence();
            comb.lowpassed = 0.0;
        }
        self.diffusers.iter_mut().for_each(Ring::silence);
    }
}

#[derive(Debug, Clone)]
pub struct Reverb {
    left: Side,
    right: Side,
    room_size: f64,
    damping: f64,
    mix: ParamSmoother,
}

impl Reverb {
    pub fn new(sample_rate: f64, settings: &ReverbSettings, smoothing_ms: f64) -> Self {
        let scale = sample_rate / 44_100.0;
        let mut reverb = Reverb {
            left: Side::new(scale, 0),
            right: Side::new(scale, RIGHT_OFFSET),
            room_size: f64::NAN,
            damping: f64::NAN,
            mix: ParamSmoother::new(settings.mix, smoothing_ms, sample_rate),
        };
        reverb.apply(settings);
        reverb
    }

    /// Room size and damping retune the combs at once; mix ramps.
    pub fn apply(&mut self, settings: &ReverbSettings) {
        self.mix.set_target(settings.mix.clamp(0.0, 1.0));
        let room_size = settings.room_size.clamp(0.0, 1.0);
        let damping = settings.damping.clamp(0.0, 1.0);
        if room_size == self.room_size && damping == self.damping {
            return;
        }
        self.room_size = room_size;
        self.damping = damping;
        let gain = (0.7 + 0.28 * room_size) as f32;
        for comb in self.left.combs.iter_mut().chain(&mut self.right.combs) {
            comb.gain = gain;
            comb.damp = damping as f32;
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let send = (left + right) * SEND_GAIN;
        let (wl, wr) = (self.left.tick(send), self.right.tick(send));
        let wet = self.mix.next() as f32;
        let dry = 1.0 - wet;
        (left * dry + wl * wet, right * dry + wr * wet)
    }

    /// Drop the tail.
    pub fn clear(&mut self) {
        self.left.silence();
        self.right.silence();
    }
}
