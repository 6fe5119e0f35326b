//! Scratch channel buffers for host audio callbacks.

use super::engine::SynthEngine;

/// A pair of channel buffers sized once, up front, so a callback never
/// allocates. Remembers the last block so a callback that cannot reach the
/// engine can fade it out instead of cutting to silence.
#[derive(Debug, Clone)]
pub struct StereoBlock {
    left: Vec<f32>,
    right: Vec<f32>,
    /// Frames in the last block written.
    frames: usize,
    /// Frames the engine missed while it was unreachable.
    missed: u64,
}

impl StereoBlock {
    pub fn new(capacity: usize) -> Self {
        StereoBlock {
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            frames: 0,
            missed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    pub fn left(&self) -> &[f32] {
        &self.left[..self.frames]
    }

    pub fn right(&self) -> &[f32] {
        &self.right[..self.frames]
    }

    fn reserve(&mut self, frames: usize) {
        if frames > self.left.len() {
            tracing::warn!(frames, capacity = self.left.len(), "audio block larger than expected");
            self.left.resize(frames, 0.0);
            self.right.resize(frames, 0.0);
        }
    }

    /// Render `frames` frames. Time lost while the engine was unreachable
    /// is skipped first, so the engine stays on the host's clock.
    pub fn render(&mut self, engine: &mut SynthEngine, frames: usize) {
        self.reserve(frames);
        engine.skip(std::mem::take(&mut self.missed));
        engine.render(&mut self.left[..frames], &mut self.right[..frames]);
        self.frames = frames;
    }

    /// Fill `frames` frames without the engine: the previous block again,
    /// faded to zero across the block.
    pub fn hold(&mut self, frames: usize) {
        self.reserve(frames);
        let keep = self.frames.min(frames);
        self.left[keep..frames].fill(0.0);
        self.right[keep..frames].fill(0.0);
        let step = 1.0 / frames.max(1) as f32;
        for i in 0..keep {
            let gain = 1.0 - (i + 1) as f32 * step;
            self.left[i] *= gain;
            self.right[i] *= gain;
        }
        self.frames = frames;
        self.missed += frames as u64;
    }

    /// Copy the last block into an interleaved buffer of `channels`
    /// channels, converting each sample with `convert`. Even channels take
    /// the left signal, odd channels the right.
    pub fn write_interleaved<T>(&self, out: &mut [T], channels: usize, convert: impl Fn(f32) -> T) {
        let channels = channels.max(1);
        for (i, frame) in out.chunks_exact_mut(channels).take(self.frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = convert(if ch % 2 == 0 { self.left[i] } else { self.right[i] });
            }
        }
    }
}
