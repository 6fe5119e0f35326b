//! Native audio output through cpal.
//!
//! The engine sits behind a mutex shared between the caller and the audio
//! callback. The callback only ever `try_lock`s; if a control call holds the
//! lock at that moment it fades out the previous block instead of waiting,
//! and the engine skips the lost time on the next block. Control calls that
//! decode sample data do it before taking the lock.

use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::EngineConfig;
use crate::dsp::{PreparedSample, StereoBlock, SynthEngine};
use crate::error::{AudioError, EngineError};
use crate::patch::{Patch, PatchUpdate};

/// Upper bound for callback scratch buffers when the device reports no
/// usable buffer size range.
const MAX_CALLBACK_FRAMES: usize = 8192;

pub struct AudioOutput {
    engine: Arc<Mutex<SynthEngine>>,
    stream: cpal::Stream,
    sample_rate: f64,
}

impl AudioOutput {
    /// Open the default output device and build an engine at its rate.
    ///
    /// This is the one place a missing device surfaces as a hard failure.
    /// The stream starts paused; call [`resume`](Self::resume) to hear it.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::UnsupportedConfig(e.to_string()))?;
        let format = supported.sample_format();
        let capacity = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { max, .. } => {
                (*max as usize).clamp(config.block_size.max(1), MAX_CALLBACK_FRAMES)
            }
            cpal::SupportedBufferSize::Unknown => MAX_CALLBACK_FRAMES,
        };
        let stream_config: cpal::StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0 as f64;
        let channels = stream_config.channels as usize;
        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            format = ?format,
            "audio output opened"
        );

        let engine = Arc::new(Mutex::new(SynthEngine::new(EngineConfig {
            sample_rate,
            ..config
        })));
        let shared = Arc::clone(&engine);
        let block = StereoBlock::new(capacity);

        let stream = match format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, shared, block, channels)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, shared, block, channels)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, shared, block, channels)
            }
            other => Err(AudioError::UnsupportedConfig(format!("sample format {other:?}"))),
        }?;

        Ok(AudioOutput {
            engine,
            stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Shared handle for control calls from other threads.
    pub fn engine(&self) -> Arc<Mutex<SynthEngine>> {
        Arc::clone(&self.engine)
    }

    /// Lock the engine for a control call.
    pub fn lock(&self) -> Result<MutexGuard<'_, SynthEngine>, EngineError> {
        self.engine
            .lock()
            .map_err(|_| AudioError::Stream("engine lock poisoned".to_string()).into())
    }

    /// Replace the patch. An inline sample the engine has not seen yet is
    /// decoded before the engine is locked.
    pub fn apply_patch(&self, patch: &Patch) -> Result<(), EngineError> {
        let decode = self.lock()?.sample_bank().needs_decode(&patch.sampler);
        let sample = if decode {
            PreparedSample::decode(&patch.sampler)
        } else {
            None
        };
        self.lock()?.apply_prepared(patch, sample);
        Ok(())
    }

    /// Merge a full or partial patch JSON document.
    pub fn apply_patch_json(&self, json: &str) -> Result<(), EngineError> {
        let update = PatchUpdate::from_json(json)?;
        let patch = update.applied_to(self.lock()?.patch());
        self.apply_patch(&patch)
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        self.lock()?.resume();
        Ok(())
    }

    pub fn suspend(&self) -> Result<(), EngineError> {
        self.lock()?.suspend();
        self.stream
            .pause()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        Ok(())
    }

    /// Stop the stream and tear the engine down.
    pub fn close(self) {
        if let Ok(mut engine) = self.engine.lock() {
            engine.close();
        }
        tracing::info!("audio output closed");
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: Arc<Mutex<SynthEngine>>,
    mut block: StereoBlock,
    channels: usize,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                match engine.try_lock() {
                    Ok(mut engine) => block.render(&mut engine, frames),
                    Err(_) => block.hold(frames),
                }
                block.write_interleaved(data, channels, |s: f32| T::from_sample(s));
            },
            |err| tracing::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
