//! Loaded sample buffers, keyed by id.
//!
//! Decoding happens here, off the render path. The render path only ever
//! sees finished `Arc<SampleBuffer>` handles.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use super::sampler::SampleBuffer;
use crate::error::{DecodeError, EngineError};
use crate::patch::{SamplePayload, SamplerSettings};

const MIN_SAMPLE_RATE: u32 = 1_000;
const MAX_SAMPLE_RATE: u32 = 384_000;
/// Hex digits of the content hash used as a sample id.
const ID_LEN: usize = 16;

/// Turns a raw audio payload into a mono buffer.
pub trait AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<SampleBuffer, DecodeError>;
}

/// Headerless little-endian integer PCM, mixed down to mono.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmDecoder {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channels: u16,
}

impl PcmDecoder {
    pub fn mono16(sample_rate: u32) -> Self {
        PcmDecoder {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<SampleBuffer, DecodeError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(DecodeError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(DecodeError::InvalidPcm("zero channels".into()));
        }
        let width = match self.bits_per_sample {
            8 => 1,
            16 => 2,
            24 => 3,
            other => {
                return Err(DecodeError::InvalidPcm(format!(
                    "{other}-bit samples are not supported"
                )));
            }
        };
        let frame_bytes = width * self.channels as usize;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() % frame_bytes != 0 {
            return Err(DecodeError::InvalidPcm(format!(
                "{} bytes is not a whole number of {frame_bytes}-byte frames",
                bytes.len()
            )));
        }

        let data = bytes
            .chunks_exact(frame_bytes)
            .map(|frame| {
                let sum: f64 = frame.chunks_exact(width).map(read_sample).sum();
                sum / self.channels as f64
            })
            .collect();
        Ok(SampleBuffer::new(data, self.sample_rate))
    }
}

/// One little-endian sample scaled to [-1, 1).
fn read_sample(bytes: &[u8]) -> f64 {
    match bytes.len() {
        // 8-bit PCM is unsigned.
        1 => (bytes[0] as f64 - 128.0) / 128.0,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64 / 32768.0,
        _ => {
            let raw = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            raw as f64 / 8_388_608.0
        }
    }
}

/// Content-derived id: a hex prefix of the payload's SHA-256.
pub fn sample_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut id = String::with_capacity(ID_LEN);
    for byte in digest.iter().take(ID_LEN / 2) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// An inline sample decoded ahead of a patch change, ready to be stored
/// without further work.
#[derive(Debug, Clone)]
pub struct PreparedSample {
    id: String,
    buffer: Arc<SampleBuffer>,
}

impl PreparedSample {
    /// Decode the inline payload a sampler descriptor carries. `None` when
    /// there is no payload or it fails to decode; failures are logged.
    pub fn decode(settings: &SamplerSettings) -> Option<Self> {
        let payload = settings.audio.as_ref()?;
        match decode_payload(payload) {
            Ok((buffer, digest_id)) => Some(PreparedSample {
                id: if settings.id.is_empty() {
                    digest_id
                } else {
                    settings.id.clone()
                },
                buffer: Arc::new(buffer),
            }),
            Err(err) => {
                tracing::warn!(id = %settings.id, "inline sample could not be decoded: {err}");
                None
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The engine's store of decoded samples.
#[derive(Debug, Default, Clone)]
pub struct SampleBank {
    buffers: HashMap<String, Arc<SampleBuffer>>,
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<SampleBuffer>> {
        self.buffers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.buffers.contains_key(id)
    }

    /// Whether applying `settings` would have to decode an inline payload.
    pub fn needs_decode(&self, settings: &SamplerSettings) -> bool {
        settings.audio.is_some() && !self.contains(&settings.id)
    }

    /// Store a sample decoded elsewhere. Only moves a handle.
    pub fn insert_prepared(&mut self, sample: PreparedSample) -> Arc<SampleBuffer> {
        self.buffers.insert(sample.id, Arc::clone(&sample.buffer));
        sample.buffer
    }

    pub fn insert(&mut self, id: impl Into<String>, buffer: SampleBuffer) -> Arc<SampleBuffer> {
        let buffer = Arc::new(buffer);
        self.buffers.insert(id.into(), Arc::clone(&buffer));
        buffer
    }

    /// Decode a raw payload and store it, returning a descriptor whose trim
    /// window covers the whole sample.
    pub fn ingest(
        &mut self,
        name: &str,
        bytes: &[u8],
        decoder: &dyn AudioDecoder,
    ) -> Result<SamplerSettings, EngineError> {
        let buffer = decoder.decode(bytes)?;
        if buffer.is_empty() {
            return Err(DecodeError::Empty.into());
        }
        let id = sample_id(bytes);
        let duration = buffer.duration();
        self.insert(id.clone(), buffer);
        tracing::info!(%id, name, duration, "sample ingested");

        let mut settings = SamplerSettings {
            id,
            name: name.to_string(),
            duration,
            ..Default::default()
        };
        settings.set_trim(0.0, duration);
        Ok(settings)
    }

    /// Find the buffer a sampler descriptor refers to.
    ///
    /// A loaded id wins; otherwise an inline payload is decoded and cached
    /// under the descriptor's id. Failures are logged and resolve to `None`,
    /// which plays as silence.
    pub fn resolve(&mut self, settings: &SamplerSettings) -> Option<Arc<SampleBuffer>> {
        if let Some(buffer) = self.get(&settings.id) {
            return Some(buffer);
        }
        if settings.audio.is_none() {
            if !settings.id.is_empty() {
                tracing::warn!(id = %settings.id, "sampler references an unloaded sample");
            }
            return None;
        }
        PreparedSample::decode(settings).map(|sample| self.insert_prepared(sample))
    }
}

/// Decode an inline payload, returning the buffer and its content id.
pub fn decode_payload(payload: &SamplePayload) -> Result<(SampleBuffer, String), DecodeError> {
    match payload {
        SamplePayload::InlinePcm {
            data,
            sample_rate,
            bits_per_sample,
        } => {
            let bytes = BASE64
                .decode(data.trim())
                .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
            let decoder = PcmDecoder {
                sample_rate: *sample_rate,
                bits_per_sample: *bits_per_sample,
                channels: 1,
            };
            let buffer = decoder.decode(&bytes)?;
            Ok((buffer, sample_id(&bytes)))
        }
    }
}

/// Encode mono 16-bit PCM as an inline payload.
pub fn encode_inline_pcm(samples: &[i16], sample_rate: u32) -> SamplePayload {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    SamplePayload::InlinePcm {
        data: BASE64.encode(bytes),
        sample_rate,
        bits_per_sample: 16,
    }
}
