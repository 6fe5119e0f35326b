use std::fmt;

/// Failures the engine reports to its caller.
///
/// Invalid patch *data* (unknown names, out-of-range numbers) never shows up
/// here; it is clamped or defaulted in place. What remains is malformed JSON,
/// audio resource failures, and sample decode failures.
#[derive(Debug)]
pub enum EngineError {
    Audio(AudioError),
    Decode(DecodeError),
    Json(serde_json::Error),
}

/// The audio output could not be opened or driven.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    NoOutputDevice,
    UnsupportedConfig(String),
    Stream(String),
}

/// A sample payload could not be turned into an audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Empty,
    InvalidPcm(String),
    InvalidBase64(String),
    UnsupportedSampleRate(u32),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Audio(e) => write!(f, "Audio error: {e}"),
            EngineError::Decode(e) => write!(f, "Decode error: {e}"),
            EngineError::Json(e) => write!(f, "Patch JSON error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Audio(e) => Some(e),
            EngineError::Decode(e) => Some(e),
            EngineError::Json(e) => Some(e),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::NoOutputDevice => write!(f, "no audio output device is available"),
            AudioError::UnsupportedConfig(why) => {
                write!(f, "the output device has no usable configuration: {why}")
            }
            AudioError::Stream(why) => write!(f, "the output stream failed: {why}"),
        }
    }
}

impl std::error::Error for AudioError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "the sample payload is empty"),
            DecodeError::InvalidPcm(why) => write!(f, "invalid PCM data: {why}"),
            DecodeError::InvalidBase64(why) => write!(f, "invalid base64 sample data: {why}"),
            DecodeError::UnsupportedSampleRate(rate) => {
                write!(f, "unsupported sample rate {rate} Hz")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<AudioError> for EngineError {
    fn from(e: AudioError) -> Self {
        EngineError::Audio(e)
    }
}

impl From<DecodeError> for EngineError {
    fn from(e: DecodeError) -> Self {
        EngineError::Decode(e)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e)
    }
}
