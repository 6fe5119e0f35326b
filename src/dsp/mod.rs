//! DSP: everything that runs on the render path.
//!
//! Small per-sample building blocks (oscillators, filter, envelope,
//! smoothers, effects) are composed into a [`Voice`](voice::Voice), and
//! voices into a [`SynthEngine`](engine::SynthEngine).

pub mod block;
pub mod delay;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod macro_osc;
pub mod mixer;
pub mod modulation;
pub mod oscillator;
pub mod reverb;
pub mod sample_bank;
pub mod sampler;
pub mod smoother;
pub mod voice;

pub use block::StereoBlock;
pub use engine::{EngineState, SynthEngine};
pub use sample_bank::{AudioDecoder, PcmDecoder, PreparedSample, SampleBank};
pub use sampler::SampleBuffer;
