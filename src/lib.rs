pub mod config;
pub mod dsp;
pub mod error;
#[cfg(feature = "native")]
pub mod output;
pub mod patch;
pub mod timing;

pub use config::EngineConfig;
pub use dsp::{EngineState, SynthEngine};
pub use error::{AudioError, DecodeError, EngineError};
pub use patch::{Patch, PatchUpdate};
pub use timing::{ArpStatus, ArpStepEvent, Transport, TransportClock};

use dsp::{PcmDecoder, StereoBlock};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the synthcore version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed: the default patch as a JS object.
#[wasm_bindgen(js_name = defaultPatch)]
pub fn default_patch() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&Patch::default()).map_err(js_error)
}

/// One synth instance for an AudioWorklet. The worklet calls `render` from
/// its `process` callback; the UI thread forwards control calls.
#[wasm_bindgen]
pub struct WebSynth {
    engine: SynthEngine,
    block: StereoBlock,
}

impl WebSynth {
    fn with_config(config: EngineConfig) -> WebSynth {
        let engine = SynthEngine::new(config);
        WebSynth {
            block: StereoBlock::new(engine.config().block_size),
            engine,
        }
    }
}

#[wasm_bindgen]
impl WebSynth {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> WebSynth {
        WebSynth::with_config(EngineConfig::with_sample_rate(sample_rate))
    }

    /// Build from an `EngineConfig` JS object; missing fields use defaults.
    #[wasm_bindgen(js_name = withConfig)]
    pub fn from_js_config(config: JsValue) -> Result<WebSynth, JsValue> {
        let config: EngineConfig = serde_wasm_bindgen::from_value(config).map_err(js_error)?;
        Ok(WebSynth::with_config(config))
    }

    pub fn resume(&mut self) {
        self.engine.resume();
    }

    pub fn suspend(&mut self) {
        self.engine.suspend();
    }

    pub fn close(&mut self) {
        self.engine.close();
    }

    /// Merge a full or partial patch object.
    #[wasm_bindgen(js_name = applyPatch)]
    pub fn apply_patch(&mut self, patch: JsValue) -> Result<(), JsValue> {
        let update: PatchUpdate = serde_wasm_bindgen::from_value(patch).map_err(js_error)?;
        self.engine.apply_update(&update);
        Ok(())
    }

    /// Merge a full or partial patch JSON document.
    #[wasm_bindgen(js_name = applyPatchJson)]
    pub fn apply_patch_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.engine.apply_patch_json(json).map_err(js_error)
    }

    /// The current, fully resolved patch.
    pub fn patch(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.engine.patch()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, note: u8, velocity: f64) {
        self.engine.note_on(note, velocity);
    }

    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, note: u8) {
        self.engine.note_off(note);
    }

    #[wasm_bindgen(js_name = previewNote)]
    pub fn preview_note(&mut self, note: u8, duration_ms: f64) {
        self.engine.preview_note(note, duration_ms);
    }

    #[wasm_bindgen(js_name = setPitchBend)]
    pub fn set_pitch_bend(&mut self, semitones: f64) {
        self.engine.set_pitch_bend(semitones);
    }

    #[wasm_bindgen(js_name = arpClear)]
    pub fn arp_clear(&mut self) {
        self.engine.arp_clear();
    }

    /// `{enabled, stepIndex, length}` for display.
    #[wasm_bindgen(js_name = arpStatus)]
    pub fn arp_status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.arp_status()).map_err(js_error)
    }

    /// Follow a shared transport's tempo and play state.
    #[wasm_bindgen(js_name = attachTransport)]
    pub fn attach_transport(&mut self, transport: &WebTransport) {
        self.engine.attach_transport(Some(transport.inner.clock()));
    }

    #[wasm_bindgen(js_name = detachTransport)]
    pub fn detach_transport(&mut self) {
        self.engine.attach_transport(None);
    }

    /// Decode mono 16-bit PCM and store it. Returns the sampler descriptor
    /// (id, name, duration, full-length trim).
    #[wasm_bindgen(js_name = ingestSample)]
    pub fn ingest_sample(
        &mut self,
        name: &str,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<JsValue, JsValue> {
        let settings = self
            .engine
            .ingest_sample(name, pcm, &PcmDecoder::mono16(sample_rate))
            .map_err(js_error)?;
        serde_wasm_bindgen::to_value(&settings).map_err(js_error)
    }

    #[wasm_bindgen(js_name = activeVoices)]
    pub fn active_voices(&self) -> usize {
        self.engine.active_voices()
    }

    /// Render `frames` stereo frames, interleaved.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.engine.render_interleaved(&mut out);
        out
    }

    /// Render into two worklet output channels.
    #[wasm_bindgen(js_name = renderInto)]
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.engine.render(left, right);
    }

    /// Render one `blockSize` block; read it back with `left()`/`right()`.
    #[wasm_bindgen(js_name = renderBlock)]
    pub fn render_block(&mut self) {
        let frames = self.block.capacity();
        self.block.render(&mut self.engine, frames);
    }

    pub fn left(&self) -> Vec<f32> {
        self.block.left().to_vec()
    }

    pub fn right(&self) -> Vec<f32> {
        self.block.right().to_vec()
    }
}

/// The shared tempo clock. Create one per page and attach every synth and
/// drum lane to it.
#[wasm_bindgen]
pub struct WebTransport {
    inner: Transport,
}

impl Default for WebTransport {
    fn default() -> Self {
        WebTransport::new()
    }
}

#[wasm_bindgen]
impl WebTransport {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebTransport {
        WebTransport {
            inner: Transport::default(),
        }
    }

    /// Returns the tempo actually stored, clamped to 20..=300.
    #[wasm_bindgen(js_name = setTempo)]
    pub fn set_tempo(&self, bpm: f64) -> f64 {
        self.inner.set_tempo(bpm)
    }

    #[wasm_bindgen(js_name = setPlaying)]
    pub fn set_playing(&self, playing: bool) {
        self.inner.set_playing(playing);
    }

    pub fn bpm(&self) -> f64 {
        self.inner.bpm()
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    /// Advance one step while playing; returns the tick count.
    pub fn tick(&self) -> u64 {
        self.inner.tick()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks()
    }

    /// Current step in a pattern of `len` steps, for drum lanes.
    #[wasm_bindgen(js_name = stepIndex)]
    pub fn step_index(&self, len: usize) -> usize {
        self.inner.clock().step_index(len)
    }

    pub fn rewind(&self) -> bool {
        self.inner.rewind()
    }
}
