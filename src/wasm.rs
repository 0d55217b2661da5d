//! WebAssembly bindings via wasm-bindgen for AudioWorklet integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! Inside an AudioWorkletProcessor, with the engine linked into the same
//! module:
//!
//! ```javascript
//! import init, { orcbridge_init, WorkletBridge } from './orcbridge.js';
//!
//! await init();
//! orcbridge_init();
//!
//! const bridge = new WorkletBridge();
//! this.port.onmessage = (ev) => {
//!   if (ev.data[0] === "write-file") {
//!     bridge.write_file(ev.data[1], new Uint8Array(ev.data[2]));
//!   } else {
//!     bridge.post_message(ev.data);
//!   }
//! };
//!
//! // per render quantum, planar destination [ch0..., ch1...]
//! bridge.process(frames, planarOutput);
//! for (let line = bridge.next_log(); line != null; line = bridge.next_log()) {
//!   this.port.postMessage(["log", line]);
//! }
//! ```

use std::sync::mpsc::Receiver;

use log::warn;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::audio_buffer::AudioBuffer;
use crate::bridge::{log_channel, printer};
use crate::engine::Engine;
use crate::message::Message;
use crate::native::NativeEngine;
use crate::processor::Processor;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other
/// functions. Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn orcbridge_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Worklet Bridge
// ═══════════════════════════════════════════════════════════════════════════

/// Message handler and refill loop for one worklet-scoped engine instance.
///
/// The worklet global scope is single-threaded, so the control surface and
/// the audio callback share this one object and no thread bridge is needed.
#[wasm_bindgen]
pub struct WorkletBridge {
    processor: Processor<NativeEngine>,
    logs: Receiver<String>,
}

#[wasm_bindgen]
impl WorkletBridge {
    /// Create a bridge around a fresh engine instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WorkletBridge {
        let (log_tx, log_rx) = log_channel();
        let engine = NativeEngine::new(printer(log_tx));
        WorkletBridge {
            processor: Processor::new(engine),
            logs: log_rx,
        }
    }

    /// Handle one positional tagged control message: `[tag, arg, ...]`.
    ///
    /// Unrecognized or malformed messages are logged and discarded.
    pub fn post_message(&mut self, message: JsValue) {
        let values: Vec<Value> = match serde_wasm_bindgen::from_value(message) {
            Ok(values) => values,
            Err(e) => {
                warn!("undecodable control message: {}", e);
                return;
            }
        };
        match Message::from_values(&values) {
            Ok(message) => self.processor.handle_message(message),
            Err(e) => warn!("discarding control message: {}", e),
        }
    }

    /// Materialize a byte payload in the engine's virtual filesystem.
    ///
    /// Typed entry for `["write-file", path, bytes]` so byte payloads can
    /// cross the boundary as a Uint8Array instead of a number array.
    pub fn write_file(&mut self, path: &str, data: &[u8]) {
        self.processor.handle_message(Message::WriteFile {
            path: path.to_string(),
            data: data.to_vec(),
        });
    }

    /// Produce one quantum into a planar destination: `channels` runs of
    /// `frames` samples. Untouched while the bridge is not running.
    pub fn process(&mut self, frames: u32, output: &mut [f32]) {
        let frames = frames as usize;
        if frames == 0 || output.len() < frames {
            return;
        }
        let channels = output.len() / frames;
        let mut buffer = AudioBuffer::new(&mut output[..channels * frames], channels);
        self.processor.process(&[], &mut buffer);
    }

    /// Take the next engine print line, or `null` when none is pending.
    pub fn next_log(&self) -> Option<String> {
        self.logs.try_recv().ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether playback is currently running.
    pub fn is_running(&self) -> bool {
        self.processor.is_running()
    }

    /// Last engine status code (0 is success).
    pub fn status(&self) -> i32 {
        self.processor.status().code()
    }

    /// Current score time in seconds.
    pub fn score_time(&self) -> f64 {
        self.processor.score_time()
    }

    /// Read a numeric control channel.
    pub fn channel(&self, name: &str) -> f64 {
        self.processor.channel(name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Direct engine surface
    // ─────────────────────────────────────────────────────────────────────────

    /// Length of a function table, or 0 if it does not exist.
    pub fn table_len(&self, table: u32) -> usize {
        self.processor.table_len(table)
    }

    /// Copy a function table's contents, or `null` if it does not exist.
    pub fn table(&self, table: u32) -> Option<Vec<f32>> {
        self.processor.table(table).map(<[f32]>::to_vec)
    }

    /// Overwrite one value of a function table.
    pub fn set_table_value(&mut self, table: u32, index: usize, value: f32) {
        self.processor.set_table_value(table, index, value);
    }

    /// Run the compiled performance to completion, non-realtime.
    pub fn render_offline(&mut self) {
        self.processor.render_offline();
    }

    /// Pause the engine's performance clock.
    pub fn pause(&mut self) {
        self.processor.pause();
    }

    /// Frames the engine produces per refill, once prepared.
    pub fn block_size(&self) -> usize {
        self.processor.engine().block_size()
    }

    /// Output channel count reported by the engine.
    pub fn output_channels(&self) -> usize {
        self.processor.engine().output_channels()
    }
}

impl Default for WorkletBridge {
    fn default() -> Self {
        Self::new()
    }
}
