// src/lib.rs
//
// Message-driven bridge exposing a compiled orchestra synthesis engine
// inside a real-time audio callback.

mod audio_buffer;
mod bridge;
mod engine;
mod message;
mod processor;

#[cfg(feature = "native")]
mod native;

#[cfg(feature = "native")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_buffer::AudioBuffer;
pub use bridge::{
    AudioHandle, BridgeReadback, ControlHandle, LogSender, create_bridge, log_channel, printer,
};
pub use engine::{Engine, FileMode, FsHandle, PrintFn, Status};
pub use message::{Message, ProtocolError};
pub use processor::{BASELINE_OPTIONS, Phase, PlaybackState, Processor};

#[cfg(feature = "native")]
pub use native::NativeEngine;
