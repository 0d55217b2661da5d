//! Thread-safe bridge between the control context and the audio processor.
//!
//! This module provides the communication layer that allows an outer control
//! thread to safely drive the processor running inside a real-time audio
//! callback.
//!
//! # Architecture
//!
//! - **Control thread** owns [`ControlHandle`] and sends [`Message`]s
//! - **Audio thread** owns [`AudioHandle`] with the [`Processor`]
//! - Messages travel over an MPSC queue drained at the top of each quantum;
//!   readback travels the other way through shared atomics
//! - Engine print output travels over a dedicated log queue so the control
//!   side can forward it as `["log", text]`
//!
//! # Usage
//!
//! ```ignore
//! let (log_tx, log_rx) = log_channel();
//! let processor = Processor::new(NativeEngine::new(printer(log_tx)));
//! let (control, mut audio) = create_bridge(processor, log_rx);
//!
//! // Control thread
//! control.compile_source("instr 1 ... endin");
//! control.start();
//!
//! // Audio callback
//! audio.process(input_frames, &mut output);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender, TryRecvError},
};

use log::warn;
use serde_json::Value;

use crate::audio_buffer::AudioBuffer;
use crate::engine::{Engine, PrintFn, Status};
use crate::message::Message;
use crate::processor::Processor;

/// Sender half of the engine print log queue.
pub type LogSender = Sender<String>;

/// Create the log queue carrying engine print output to the control side.
pub fn log_channel() -> (LogSender, Receiver<String>) {
    mpsc::channel()
}

/// Build a per-instance engine print hook from a log queue sender.
pub fn printer(tx: LogSender) -> PrintFn {
    Box::new(move |line: &str| {
        let _ = tx.send(line.to_string());
    })
}

/// Handle for the control thread.
///
/// All methods are fire-and-forget: nothing about the outcome of a message
/// travels back through them. State observation goes through [`readback`]
/// and [`poll_logs`].
///
/// [`readback`]: ControlHandle::readback
/// [`poll_logs`]: ControlHandle::poll_logs
pub struct ControlHandle {
    /// Queue of control messages to the audio side.
    message_tx: Sender<Message>,

    /// Engine print output from the audio side.
    log_rx: Receiver<String>,

    /// Shared readback state (updated by the audio side).
    readback: Arc<SharedReadback>,
}

/// Handle for the audio thread containing the processor and message queue.
pub struct AudioHandle<E: Engine> {
    /// The processor (owned by the audio thread).
    processor: Processor<E>,

    /// Queue of control messages from the control side.
    message_rx: Receiver<Message>,

    /// Shared readback state (written after every quantum).
    readback: Arc<SharedReadback>,
}

/// Lock-free shared state for audio -> control readback.
struct SharedReadback {
    running: AtomicBool,
    prepared: AtomicBool,
    status: AtomicI32,
    /// Score time stored as f64 bits (no AtomicF64 in std)
    score_time_bits: AtomicU64,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
            status: AtomicI32::new(0),
            score_time_bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }
}

/// Snapshot of the readback atomics.
#[derive(Debug, Copy, Clone)]
pub struct BridgeReadback {
    pub running: bool,
    pub prepared: bool,
    pub status: Status,
    pub score_time: f64,
}

/// Create a linked pair of handles for control and audio communication.
///
/// `log_rx` is the receiver half of the [`log_channel`] whose sender was
/// turned into the engine's print hook.
pub fn create_bridge<E: Engine>(
    processor: Processor<E>,
    log_rx: Receiver<String>,
) -> (ControlHandle, AudioHandle<E>) {
    let (message_tx, message_rx) = mpsc::channel();
    let readback = Arc::new(SharedReadback::new());

    let control = ControlHandle {
        message_tx,
        log_rx,
        readback: Arc::clone(&readback),
    };

    let audio = AudioHandle {
        processor,
        message_rx,
        readback,
    };

    (control, audio)
}

// ═══════════════════════════════════════════════════════════════════
// ControlHandle - Control Thread API
// ═══════════════════════════════════════════════════════════════════

impl ControlHandle {
    /// Queue a control message for the audio side.
    pub fn send(&self, message: Message) {
        let _ = self.message_tx.send(message);
    }

    /// Decode and queue one positional tagged message: `[tag, arg, ...]`.
    ///
    /// Unrecognized or malformed messages are logged and discarded; nothing
    /// propagates back to the sender.
    pub fn send_values(&self, values: &[Value]) {
        match Message::from_values(values) {
            Ok(message) => self.send(message),
            Err(e) => warn!("discarding control message: {}", e),
        }
    }

    /// Drain any engine print output produced since the last poll.
    pub fn poll_logs(&self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.log_rx.try_recv() {
                Ok(line) => lines.push(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        lines
    }

    /// Get the current readback snapshot.
    pub fn readback(&self) -> BridgeReadback {
        BridgeReadback {
            running: self.readback.running.load(Ordering::Relaxed),
            prepared: self.readback.prepared.load(Ordering::Relaxed),
            status: Status(self.readback.status.load(Ordering::Relaxed)),
            score_time: f64::from_bits(self.readback.score_time_bits.load(Ordering::Relaxed)),
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Convenience senders
    // ───────────────────────────────────────────────────────────────

    /// Compile a project archive.
    pub fn compile_archive(&self, text: impl Into<String>) {
        self.send(Message::CompileArchive(text.into()));
    }

    /// Compile orchestra source.
    pub fn compile_source(&self, text: impl Into<String>) {
        self.send(Message::CompileSource(text.into()));
    }

    /// Incrementally evaluate an orchestra snippet.
    pub fn evaluate(&self, text: impl Into<String>) {
        self.send(Message::Evaluate(text.into()));
    }

    /// Feed text to the score reader.
    pub fn read_score(&self, text: impl Into<String>) {
        self.send(Message::ReadScore(text.into()));
    }

    /// Write a numeric control channel.
    pub fn set_channel(&self, name: impl Into<String>, value: f64) {
        self.send(Message::SetChannel {
            name: name.into(),
            value,
        });
    }

    /// Write a text control channel.
    pub fn set_text_channel(&self, name: impl Into<String>, value: impl Into<String>) {
        self.send(Message::SetTextChannel {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Start playback, preparing the engine on first use.
    pub fn start(&self) {
        self.send(Message::Start);
    }

    /// Stop playback, retaining engine state for a later resume.
    pub fn stop(&self) {
        self.send(Message::Stop);
    }

    /// Resume playback.
    pub fn resume(&self) {
        self.send(Message::Resume);
    }

    /// Forward a raw option string to the engine.
    pub fn set_option(&self, option: impl Into<String>) {
        self.send(Message::SetOption(option.into()));
    }

    /// Reset the engine and discard derived playback state.
    pub fn reset(&self) {
        self.send(Message::Reset);
    }

    /// Materialize a byte payload in the engine's virtual filesystem.
    pub fn write_file(&self, path: impl Into<String>, data: Vec<u8>) {
        self.send(Message::WriteFile {
            path: path.into(),
            data,
        });
    }
}

// ═══════════════════════════════════════════════════════════════════
// AudioHandle - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl<E: Engine> AudioHandle<E> {
    /// Handle all pending control messages.
    ///
    /// Called at the top of each quantum, so a message sent mid-quantum takes
    /// effect at the next one and never tears the refill loop.
    pub fn process_messages(&mut self) {
        while let Ok(message) = self.message_rx.try_recv() {
            self.processor.handle_message(message);
        }
    }

    /// Produce one quantum: drain messages, run the refill loop, publish
    /// readback.
    pub fn process(&mut self, input: &[f32], output: &mut AudioBuffer) {
        self.process_messages();
        self.processor.process(input, output);
        self.sync_readback();
    }

    /// Run the compiled performance to completion, non-realtime.
    pub fn render_offline(&mut self) {
        self.process_messages();
        self.processor.render_offline();
        self.sync_readback();
    }

    /// Publish processor state for the control side.
    pub fn sync_readback(&self) {
        self.readback
            .running
            .store(self.processor.is_running(), Ordering::Relaxed);
        self.readback
            .prepared
            .store(self.processor.is_prepared(), Ordering::Relaxed);
        self.readback
            .status
            .store(self.processor.status().code(), Ordering::Relaxed);
        self.readback
            .score_time_bits
            .store(self.processor.score_time().to_bits(), Ordering::Relaxed);
    }

    /// Get a reference to the processor.
    pub fn processor(&self) -> &Processor<E> {
        &self.processor
    }

    /// Get a mutable reference to the processor.
    pub fn processor_mut(&mut self) -> &mut Processor<E> {
        &mut self.processor
    }
}
