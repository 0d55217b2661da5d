// src/processor.rs
//
// The audio-side half of the bridge: the control-message handler and the
// block-refill loop. Both operate on the same playback state, so they live
// on one struct and are called from the same thread.

use log::debug;

use crate::audio_buffer::AudioBuffer;
use crate::engine::{Engine, FileMode, Status};
use crate::message::Message;

/// Options applied at construction and reapplied after every reset.
pub const BASELINE_OPTIONS: &[&str] = &["-odac", "-+rtaudio=null"];

/// Playback lifecycle.
///
/// `Idle` means no one-time preparation has happened yet; quanta do no work
/// and leave the destination buffers untouched. Preparation runs at most once
/// between resets, on the first start.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,

    /// Prepared but not producing samples.
    Stopped,

    /// Prepared and producing samples.
    Running,
}

/// State driven by the message handler and consumed by the refill loop.
///
/// All fields except `phase` are derived from the engine during preparation
/// and discarded on reset. The cursor never exceeds `block_size`; reaching it
/// triggers exactly one refill before further reads.
#[derive(Debug, Default)]
pub struct PlaybackState {
    pub phase: Phase,
    pub block_size: usize,
    pub output_channels: usize,
    pub input_channels: usize,
    pub full_scale: f32,
    pub cursor: usize,
    pub status: Status,
}

/// Message handler plus refill loop around one owned engine instance.
///
/// The processor is the engine's only caller and holds it for its whole
/// lifetime. It never blocks, never allocates on the audio path, and never
/// surfaces engine failures as errors; a non-success status latches and the
/// output degrades to silence until an explicit reset.
pub struct Processor<E: Engine> {
    engine: E,
    state: PlaybackState,
}

impl<E: Engine> Processor<E> {
    pub fn new(engine: E) -> Self {
        let mut processor = Self {
            engine,
            state: PlaybackState::default(),
        };
        for option in BASELINE_OPTIONS {
            processor.engine.set_option(option);
        }
        processor
    }

    /// Handle one control message: exactly one engine call or state change,
    /// synchronously, fire-and-forget.
    ///
    /// Only `CompileArchive` retains the engine's status; every other call's
    /// outcome is deliberately dropped, matching the control surface contract.
    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::CompileArchive(text) => {
                self.state.status = self.engine.compile_archive(&text);
            }
            Message::CompileSource(text) => {
                self.engine.compile_source(&text);
            }
            Message::Evaluate(text) => {
                self.engine.evaluate(&text);
            }
            Message::ReadScore(text) => {
                self.engine.read_score(&text);
            }
            Message::SetChannel { name, value } => {
                self.engine.set_channel(&name, value);
            }
            Message::SetTextChannel { name, value } => {
                self.engine.set_text_channel(&name, &value);
            }
            Message::Start | Message::Resume => self.start(),
            Message::Stop => {
                if self.state.phase == Phase::Running {
                    self.state.phase = Phase::Stopped;
                }
            }
            Message::SetOption(option) => {
                self.engine.set_option(&option);
            }
            Message::Reset => self.reset(),
            Message::WriteFile { path, data } => self.write_file(&path, &data),
        }
    }

    /// One-time preparation, then mark playback running.
    ///
    /// Idempotent: a second start (or a resume after stop) only re-marks the
    /// running flag; block size, channel counts and the full-scale reference
    /// are acquired exactly once between resets.
    fn start(&mut self) {
        if self.state.phase == Phase::Idle {
            self.state.block_size = self.engine.block_size();
            self.state.output_channels = self.engine.output_channels();
            self.state.input_channels = self.engine.input_channels();
            self.state.full_scale = self.engine.full_scale();

            self.engine.prepare_realtime();
            self.engine.play();

            // Park the cursor so the first frame forces a refill.
            self.state.cursor = self.state.block_size;

            debug!(
                "prepared engine: block_size={} channels={} full_scale={}",
                self.state.block_size, self.state.output_channels, self.state.full_scale
            );
        }
        self.state.phase = Phase::Running;
    }

    /// Reset the engine, reapply the baseline options and drop every piece
    /// of derived playback state, including a latched failure status.
    fn reset(&mut self) {
        self.engine.reset();
        for option in BASELINE_OPTIONS {
            self.engine.set_option(option);
        }
        self.state = PlaybackState::default();
        debug!("engine reset");
    }

    /// Materialize a byte payload in the engine's virtual filesystem,
    /// truncate-or-create. Write failures are not reported anywhere.
    fn write_file(&mut self, path: &str, data: &[u8]) {
        let file = self.engine.fs_open(path, FileMode::WriteTruncate);
        self.engine.fs_write(file, data, 0);
        self.engine.fs_close(file);
    }

    /// Produce one quantum of output.
    ///
    /// Refills the engine window whenever the cursor exhausts it, then
    /// de-interleaves and normalizes into the destination channels. While not
    /// running (or before any preparation) the destination is left untouched.
    /// A non-success refill status silences everything from that frame on.
    ///
    /// Input frames are accepted for interface symmetry but not consumed.
    pub fn process(&mut self, _input: &[f32], output: &mut AudioBuffer) {
        if self.state.phase != Phase::Running {
            return;
        }

        let block_size = self.state.block_size;
        let engine_channels = self.state.output_channels;
        let full_scale = self.state.full_scale;
        let mut cursor = self.state.cursor;
        let mut status = self.state.status;

        for frame in 0..output.frames {
            if cursor == block_size && status.is_ok() {
                status = self.engine.perform_block();
                cursor = 0;
            }

            let window = self.engine.output_window();
            for ch in 0..output.channels {
                let sample = if status.is_ok() && ch < engine_channels {
                    window[cursor * engine_channels + ch] / full_scale
                } else {
                    0.0
                };
                output.channel_mut(ch)[frame] = sample;
            }

            if status.is_ok() {
                cursor += 1;
            }
        }

        self.state.cursor = cursor;
        self.state.status = status;
    }

    // ───────────────────────────────────────────────────────────────
    // Direct engine access (surface not driven by messages)
    // ───────────────────────────────────────────────────────────────

    /// Read a numeric control channel.
    pub fn channel(&self, name: &str) -> f64 {
        self.engine.channel(name)
    }

    /// Current score time in seconds.
    pub fn score_time(&self) -> f64 {
        self.engine.score_time()
    }

    pub fn table_len(&self, table: u32) -> usize {
        self.engine.table_len(table)
    }

    pub fn table(&self, table: u32) -> Option<&[f32]> {
        self.engine.table(table)
    }

    pub fn set_table_value(&mut self, table: u32, index: usize, value: f32) {
        self.engine.set_table_value(table, index, value);
    }

    /// Run the compiled performance to completion, non-realtime.
    pub fn render_offline(&mut self) {
        self.engine.render_offline();
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    // ───────────────────────────────────────────────────────────────
    // State access
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state.phase == Phase::Running
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.state.phase != Phase::Idle
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;

    const BLOCK: usize = 16;

    fn running_processor() -> Processor<FakeEngine> {
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2));
        p.handle_message(Message::Start);
        p
    }

    fn run_quantum(p: &mut Processor<FakeEngine>, frames: usize, channels: usize) -> Vec<f32> {
        let mut data = vec![0.0; frames * channels];
        let mut output = AudioBuffer::new(&mut data, channels);
        p.process(&[], &mut output);
        data
    }

    #[test]
    fn test_refill_cadence_over_uneven_quanta() {
        let mut p = running_processor();
        for _ in 0..5 {
            run_quantum(&mut p, 10, 2);
        }
        // 50 frames over 16-frame blocks: refills land at frames 0, 16, 32, 48.
        assert_eq!(p.engine().performed, 4);
        assert_eq!(p.state().cursor, 50 % BLOCK);
    }

    #[test]
    fn test_refill_count_at_block_multiples() {
        let mut p = running_processor();
        run_quantum(&mut p, 2 * BLOCK, 2);
        assert_eq!(p.engine().performed, 2);
        // Cursor parks at block size; the next frame performs the refill.
        assert_eq!(p.state().cursor, BLOCK);
    }

    #[test]
    fn test_output_is_scaled_deinterleaved_ramp() {
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2).with_full_scale(2.0));
        p.handle_message(Message::Start);
        let data = run_quantum(&mut p, 24, 2);
        // The fake window ramps continuously across blocks, so the
        // interleaved source value of frame f, channel ch is 2f + ch.
        for frame in 0..24 {
            assert_eq!(data[frame], (2 * frame) as f32 / 2.0, "ch0 frame {frame}");
            assert_eq!(
                data[24 + frame],
                (2 * frame + 1) as f32 / 2.0,
                "ch1 frame {frame}"
            );
        }
    }

    #[test]
    fn test_deinterleave_fixed_window() {
        let window: Vec<f32> = (0..BLOCK as u32 * 2)
            .map(|k| if k % 2 == 0 { 100.0 + k as f32 } else { 200.0 + k as f32 })
            .collect();
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2).with_fixed_window(window.clone()));
        p.handle_message(Message::Start);
        let data = run_quantum(&mut p, BLOCK, 2);
        for frame in 0..BLOCK {
            assert_eq!(data[frame], window[frame * 2]);
            assert_eq!(data[BLOCK + frame], window[frame * 2 + 1]);
        }
    }

    #[test]
    fn test_failure_latches_silence_until_reset() {
        let mut p = running_processor();
        p.engine_mut().fail_after = Some(2);

        let first = run_quantum(&mut p, 2 * BLOCK, 2);
        assert!(first.iter().any(|&s| s != 0.0));

        // The third refill fails; from here on everything is silence.
        let failed = run_quantum(&mut p, BLOCK, 2);
        assert!(failed.iter().all(|&s| s == 0.0));
        assert!(!p.status().is_ok());

        // No further refill attempts happen while the failure is latched.
        let calls_after_failure = p.engine().perform_calls;
        run_quantum(&mut p, BLOCK, 2);
        assert_eq!(p.engine().perform_calls, calls_after_failure);

        // An explicit reset clears the latch; the next start plays again.
        p.handle_message(Message::Reset);
        p.engine_mut().fail_after = None;
        p.handle_message(Message::Start);
        assert!(p.status().is_ok());
        let recovered = run_quantum(&mut p, BLOCK, 2);
        assert!(recovered.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_failed_archive_compile_silences_output() {
        let mut engine = FakeEngine::new(BLOCK, 2);
        engine.compile_archive_status = Status(-5);
        let mut p = Processor::new(engine);
        p.handle_message(Message::CompileArchive("<broken/>".into()));
        assert_eq!(p.status(), Status(-5));

        p.handle_message(Message::Start);
        let data = run_quantum(&mut p, BLOCK, 2);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(p.engine().perform_calls, 0);
    }

    #[test]
    fn test_start_prepares_exactly_once() {
        let mut p = running_processor();
        p.handle_message(Message::Stop);
        p.handle_message(Message::Start);
        p.handle_message(Message::Resume);
        assert_eq!(p.engine().prepared, 1);
        assert_eq!(p.engine().played, 1);
        assert!(p.is_running());
    }

    #[test]
    fn test_stop_leaves_destination_untouched() {
        let mut p = running_processor();
        p.handle_message(Message::Stop);

        let mut data = vec![0.75; BLOCK * 2];
        let mut output = AudioBuffer::new(&mut data, 2);
        p.process(&[], &mut output);
        assert!(data.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn test_unprepared_processor_does_no_work() {
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2));
        let mut data = vec![0.25; BLOCK * 2];
        let mut output = AudioBuffer::new(&mut data, 2);
        p.process(&[], &mut output);
        assert!(data.iter().all(|&s| s == 0.25));
        assert_eq!(p.engine().perform_calls, 0);
    }

    #[test]
    fn test_reset_discards_derived_state() {
        let mut p = running_processor();
        run_quantum(&mut p, BLOCK, 2);
        p.handle_message(Message::Reset);

        assert!(!p.is_prepared());
        assert_eq!(p.state().cursor, 0);
        assert_eq!(p.state().block_size, 0);

        // A quantum before the next start performs no work at all.
        let data = run_quantum(&mut p, BLOCK, 2);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(p.engine().perform_calls, 0);

        // Baseline options are reapplied after the engine reset.
        assert_eq!(p.engine().options, BASELINE_OPTIONS);
        assert_eq!(p.engine().resets, 1);
    }

    #[test]
    fn test_messages_forward_to_engine_calls() {
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2));
        p.handle_message(Message::CompileSource("instr 1".into()));
        p.handle_message(Message::Evaluate("gain = 1".into()));
        p.handle_message(Message::ReadScore("i1 0 1".into()));
        p.handle_message(Message::SetChannel {
            name: "cutoff".into(),
            value: 880.0,
        });
        p.handle_message(Message::SetTextChannel {
            name: "mode".into(),
            value: "arp".into(),
        });
        p.handle_message(Message::SetOption("-m0".into()));

        let engine = p.engine();
        assert_eq!(engine.compiled_sources, ["instr 1"]);
        assert_eq!(engine.evaluated, ["gain = 1"]);
        assert_eq!(engine.scores, ["i1 0 1"]);
        assert_eq!(engine.channels["cutoff"], 880.0);
        assert_eq!(engine.text_channels["mode"], "arp");
        assert!(engine.options.contains(&"-m0".to_string()));
    }

    #[test]
    fn test_write_file_opens_writes_closes() {
        let mut p = Processor::new(FakeEngine::new(BLOCK, 2));
        p.handle_message(Message::WriteFile {
            path: "samples/kick.wav".into(),
            data: vec![82, 73, 70, 70],
        });
        let engine = p.engine();
        assert_eq!(engine.files["samples/kick.wav"], vec![82, 73, 70, 70]);
        assert_eq!(engine.open_count, 1);
        assert_eq!(engine.close_count, 1);
    }

    #[test]
    fn test_extra_host_channels_get_silence() {
        let mut p = running_processor();
        let data = run_quantum(&mut p, 8, 3);
        // Engine is two-channel; the third host channel stays silent.
        assert!(data[16..24].iter().all(|&s| s == 0.0));
        assert!(data[..16].iter().any(|&s| s != 0.0));
    }
}
