// src/engine.rs

/// Raw status code returned by the engine's compile and perform entry points.
///
/// Zero is success. Any non-zero value signals an engine-side condition
/// (compile failure, end of performance) and is never translated into a Rust
/// error on the audio path; the processor degrades to silence instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);

    #[inline]
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn code(self) -> i32 {
        self.0
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::OK
    }
}

/// Open mode for the engine's virtual filesystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileMode {
    /// Read an existing file.
    Read,

    /// Truncate-or-create for writing.
    WriteTruncate,
}

/// Opaque handle to an open file in the engine's virtual filesystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FsHandle(pub u64);

/// Per-instance print hook.
///
/// The engine routes all of its textual output (compile diagnostics, score
/// messages) through this callback. It is injected at engine construction so
/// no global print state is shared between instances.
pub type PrintFn = Box<dyn FnMut(&str) + Send>;

/// The engine's exported call surface.
///
/// One implementor wraps one engine instance. The bridge owns the instance
/// for its whole lifetime and is the only caller.
///
/// Contracts assumed from the engine:
/// - `perform_block` is synchronous, bounded and non-blocking
/// - `output_window` stays valid from one refill to the next; a refill
///   rewrites its contents in place
/// - the window holds `block_size() * output_channels()` interleaved samples
pub trait Engine: Send {
    /// Compile a self-contained project archive (orchestra plus score).
    fn compile_archive(&mut self, text: &str) -> Status;

    /// Compile orchestra source.
    fn compile_source(&mut self, text: &str) -> Status;

    /// Incrementally evaluate an orchestra snippet.
    fn evaluate(&mut self, text: &str) -> Status;

    /// Feed score text to the score reader.
    fn read_score(&mut self, text: &str) -> Status;

    /// Reset the engine to its freshly constructed state.
    fn reset(&mut self);

    /// Interleaved output sample window, rewritten by each `perform_block`.
    fn output_window(&self) -> &[f32];

    /// Interleaved input sample window, consumed by `perform_block`.
    fn input_window_mut(&mut self) -> &mut [f32];

    /// Read a numeric control channel.
    fn channel(&self, name: &str) -> f64;

    /// Write a numeric control channel.
    fn set_channel(&mut self, name: &str, value: f64);

    /// Write a text control channel.
    fn set_text_channel(&mut self, name: &str, value: &str);

    /// Frames produced per `perform_block` call. Fixed per configuration.
    fn block_size(&self) -> usize;

    /// Produce the next block of samples into the output window.
    fn perform_block(&mut self) -> Status;

    /// Run the compiled performance to completion, non-realtime.
    fn render_offline(&mut self);

    fn input_channels(&self) -> usize;

    fn output_channels(&self) -> usize;

    /// Length of a function table, or 0 if it does not exist.
    fn table_len(&self, table: u32) -> usize;

    /// View of a function table's contents.
    fn table(&self, table: u32) -> Option<&[f32]>;

    /// Overwrite one value of a function table.
    fn set_table_value(&mut self, table: u32, index: usize, value: f32);

    /// Full-scale reference value; samples divided by it land in [-1, 1].
    fn full_scale(&self) -> f32;

    /// Forward a raw option string to the engine.
    fn set_option(&mut self, option: &str);

    /// One-time realtime preparation before the first `perform_block`.
    fn prepare_realtime(&mut self);

    /// Current score time in seconds.
    fn score_time(&self) -> f64;

    fn play(&mut self);

    fn pause(&mut self);

    /// Open a file in the engine's virtual filesystem.
    fn fs_open(&mut self, path: &str, mode: FileMode) -> FsHandle;

    /// Write `bytes` at `position`. Failures are not reported.
    fn fs_write(&mut self, file: FsHandle, bytes: &[u8], position: u64);

    fn fs_close(&mut self, file: FsHandle);
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;

    use super::{Engine, FileMode, FsHandle, Status};

    /// Scripted engine for exercising the bridge without a native library.
    ///
    /// Each `perform_block` fills the output window with a deterministic ramp:
    /// after `n` completed blocks, sample `k` of the window holds
    /// `(n * window_len + k) as f32`. Call counts are recorded so tests can
    /// assert on the refill cadence and one-time preparation.
    pub struct FakeEngine {
        block_size: usize,
        out_channels: usize,
        in_channels: usize,
        full_scale: f32,
        window: Vec<f32>,
        input: Vec<f32>,
        fixed_window: Option<Vec<f32>>,

        /// Return `fail_code` once this many blocks have been performed.
        pub fail_after: Option<u32>,
        pub fail_code: i32,

        pub performed: u32,
        pub perform_calls: u32,
        pub prepared: u32,
        pub played: u32,
        pub paused: u32,
        pub resets: u32,
        pub rendered: u32,

        pub options: Vec<String>,
        pub compiled_archives: Vec<String>,
        pub compiled_sources: Vec<String>,
        pub evaluated: Vec<String>,
        pub scores: Vec<String>,
        pub channels: HashMap<String, f64>,
        pub text_channels: HashMap<String, String>,
        pub tables: HashMap<u32, Vec<f32>>,
        pub score_time: f64,

        pub files: HashMap<String, Vec<u8>>,
        open_paths: HashMap<u64, String>,
        next_fs_handle: u64,
        pub open_count: u32,
        pub close_count: u32,

        pub compile_archive_status: Status,
    }

    impl FakeEngine {
        pub fn new(block_size: usize, out_channels: usize) -> Self {
            let window_len = block_size * out_channels;
            Self {
                block_size,
                out_channels,
                in_channels: 1,
                full_scale: 1.0,
                window: vec![0.0; window_len],
                input: vec![0.0; block_size],
                fixed_window: None,
                fail_after: None,
                fail_code: -1,
                performed: 0,
                perform_calls: 0,
                prepared: 0,
                played: 0,
                paused: 0,
                resets: 0,
                rendered: 0,
                options: Vec::new(),
                compiled_archives: Vec::new(),
                compiled_sources: Vec::new(),
                evaluated: Vec::new(),
                scores: Vec::new(),
                channels: HashMap::new(),
                text_channels: HashMap::new(),
                tables: HashMap::new(),
                score_time: 0.0,
                files: HashMap::new(),
                open_paths: HashMap::new(),
                next_fs_handle: 1,
                open_count: 0,
                close_count: 0,
                compile_archive_status: Status::OK,
            }
        }

        pub fn with_full_scale(mut self, full_scale: f32) -> Self {
            self.full_scale = full_scale;
            self
        }

        /// Use the same window contents for every block instead of the ramp.
        pub fn with_fixed_window(mut self, window: Vec<f32>) -> Self {
            assert_eq!(window.len(), self.window.len());
            self.fixed_window = Some(window);
            self
        }
    }

    impl Engine for FakeEngine {
        fn compile_archive(&mut self, text: &str) -> Status {
            self.compiled_archives.push(text.to_string());
            self.compile_archive_status
        }

        fn compile_source(&mut self, text: &str) -> Status {
            self.compiled_sources.push(text.to_string());
            Status::OK
        }

        fn evaluate(&mut self, text: &str) -> Status {
            self.evaluated.push(text.to_string());
            Status::OK
        }

        fn read_score(&mut self, text: &str) -> Status {
            self.scores.push(text.to_string());
            Status::OK
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.performed = 0;
            self.perform_calls = 0;
            self.options.clear();
            self.channels.clear();
            self.text_channels.clear();
            self.window.fill(0.0);
        }

        fn output_window(&self) -> &[f32] {
            &self.window
        }

        fn input_window_mut(&mut self) -> &mut [f32] {
            &mut self.input
        }

        fn channel(&self, name: &str) -> f64 {
            self.channels.get(name).copied().unwrap_or(0.0)
        }

        fn set_channel(&mut self, name: &str, value: f64) {
            self.channels.insert(name.to_string(), value);
        }

        fn set_text_channel(&mut self, name: &str, value: &str) {
            self.text_channels
                .insert(name.to_string(), value.to_string());
        }

        fn block_size(&self) -> usize {
            self.block_size
        }

        fn perform_block(&mut self) -> Status {
            self.perform_calls += 1;
            if let Some(limit) = self.fail_after {
                if self.performed >= limit {
                    return Status(self.fail_code);
                }
            }
            let window_len = self.window.len();
            match &self.fixed_window {
                Some(fixed) => self.window.copy_from_slice(fixed),
                None => {
                    let base = self.performed as usize * window_len;
                    for (k, sample) in self.window.iter_mut().enumerate() {
                        *sample = (base + k) as f32;
                    }
                }
            }
            self.performed += 1;
            self.score_time = self.performed as f64 * self.block_size as f64;
            Status::OK
        }

        fn render_offline(&mut self) {
            self.rendered += 1;
        }

        fn input_channels(&self) -> usize {
            self.in_channels
        }

        fn output_channels(&self) -> usize {
            self.out_channels
        }

        fn table_len(&self, table: u32) -> usize {
            self.tables.get(&table).map(Vec::len).unwrap_or(0)
        }

        fn table(&self, table: u32) -> Option<&[f32]> {
            self.tables.get(&table).map(Vec::as_slice)
        }

        fn set_table_value(&mut self, table: u32, index: usize, value: f32) {
            if let Some(t) = self.tables.get_mut(&table) {
                if index < t.len() {
                    t[index] = value;
                }
            }
        }

        fn full_scale(&self) -> f32 {
            self.full_scale
        }

        fn set_option(&mut self, option: &str) {
            self.options.push(option.to_string());
        }

        fn prepare_realtime(&mut self) {
            self.prepared += 1;
        }

        fn score_time(&self) -> f64 {
            self.score_time
        }

        fn play(&mut self) {
            self.played += 1;
        }

        fn pause(&mut self) {
            self.paused += 1;
        }

        fn fs_open(&mut self, path: &str, mode: FileMode) -> FsHandle {
            self.open_count += 1;
            let handle = self.next_fs_handle;
            self.next_fs_handle += 1;
            self.open_paths.insert(handle, path.to_string());
            if mode == FileMode::WriteTruncate {
                self.files.insert(path.to_string(), Vec::new());
            }
            FsHandle(handle)
        }

        fn fs_write(&mut self, file: FsHandle, bytes: &[u8], position: u64) {
            if let Some(path) = self.open_paths.get(&file.0) {
                let contents = self.files.entry(path.clone()).or_default();
                let end = position as usize + bytes.len();
                if contents.len() < end {
                    contents.resize(end, 0);
                }
                contents[position as usize..end].copy_from_slice(bytes);
            }
        }

        fn fs_close(&mut self, file: FsHandle) {
            self.close_count += 1;
            self.open_paths.remove(&file.0);
        }
    }
}
