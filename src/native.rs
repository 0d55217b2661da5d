// src/native.rs
//
// Binding to the engine's exported native entry points.
//
// Safety requirements:
// - One `NativeEngine` wraps exactly one engine instance and is its only
//   caller; the handle is released on drop
// - Window and table views borrow engine-owned storage; they are only handed
//   out between refills, never across a reset
// - The print callback trampoline owns its hook through a raw Box that lives
//   as long as the engine handle

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::slice;

use crate::engine::{Engine, FileMode, FsHandle, PrintFn, Status};

mod sys {
    use super::{c_char, c_int, c_void};

    #[repr(C)]
    pub struct OrcEngine {
        _private: [u8; 0],
    }

    #[repr(C)]
    pub struct OrcFsFile {
        _private: [u8; 0],
    }

    pub type MessageCallback = extern "C" fn(user: *mut c_void, line: *const c_char);

    unsafe extern "C" {
        pub fn OrcEngine_new() -> *mut OrcEngine;
        pub fn OrcEngine_destroy(engine: *mut OrcEngine);
        pub fn OrcEngine_setMessageCallback(
            engine: *mut OrcEngine,
            callback: MessageCallback,
            user: *mut c_void,
        );

        pub fn OrcEngine_compileArchive(engine: *mut OrcEngine, text: *const c_char) -> c_int;
        pub fn OrcEngine_compileOrchestra(engine: *mut OrcEngine, text: *const c_char) -> c_int;
        pub fn OrcEngine_evaluate(engine: *mut OrcEngine, text: *const c_char) -> c_int;
        pub fn OrcEngine_readScore(engine: *mut OrcEngine, text: *const c_char) -> c_int;
        pub fn OrcEngine_reset(engine: *mut OrcEngine);

        pub fn OrcEngine_getOutputBuffer(engine: *mut OrcEngine) -> *const f32;
        pub fn OrcEngine_getInputBuffer(engine: *mut OrcEngine) -> *mut f32;

        pub fn OrcEngine_getChannel(engine: *mut OrcEngine, name: *const c_char) -> f64;
        pub fn OrcEngine_setChannel(engine: *mut OrcEngine, name: *const c_char, value: f64);
        pub fn OrcEngine_setTextChannel(
            engine: *mut OrcEngine,
            name: *const c_char,
            value: *const c_char,
        );

        pub fn OrcEngine_getBlockSize(engine: *mut OrcEngine) -> c_int;
        pub fn OrcEngine_performBlock(engine: *mut OrcEngine) -> c_int;
        pub fn OrcEngine_renderOffline(engine: *mut OrcEngine);

        pub fn OrcEngine_getInputChannelCount(engine: *mut OrcEngine) -> c_int;
        pub fn OrcEngine_getOutputChannelCount(engine: *mut OrcEngine) -> c_int;

        pub fn OrcEngine_getTableLength(engine: *mut OrcEngine, table: c_int) -> c_int;
        pub fn OrcEngine_getTable(engine: *mut OrcEngine, table: c_int) -> *const f32;
        pub fn OrcEngine_setTableValue(
            engine: *mut OrcEngine,
            table: c_int,
            index: c_int,
            value: f32,
        );

        pub fn OrcEngine_getFullScale(engine: *mut OrcEngine) -> f32;
        pub fn OrcEngine_setOption(engine: *mut OrcEngine, option: *const c_char);
        pub fn OrcEngine_prepareRealtime(engine: *mut OrcEngine);
        pub fn OrcEngine_getScoreTime(engine: *mut OrcEngine) -> f64;
        pub fn OrcEngine_play(engine: *mut OrcEngine);
        pub fn OrcEngine_pause(engine: *mut OrcEngine);

        pub fn OrcFs_open(path: *const c_char, mode: *const c_char) -> *mut OrcFsFile;
        pub fn OrcFs_write(
            file: *mut OrcFsFile,
            bytes: *const u8,
            length: usize,
            position: u64,
        );
        pub fn OrcFs_close(file: *mut OrcFsFile);
    }
}

extern "C" fn print_trampoline(user: *mut c_void, line: *const c_char) {
    if user.is_null() || line.is_null() {
        return;
    }
    let print = unsafe { &mut *(user as *mut PrintFn) };
    let line = unsafe { CStr::from_ptr(line) };
    print(&line.to_string_lossy());
}

/// Interior NULs cannot cross the C boundary; degrade to an empty string
/// rather than failing a fire-and-forget call.
fn to_cstring(text: &str) -> CString {
    CString::new(text).unwrap_or_default()
}

fn mode_str(mode: FileMode) -> &'static CStr {
    match mode {
        FileMode::Read => c"r",
        FileMode::WriteTruncate => c"w+",
    }
}

/// Owned handle to one native engine instance.
///
/// The engine's print output is routed to the injected hook for this
/// instance only. The sample window views are cached during realtime
/// preparation, exactly one refill period behind the engine, and discarded
/// on reset.
pub struct NativeEngine {
    handle: *mut sys::OrcEngine,

    /// Print hook, boxed twice so the trampoline gets a stable address.
    print: *mut PrintFn,

    output_ptr: *const f32,
    output_len: usize,
    input_ptr: *mut f32,
    input_len: usize,
}

// The processor is the engine's only caller and moves between threads as a
// whole; the raw pointers are never aliased outside this struct.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    /// Construct a fresh engine instance and register its print hook.
    pub fn new(print: PrintFn) -> Self {
        let print = Box::into_raw(Box::new(print));
        let handle = unsafe { sys::OrcEngine_new() };
        unsafe {
            sys::OrcEngine_setMessageCallback(handle, print_trampoline, print as *mut c_void);
        }
        Self {
            handle,
            print,
            output_ptr: std::ptr::null(),
            output_len: 0,
            input_ptr: std::ptr::null_mut(),
            input_len: 0,
        }
    }

    fn drop_window_views(&mut self) {
        self.output_ptr = std::ptr::null();
        self.output_len = 0;
        self.input_ptr = std::ptr::null_mut();
        self.input_len = 0;
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        unsafe {
            sys::OrcEngine_destroy(self.handle);
            drop(Box::from_raw(self.print));
        }
    }
}

impl Engine for NativeEngine {
    fn compile_archive(&mut self, text: &str) -> Status {
        let text = to_cstring(text);
        Status(unsafe { sys::OrcEngine_compileArchive(self.handle, text.as_ptr()) })
    }

    fn compile_source(&mut self, text: &str) -> Status {
        let text = to_cstring(text);
        Status(unsafe { sys::OrcEngine_compileOrchestra(self.handle, text.as_ptr()) })
    }

    fn evaluate(&mut self, text: &str) -> Status {
        let text = to_cstring(text);
        Status(unsafe { sys::OrcEngine_evaluate(self.handle, text.as_ptr()) })
    }

    fn read_score(&mut self, text: &str) -> Status {
        let text = to_cstring(text);
        Status(unsafe { sys::OrcEngine_readScore(self.handle, text.as_ptr()) })
    }

    fn reset(&mut self) {
        unsafe { sys::OrcEngine_reset(self.handle) };
        self.drop_window_views();
    }

    fn output_window(&self) -> &[f32] {
        if self.output_ptr.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.output_ptr, self.output_len) }
    }

    fn input_window_mut(&mut self) -> &mut [f32] {
        if self.input_ptr.is_null() {
            return &mut [];
        }
        unsafe { slice::from_raw_parts_mut(self.input_ptr, self.input_len) }
    }

    fn channel(&self, name: &str) -> f64 {
        let name = to_cstring(name);
        unsafe { sys::OrcEngine_getChannel(self.handle, name.as_ptr()) }
    }

    fn set_channel(&mut self, name: &str, value: f64) {
        let name = to_cstring(name);
        unsafe { sys::OrcEngine_setChannel(self.handle, name.as_ptr(), value) };
    }

    fn set_text_channel(&mut self, name: &str, value: &str) {
        let name = to_cstring(name);
        let value = to_cstring(value);
        unsafe { sys::OrcEngine_setTextChannel(self.handle, name.as_ptr(), value.as_ptr()) };
    }

    fn block_size(&self) -> usize {
        unsafe { sys::OrcEngine_getBlockSize(self.handle) }.max(0) as usize
    }

    fn perform_block(&mut self) -> Status {
        Status(unsafe { sys::OrcEngine_performBlock(self.handle) })
    }

    fn render_offline(&mut self) {
        unsafe { sys::OrcEngine_renderOffline(self.handle) };
    }

    fn input_channels(&self) -> usize {
        unsafe { sys::OrcEngine_getInputChannelCount(self.handle) }.max(0) as usize
    }

    fn output_channels(&self) -> usize {
        unsafe { sys::OrcEngine_getOutputChannelCount(self.handle) }.max(0) as usize
    }

    fn table_len(&self, table: u32) -> usize {
        unsafe { sys::OrcEngine_getTableLength(self.handle, table as c_int) }.max(0) as usize
    }

    fn table(&self, table: u32) -> Option<&[f32]> {
        let len = self.table_len(table);
        let ptr = unsafe { sys::OrcEngine_getTable(self.handle, table as c_int) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts(ptr, len) })
    }

    fn set_table_value(&mut self, table: u32, index: usize, value: f32) {
        unsafe {
            sys::OrcEngine_setTableValue(self.handle, table as c_int, index as c_int, value)
        };
    }

    fn full_scale(&self) -> f32 {
        unsafe { sys::OrcEngine_getFullScale(self.handle) }
    }

    fn set_option(&mut self, option: &str) {
        let option = to_cstring(option);
        unsafe { sys::OrcEngine_setOption(self.handle, option.as_ptr()) };
    }

    fn prepare_realtime(&mut self) {
        unsafe { sys::OrcEngine_prepareRealtime(self.handle) };

        // Establish the window views for the upcoming performance. They stay
        // valid until the next reset; each refill rewrites them in place.
        let block = self.block_size();
        self.output_len = block * self.output_channels();
        self.input_len = block * self.input_channels();
        self.output_ptr = unsafe { sys::OrcEngine_getOutputBuffer(self.handle) };
        self.input_ptr = unsafe { sys::OrcEngine_getInputBuffer(self.handle) };
        if self.output_ptr.is_null() {
            self.output_len = 0;
        }
        if self.input_ptr.is_null() {
            self.input_len = 0;
        }
    }

    fn score_time(&self) -> f64 {
        unsafe { sys::OrcEngine_getScoreTime(self.handle) }
    }

    fn play(&mut self) {
        unsafe { sys::OrcEngine_play(self.handle) };
    }

    fn pause(&mut self) {
        unsafe { sys::OrcEngine_pause(self.handle) };
    }

    fn fs_open(&mut self, path: &str, mode: FileMode) -> FsHandle {
        let path = to_cstring(path);
        let file = unsafe { sys::OrcFs_open(path.as_ptr(), mode_str(mode).as_ptr()) };
        FsHandle(file as u64)
    }

    fn fs_write(&mut self, file: FsHandle, bytes: &[u8], position: u64) {
        let file = file.0 as *mut sys::OrcFsFile;
        if file.is_null() {
            return;
        }
        unsafe { sys::OrcFs_write(file, bytes.as_ptr(), bytes.len(), position) };
    }

    fn fs_close(&mut self, file: FsHandle) {
        let file = file.0 as *mut sys::OrcFsFile;
        if file.is_null() {
            return;
        }
        unsafe { sys::OrcFs_close(file) };
    }
}
