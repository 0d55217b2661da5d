// C-compatible FFI bindings for native host integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - String parameters must be valid null-terminated UTF-8
// - Caller must call the corresponding _destroy function for each handle

use std::ffi::{CStr, CString, c_char};

use crate::bridge::{AudioHandle, ControlHandle, create_bridge, log_channel, printer};
use crate::engine::Status;
use crate::native::NativeEngine;
use crate::processor::Processor;

#[cfg(feature = "ios")]
use log::LevelFilter;
#[cfg(feature = "ios")]
use oslog::OsLogger;

// Logger subsystem identifier
#[cfg(feature = "ios")]
const LOG_SUBSYSTEM: &str = "com.orcbridge.bridge";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup before any other function. Discarded
/// control messages and engine lifecycle events then show up in Console.app
/// and Xcode's debug console.
#[cfg(feature = "ios")]
#[unsafe(no_mangle)]
pub extern "C" fn orcbridge_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to the control side of the bridge.
pub struct OrcBridgeControl {
    inner: ControlHandle,
}

/// Opaque handle to the audio side of the bridge.
pub struct OrcBridgeAudio {
    inner: AudioHandle<NativeEngine>,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the audio side.
#[repr(C)]
pub struct OrcBridgeReadback {
    pub running: bool,
    pub prepared: bool,
    pub status: i32,
    pub score_time: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Bridge Creation
// ═══════════════════════════════════════════════════════════════════════════

/// Create a linked control/audio handle pair around a fresh engine instance.
///
/// Returns the control handle; the audio handle is returned via `out_audio`
/// and is intended to move to the audio thread. Both handles must be
/// destroyed with their respective destroy functions.
///
/// # Safety
/// `out_audio` must be a valid pointer to store the audio handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn orcbridge_create(
    out_audio: *mut *mut OrcBridgeAudio,
) -> *mut OrcBridgeControl {
    let (log_tx, log_rx) = log_channel();
    let engine = NativeEngine::new(printer(log_tx));
    let processor = Processor::new(engine);
    let (control, audio) = create_bridge(processor, log_rx);

    if !out_audio.is_null() {
        unsafe {
            *out_audio = Box::into_raw(Box::new(OrcBridgeAudio { inner: audio }));
        }
    }

    Box::into_raw(Box::new(OrcBridgeControl { inner: control }))
}

/// Destroy a control handle.
///
/// # Safety
/// `control` must be a valid pointer returned by `orcbridge_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_destroy(control: *mut OrcBridgeControl) {
    if !control.is_null() {
        unsafe { drop(Box::from_raw(control)) };
    }
}

/// Destroy an audio handle, releasing the engine instance with it.
///
/// # Safety
/// `audio` must be a valid pointer returned via `orcbridge_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_destroy(audio: *mut OrcBridgeAudio) {
    if !audio.is_null() {
        unsafe { drop(Box::from_raw(audio)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Messages
// ═══════════════════════════════════════════════════════════════════════════

unsafe fn text_or_empty<'a>(text: *const c_char) -> &'a str {
    if text.is_null() {
        ""
    } else {
        unsafe { CStr::from_ptr(text) }.to_str().unwrap_or("")
    }
}

/// Compile a project archive.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_compile_archive(
    control: *mut OrcBridgeControl,
    text: *const c_char,
) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.compile_archive(text_or_empty(text)) };
}

/// Compile orchestra source.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_compile_source(
    control: *mut OrcBridgeControl,
    text: *const c_char,
) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.compile_source(text_or_empty(text)) };
}

/// Incrementally evaluate an orchestra snippet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_evaluate(control: *mut OrcBridgeControl, text: *const c_char) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.evaluate(text_or_empty(text)) };
}

/// Feed text to the score reader.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_read_score(control: *mut OrcBridgeControl, text: *const c_char) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.read_score(text_or_empty(text)) };
}

/// Write a numeric control channel.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_channel(
    control: *mut OrcBridgeControl,
    name: *const c_char,
    value: f64,
) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.set_channel(text_or_empty(name), value) };
}

/// Write a text control channel.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_text_channel(
    control: *mut OrcBridgeControl,
    name: *const c_char,
    value: *const c_char,
) {
    if control.is_null() {
        return;
    }
    unsafe {
        (*control)
            .inner
            .set_text_channel(text_or_empty(name), text_or_empty(value))
    };
}

/// Start playback, preparing the engine on first use.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_start(control: *mut OrcBridgeControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.start() };
}

/// Stop playback. Engine state is retained for a later resume.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_stop(control: *mut OrcBridgeControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.stop() };
}

/// Resume playback.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_resume(control: *mut OrcBridgeControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.resume() };
}

/// Forward a raw option string to the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_set_option(control: *mut OrcBridgeControl, option: *const c_char) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.set_option(text_or_empty(option)) };
}

/// Reset the engine and discard derived playback state.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_reset(control: *mut OrcBridgeControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.reset() };
}

/// Materialize a byte payload in the engine's virtual filesystem.
///
/// # Safety
/// `data` must point to `length` valid bytes, or be NULL with `length` 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_write_file(
    control: *mut OrcBridgeControl,
    path: *const c_char,
    data: *const u8,
    length: usize,
) {
    if control.is_null() {
        return;
    }
    let bytes = if data.is_null() {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data, length) }.to_vec()
    };
    unsafe { (*control).inner.write_file(text_or_empty(path), bytes) };
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Readback and Logs
// ═══════════════════════════════════════════════════════════════════════════

/// Get the current readback snapshot.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_readback(control: *const OrcBridgeControl) -> OrcBridgeReadback {
    if control.is_null() {
        return OrcBridgeReadback {
            running: false,
            prepared: false,
            status: Status::OK.code(),
            score_time: 0.0,
        };
    }
    let readback = unsafe { (*control).inner.readback() };
    OrcBridgeReadback {
        running: readback.running,
        prepared: readback.prepared,
        status: readback.status.code(),
        score_time: readback.score_time,
    }
}

/// Take all pending engine print output, newline-joined, or NULL if none.
///
/// The returned string must be released with `orcbridge_string_free`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn control_poll_logs(control: *const OrcBridgeControl) -> *mut c_char {
    if control.is_null() {
        return std::ptr::null_mut();
    }
    let lines = unsafe { (*control).inner.poll_logs() };
    if lines.is_empty() {
        return std::ptr::null_mut();
    }
    CString::new(lines.join("\n")).unwrap_or_default().into_raw()
}

/// Release a string returned by `control_poll_logs`.
///
/// # Safety
/// `text` must be a pointer returned by this module, or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn orcbridge_string_free(text: *mut c_char) {
    if !text.is_null() {
        unsafe { drop(CString::from_raw(text)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio Thread Functions
// ═══════════════════════════════════════════════════════════════════════════

/// Produce one quantum of planar output.
///
/// Drains pending control messages, runs the refill loop and publishes
/// readback. Buffers are planar: `channels` runs of `frames` samples. While
/// the bridge is not running the output is left untouched, so hosts that
/// expect silence must pre-zero it.
///
/// # Safety
/// - Must be called from the audio thread
/// - `output` must hold `frames * output_channels` samples
/// - `input` must hold `frames * input_channels` samples, or be NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_process(
    audio: *mut OrcBridgeAudio,
    frames: u32,
    input: *const f32,
    input_channels: u32,
    output: *mut f32,
    output_channels: u32,
) {
    if audio.is_null() || output.is_null() {
        return;
    }
    let audio = unsafe { &mut *audio };

    let input_slice: &[f32] = if input.is_null() {
        &[]
    } else {
        unsafe {
            std::slice::from_raw_parts(input, frames as usize * input_channels as usize)
        }
    };
    let output_slice = unsafe {
        std::slice::from_raw_parts_mut(output, frames as usize * output_channels as usize)
    };

    let mut output_buffer =
        crate::audio_buffer::AudioBuffer::new(output_slice, output_channels.max(1) as usize);

    audio.inner.process(input_slice, &mut output_buffer);
}

/// Run the compiled performance to completion, non-realtime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_render_offline(audio: *mut OrcBridgeAudio) {
    if audio.is_null() {
        return;
    }
    unsafe { (*audio).inner.render_offline() };
}

/// Read a numeric control channel directly from the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_channel(audio: *const OrcBridgeAudio, name: *const c_char) -> f64 {
    if audio.is_null() {
        return 0.0;
    }
    unsafe { (*audio).inner.processor().channel(text_or_empty(name)) }
}

/// Length of a function table, or 0 if it does not exist.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_table_len(audio: *const OrcBridgeAudio, table: u32) -> usize {
    if audio.is_null() {
        return 0;
    }
    unsafe { (*audio).inner.processor().table_len(table) }
}

/// Overwrite one value of a function table.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_set_table_value(
    audio: *mut OrcBridgeAudio,
    table: u32,
    index: usize,
    value: f32,
) {
    if audio.is_null() {
        return;
    }
    unsafe {
        (*audio)
            .inner
            .processor_mut()
            .set_table_value(table, index, value)
    };
}

/// Pause the engine's performance clock.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_pause(audio: *mut OrcBridgeAudio) {
    if audio.is_null() {
        return;
    }
    unsafe { (*audio).inner.processor_mut().pause() };
}
