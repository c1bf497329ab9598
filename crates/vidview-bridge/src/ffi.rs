//! C-compatible FFI interface for player sessions
//!
//! Every export resolves its handle through the process-wide registry in
//! `vidview_core::registry`, so a stale or foreign handle is reported as
//! `-1` instead of being dereferenced.
//!
//! # Thread Safety
//!
//! All functions may be called from any thread. Calls on different handles are
//! independent. `vv_player_release` and `vv_player_stop` block until the
//! session's worker threads have exited; nothing else blocks on I/O.
//!
//! # Safety
//!
//! Pointer arguments are checked for null. Non-null pointers must be valid for
//! the documented length. Panics are caught at the boundary and reported as a
//! failure status.

use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use vidview_core::logging::{self, PREFIX};
use vidview_core::registry::{self, Handle};
use vidview_core::{
    default_engine, Color, FrameBufferHost, HostWindow, PlayerConfig, PlayerError, PlayerSession,
    Rect, Result, WindowRegion,
};
use vidview_ffi_common::{
    copy_str_to_buffer, cstr_to_str, cstring_new_or_fallback, guard, slice_from_raw,
};

use crate::host::{CallbackHost, FrameCallback};

pub const VV_OK: i32 = 0;

/// Returned when a panic is caught at the boundary
const PANIC_STATUS: i32 = -2;

// Safety limits on caller-provided sizes
const MAX_RECTANGLES: i32 = 65_536;
const MAX_SOURCE_LEN: usize = 8192;

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => VV_OK,
        Err(err) => err.code(),
    }
}

fn with_session(handle: Handle, f: impl FnOnce(&PlayerSession) -> Result<()>) -> i32 {
    status(registry::resolve(handle).and_then(|session| f(&session)))
}

fn create_player(
    window: *mut c_void,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    host: Arc<dyn HostWindow>,
    config: PlayerConfig,
) -> Handle {
    let created = WindowRegion::new(window as usize, x, y, width, height)
        .and_then(|region| registry::create_player(region, default_engine(), host, config));
    match created {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!("{} failed to create player: {}", PREFIX, err);
            0
        }
    }
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Create a player bound to a region of `window`.
///
/// Composited frames are kept in memory and can be read back with
/// `vv_player_copy_frame`.
///
/// # Returns
/// A non-zero handle, or 0 if the window is null or the region is empty.
#[no_mangle]
pub extern "C" fn vv_create_player_for_view(
    window: *mut c_void,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> u64 {
    guard(0, || {
        create_player(
            window,
            x,
            y,
            width,
            height,
            FrameBufferHost::new(),
            PlayerConfig::default(),
        )
    })
}

/// Create a player that hands every presented frame to `callback`.
///
/// # Returns
/// A non-zero handle, or 0 on failure (including a missing callback).
#[no_mangle]
pub extern "C" fn vv_create_player_with_callback(
    window: *mut c_void,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    callback: Option<FrameCallback>,
    user_data: *mut c_void,
) -> u64 {
    guard(0, || {
        let Some(callback) = callback else {
            tracing::warn!("{} failed to create player: null frame callback", PREFIX);
            return 0;
        };
        create_player(
            window,
            x,
            y,
            width,
            height,
            Arc::new(CallbackHost::new(callback, user_data)),
            PlayerConfig::default(),
        )
    })
}

/// Create a player with a JSON configuration object.
///
/// A null or empty `config_json` uses the defaults. Unknown fields are
/// rejected.
///
/// # Returns
/// A non-zero handle, or 0 on failure.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn vv_create_player_with_config(
    window: *mut c_void,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    config_json: *const c_char,
) -> u64 {
    guard(0, || {
        let config = if config_json.is_null() {
            Ok(PlayerConfig::default())
        } else {
            match unsafe { cstr_to_str(config_json) } {
                Ok(json) => PlayerConfig::from_json(json),
                Err(e) => Err(PlayerError::InvalidArgument(format!("config: {}", e))),
            }
        };
        match config {
            Ok(config) => create_player(
                window,
                x,
                y,
                width,
                height,
                FrameBufferHost::new(),
                config,
            ),
            Err(err) => {
                tracing::warn!("{} failed to create player: {}", PREFIX, err);
                0
            }
        }
    })
}

/// Release a player. Blocks until its decode and presentation threads exit.
///
/// # Returns
/// `0`, `-1` for an unknown handle, `-4` if the handle was already released.
#[no_mangle]
pub extern "C" fn vv_player_release(handle: u64) -> i32 {
    guard(PANIC_STATUS, || status(registry::release_player(handle)))
}

// ============================================================================
// Playback
// ============================================================================

/// Start playing a file path or network URL.
///
/// Returns as soon as the source is accepted; the open completes in the
/// background and failures show up in `vv_player_last_error`. A missing local
/// file is reported immediately as `-3`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn vv_player_play(handle: u64, source: *const c_char) -> i32 {
    guard(PANIC_STATUS, || {
        with_session(handle, |session| {
            let source = unsafe { cstr_to_str(source) }
                .map_err(|e| PlayerError::InvalidArgument(format!("source: {}", e)))?;
            if source.len() > MAX_SOURCE_LEN {
                return Err(PlayerError::InvalidArgument(format!(
                    "source longer than {} bytes",
                    MAX_SOURCE_LEN
                )));
            }
            session.play(source)
        })
    })
}

#[no_mangle]
pub extern "C" fn vv_player_pause(handle: u64) -> i32 {
    guard(PANIC_STATUS, || with_session(handle, |s| s.pause()))
}

#[no_mangle]
pub extern "C" fn vv_player_resume(handle: u64) -> i32 {
    guard(PANIC_STATUS, || with_session(handle, |s| s.resume()))
}

/// Stop playback and unload the source. Blocks until the decode thread exits.
#[no_mangle]
pub extern "C" fn vv_player_stop(handle: u64) -> i32 {
    guard(PANIC_STATUS, || with_session(handle, |s| s.stop()))
}

// ============================================================================
// Overlay
// ============================================================================

/// Replace the overlay rectangles.
///
/// # Arguments
/// - `rects`: `count * 4` floats laid out as `[x, y, width, height]`, in pixels
///   of the region the player was created with
/// - `count`: number of rectangles; 0 clears them but keeps the new style
/// - `line_width`: stroke width in pixels
/// - `r`, `g`, `b`, `a`: stroke color, each clamped into 0.0..=1.0
///
/// # Returns
/// `0`, `-1` for an unknown handle, `-5` for a negative count, a null buffer
/// with a positive count, or non-finite values.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref, clippy::too_many_arguments)]
pub extern "C" fn vv_player_update_rectangles(
    handle: u64,
    rects: *const f32,
    count: i32,
    line_width: f32,
    r: f32,
    g: f32,
    b: f32,
    a: f32,
) -> i32 {
    guard(PANIC_STATUS, || {
        with_session(handle, |session| {
            if !(0..=MAX_RECTANGLES).contains(&count) {
                return Err(PlayerError::InvalidArgument(format!(
                    "rectangle count {} out of range",
                    count
                )));
            }
            let values = unsafe { slice_from_raw(rects, count as usize * 4) }.ok_or_else(|| {
                PlayerError::InvalidArgument("null rectangle buffer".to_string())
            })?;
            session.update_rectangles(Rect::from_flat(values), line_width, Color::new(r, g, b, a))
        })
    })
}

/// Remove all rectangles; the stroke style is kept.
#[no_mangle]
pub extern "C" fn vv_player_clear_rectangles(handle: u64) -> i32 {
    guard(PANIC_STATUS, || with_session(handle, |s| s.clear_rectangles()))
}

/// Show `text` in a box in the top-right corner of the surface, or hide it.
///
/// `text` may contain newlines and is ignored (and may be null) when `show` is
/// false.
///
/// # Returns
/// `0`, `-1` for an unknown handle, `-5` for a null or non-UTF-8 `text` while
/// showing, or text longer than 4096 bytes.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn vv_player_update_stats_display(
    handle: u64,
    text: *const c_char,
    show: bool,
) -> i32 {
    guard(PANIC_STATUS, || {
        with_session(handle, |session| {
            if !show {
                return session.set_stats_display("", false);
            }
            let text = unsafe { cstr_to_str(text) }
                .map_err(|e| PlayerError::InvalidArgument(format!("stats text: {}", e)))?;
            session.set_stats_display(text, true)
        })
    })
}

// ============================================================================
// Layout
// ============================================================================

/// Set the fill color around the video. Channels are clamped into 0..=255.
#[no_mangle]
pub extern "C" fn vv_player_set_background_color(handle: u64, r: i32, g: i32, b: i32) -> i32 {
    guard(PANIC_STATUS, || {
        with_session(handle, |s| s.set_background_color(r, g, b))
    })
}

/// Move or resize the region inside the same window.
#[no_mangle]
pub extern "C" fn vv_player_set_region(
    handle: u64,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> i32 {
    guard(PANIC_STATUS, || {
        with_session(handle, |s| s.set_region(x, y, width, height))
    })
}

/// Re-fit the video into the region on the next presentation tick.
#[no_mangle]
pub extern "C" fn vv_player_recalculate_video_center(handle: u64) -> bool {
    guard(false, || {
        with_session(handle, |s| s.recalculate_layout()) == VV_OK
    })
}

// ============================================================================
// Queries
// ============================================================================

/// Write a statistics summary into `buf` as a NUL-terminated string.
///
/// # Returns
/// `false` for an unknown handle, a null or empty buffer, or a player that has
/// not played anything yet. Text that does not fit is truncated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn vv_player_get_stats(handle: u64, buf: *mut c_char, len: i32) -> bool {
    guard(false, || {
        if buf.is_null() || len <= 0 {
            return false;
        }
        let Ok(session) = registry::resolve(handle) else {
            return false;
        };
        let stats = session.stats();
        if stats.started_at.is_none() {
            return false;
        }
        unsafe { copy_str_to_buffer(&stats.to_text(), buf, len as usize) }
    })
}

/// Current playback state: `0` idle, `1` playing, `2` paused, `3` stopped,
/// or a negative status for an invalid handle.
#[no_mangle]
pub extern "C" fn vv_player_get_state(handle: u64) -> i32 {
    guard(PANIC_STATUS, || match registry::resolve(handle) {
        Ok(session) => session.state() as i32,
        Err(err) => err.code(),
    })
}

/// Message of the most recent asynchronous failure, or NULL if none.
///
/// The caller owns the string and frees it with `vv_string_free`.
#[no_mangle]
pub extern "C" fn vv_player_last_error(handle: u64) -> *mut c_char {
    guard(ptr::null_mut(), || {
        match registry::resolve(handle).map(|s| s.last_error()) {
            Ok(Some(err)) => cstring_new_or_fallback(&err.to_string(), "unknown error"),
            Ok(None) => ptr::null_mut(),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Copy the most recently presented RGBA8 surface into `buf`.
///
/// `out_width` and `out_height` (either may be null) receive the surface size,
/// or 0 when nothing has been presented yet. A buffer smaller than
/// `width * height * 4` bytes is left untouched and `-5` is returned, so a
/// caller can pass a null buffer first to learn the size.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn vv_player_copy_frame(
    handle: u64,
    buf: *mut u8,
    len: usize,
    out_width: *mut u32,
    out_height: *mut u32,
) -> i32 {
    guard(PANIC_STATUS, || {
        let session = match registry::resolve(handle) {
            Ok(session) => session,
            Err(err) => return err.code(),
        };
        let frame = session.latest_frame();
        let (width, height) = frame.as_ref().map_or((0, 0), |f| (f.width(), f.height()));
        unsafe {
            if !out_width.is_null() {
                *out_width = width;
            }
            if !out_height.is_null() {
                *out_height = height;
            }
        }

        let Some(frame) = frame else {
            return VV_OK;
        };
        let pixels = frame.image.as_raw();
        if buf.is_null() || len < pixels.len() {
            return PlayerError::InvalidArgument(String::new()).code();
        }
        unsafe { ptr::copy_nonoverlapping(pixels.as_ptr(), buf, pixels.len()) };
        VV_OK
    })
}

// ============================================================================
// Ambient
// ============================================================================

/// Install a stderr log subscriber (`RUST_LOG` filter, default `info`).
/// Repeated calls are ignored.
#[no_mangle]
pub extern "C" fn vv_init_logging() {
    guard((), logging::init)
}

vidview_ffi_common::define_version_fn!(vv_bridge_version);

vidview_ffi_common::define_string_free!(vv_string_free);
