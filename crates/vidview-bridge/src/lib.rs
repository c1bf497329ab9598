//! vidview C bridge
//!
//! Exposes player sessions from `vidview-core` through a C ABI so a host
//! application (Electron addon, C++ shell, Go via CGO) can embed video with a
//! rectangle overlay.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  u64 handle  ┌──────────────────┐     ┌───────────────┐
//! │ Host process │─────────────▶│ vv_* (this crate)│────▶│ vidview-core  │
//! │ (C ABI)      │◀─────────────│ status codes     │     │ session/regs  │
//! └──────────────┘  RGBA frames └──────────────────┘     └───────────────┘
//! ```
//!
//! ## Usage from C
//!
//! ```c
//! uint64_t h = vv_create_player_for_view(hwnd, 50, 50, 800, 600);
//! vv_player_play(h, "C:\\Videos\\clip.mp4");
//!
//! float rects[] = { 10, 20, 100, 50 };
//! vv_player_update_rectangles(h, rects, 1, 3.0f, 0, 1, 0, 1);
//!
//! vv_player_release(h);
//! ```
//!
//! ## Status Codes
//!
//! `0` ok, `-1` invalid handle, `-2` creation failed, `-3` source unavailable,
//! `-4` double release, `-5` invalid argument.
//!
//! ## Memory Ownership
//!
//! - Handles are plain integers; `vv_player_release()` ends a session
//! - Strings returned by the library are freed with `vv_string_free()`
//! - Caller buffers are only written within the length passed in

pub mod ffi;
pub mod host;

pub use host::{CallbackHost, FrameCallback};
