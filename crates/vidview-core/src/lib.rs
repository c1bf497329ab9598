//! Video surface sessions with a synchronized rectangle overlay
//!
//! A session binds a region of a host window to a playback pipeline and keeps a
//! set of annotation rectangles drawn over the video, in step with the frames on
//! screen.
//!
//! ## Architecture
//!
//! ```text
//!               ┌──────────────┐  latest-wins  ┌───────────┐    ┌────────────┐
//!  play(src) ──▶│ FrameSource  │──────────────▶│ Presenter │───▶│ HostWindow │
//!               │ (decode thr) │   FrameSlot   │ (tick thr)│    └────────────┘
//!               └──────────────┘               └─────▲─────┘
//!                                                    │ Arc swap
//!  update_rectangles ──────────────▶ OverlayStore ───┘
//! ```
//!
//! Sessions are addressed by opaque integer handles through the
//! [`registry`]; the C ABI lives in the `vidview-bridge` crate.
//!
//! ## Threads
//!
//! - caller thread: every public operation; only `release` and `stop` join
//! - decode thread: one per playing source, owns the decode engine stream
//! - presentation thread: one per session, composites and presents

pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
mod font;
pub mod host;
pub mod logging;
pub mod overlay;
pub mod presenter;
pub mod registry;
pub mod session;
pub mod slot;
pub mod source;
pub mod types;

pub use compositor::{CompositedFrame, Compositor, Placement};
pub use config::PlayerConfig;
pub use engine::{
    default_engine, CancelToken, DecodeEngine, MediaStream, PatternEngine, StillImageEngine,
    StreamPoll,
};
#[cfg(feature = "ffmpeg")]
pub use engine::FfmpegEngine;
pub use error::{PlayerError, Result};
pub use host::{FrameBufferHost, HostWindow};
pub use overlay::{OverlaySnapshot, OverlayStore};
pub use registry::{Handle, SessionRegistry};
pub use session::PlayerSession;
pub use types::{
    Color, MediaSource, PlaybackState, PlaybackStats, PlayerEvent, Rect, VideoFrame, WindowRef,
    WindowRegion,
};
