//! Decode engine boundary
//!
//! The decode engine is an external collaborator: it opens a source and hands back
//! RGBA frames. Three implementations ship with the crate:
//!
//! - [`StillImageEngine`]: local images and image-sequence directories (`image` crate)
//! - [`PatternEngine`]: synthetic color bars, for tests and demos
//! - `FfmpegEngine`: files and network streams via ffmpeg-next (`ffmpeg` feature)
//!
//! Engines run entirely on the session's decode thread. They must poll the
//! [`CancelToken`] during anything that can block (opening a network stream,
//! waiting for packets) so `stop`/`release` return within a bounded time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::PlayerConfig;
use crate::error::Result;
use crate::types::{MediaSource, VideoFrame};

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod pattern;
mod still;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegEngine;
pub use pattern::PatternEngine;
pub use still::StillImageEngine;

/// Shared flag asking an engine to abandon whatever it is doing
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of asking a stream for its next frame
#[derive(Debug)]
pub enum StreamPoll {
    Frame(VideoFrame),
    /// Nothing decoded yet; ask again shortly
    Pending,
    EndOfStream,
}

/// An opened source producing frames
pub trait MediaStream: Send {
    /// Decode the next frame. Frame `pts_us` values must be non-decreasing.
    fn next_frame(&mut self) -> Result<StreamPoll>;

    /// Native dimensions of the video track, when known.
    fn dimensions(&self) -> (u32, u32);

    /// Total bytes consumed from the input so far.
    fn bytes_read(&self) -> u64 {
        0
    }

    /// Release decoder resources. Called exactly once by the frame source.
    fn close(&mut self) {}
}

/// Opens sources into streams
pub trait DecodeEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Open `source`. May block on I/O, but must give up with
    /// `PlayerError::SourceUnavailable` once `cancel` is set.
    fn open(
        &self,
        source: &MediaSource,
        config: &PlayerConfig,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaStream>>;
}

/// Engine used when the caller does not supply one: ffmpeg when compiled in,
/// with still images and image sequences always routed to the image decoder.
pub fn default_engine() -> Arc<dyn DecodeEngine> {
    Arc::new(RoutingEngine::default())
}

/// Picks the image decoder for image paths and directories, and ffmpeg (when
/// available) for everything else.
#[derive(Default)]
pub struct RoutingEngine {
    still: StillImageEngine,
    #[cfg(feature = "ffmpeg")]
    ffmpeg: FfmpegEngine,
}

impl DecodeEngine for RoutingEngine {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn open(
        &self,
        source: &MediaSource,
        config: &PlayerConfig,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaStream>> {
        if StillImageEngine::handles(source) {
            return self.still.open(source, config, cancel);
        }

        #[cfg(feature = "ffmpeg")]
        {
            self.ffmpeg.open(source, config, cancel)
        }

        #[cfg(not(feature = "ffmpeg"))]
        {
            Err(crate::error::PlayerError::SourceUnavailable(format!(
                "{}: no decoder for this source (build with the `ffmpeg` feature)",
                source.describe()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayerError;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    #[cfg(not(feature = "ffmpeg"))]
    fn test_routing_without_ffmpeg_rejects_streams() {
        let engine = default_engine();
        let source = MediaSource::parse("rtsp://camera.local/stream").unwrap();
        let result = engine.open(&source, &PlayerConfig::default(), &CancelToken::new());
        assert!(matches!(result, Err(PlayerError::SourceUnavailable(_))));
    }
}
