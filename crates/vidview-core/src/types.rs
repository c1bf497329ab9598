//! Core types shared by sessions, engines and the compositor
//!
//! These types are used internally and converted to flat C values in the
//! bridge crate.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{PlayerError, Result};

/// Overlay rectangle in region coordinates (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Build rectangles from a flat `[x, y, w, h, x, y, w, h, ...]` buffer.
    ///
    /// Trailing values that do not form a complete rectangle are ignored.
    pub fn from_flat(values: &[f32]) -> Vec<Rect> {
        values
            .chunks_exact(4)
            .map(|c| Rect::new(c[0], c[1], c[2], c[3]))
            .collect()
    }
}

/// Stroke color, each channel in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Channels are clamped into 0.0..=1.0; NaN becomes 0.0.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        fn clamp(v: f32) -> f32 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        Self {
            r: clamp(r),
            g: clamp(g),
            b: clamp(b),
            a: clamp(a),
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
            (self.a * 255.0).round() as u8,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }
}

/// Opaque reference to a caller-owned host window.
///
/// Only ever compared and logged; never dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRef(NonZeroUsize);

impl WindowRef {
    /// Returns `None` for a null reference.
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowRef({:#x})", self.0)
    }
}

/// Largest surface edge in pixels; bigger regions cannot be backed by a frame buffer
pub const MAX_SURFACE_EDGE: f32 = 16_384.0;

/// A rectangle inside a host window where video and overlay are rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRegion {
    pub window: WindowRef,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl WindowRegion {
    /// Validate and build a region. A zero `window` is a null reference.
    pub fn new(window: usize, x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        let window = WindowRef::new(window)
            .ok_or_else(|| PlayerError::CreationFailed("null window reference".to_string()))?;
        let region = Self {
            window,
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(PlayerError::CreationFailed(format!(
                "region origin must be finite, got ({}, {})",
                self.x, self.y
            )));
        }
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width < 1.0
            || self.height < 1.0
        {
            return Err(PlayerError::CreationFailed(format!(
                "region size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_SURFACE_EDGE || self.height > MAX_SURFACE_EDGE {
            return Err(PlayerError::CreationFailed(format!(
                "region size {}x{} exceeds {} pixels per edge",
                self.width, self.height, MAX_SURFACE_EDGE
            )));
        }
        Ok(())
    }

    /// Pixel size of the surface backing this region.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PlaybackState {
    /// Created, no source loaded
    Idle = 0,
    Playing = 1,
    Paused = 2,
    Stopped = 3,
    /// Terminal
    Released = 4,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Released => "released",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded RGBA8 frame
#[derive(Clone)]
pub struct VideoFrame {
    /// Tightly packed RGBA rows
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp relative to stream start (microseconds)
    pub pts_us: u64,
    /// Assigned by the frame source; strictly increasing per source
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(pixels: impl Into<Arc<[u8]>>, width: u32, height: u32, pts_us: u64) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            pts_us,
            sequence: 0,
        }
    }

    pub fn expected_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() >= Self::expected_size(self.width, self.height)
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pts_us", &self.pts_us)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Playback statistics for the current (or last) source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    pub frames_decoded: u64,
    pub frames_presented: u64,
    /// Frames replaced in the latest-wins slot before they were presented
    pub frames_dropped: u64,
    pub bytes_read: u64,
    pub input_bitrate_kbps: f64,
    pub video_width: u32,
    pub video_height: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlaybackStats {
    /// Multi-line summary for on-screen or log display.
    pub fn to_text(&self) -> String {
        format!(
            "Bitrate: {:.2} kb/s\nRead: {:.2} MB\nDecoded frames: {}\nLost frames: {}",
            self.input_bitrate_kbps,
            self.bytes_read as f64 / (1024.0 * 1024.0),
            self.frames_decoded,
            self.frames_dropped,
        )
    }
}

/// Notifications delivered to `PlayerSession::subscribe` receivers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The decode engine opened the source and playback started
    Opened { source: String, width: u32, height: u32 },
    /// Opening (or continuing to read) the source failed
    SourceUnavailable { source: String, reason: String },
    /// The stream ended; the last frame stays on screen
    EndOfStream { source: String },
    StateChanged { from: PlaybackState, to: PlaybackState },
}

/// Network stream schemes recognized by `MediaSource::parse`
pub const NETWORK_SCHEMES: &[&str] = &["http", "https", "rtsp", "rtmp", "rtmps", "rtp"];

/// A classified playback source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Local file or directory, separators normalized to `/`
    Local(PathBuf),
    /// Network stream URL, passed through unchanged
    Network(String),
}

impl MediaSource {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(PlayerError::SourceUnavailable("empty source".to_string()));
        }
        if is_network_stream(trimmed) {
            return Ok(MediaSource::Network(trimmed.to_string()));
        }
        Ok(MediaSource::Local(PathBuf::from(trimmed.replace('\\', "/"))))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, MediaSource::Network(_))
    }

    /// Display form used in logs and events.
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Local(path) => path.display().to_string(),
            MediaSource::Network(url) => url.clone(),
        }
    }
}

fn is_network_stream(source: &str) -> bool {
    let Some((scheme, _)) = source.split_once("://") else {
        return false;
    };
    NETWORK_SCHEMES
        .iter()
        .any(|known| scheme.eq_ignore_ascii_case(known))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_color_clamps_channels() {
        let color = Color::new(-1.0, 2.0, f32::NAN, 0.5);
        assert_eq!(color, Color { r: 0.0, g: 1.0, b: 0.0, a: 0.5 });
        assert_eq!(Color::new(1.0, 0.0, 0.0, 0.8).to_rgba8(), [255, 0, 0, 204]);
    }

    #[test]
    fn test_rect_from_flat_ignores_partial_tail() {
        let rects = Rect::from_flat(&[100.0, 100.0, 200.0, 150.0, 400.0, 200.0, 150.0, 100.0, 1.0]);
        assert_eq!(
            rects,
            vec![
                Rect::new(100.0, 100.0, 200.0, 150.0),
                Rect::new(400.0, 200.0, 150.0, 100.0)
            ]
        );
    }

    #[test]
    fn test_region_rejects_null_window_and_bad_size() {
        assert!(matches!(
            WindowRegion::new(0, 0.0, 0.0, 800.0, 600.0),
            Err(PlayerError::CreationFailed(_))
        ));
        assert!(WindowRegion::new(1, 0.0, 0.0, 0.0, 600.0).is_err());
        assert!(WindowRegion::new(1, 0.0, 0.0, 800.0, -1.0).is_err());
        assert!(WindowRegion::new(1, f32::NAN, 0.0, 800.0, 600.0).is_err());
        assert!(matches!(
            WindowRegion::new(1, 0.0, 0.0, 1e6, 1e6),
            Err(PlayerError::CreationFailed(_))
        ));
        assert!(WindowRegion::new(1, 0.0, 0.0, 16_384.0, 16.0).is_ok());
        assert!(WindowRegion::new(1, 0.0, 0.0, 16.0, 16_385.0).is_err());
        let region = WindowRegion::new(0x1234, 50.0, 50.0, 800.0, 600.0).unwrap();
        assert_eq!(region.pixel_size(), (800, 600));
        assert_eq!(region.window.raw(), 0x1234);
    }

    #[test]
    fn test_media_source_classification() {
        for url in [
            "http://example.com/stream.m3u8",
            "HTTPS://example.com/a.mp4",
            "rtsp://example.com/stream",
            "rtmp://example.com/live",
            "rtmps://example.com/live",
            "rtp://239.0.0.1:5004",
        ] {
            assert!(MediaSource::parse(url).unwrap().is_network(), "{}", url);
        }

        assert_eq!(
            MediaSource::parse(r"C:\Videos\sample.mp4").unwrap(),
            MediaSource::Local(PathBuf::from("C:/Videos/sample.mp4"))
        );
        assert_eq!(
            MediaSource::parse("ftp://example.com/a.mp4").unwrap(),
            MediaSource::Local(PathBuf::from("ftp://example.com/a.mp4"))
        );
        assert!(matches!(
            MediaSource::parse("   "),
            Err(PlayerError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_stats_text() {
        let stats = PlaybackStats {
            bytes_read: 3 * 1024 * 1024,
            input_bitrate_kbps: 1500.0,
            frames_decoded: 90,
            frames_dropped: 2,
            ..Default::default()
        };
        assert_eq!(
            stats.to_text(),
            "Bitrate: 1500.00 kb/s\nRead: 3.00 MB\nDecoded frames: 90\nLost frames: 2"
        );
    }
}
