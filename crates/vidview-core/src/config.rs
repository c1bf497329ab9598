//! Player configuration
//!
//! Every field has a default, so a caller may pass `{}` (or nothing at all) and
//! override only what it needs.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PlayerError, Result};
use crate::types::Color;

/// Configuration applied to a player session at creation time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Presentation ticks per second driving the compositor
    pub presentation_fps: f32,
    /// Read-ahead budget for local files, in milliseconds
    pub file_caching_ms: u32,
    /// Read-ahead budget for network streams, in milliseconds
    pub network_caching_ms: u32,
    /// Upper bound on how long a decode engine may spend opening a source
    pub open_timeout_ms: u64,
    /// Frame rate used when playing back image sequences
    pub still_fps: f32,
    /// Fill color around a letterboxed/pillarboxed frame
    pub background: [u8; 3],
    /// Stroke width used until the first rectangle update
    pub default_line_width: f32,
    /// Stroke color (r, g, b, a in 0.0..=1.0) used until the first rectangle update
    pub default_color: [f32; 4],
    /// TrueType font for the statistics box; common monospace system fonts are
    /// tried when unset
    pub stats_font: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            presentation_fps: 30.0,
            file_caching_ms: 50,
            network_caching_ms: 300,
            open_timeout_ms: 10_000,
            still_fps: 25.0,
            background: [0, 0, 0],
            default_line_width: 2.0,
            default_color: [0.0, 1.0, 0.0, 1.0],
            stats_font: None,
        }
    }
}

impl PlayerConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let trimmed = json.trim();
        let config: PlayerConfig = if trimmed.is_empty() {
            PlayerConfig::default()
        } else {
            serde_json::from_str(trimmed)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(self.presentation_fps.is_finite()
            && self.presentation_fps > 0.0
            && self.presentation_fps <= 240.0)
        {
            return Err(PlayerError::InvalidArgument(
                "presentation_fps must be in (0, 240]".to_string(),
            ));
        }
        if !(self.still_fps.is_finite() && self.still_fps > 0.0) {
            return Err(PlayerError::InvalidArgument(
                "still_fps must be positive".to_string(),
            ));
        }
        if !(self.default_line_width.is_finite() && self.default_line_width > 0.0) {
            return Err(PlayerError::InvalidArgument(
                "default_line_width must be positive".to_string(),
            ));
        }
        if self.default_color.iter().any(|c| !c.is_finite()) {
            return Err(PlayerError::InvalidArgument(
                "default_color must be finite".to_string(),
            ));
        }
        if self.open_timeout_ms == 0 {
            return Err(PlayerError::InvalidArgument(
                "open_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between presentation ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.presentation_fps)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn default_color(&self) -> Color {
        let [r, g, b, a] = self.default_color;
        Color::new(r, g, b, a)
    }
}
