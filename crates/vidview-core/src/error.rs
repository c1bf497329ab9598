//! Error types for player sessions

use thiserror::Error;

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors reported by the registry, sessions and decode engines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// Handle is unknown, stale, or refers to a released session
    #[error("invalid player handle")]
    InvalidHandle,

    /// Window binding or rendering resources could not be established
    #[error("player creation failed: {0}")]
    CreationFailed(String),

    /// The decode engine could not open the given source
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Release was called a second time on the same handle
    #[error("player handle already released")]
    DoubleRelease,

    /// Malformed caller input (non-finite geometry, bad config, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PlayerError {
    /// Status code used across the C ABI.
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::InvalidHandle => -1,
            PlayerError::CreationFailed(_) => -2,
            PlayerError::SourceUnavailable(_) => -3,
            PlayerError::DoubleRelease => -4,
            PlayerError::InvalidArgument(_) => -5,
        }
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::InvalidArgument(format!("config: {}", err))
    }
}
