//! Error types for heaplens sessions
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] heaplens_capture::LoaderError),

    #[error("Unknown heap: {0}")]
    UnknownHeap(u32),

    #[error("Unknown session: {0}")]
    UnknownSession(u32),

    #[error("Invalid selection range: [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
