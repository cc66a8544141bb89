//! Error types for devtrail-core

use thiserror::Error;

/// Main error type for the devtrail-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (invalid values or unreadable config)
    #[error("configuration error: {0}")]
    Config(String),

    /// Session ID that cannot be used as a storage key
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Git command failed
    #[error("git error: {0}")]
    Git(String),

    /// Session storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Team backend error
    #[error("team sharing error: {0}")]
    Team(String),

    /// Summarizer error
    #[error("summary error: {0}")]
    Summary(String),
}

/// Result type alias for devtrail-core
pub type Result<T> = std::result::Result<T, Error>;
