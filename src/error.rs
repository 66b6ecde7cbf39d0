//! Error types for the relay gateway

use std::io;

use thiserror::Error;

/// Result type alias for the relay gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Relay gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request fields (user-correctable)
    #[error("{0}")]
    Validation(String),

    /// Malformed base64 or undetectable attachment content
    #[error("{0}")]
    Decode(String),

    /// The external binary exited unsuccessfully
    #[error("{0}")]
    Subprocess(String),

    /// Filesystem failure on registry or attachment I/O
    #[error("Storage error: {0}")]
    Storage(String),

    /// The relay binary could not be launched
    #[error("Failed to start relay: {0}")]
    Startup(String),

    /// The relay process exited
    #[error("Relay process terminated: {0}")]
    RelayTerminated(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Wrap an I/O failure with the path it happened on
    pub fn storage(path: &std::path::Path, err: &io::Error) -> Self {
        Self::Storage(format!("{}: {err}", path.display()))
    }

    /// Whether the caller can fix this by changing the request
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Decode(_))
    }
}
