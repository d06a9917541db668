//! Error types for the tutor pipeline.

use thiserror::Error;

/// Result type alias for tutor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tutor pipeline.
///
/// Component-local conditions (no voice selected, playback failure) are
/// absorbed and logged where they occur; only pipeline-level failures
/// (a failed send, a misconfigured startup) travel as these values.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Tutor backend transport failure or non-success status
    #[error("tutor error: {0}")]
    Tutor(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
