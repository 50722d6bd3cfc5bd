//! Error types for the synthesis pipeline

use thiserror::Error;

/// Result type alias for synthesis operations
pub type TtsResult<T> = Result<T, TtsError>;

/// Errors that can occur while synthesizing or playing speech
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
