//! Error types for the arbitration side

use thiserror::Error;

/// Result type alias for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Errors surfaced by the stage layer. Malformed candidates are an expected,
/// high-frequency condition; the director logs them at debug and moves on.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
