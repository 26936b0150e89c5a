//! Error types for Histoscope

use thiserror::Error;

/// Histoscope error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Fit service error
    #[error("Fit service error: {0}")]
    FitService(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
