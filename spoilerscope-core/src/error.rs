//! Error types for spoilerscope-core

use thiserror::Error;

/// Main error type for the spoilerscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Scene input with an invalid shape (rejected at the extraction boundary)
    #[error("invalid scene at index {index}: {message}")]
    InvalidScene { index: usize, message: String },

    /// Dependency enrichment collaborator failed
    #[error("enrichment error: {0}")]
    Enrichment(String),
}

/// Result type alias for spoilerscope-core
pub type Result<T> = std::result::Result<T, Error>;
