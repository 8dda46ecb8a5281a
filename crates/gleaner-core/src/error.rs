use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for Gleaner.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned an unexpected status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream answered "too many requests".
    #[error("Rate limited by upstream")]
    RateLimited {
        /// Server-suggested wait, when the response carried one.
        retry_after: Option<Duration>,
    },

    /// Upstream refused the request for the current credentials.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A page item could not be turned into a record.
    #[error("Malformed item: {0}")]
    MalformedItem(String),

    /// Checkpoint file could not be read, written or committed.
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Delimited file encoding/decoding failed.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Policy-relevant classification of an [`AppError`].
///
/// The fetcher decides retry, skip or abort from the class alone, never from
/// the transport that produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    Forbidden,
    Transient,
    MalformedItem,
    /// Unrecoverable; must be propagated to the caller.
    Fatal,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::RateLimited { .. } => ErrorClass::RateLimited,
            AppError::Forbidden(_) => ErrorClass::Forbidden,
            AppError::HttpError(_)
            | AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::SerializationError(_) => ErrorClass::Transient,
            AppError::MalformedItem(_) => ErrorClass::MalformedItem,
            AppError::CheckpointError(_)
            | AppError::CsvError(_)
            | AppError::IoError(_)
            | AppError::ConfigError(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}
