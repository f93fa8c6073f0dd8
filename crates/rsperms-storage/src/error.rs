//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend connection error.
    #[error("storage connection error: {message}")]
    ConnectionError { message: String },

    /// A query or write failed.
    #[error("storage query error: {message}")]
    QueryError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a backend health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
    pub message: Option<String>,
}
