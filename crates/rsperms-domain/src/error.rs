//! Domain error types for permission resolution and audit queries.

use thiserror::Error;

/// Domain-specific errors.
///
/// Resolution itself never fails: malformed or expired nodes are skipped and
/// cycles are broken. These errors cover construction and usage mistakes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A context key or value was empty after normalization.
    #[error("invalid context pair '{key}={value}': {message}")]
    InvalidContext {
        key: String,
        value: String,
        message: String,
    },

    /// An identity name could not be used (e.g. an empty group name).
    #[error("invalid identity: {value}")]
    InvalidIdentity { value: String },

    /// The identity is not loaded into the inheritance graph.
    #[error("identity not loaded: {identity}")]
    IdentityNotLoaded { identity: String },

    /// An audit entry is missing a required field.
    #[error("invalid log entry: {message}")]
    InvalidLogEntry { message: String },

    /// Page numbers are 1-indexed.
    #[error("invalid page number {page}: pages start at 1")]
    InvalidPage { page: usize },

    /// The requested page lies beyond the last populated page.
    #[error("page {page} out of range (max: {max_pages})")]
    PageOutOfRange { page: usize, max_pages: usize },

    /// Page size must be positive.
    #[error("page size must be greater than 0")]
    InvalidPageSize,
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
