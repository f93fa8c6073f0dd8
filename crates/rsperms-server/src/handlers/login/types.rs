//! Data types for session bootstrap.

use std::sync::Arc;
use std::time::Duration;

use rsperms_domain::resolver::ComputedData;
use rsperms_domain::DomainError;
use rsperms_storage::StorageError;
use uuid::Uuid;

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Canonical id the session resolved to.
    pub canonical_id: Uuid,
    /// No record of this player existed before.
    pub first_login: bool,
    /// Default assignments changed the user (and it was saved).
    pub assignments_changed: bool,
    /// Groups read from storage during this login.
    pub groups_loaded: usize,
    /// Snapshot computed for the initial context.
    pub data: Arc<ComputedData>,
    pub elapsed: Duration,
}

/// Errors that can occur during login.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoginError {
    /// The user record could not be loaded, even after a retry.
    #[error("failed to load user {username}: {reason}")]
    LoadFailed { username: String, reason: String },

    /// The identity lookup failed.
    #[error("identity lookup failed for {username}: {message}")]
    Lookup { username: String, message: String },

    /// No session is loaded for this platform id.
    #[error("no session loaded for {platform_id}")]
    NotLoaded { platform_id: Uuid },

    /// Domain error while computing the initial snapshot.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

impl LoginError {
    pub(crate) fn lookup(username: &str, err: StorageError) -> Self {
        LoginError::Lookup {
            username: username.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for login operations.
pub type LoginResult<T> = Result<T, LoginError>;
