//! DataStore trait definition and stored record types.
//!
//! Records are kept in their storage shape: node keys use the flat string
//! encoding (`group.<name>`, `prefix.<priority>.<value>`,
//! `meta.<key>.<value>`, or a plain permission) and contexts are raw JSON.
//! Turning them into domain types is the caller's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Maximum length of group and track names.
pub const MAX_NAME_LENGTH: usize = 36;

/// Primary group assigned to users with no stored record.
pub const DEFAULT_GROUP: &str = "default";

/// A stored node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    /// Encoded node key.
    pub key: String,
    pub value: bool,
    /// JSON object of context key to one or more values; empty means global.
    #[serde(default)]
    pub contexts: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredNode {
    /// A global node with no expiry.
    pub fn new(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value,
            contexts: String::new(),
            weight: 0,
            expiry: None,
        }
    }

    pub fn with_contexts(mut self, contexts: impl Into<String>) -> Self {
        self.contexts = contexts.into();
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub primary_group: String,
    pub nodes: Vec<StoredNode>,
}

impl StoredUser {
    /// A user with no stored data yet.
    pub fn new(uuid: Uuid, name: Option<String>) -> Self {
        Self {
            uuid,
            name,
            primary_group: DEFAULT_GROUP.to_string(),
            nodes: Vec::new(),
        }
    }
}

/// A stored group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGroup {
    pub name: String,
    pub nodes: Vec<StoredNode>,
}

impl StoredGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }
}

/// A stored promotion track: an ordered list of group names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub name: String,
    pub groups: Vec<String>,
}

/// A stored audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: Uuid,
    pub actor_name: String,
    /// `U`, `G` or `T`.
    pub target_type: char,
    pub target_id: Option<Uuid>,
    pub target_name: String,
    pub action: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub extra_data: serde_json::Value,
}

/// Validates a group or track name: non-empty, at most
/// [`MAX_NAME_LENGTH`] characters, no whitespace.
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "name cannot be empty".to_string(),
        });
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("name exceeds {MAX_NAME_LENGTH} characters: {name}"),
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(StorageError::InvalidInput {
            message: format!("name contains whitespace: {name}"),
        });
    }
    Ok(())
}

/// Abstract storage interface for permission data.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. Boolean results report whether the write took effect.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Identity mapping

    /// Canonical id recorded for `username`, if any.
    async fn get_canonical_id(&self, username: &str) -> StorageResult<Option<Uuid>>;

    /// Last known name for `id`, if any.
    async fn get_name(&self, id: Uuid) -> StorageResult<Option<String>>;

    /// Records `username` -> `id`.
    async fn save_identity_mapping(&self, username: &str, id: Uuid) -> StorageResult<bool>;

    // Users

    /// Loads a user, returning a fresh record if none is stored.
    /// A provided `name` replaces the stored one.
    async fn load_user(&self, id: Uuid, name: Option<&str>) -> StorageResult<StoredUser>;

    async fn save_user(&self, user: &StoredUser) -> StorageResult<bool>;

    // Groups

    async fn load_group(&self, name: &str) -> StorageResult<Option<StoredGroup>>;

    /// Creates or replaces a group.
    async fn save_group(&self, group: &StoredGroup) -> StorageResult<bool>;

    async fn delete_group(&self, name: &str) -> StorageResult<bool>;

    async fn list_groups(&self) -> StorageResult<Vec<StoredGroup>>;

    // Tracks

    async fn load_track(&self, name: &str) -> StorageResult<Option<StoredTrack>>;

    async fn save_track(&self, track: &StoredTrack) -> StorageResult<bool>;

    async fn delete_track(&self, name: &str) -> StorageResult<bool>;

    async fn list_tracks(&self) -> StorageResult<Vec<StoredTrack>>;

    // Audit log

    async fn append_log(&self, entry: &StoredLogEntry) -> StorageResult<bool>;

    /// Every stored log entry, in append order.
    async fn read_log(&self) -> StorageResult<Vec<StoredLogEntry>>;

    /// Probes the backend.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}
