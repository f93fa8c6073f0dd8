//! In-memory storage implementation.
//!
//! Backed by `DashMap`s keyed by lowercase names and usernames. Used in
//! tests and for single-process deployments without durable storage.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{HealthStatus, StorageResult};
use crate::traits::{
    validate_name, DataStore, StoredGroup, StoredLogEntry, StoredTrack, StoredUser,
};

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Users, groups, tracks, mappings**: O(1) average (DashMap lookup)
/// - **List groups/tracks**: O(N)
/// - **Append log**: O(1) amortized
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    /// username (lowercase) -> canonical id
    uuids: DashMap<String, Uuid>,
    /// canonical id -> last known username
    names: DashMap<Uuid, String>,
    users: DashMap<Uuid, StoredUser>,
    groups: DashMap<String, StoredGroup>,
    tracks: DashMap<String, StoredTrack>,
    log: RwLock<Vec<StoredLogEntry>>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn get_canonical_id(&self, username: &str) -> StorageResult<Option<Uuid>> {
        Ok(self.uuids.get(&username.to_lowercase()).map(|id| *id))
    }

    async fn get_name(&self, id: Uuid) -> StorageResult<Option<String>> {
        Ok(self.names.get(&id).map(|name| name.clone()))
    }

    async fn save_identity_mapping(&self, username: &str, id: Uuid) -> StorageResult<bool> {
        let key = username.to_lowercase();
        // drop a stale reverse mapping when the name moved to another id
        if let Some(previous) = self.uuids.insert(key, id) {
            if previous != id {
                self.names.remove_if(&previous, |_, n| n.eq_ignore_ascii_case(username));
            }
        }
        self.names.insert(id, username.to_string());
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn load_user(&self, id: Uuid, name: Option<&str>) -> StorageResult<StoredUser> {
        let mut user = self
            .users
            .get(&id)
            .map(|u| u.value().clone())
            .unwrap_or_else(|| StoredUser::new(id, None));
        if let Some(name) = name {
            user.name = Some(name.to_string());
        }
        Ok(user)
    }

    async fn save_user(&self, user: &StoredUser) -> StorageResult<bool> {
        self.users.insert(user.uuid, user.clone());
        Ok(true)
    }

    async fn load_group(&self, name: &str) -> StorageResult<Option<StoredGroup>> {
        Ok(self
            .groups
            .get(&name.to_lowercase())
            .map(|g| g.value().clone()))
    }

    async fn save_group(&self, group: &StoredGroup) -> StorageResult<bool> {
        validate_name(&group.name)?;
        let mut group = group.clone();
        group.name = group.name.to_lowercase();
        self.groups.insert(group.name.clone(), group);
        Ok(true)
    }

    async fn delete_group(&self, name: &str) -> StorageResult<bool> {
        Ok(self.groups.remove(&name.to_lowercase()).is_some())
    }

    async fn list_groups(&self) -> StorageResult<Vec<StoredGroup>> {
        let mut groups: Vec<StoredGroup> = self.groups.iter().map(|g| g.value().clone()).collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn load_track(&self, name: &str) -> StorageResult<Option<StoredTrack>> {
        Ok(self
            .tracks
            .get(&name.to_lowercase())
            .map(|t| t.value().clone()))
    }

    async fn save_track(&self, track: &StoredTrack) -> StorageResult<bool> {
        validate_name(&track.name)?;
        let mut track = track.clone();
        track.name = track.name.to_lowercase();
        self.tracks.insert(track.name.clone(), track);
        Ok(true)
    }

    async fn delete_track(&self, name: &str) -> StorageResult<bool> {
        Ok(self.tracks.remove(&name.to_lowercase()).is_some())
    }

    async fn list_tracks(&self) -> StorageResult<Vec<StoredTrack>> {
        let mut tracks: Vec<StoredTrack> = self.tracks.iter().map(|t| t.value().clone()).collect();
        tracks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tracks)
    }

    async fn append_log(&self, entry: &StoredLogEntry) -> StorageResult<bool> {
        self.log.write().push(entry.clone());
        Ok(true)
    }

    async fn read_log(&self) -> StorageResult<Vec<StoredLogEntry>> {
        Ok(self.log.read().clone())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            latency: std::time::Duration::ZERO,
            message: Some("in-memory storage".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoredNode;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_store_can_be_created() {
        let store = MemoryDataStore::new();
        assert!(store.list_groups().await.unwrap().is_empty());
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_shared() {
        let store = MemoryDataStore::new_shared();
        let clone = Arc::clone(&store);
        clone.save_group(&StoredGroup::new("admin")).await.unwrap();
        assert!(store.load_group("admin").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_identity_mapping_round_trip() {
        let store = MemoryDataStore::new();
        let id = Uuid::from_u128(9);

        assert_eq!(store.get_canonical_id("Steve").await.unwrap(), None);
        assert!(store.save_identity_mapping("Steve", id).await.unwrap());

        assert_eq!(store.get_canonical_id("steve").await.unwrap(), Some(id));
        assert_eq!(store.get_name(id).await.unwrap(), Some("Steve".to_string()));
    }

    #[tokio::test]
    async fn test_name_moving_to_new_id_drops_old_reverse_entry() {
        let store = MemoryDataStore::new();
        let old = Uuid::from_u128(1);
        let new = Uuid::from_u128(2);
        store.save_identity_mapping("steve", old).await.unwrap();
        store.save_identity_mapping("steve", new).await.unwrap();

        assert_eq!(store.get_name(old).await.unwrap(), None);
        assert_eq!(store.get_name(new).await.unwrap(), Some("steve".to_string()));
    }

    #[tokio::test]
    async fn test_load_unknown_user_returns_fresh_record() {
        let store = MemoryDataStore::new();
        let user = store.load_user(Uuid::from_u128(3), Some("alex")).await.unwrap();

        assert_eq!(user.name.as_deref(), Some("alex"));
        assert!(user.nodes.is_empty());
        assert_eq!(store.user_count(), 0, "loading must not persist");
    }

    #[tokio::test]
    async fn test_save_and_load_user() {
        let store = MemoryDataStore::new();
        let mut user = StoredUser::new(Uuid::from_u128(3), Some("alex".to_string()));
        user.nodes.push(StoredNode::new("group.admin", true));
        store.save_user(&user).await.unwrap();

        let loaded = store.load_user(user.uuid, None).await.unwrap();
        assert_eq!(loaded, user);

        let renamed = store.load_user(user.uuid, Some("alexa")).await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("alexa"));
        assert_eq!(renamed.nodes, user.nodes);
    }

    #[tokio::test]
    async fn test_group_names_are_case_insensitive() {
        let store = MemoryDataStore::new();
        store.save_group(&StoredGroup::new("Admin")).await.unwrap();

        let loaded = store.load_group("ADMIN").await.unwrap().unwrap();
        assert_eq!(loaded.name, "admin");
        assert!(store.delete_group("admin").await.unwrap());
        assert!(!store.delete_group("admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_group_name_is_rejected() {
        let store = MemoryDataStore::new();
        assert!(store.save_group(&StoredGroup::new("")).await.is_err());
        assert!(store.save_group(&StoredGroup::new("two words")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_groups_sorted() {
        let store = MemoryDataStore::new();
        for name in ["mod", "admin", "default"] {
            store.save_group(&StoredGroup::new(name)).await.unwrap();
        }
        let names: Vec<String> = store
            .list_groups()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["admin", "default", "mod"]);
    }

    #[tokio::test]
    async fn test_tracks() {
        let store = MemoryDataStore::new();
        let track = StoredTrack {
            name: "staff".to_string(),
            groups: vec!["helper".to_string(), "mod".to_string(), "admin".to_string()],
        };
        store.save_track(&track).await.unwrap();

        assert_eq!(store.load_track("staff").await.unwrap(), Some(track));
        assert_eq!(store.list_tracks().await.unwrap().len(), 1);
        assert!(store.delete_track("staff").await.unwrap());
        assert_eq!(store.load_track("staff").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_log_keeps_append_order() {
        let store = MemoryDataStore::new();
        for action in ["first", "second"] {
            store
                .append_log(&StoredLogEntry {
                    timestamp: Utc::now(),
                    actor: Uuid::nil(),
                    actor_name: "console".to_string(),
                    target_type: 'G',
                    target_id: None,
                    target_name: "admin".to_string(),
                    action: action.to_string(),
                    context: String::new(),
                    extra_data: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }
        let actions: Vec<String> = store
            .read_log()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let status = MemoryDataStore::new().health_check().await.unwrap();
        assert!(status.healthy);
    }
}
