//! Loads the groups an identity inherits from into the engine.

use std::collections::{HashSet, VecDeque};

use rsperms_domain::model::{Identity, IdentityId};
use rsperms_domain::PermissionEngine;
use rsperms_storage::DataStore;
use tracing::{debug, warn};

use crate::adapters::group_from_stored;

/// Ensures every group reachable from `identity` is loaded.
///
/// Groups already in the engine are not re-read; their own parents are
/// still followed. Missing or unreadable groups are logged and skipped.
/// Returns the number of groups loaded from storage.
pub async fn load_parent_groups(
    engine: &PermissionEngine,
    store: &dyn DataStore,
    identity: &Identity,
) -> usize {
    let mut queue: VecDeque<String> = identity.parents().iter().map(|p| p.group.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut loaded = 0;

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Ok(id) = IdentityId::group(&name) else {
            continue;
        };

        if let Some(existing) = engine.identity(&id) {
            queue.extend(existing.parents().iter().map(|p| p.group.clone()));
            continue;
        }

        match store.load_group(&name).await {
            Ok(Some(stored)) => match group_from_stored(&stored) {
                Ok(group) => {
                    queue.extend(group.parents().iter().map(|p| p.group.clone()));
                    engine.load_identity(group);
                    loaded += 1;
                }
                Err(err) => warn!(group = %name, error = %err, "stored group is invalid"),
            },
            Ok(None) => debug!(group = %name, "inherited group does not exist"),
            Err(err) => warn!(group = %name, error = %err, "failed to load group"),
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsperms_domain::cache::CacheConfig;
    use rsperms_domain::model::InheritanceEdge;
    use rsperms_domain::resolver::ResolverConfig;
    use rsperms_storage::{MemoryDataStore, StoredGroup, StoredNode};
    use uuid::Uuid;

    fn group(name: &str, parents: &[&str]) -> StoredGroup {
        let mut group = StoredGroup::new(name);
        for parent in parents {
            group.nodes.push(StoredNode::new(format!("group.{parent}"), true));
        }
        group
    }

    #[tokio::test]
    async fn test_loads_transitive_groups_once() {
        let store = MemoryDataStore::new();
        store.save_group(&group("admin", &["mod"])).await.unwrap();
        store.save_group(&group("mod", &["default", "admin"])).await.unwrap();
        store.save_group(&group("default", &[])).await.unwrap();
        let engine = PermissionEngine::new(ResolverConfig::default(), CacheConfig::default());
        let user = Identity::user(Uuid::from_u128(1), None).with_parent(InheritanceEdge::new("admin"));

        let loaded = load_parent_groups(&engine, &store, &user).await;

        assert_eq!(loaded, 3);
        for name in ["admin", "mod", "default"] {
            assert!(engine.is_loaded(&IdentityId::group(name).unwrap()), "{name}");
        }

        // second pass reads nothing
        assert_eq!(load_parent_groups(&engine, &store, &user).await, 0);
    }

    #[tokio::test]
    async fn test_missing_groups_are_skipped() {
        let store = MemoryDataStore::new();
        store.save_group(&group("mod", &["ghost"])).await.unwrap();
        let engine = PermissionEngine::new(ResolverConfig::default(), CacheConfig::default());
        let user = Identity::user(Uuid::from_u128(1), None)
            .with_parent(InheritanceEdge::new("mod"))
            .with_parent(InheritanceEdge::new("missing"));

        assert_eq!(load_parent_groups(&engine, &store, &user).await, 1);
        assert!(!engine.is_loaded(&IdentityId::group("ghost").unwrap()));
    }
}
