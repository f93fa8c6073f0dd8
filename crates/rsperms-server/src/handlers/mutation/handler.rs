//! Mutation handler implementation.

use std::sync::Arc;

use dashmap::DashMap;
use rsperms_domain::audit::LogEntry;
use rsperms_domain::model::{Identity, IdentityId};
use rsperms_domain::PermissionEngine;
use rsperms_storage::{DataStore, StorageResult, DEFAULT_GROUP};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::types::{Actor, Mutation, MutationError, MutationOutcome, MutationResult};
use crate::adapters::{group_from_stored, group_to_stored, user_to_stored};
use crate::handlers::audit::AuditRecorder;
use crate::loader::load_parent_groups;

/// Applies administrative edits to users and groups.
///
/// The engine's graph is updated first and a debounced refresh scheduled
/// for the identity and its dependents; lookups keep being served from the
/// previous snapshots until it lands. The change is then written to
/// storage and recorded in the audit log. A failed write is logged and the
/// in-memory change kept.
///
/// Edits to the same identity are serialized: each one holds that
/// identity's lock from reading the current state until the write lands.
pub struct MutationHandler {
    engine: Arc<PermissionEngine>,
    store: Arc<dyn DataStore>,
    audit: Arc<AuditRecorder>,
    locks: DashMap<IdentityId, Arc<Mutex<()>>>,
}

impl MutationHandler {
    pub fn new(
        engine: Arc<PermissionEngine>,
        store: Arc<dyn DataStore>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            engine,
            store,
            audit,
            locks: DashMap::new(),
        }
    }

    /// Applies `mutation` to `target` on behalf of `actor`.
    ///
    /// Users must be loaded. Groups that are not loaded are read from
    /// storage first.
    #[instrument(skip(self, actor, mutation), fields(target = %target, change = %mutation))]
    pub async fn apply(
        &self,
        actor: &Actor,
        target: &IdentityId,
        mutation: Mutation,
    ) -> MutationResult<MutationOutcome> {
        let lock = Arc::clone(self.locks.entry(target.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.apply_locked(actor, target, mutation).await
        };
        drop(lock);
        self.locks.remove_if(target, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn apply_locked(
        &self,
        actor: &Actor,
        target: &IdentityId,
        mutation: Mutation,
    ) -> MutationResult<MutationOutcome> {
        let current = self.current(target).await?;

        let mut updated = Identity::clone(&current);
        if !mutation.apply(&mut updated) {
            debug!("mutation changed nothing");
            return Ok(MutationOutcome::unchanged());
        }

        if matches!(mutation, Mutation::AddParent(_)) {
            load_parent_groups(&self.engine, self.store.as_ref(), &updated).await;
        }
        self.engine.update_identity(updated.clone());

        let persisted = match self.persist(&updated).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("storage declined the change");
                false
            }
            Err(err) => {
                warn!(error = %err, "failed to persist change, keeping in-memory state");
                false
            }
        };

        let entry = self.audit_entry(actor, &updated, &mutation)?;
        let entry = self.audit.record(entry).await;

        Ok(MutationOutcome {
            changed: true,
            persisted,
            entry: Some(entry),
        })
    }

    async fn current(&self, target: &IdentityId) -> MutationResult<Arc<Identity>> {
        if let Some(identity) = self.engine.identity(target) {
            return Ok(identity);
        }
        let IdentityId::Group(name) = target else {
            return Err(MutationError::NotLoaded {
                identity: target.to_string(),
            });
        };

        let stored = self
            .store
            .load_group(name)
            .await
            .map_err(|err| MutationError::Storage {
                message: err.to_string(),
            })?
            .ok_or_else(|| MutationError::GroupNotFound { name: name.clone() })?;
        let group = group_from_stored(&stored)?;
        load_parent_groups(&self.engine, self.store.as_ref(), &group).await;
        self.engine.load_identity(group);

        self.engine
            .identity(target)
            .ok_or_else(|| MutationError::NotLoaded {
                identity: target.to_string(),
            })
    }

    async fn persist(&self, identity: &Identity) -> StorageResult<bool> {
        match identity.id() {
            IdentityId::User(uuid) => {
                // primary group lives only in storage
                let primary_group = match self.store.load_user(*uuid, None).await {
                    Ok(existing) => existing.primary_group,
                    Err(err) => {
                        warn!(error = %err, "could not read primary group, using default");
                        DEFAULT_GROUP.to_string()
                    }
                };
                let record = user_to_stored(identity, &primary_group).map_err(internal)?;
                self.store.save_user(&record).await
            }
            IdentityId::Group(_) => {
                let record = group_to_stored(identity).map_err(internal)?;
                self.store.save_group(&record).await
            }
        }
    }

    fn audit_entry(
        &self,
        actor: &Actor,
        identity: &Identity,
        mutation: &Mutation,
    ) -> MutationResult<LogEntry> {
        let builder = LogEntry::builder()
            .actor(actor.id, actor.name.clone())
            .action(mutation.to_string())
            .context(mutation.context());
        let builder = match identity.id() {
            IdentityId::User(uuid) => builder.user(
                *uuid,
                identity.name().map_or_else(|| uuid.to_string(), str::to_string),
            ),
            IdentityId::Group(name) => builder.group(name.clone()),
        };
        Ok(builder.build()?)
    }
}

fn internal(err: rsperms_domain::DomainError) -> rsperms_storage::StorageError {
    rsperms_storage::StorageError::InternalError {
        message: err.to_string(),
    }
}

impl std::fmt::Debug for MutationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationHandler")
            .field("engine", &self.engine)
            .field("audit", &self.audit)
            .field("locked_identities", &self.locks.len())
            .finish()
    }
}
