//! The permission engine facade.
//!
//! [`PermissionEngine`] owns the inheritance graph, the resolver, the
//! computed data cache and the refresh buffer, and wires them together:
//!
//! - lookups read the cache and fall back to a live resolve on miss;
//! - loading or unloading an identity invalidates it and its dependents
//!   immediately;
//! - updates schedule a debounced refresh, serving the previous snapshot
//!   until it lands.
//!
//! The graph sits behind a `parking_lot::RwLock`; resolution never awaits,
//! so the lock is never held across a suspension point.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::cache::{CacheConfig, CacheStats, ComputedDataCache, RefreshBuffer, RefreshStats};
use crate::context::ContextSet;
use crate::error::{DomainError, DomainResult};
use crate::graph::InheritanceGraph;
use crate::model::{Identity, IdentityId, Tristate};
use crate::resolver::{ComputedData, PermissionResolver, ResolverConfig};

struct EngineState {
    graph: RwLock<InheritanceGraph>,
    resolver: PermissionResolver,
    cache: ComputedDataCache,
}

impl EngineState {
    fn compute(&self, identity: &IdentityId, active: &ContextSet) -> DomainResult<Arc<ComputedData>> {
        let generation = self.cache.generation(identity);
        let data = {
            let graph = self.graph.read();
            if !graph.contains(identity) {
                return Err(DomainError::IdentityNotLoaded {
                    identity: identity.to_string(),
                });
            }
            let data = Arc::new(self.resolver.compute(&graph, identity, active));
            // published under the read lock so an unload cannot slip in between
            self.cache.insert_if_current(Arc::clone(&data), generation);
            data
        };
        Ok(data)
    }

    /// Recomputes every snapshot currently cached for `identity`.
    fn refresh(&self, identity: &IdentityId) {
        let contexts = self.cache.contexts_for(identity);
        if contexts.is_empty() {
            return;
        }

        let generation = self.cache.generation(identity);
        let graph = self.graph.read();
        if !graph.contains(identity) {
            self.cache.forget(identity);
            return;
        }
        for context in &contexts {
            let data = Arc::new(self.resolver.compute(&graph, identity, context));
            self.cache.insert_if_current(data, generation);
        }
        debug!(identity = %identity, contexts = contexts.len(), "refreshed computed data");
    }
}

/// Facade over graph, resolver and cache.
pub struct PermissionEngine {
    state: Arc<EngineState>,
    refresh: RefreshBuffer<IdentityId>,
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("identities", &self.state.graph.read().len())
            .field("cache", &self.state.cache)
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl PermissionEngine {
    pub fn new(resolver: ResolverConfig, cache: CacheConfig) -> Self {
        let window = cache.refresh_debounce;
        let state = Arc::new(EngineState {
            graph: RwLock::new(InheritanceGraph::new()),
            resolver: PermissionResolver::new(resolver),
            cache: ComputedDataCache::new(cache),
        });

        let weak: Weak<EngineState> = Arc::downgrade(&state);
        let refresh = RefreshBuffer::new(window, move |identity: &IdentityId| {
            if let Some(state) = weak.upgrade() {
                state.refresh(identity);
            }
        });

        Self { state, refresh }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.state.resolver
    }

    /// Returns the loaded identity, if any.
    pub fn identity(&self, id: &IdentityId) -> Option<Arc<Identity>> {
        self.state.graph.read().get(id)
    }

    pub fn is_loaded(&self, id: &IdentityId) -> bool {
        self.state.graph.read().contains(id)
    }

    /// Runs `f` with shared access to the graph.
    pub fn with_graph<R>(&self, f: impl FnOnce(&InheritanceGraph) -> R) -> R {
        f(&self.state.graph.read())
    }

    /// Loads (or reloads) an identity and invalidates it and its dependents.
    #[instrument(skip(self, identity), fields(identity = %identity.id()))]
    pub fn load_identity(&self, identity: Identity) {
        let id = identity.id().clone();
        let affected = {
            let mut graph = self.state.graph.write();
            graph.insert(identity);
            Self::affected(&graph, &id)
        };
        self.state.cache.invalidate_many(&affected);
        debug!(affected = affected.len(), "identity loaded");
    }

    /// Unloads an identity, dropping its snapshots and those of every
    /// identity that inherited from it.
    pub fn unload_identity(&self, id: &IdentityId) -> Option<Arc<Identity>> {
        let mut graph = self.state.graph.write();
        let affected = Self::affected(&graph, id);
        let removed = graph.remove(id);
        self.state.cache.forget(id);
        drop(graph);

        self.state
            .cache
            .invalidate_many(affected.iter().filter(|identity| *identity != id));
        removed
    }

    /// Replaces a loaded identity and schedules a debounced refresh of it
    /// and its dependents. Until the refresh lands, lookups are served from
    /// the previous snapshots.
    pub fn update_identity(&self, identity: Identity) {
        let id = identity.id().clone();
        let affected = {
            let mut graph = self.state.graph.write();
            graph.insert(identity);
            Self::affected(&graph, &id)
        };
        self.schedule(affected);
    }

    /// Immediately invalidates `id` and everything inheriting from it.
    pub fn invalidate(&self, id: &IdentityId) {
        let affected = Self::affected(&self.state.graph.read(), id);
        self.state.cache.invalidate_many(&affected);
    }

    /// Schedules a debounced refresh of `id` and its dependents.
    pub fn request_refresh(&self, id: &IdentityId) {
        let affected = Self::affected(&self.state.graph.read(), id);
        self.schedule(affected);
    }

    /// Recomputes `id` and its dependents now, cancelling pending windows.
    pub fn refresh_now(&self, id: &IdentityId) {
        let affected = Self::affected(&self.state.graph.read(), id);
        for identity in &affected {
            self.state.cache.advance_generation(identity);
            self.refresh.request_direct(identity);
        }
    }

    /// Returns the snapshot for `identity` under exactly `active`, computing
    /// and caching it on miss.
    pub fn get_or_compute(&self, identity: &IdentityId, active: &ContextSet) -> DomainResult<Arc<ComputedData>> {
        if let Some(hit) = self.state.cache.get(identity, active) {
            return Ok(hit);
        }
        self.state.compute(identity, active)
    }

    /// Computes and caches the snapshot for `active`, bypassing any cached
    /// or pending state.
    pub fn compute_now(&self, identity: &IdentityId, active: &ContextSet) -> DomainResult<Arc<ComputedData>> {
        self.state.compute(identity, active)
    }

    pub fn check_permission(&self, identity: &IdentityId, key: &str, active: &ContextSet) -> DomainResult<Tristate> {
        Ok(self.get_or_compute(identity, active)?.permission_value(key))
    }

    pub fn meta_value(&self, identity: &IdentityId, key: &str, active: &ContextSet) -> DomainResult<Option<String>> {
        Ok(self
            .get_or_compute(identity, active)?
            .meta()
            .get(key)
            .map(str::to_string))
    }

    /// Removes expired nodes and edges from every loaded identity and
    /// schedules a refresh for each identity that changed.
    ///
    /// Returns the number of identities that changed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut affected = Vec::new();
        let changed = {
            let mut graph = self.state.graph.write();
            let pruned: Vec<Identity> = graph
                .identities()
                .filter_map(|identity| {
                    let mut copy = Identity::clone(identity);
                    copy.remove_expired(now).then_some(copy)
                })
                .collect();
            let changed = pruned.len();
            for identity in pruned {
                let id = identity.id().clone();
                graph.insert(identity);
                affected.extend(Self::affected(&graph, &id));
            }
            changed
        };

        affected.sort();
        affected.dedup();
        if changed > 0 {
            info!(changed, "removed expired nodes");
        }
        self.schedule(affected);
        changed
    }

    /// Spawns a task running [`sweep_expired`](Self::sweep_expired) every
    /// `interval`.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.sweep_expired();
            }
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.cache.stats()
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        self.refresh.stats()
    }

    /// True if a debounced refresh is waiting for `id`.
    pub fn is_refresh_pending(&self, id: &IdentityId) -> bool {
        self.refresh.is_pending(id)
    }

    fn schedule(&self, affected: Vec<IdentityId>) {
        for identity in affected {
            self.state.cache.advance_generation(&identity);
            self.refresh.request(identity);
        }
    }

    fn affected(graph: &InheritanceGraph, id: &IdentityId) -> Vec<IdentityId> {
        let mut affected = vec![id.clone()];
        affected.extend(graph.dependents(id));
        affected
    }
}
