//! Computed data caching with per-identity invalidation.
//!
//! Snapshots of resolved permissions and metadata are memoized per
//! `(identity, context set)` in a Moka cache. An entry is only ever returned
//! for the exact context set it was computed against.
//!
//! # Architecture
//!
//! - **Moka** stores the `Arc<ComputedData>` snapshots, bounded by
//!   `max_capacity` and optionally expiring after `ttl`.
//! - **`by_identity`** is a secondary index from identity to the context sets
//!   cached for it, so invalidating an identity is O(K) in its own entries.
//! - **`generations`** holds a counter per identity. A computation records
//!   the generation before it reads the graph and can only publish while the
//!   generation is unchanged, so a result started before an invalidation is
//!   never stored after it.
//!
//! Debounced recomputation lives in [`RefreshBuffer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use rsperms_domain::cache::{CacheConfig, ComputedDataCache};
//!
//! let cache = ComputedDataCache::new(CacheConfig::default());
//! let generation = cache.generation(&id);
//! let data = Arc::new(resolver.compute(&graph, &id, &active));
//! cache.insert_if_current(data, generation);
//! assert!(cache.get(&id, &active).is_some());
//! ```

mod refresh;

pub use refresh::{RefreshBuffer, RefreshStats};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tracing::trace;

use crate::context::ContextSet;
use crate::model::IdentityId;
use crate::resolver::ComputedData;

/// Configuration for the computed data cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of snapshots held across all identities.
    pub max_capacity: u64,
    /// Optional time-to-live for snapshots. `None` keeps them until
    /// invalidated or evicted.
    pub ttl: Option<Duration>,
    /// Debounce window for coalescing refresh requests.
    pub refresh_debounce: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: None,
            refresh_debounce: Duration::from_millis(50),
        }
    }
}

impl CacheConfig {
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_refresh_debounce(mut self, window: Duration) -> Self {
        self.refresh_debounce = window;
        self
    }
}

/// Cache key: an identity plus the exact context set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: IdentityId,
    pub context: ContextSet,
}

impl CacheKey {
    pub fn new(identity: IdentityId, context: ContextSet) -> Self {
        Self { identity, context }
    }
}

/// In-process counters mirrored to the `metrics` recorder.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl CacheMetrics {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rsperms_cache_hits_total").increment(1);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rsperms_cache_misses_total").increment(1);
    }

    fn invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rsperms_cache_invalidations_total").increment(1);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Memoized [`ComputedData`] per identity and context set.
///
/// Fully thread-safe; share it behind an `Arc`.
pub struct ComputedDataCache {
    cache: Cache<CacheKey, Arc<ComputedData>>,
    config: CacheConfig,
    /// Secondary index: identity -> context sets cached for it.
    by_identity: DashMap<IdentityId, HashSet<ContextSet>>,
    generations: DashMap<IdentityId, u64>,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for ComputedDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedDataCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .field("identity_index_size", &self.by_identity.len())
            .finish()
    }
}

impl ComputedDataCache {
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            config,
            by_identity: DashMap::new(),
            generations: DashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the snapshot computed for exactly `context`, if any.
    ///
    /// # Metrics
    ///
    /// - `rsperms_cache_hits_total` on hit
    /// - `rsperms_cache_misses_total` on miss
    pub fn get(&self, identity: &IdentityId, context: &ContextSet) -> Option<Arc<ComputedData>> {
        let key = CacheKey::new(identity.clone(), context.clone());
        let result = self.cache.get(&key);
        if result.is_some() {
            self.metrics.hit();
        } else {
            self.metrics.miss();
        }
        result
    }

    /// Current generation of `identity`. Read it before resolving.
    pub fn generation(&self, identity: &IdentityId) -> u64 {
        self.generations.get(identity).map_or(0, |g| *g)
    }

    /// Bumps the generation of `identity` without dropping its snapshots.
    ///
    /// Readers keep the current snapshots; computations already in flight
    /// can no longer publish.
    pub fn advance_generation(&self, identity: &IdentityId) -> u64 {
        let mut generation = self.generations.entry(identity.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Stores `data` if no invalidation happened since `generation` was read.
    ///
    /// Returns whether the snapshot was published.
    pub fn insert_if_current(&self, data: Arc<ComputedData>, generation: u64) -> bool {
        let identity = data.identity().clone();
        // the generation entry is held for the whole insert so that a
        // concurrent invalidation either runs fully before or after it
        let current = self.generations.entry(identity.clone()).or_insert(0);
        if *current != generation {
            trace!(identity = %identity, "discarding snapshot from an older generation");
            return false;
        }

        let context = data.context().clone();
        self.by_identity
            .entry(identity.clone())
            .or_default()
            .insert(context.clone());
        self.cache.insert(CacheKey::new(identity, context), data);
        drop(current);
        true
    }

    /// Drops every snapshot of `identity` and bumps its generation.
    pub fn invalidate(&self, identity: &IdentityId) {
        let mut generation = self.generations.entry(identity.clone()).or_insert(0);
        *generation += 1;

        if let Some((_, contexts)) = self.by_identity.remove(identity) {
            for context in contexts {
                self.cache.invalidate(&CacheKey::new(identity.clone(), context));
            }
        }
        drop(generation);
        self.metrics.invalidation();
    }

    /// Drops every snapshot of `identity` and forgets its generation.
    ///
    /// Callers must ensure no computation for `identity` can still publish,
    /// e.g. by holding the graph write lock after removing it.
    pub fn forget(&self, identity: &IdentityId) {
        if let Some((_, contexts)) = self.by_identity.remove(identity) {
            for context in contexts {
                self.cache.invalidate(&CacheKey::new(identity.clone(), context));
            }
        }
        self.generations.remove(identity);
        self.metrics.invalidation();
    }

    /// Number of identities with a tracked generation.
    pub fn tracked_identities(&self) -> usize {
        self.generations.len()
    }

    /// Invalidates every identity in `identities`.
    pub fn invalidate_many<'a>(&self, identities: impl IntoIterator<Item = &'a IdentityId>) {
        for identity in identities {
            self.invalidate(identity);
        }
    }

    /// Drops all snapshots. Generations advance so in-flight results are
    /// discarded too.
    pub fn invalidate_all(&self) {
        let identities: Vec<IdentityId> = self.by_identity.iter().map(|e| e.key().clone()).collect();
        self.invalidate_many(&identities);
        self.cache.invalidate_all();
    }

    /// Context sets currently cached for `identity`.
    ///
    /// Index entries whose snapshot was evicted or expired are pruned.
    pub fn contexts_for(&self, identity: &IdentityId) -> Vec<ContextSet> {
        let Some(mut contexts) = self.by_identity.get_mut(identity) else {
            return Vec::new();
        };
        contexts.retain(|context| {
            self.cache
                .contains_key(&CacheKey::new(identity.clone(), context.clone()))
        });
        contexts.iter().cloned().collect()
    }

    /// Approximate number of cached snapshots.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending eviction work. Mostly useful in tests.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }
}

/// Registers metric descriptions with the installed recorder.
///
/// Optional; call once at startup.
///
/// # Metrics Registered
///
/// - `rsperms_cache_hits_total`
/// - `rsperms_cache_misses_total`
/// - `rsperms_cache_invalidations_total`
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "rsperms_cache_hits_total",
        "Total number of computed data cache hits"
    );
    metrics::describe_counter!(
        "rsperms_cache_misses_total",
        "Total number of computed data cache misses"
    );
    metrics::describe_counter!(
        "rsperms_cache_invalidations_total",
        "Total number of identity invalidations"
    );
}
