//! Debounced refresh scheduling.
//!
//! Each key has at most one pending refresh. Requests arriving while one is
//! pending are coalesced into it; the refresh runs once the debounce window
//! elapses. [`RefreshBuffer::request_direct`] cancels any pending window and
//! refreshes on the caller's thread.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type Refresher<K> = Arc<dyn Fn(&K) + Send + Sync>;

struct Pending {
    ticket: u64,
    handle: JoinHandle<()>,
}

/// Counters describing what the buffer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Calls to `request`.
    pub requested: u64,
    /// Requests folded into an already pending refresh.
    pub coalesced: u64,
    /// Refreshes actually run, debounced or direct.
    pub executed: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    coalesced: AtomicU64,
    executed: AtomicU64,
}

/// Coalesces refresh requests per key behind a debounce window.
pub struct RefreshBuffer<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<K, Pending>>,
    window: Duration,
    refresher: Refresher<K>,
    tickets: AtomicU64,
    counters: Arc<Counters>,
}

impl<K> std::fmt::Debug for RefreshBuffer<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshBuffer")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<K> RefreshBuffer<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates a buffer that calls `refresher` once per debounced burst.
    pub fn new<F>(window: Duration, refresher: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        Self {
            pending: Arc::new(DashMap::new()),
            window,
            refresher: Arc::new(refresher),
            tickets: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests a debounced refresh of `key`.
    ///
    /// Returns `true` if a new window was opened and `false` if the request
    /// was coalesced into a pending one. Outside a Tokio runtime the refresh
    /// runs immediately.
    pub fn request(&self, key: K) -> bool {
        self.counters.requested.fetch_add(1, Ordering::Relaxed);

        let Ok(runtime) = Handle::try_current() else {
            debug!("no runtime available, refreshing immediately");
            self.run(&key);
            return true;
        };

        match self.pending.entry(key) {
            Entry::Occupied(_) => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                false
            }
            Entry::Vacant(entry) => {
                let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
                let key = entry.key().clone();
                let pending = Arc::clone(&self.pending);
                let refresher = Arc::clone(&self.refresher);
                let counters = Arc::clone(&self.counters);
                let window = self.window;

                // the shard lock is held until `insert` below, so the task
                // cannot observe the map before its own entry exists
                let handle = runtime.spawn(async move {
                    tokio::time::sleep(window).await;
                    if pending.remove_if(&key, |_, p| p.ticket == ticket).is_some() {
                        counters.executed.fetch_add(1, Ordering::Relaxed);
                        refresher(&key);
                    }
                });
                entry.insert(Pending { ticket, handle });
                true
            }
        }
    }

    /// Cancels any pending window for `key` and refreshes now.
    ///
    /// Returns whether a pending refresh was superseded.
    pub fn request_direct(&self, key: &K) -> bool {
        let superseded = match self.pending.remove(key) {
            Some((_, pending)) => {
                pending.handle.abort();
                trace!("pending refresh superseded by a direct one");
                true
            }
            None => false,
        };
        self.run(key);
        superseded
    }

    /// True if a debounced refresh is waiting for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            requested: self.counters.requested.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
        }
    }

    fn run(&self, key: &K) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        (self.refresher)(key);
    }
}

impl<K> Drop for RefreshBuffer<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for entry in self.pending.iter() {
            entry.value().handle.abort();
        }
    }
}
