//! Test doubles shared by the handler tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rsperms_storage::{
    DataStore, HealthStatus, MemoryDataStore, StorageError, StorageResult, StoredGroup,
    StoredLogEntry, StoredTrack, StoredUser,
};
use uuid::Uuid;

/// A store that fails on demand, delegating to memory otherwise.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    inner: MemoryDataStore,
    load_user_failures: AtomicUsize,
    load_user_calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    yield_on_io: AtomicBool,
}

impl FaultyStore {
    /// Fails every read and write.
    pub(crate) fn failing() -> Self {
        let store = Self::default();
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Fails the next `n` calls to `load_user`.
    pub(crate) fn with_load_user_failures(n: usize) -> Self {
        let store = Self::default();
        store.load_user_failures.store(n, Ordering::SeqCst);
        store
    }

    /// Fails every write.
    pub(crate) fn failing_writes() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Yields to the scheduler inside every user and group read and write,
    /// so concurrent callers interleave there.
    pub(crate) fn yielding() -> Self {
        let store = Self::default();
        store.yield_on_io.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn inner(&self) -> &MemoryDataStore {
        &self.inner
    }

    pub(crate) fn load_user_calls(&self) -> usize {
        self.load_user_calls.load(Ordering::SeqCst)
    }

    async fn maybe_yield(&self) {
        if self.yield_on_io.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError {
                message: "read refused".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QueryError {
                message: "write refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    async fn get_canonical_id(&self, username: &str) -> StorageResult<Option<Uuid>> {
        self.check_read()?;
        self.inner.get_canonical_id(username).await
    }

    async fn get_name(&self, id: Uuid) -> StorageResult<Option<String>> {
        self.check_read()?;
        self.inner.get_name(id).await
    }

    async fn save_identity_mapping(&self, username: &str, id: Uuid) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.save_identity_mapping(username, id).await
    }

    async fn load_user(&self, id: Uuid, name: Option<&str>) -> StorageResult<StoredUser> {
        self.load_user_calls.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let remaining = self.load_user_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.load_user_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::ConnectionError {
                message: "load timed out".to_string(),
            });
        }
        self.maybe_yield().await;
        self.inner.load_user(id, name).await
    }

    async fn save_user(&self, user: &StoredUser) -> StorageResult<bool> {
        self.check_write()?;
        self.maybe_yield().await;
        self.inner.save_user(user).await
    }

    async fn load_group(&self, name: &str) -> StorageResult<Option<StoredGroup>> {
        self.check_read()?;
        self.maybe_yield().await;
        self.inner.load_group(name).await
    }

    async fn save_group(&self, group: &StoredGroup) -> StorageResult<bool> {
        self.check_write()?;
        self.maybe_yield().await;
        self.inner.save_group(group).await
    }

    async fn delete_group(&self, name: &str) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.delete_group(name).await
    }

    async fn list_groups(&self) -> StorageResult<Vec<StoredGroup>> {
        self.check_read()?;
        self.inner.list_groups().await
    }

    async fn load_track(&self, name: &str) -> StorageResult<Option<StoredTrack>> {
        self.check_read()?;
        self.inner.load_track(name).await
    }

    async fn save_track(&self, track: &StoredTrack) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.save_track(track).await
    }

    async fn delete_track(&self, name: &str) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.delete_track(name).await
    }

    async fn list_tracks(&self) -> StorageResult<Vec<StoredTrack>> {
        self.check_read()?;
        self.inner.list_tracks().await
    }

    async fn append_log(&self, entry: &StoredLogEntry) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.append_log(entry).await
    }

    async fn read_log(&self) -> StorageResult<Vec<StoredLogEntry>> {
        self.check_read()?;
        self.inner.read_log().await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.check_read()?;
        self.inner.health_check().await
    }
}
