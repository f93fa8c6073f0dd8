//! Audit recorder: the in-memory audit log plus write-through to storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use rsperms_domain::audit::{AuditFilter, AuditLog, LogEntry};
use rsperms_domain::DomainResult;
use rsperms_storage::{DataStore, StorageResult};
use tracing::warn;

use crate::adapters::{log_entry_from_stored, log_entry_to_stored};

/// Records audit entries in memory and, optionally, in storage.
///
/// Storage failures never lose an entry: it stays in the in-memory log and
/// the failure is logged.
pub struct AuditRecorder {
    log: AuditLog,
    store: Arc<dyn DataStore>,
    persist: bool,
    page_size: usize,
}

impl AuditRecorder {
    /// Creates a recorder with an empty log.
    pub fn new(store: Arc<dyn DataStore>, persist: bool, page_size: usize) -> Self {
        Self {
            log: AuditLog::new(),
            store,
            persist,
            page_size,
        }
    }

    /// Creates a recorder whose log is rebuilt from storage. Stored entries
    /// that cannot be decoded are skipped.
    pub async fn restore(
        store: Arc<dyn DataStore>,
        persist: bool,
        page_size: usize,
    ) -> StorageResult<Self> {
        let stored = store.read_log().await?;
        let entries = stored.iter().filter_map(|entry| match log_entry_from_stored(entry) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping undecodable audit entry");
                None
            }
        });
        Ok(Self {
            log: AuditLog::load(entries),
            store,
            persist,
            page_size,
        })
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Appends `entry` to the log and writes it through to storage.
    pub async fn record(&self, entry: LogEntry) -> LogEntry {
        let entry = self.log.record(entry);
        if self.persist {
            match self.store.append_log(&log_entry_to_stored(&entry)).await {
                Ok(true) => {}
                Ok(false) => warn!(action = %entry.action, "storage declined audit entry"),
                Err(err) => warn!(error = %err, action = %entry.action, "failed to persist audit entry"),
            }
        }
        entry
    }

    /// Page `page_no` of the entries matching `filter`, at the configured page size.
    pub fn page(&self, page_no: usize, filter: &AuditFilter) -> DomainResult<BTreeMap<usize, LogEntry>> {
        self.log.page(page_no, filter, self.page_size)
    }

    pub fn max_pages(&self, filter: &AuditFilter) -> DomainResult<usize> {
        self.log.max_pages(filter, self.page_size)
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("entries", &self.log.len())
            .field("persist", &self.persist)
            .field("page_size", &self.page_size)
            .finish()
    }
}
