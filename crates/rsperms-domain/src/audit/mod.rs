//! Append-only audit log of administrative changes.
//!
//! Entries are totally ordered by timestamp, then by the sequence number the
//! log assigns on append. Queries take an [`AuditFilter`]; paginated queries
//! key each entry by its 1-based position within the filtered results, in
//! ascending time order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Kind of object an entry acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    User,
    Group,
    Track,
}

impl TargetType {
    pub fn code(self) -> char {
        match self {
            TargetType::User => 'U',
            TargetType::Group => 'G',
            TargetType::Track => 'T',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'U' => Some(TargetType::User),
            'G' => Some(TargetType::Group),
            'T' => Some(TargetType::Track),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Position in the log, assigned on append.
    #[serde(default)]
    pub seq: u64,
    pub actor: Uuid,
    pub actor_name: String,
    pub target_type: TargetType,
    /// Acted user, for user entries.
    pub target_id: Option<Uuid>,
    pub target_name: String,
    pub action: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub extra_data: serde_json::Value,
}

impl LogEntry {
    pub fn builder() -> LogEntryBuilder {
        LogEntryBuilder::default()
    }

    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.seq)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) [{}] ({}) --> {}",
            self.actor_name, self.target_type, self.target_name, self.action
        )
    }
}

/// Builder for [`LogEntry`].
#[derive(Debug, Default)]
pub struct LogEntryBuilder {
    timestamp: Option<DateTime<Utc>>,
    actor: Option<Uuid>,
    actor_name: String,
    target_type: Option<TargetType>,
    target_id: Option<Uuid>,
    target_name: String,
    action: String,
    context: String,
    extra_data: serde_json::Value,
}

impl LogEntryBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn actor(mut self, actor: Uuid, name: impl Into<String>) -> Self {
        self.actor = Some(actor);
        self.actor_name = name.into();
        self
    }

    /// Targets a user.
    pub fn user(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.target_type = Some(TargetType::User);
        self.target_id = Some(id);
        self.target_name = name.into();
        self
    }

    /// Targets a group.
    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.target_type = Some(TargetType::Group);
        self.target_id = None;
        self.target_name = name.into();
        self
    }

    /// Targets a track.
    pub fn track(mut self, name: impl Into<String>) -> Self {
        self.target_type = Some(TargetType::Track);
        self.target_id = None;
        self.target_name = name.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn extra_data(mut self, extra: serde_json::Value) -> Self {
        self.extra_data = extra;
        self
    }

    /// Builds the entry. Actor defaults to the nil uuid (the console) and
    /// the timestamp to now.
    pub fn build(self) -> DomainResult<LogEntry> {
        let target_type = self.target_type.ok_or_else(|| DomainError::InvalidLogEntry {
            message: "no target".to_string(),
        })?;
        if self.action.trim().is_empty() {
            return Err(DomainError::InvalidLogEntry {
                message: "no action".to_string(),
            });
        }
        Ok(LogEntry {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            seq: 0,
            actor: self.actor.unwrap_or(Uuid::nil()),
            actor_name: self.actor_name,
            target_type,
            target_id: self.target_id,
            target_name: self.target_name,
            action: self.action,
            context: self.context,
            extra_data: self.extra_data,
        })
    }
}

/// Selects entries from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFilter {
    All,
    /// Entries made by this actor.
    Actor(Uuid),
    /// Entries acting on this user.
    User(Uuid),
    /// Entries acting on this group (case-insensitive).
    Group(String),
    /// Entries acting on this track (case-insensitive).
    Track(String),
    /// Case-insensitive substring of actor name, target name or action.
    Search(String),
}

impl AuditFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            AuditFilter::All => true,
            AuditFilter::Actor(actor) => entry.actor == *actor,
            AuditFilter::User(user) => {
                entry.target_type == TargetType::User && entry.target_id == Some(*user)
            }
            AuditFilter::Group(name) => {
                entry.target_type == TargetType::Group && entry.target_name.eq_ignore_ascii_case(name)
            }
            AuditFilter::Track(name) => {
                entry.target_type == TargetType::Track && entry.target_name.eq_ignore_ascii_case(name)
            }
            AuditFilter::Search(query) => {
                let query = query.to_lowercase();
                [&entry.actor_name, &entry.target_name, &entry.action]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&query))
            }
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    entries: BTreeMap<(DateTime<Utc>, u64), LogEntry>,
    next_seq: u64,
}

/// In-memory, append-only audit log.
#[derive(Debug, Default)]
pub struct AuditLog {
    state: RwLock<LogState>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a log from previously stored entries.
    pub fn load(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let log = Self::new();
        let mut sorted: Vec<LogEntry> = entries.into_iter().collect();
        sorted.sort_by_key(LogEntry::order_key);
        for entry in sorted {
            log.record(entry);
        }
        log
    }

    /// Appends `entry`, returning it with its assigned sequence number.
    pub fn record(&self, mut entry: LogEntry) -> LogEntry {
        let mut state = self.state.write();
        entry.seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(entry.order_key(), entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// All entries matching `filter`, oldest first.
    pub fn recent(&self, filter: &AuditFilter) -> Vec<LogEntry> {
        self.state
            .read()
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Number of pages of `page_size` needed for the entries matching `filter`.
    pub fn max_pages(&self, filter: &AuditFilter, page_size: usize) -> DomainResult<usize> {
        if page_size == 0 {
            return Err(DomainError::InvalidPageSize);
        }
        let matches = self
            .state
            .read()
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .count();
        Ok(matches.div_ceil(page_size))
    }

    /// Page `page_no` (1-based) of the entries matching `filter`, keyed by
    /// each entry's 1-based position among them.
    ///
    /// A filter matching nothing yields an empty first page.
    pub fn page(
        &self,
        page_no: usize,
        filter: &AuditFilter,
        page_size: usize,
    ) -> DomainResult<BTreeMap<usize, LogEntry>> {
        if page_size == 0 {
            return Err(DomainError::InvalidPageSize);
        }
        if page_no < 1 {
            return Err(DomainError::InvalidPage { page: page_no });
        }

        let matching = self.recent(filter);
        let max_pages = matching.len().div_ceil(page_size);
        // page 1 of an empty result is an empty answer, not an error
        if page_no > max_pages.max(1) {
            return Err(DomainError::PageOutOfRange {
                page: page_no,
                max_pages,
            });
        }

        let start = (page_no - 1) * page_size;
        Ok(matching
            .into_iter()
            .enumerate()
            .skip(start)
            .take(page_size)
            .map(|(index, entry)| (index + 1, entry))
            .collect())
    }
}
