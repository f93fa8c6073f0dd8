//! Types produced by the resolver.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::context::ContextSet;
use crate::model::{IdentityId, Tristate};

/// Resolved metadata: prefix, suffix and arbitrary meta options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    pub(crate) prefix: Option<String>,
    pub(crate) suffix: Option<String>,
    pub(crate) meta: HashMap<String, String>,
}

impl MetaData {
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Meta value for `key`, defaults layers included.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn meta(&self) -> &HashMap<String, String> {
        &self.meta
    }
}

/// Frozen result of resolving one identity under one context set.
///
/// Snapshots are never mutated after construction; the cache replaces them
/// wholesale.
#[derive(Debug, Clone)]
pub struct ComputedData {
    pub(crate) identity: IdentityId,
    pub(crate) context: ContextSet,
    pub(crate) permissions: HashMap<String, bool>,
    pub(crate) meta: MetaData,
    pub(crate) groups: Vec<String>,
    pub(crate) computed_at: DateTime<Utc>,
}

impl ComputedData {
    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    /// The context set this snapshot was computed for.
    pub fn context(&self) -> &ContextSet {
        &self.context
    }

    /// Resolved value of a permission. Keys are case-insensitive.
    pub fn permission_value(&self, key: &str) -> Tristate {
        let key = key.trim().to_lowercase();
        self.permissions.get(&key).copied().into()
    }

    /// Every resolved permission.
    pub fn permissions(&self) -> &HashMap<String, bool> {
        &self.permissions
    }

    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Loaded groups reached by the inheritance walk, sorted by name.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// True if `group` was reached by the inheritance walk.
    pub fn inherits(&self, group: &str) -> bool {
        let group = group.trim().to_lowercase();
        self.groups.binary_search(&group).is_ok()
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }
}
