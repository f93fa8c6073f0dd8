//! Core value types: tri-state results and permission/meta nodes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextSet;

/// Three-valued permission result.
///
/// `Undefined` means no applicable assignment was found; it is distinct from
/// an explicit `False`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tristate {
    True,
    False,
    #[default]
    Undefined,
}

impl Tristate {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }

    /// Collapses to a boolean; `Undefined` becomes `false`.
    pub fn as_bool(self) -> bool {
        matches!(self, Tristate::True)
    }

    pub fn is_defined(self) -> bool {
        !matches!(self, Tristate::Undefined)
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        Tristate::from_bool(value)
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Tristate::Undefined, Tristate::from_bool)
    }
}

/// Value carried by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeValue {
    /// An explicit grant (`true`) or denial (`false`).
    Permission(bool),
    /// Arbitrary metadata value.
    Meta(String),
    /// Chat prefix; the node weight is its priority.
    Prefix(String),
    /// Chat suffix; the node weight is its priority.
    Suffix(String),
}

/// Node category used when filtering during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Permission,
    Meta,
    Prefix,
    Suffix,
}

/// Key used for prefix nodes.
pub const PREFIX_KEY: &str = "prefix";
/// Key used for suffix nodes.
pub const SUFFIX_KEY: &str = "suffix";

/// Context filter attached to a node.
///
/// Filters that failed to parse from storage are kept as `Malformed` so the
/// record round-trips, but they never apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextFilter {
    Valid(ContextSet),
    Malformed(String),
}

impl ContextFilter {
    pub fn applies(&self, active: &ContextSet) -> bool {
        match self {
            ContextFilter::Valid(set) => set.is_satisfied_by(active),
            ContextFilter::Malformed(_) => false,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ContextFilter::Valid(set) if set.is_empty())
    }
}

impl Default for ContextFilter {
    fn default() -> Self {
        ContextFilter::Valid(ContextSet::empty())
    }
}

impl From<ContextSet> for ContextFilter {
    fn from(set: ContextSet) -> Self {
        ContextFilter::Valid(set)
    }
}

/// A single permission or metadata assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    key: String,
    value: NodeValue,
    context: ContextFilter,
    weight: i32,
    expiry: Option<DateTime<Utc>>,
}

impl Node {
    /// A permission node. Permission keys are case-insensitive.
    pub fn permission(key: impl AsRef<str>, value: bool) -> Self {
        Self {
            key: key.as_ref().trim().to_lowercase(),
            value: NodeValue::Permission(value),
            context: ContextFilter::default(),
            weight: 0,
            expiry: None,
        }
    }

    /// A metadata node.
    pub fn meta(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: NodeValue::Meta(value.into()),
            context: ContextFilter::default(),
            weight: 0,
            expiry: None,
        }
    }

    /// A prefix node with the given priority.
    pub fn prefix(priority: i32, value: impl Into<String>) -> Self {
        Self {
            key: PREFIX_KEY.to_string(),
            value: NodeValue::Prefix(value.into()),
            context: ContextFilter::default(),
            weight: priority,
            expiry: None,
        }
    }

    /// A suffix node with the given priority.
    pub fn suffix(priority: i32, value: impl Into<String>) -> Self {
        Self {
            key: SUFFIX_KEY.to_string(),
            value: NodeValue::Suffix(value.into()),
            context: ContextFilter::default(),
            weight: priority,
            expiry: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<ContextFilter>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    pub fn context(&self) -> &ContextFilter {
        &self.context
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn kind(&self) -> NodeKind {
        match self.value {
            NodeValue::Permission(_) => NodeKind::Permission,
            NodeValue::Meta(_) => NodeKind::Meta,
            NodeValue::Prefix(_) => NodeKind::Prefix,
            NodeValue::Suffix(_) => NodeKind::Suffix,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|at| at <= now)
    }

    /// True if the node is live at `now` and its filter applies under `active`.
    pub fn applies(&self, active: &ContextSet, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.context.applies(active)
    }

    /// String payload of meta, prefix and suffix nodes.
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Permission(_) => None,
            NodeValue::Meta(v) | NodeValue::Prefix(v) | NodeValue::Suffix(v) => Some(v),
        }
    }

    /// True if this node and `other` target the same assignment slot.
    ///
    /// Prefixes and suffixes occupy one slot per priority.
    pub fn same_slot(&self, other: &Node) -> bool {
        let same_priority = match self.kind() {
            NodeKind::Prefix | NodeKind::Suffix => self.weight == other.weight,
            NodeKind::Permission | NodeKind::Meta => true,
        };
        self.key == other.key
            && self.kind() == other.kind()
            && self.context == other.context
            && same_priority
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            NodeValue::Permission(v) => write!(f, "{}={}", self.key, v)?,
            NodeValue::Meta(v) => write!(f, "meta.{}={}", self.key, v)?,
            NodeValue::Prefix(v) => write!(f, "prefix.{}.{}", self.weight, v)?,
            NodeValue::Suffix(v) => write!(f, "suffix.{}.{}", self.weight, v)?,
        }
        match &self.context {
            ContextFilter::Valid(set) if !set.is_empty() => write!(f, " {set}"),
            ContextFilter::Valid(_) => Ok(()),
            ContextFilter::Malformed(raw) => write!(f, " <malformed: {raw}>"),
        }
    }
}
