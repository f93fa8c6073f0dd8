//! Data types for administrative mutations.

use std::fmt;

use rsperms_domain::audit::LogEntry;
use rsperms_domain::model::{ContextFilter, Identity, InheritanceEdge, Node, NodeValue};
use rsperms_domain::DomainError;
use uuid::Uuid;

use crate::adapters::encode_contexts;

/// Who performed a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The server console (nil id).
    pub fn console() -> Self {
        Self::new(Uuid::nil(), "Console")
    }
}

/// A single edit to an identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Sets a node, replacing any node in the same slot.
    SetNode(Node),
    /// Removes the node in the same slot.
    UnsetNode(Node),
    AddParent(InheritanceEdge),
    /// Removes every edge to the named group.
    RemoveParent(String),
}

impl Mutation {
    /// Applies the edit. Returns true if the identity changed.
    pub(crate) fn apply(&self, identity: &mut Identity) -> bool {
        match self {
            Mutation::SetNode(node) => identity.set_node(node.clone()),
            Mutation::UnsetNode(node) => identity.unset_node(node),
            Mutation::AddParent(edge) => identity.add_parent(edge.clone()),
            Mutation::RemoveParent(group) => identity.remove_parent(group),
        }
    }

    /// Context the edit applies in, as recorded in the audit log.
    pub(crate) fn context(&self) -> String {
        match self {
            Mutation::SetNode(node) | Mutation::UnsetNode(node) => encode_contexts(node.context()),
            Mutation::AddParent(edge) => encode_contexts(&edge.context),
            Mutation::RemoveParent(_) => encode_contexts(&ContextFilter::default()),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::SetNode(node) => match node.value() {
                NodeValue::Permission(v) => write!(f, "permission set {} {v}", node.key()),
                NodeValue::Meta(v) => write!(f, "meta set {} {v}", node.key()),
                NodeValue::Prefix(v) => write!(f, "meta setprefix {} {v}", node.weight()),
                NodeValue::Suffix(v) => write!(f, "meta setsuffix {} {v}", node.weight()),
            },
            Mutation::UnsetNode(node) => match node.value() {
                NodeValue::Permission(_) => write!(f, "permission unset {}", node.key()),
                NodeValue::Meta(_) => write!(f, "meta unset {}", node.key()),
                NodeValue::Prefix(_) => write!(f, "meta removeprefix {}", node.weight()),
                NodeValue::Suffix(_) => write!(f, "meta removesuffix {}", node.weight()),
            },
            Mutation::AddParent(edge) => write!(f, "parent add {}", edge.group),
            Mutation::RemoveParent(group) => write!(f, "parent remove {}", group.to_lowercase()),
        }
    }
}

/// Result of an applied mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// False when the identity already looked like this.
    pub changed: bool,
    /// The change reached storage.
    pub persisted: bool,
    /// Audit entry recorded for the change.
    pub entry: Option<LogEntry>,
}

impl MutationOutcome {
    pub(crate) fn unchanged() -> Self {
        Self {
            changed: false,
            persisted: false,
            entry: None,
        }
    }
}

/// Errors that can occur while applying a mutation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MutationError {
    /// Users must be logged in to be edited.
    #[error("identity not loaded: {identity}")]
    NotLoaded { identity: String },

    /// The group is neither loaded nor stored.
    #[error("group not found: {name}")]
    GroupNotFound { name: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;
