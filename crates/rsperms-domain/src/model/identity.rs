//! Identities (users and groups) and their inheritance edges.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContextSet;
use crate::error::{DomainError, DomainResult};

use super::types::{ContextFilter, Node, NodeValue};

/// Key of an identity in the inheritance graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentityId {
    User(Uuid),
    Group(String),
}

impl IdentityId {
    /// A group key. Group names are case-insensitive.
    pub fn group(name: impl AsRef<str>) -> DomainResult<Self> {
        let name = name.as_ref().trim().to_lowercase();
        if name.is_empty() {
            return Err(DomainError::InvalidIdentity {
                value: "group name cannot be empty".to_string(),
            });
        }
        Ok(IdentityId::Group(name))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, IdentityId::User(_))
    }

    pub fn as_group(&self) -> Option<&str> {
        match self {
            IdentityId::Group(name) => Some(name),
            IdentityId::User(_) => None,
        }
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityId::User(uuid) => write!(f, "user:{uuid}"),
            IdentityId::Group(name) => write!(f, "group:{name}"),
        }
    }
}

/// Inheritance of a parent group, optionally gated by context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritanceEdge {
    /// Parent group name (lowercase).
    pub group: String,
    pub context: ContextFilter,
    /// Higher weights are visited first.
    pub weight: i32,
    pub expiry: Option<DateTime<Utc>>,
}

impl InheritanceEdge {
    pub fn new(group: impl AsRef<str>) -> Self {
        Self {
            group: group.as_ref().trim().to_lowercase(),
            context: ContextFilter::default(),
            weight: 0,
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

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|at| at <= now)
    }

    pub fn applies(&self, active: &ContextSet, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.context.applies(active)
    }
}

/// A user or group together with its own assignments.
///
/// Nodes and parents are kept in insertion order; that order is the final
/// tie-breaker during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: IdentityId,
    /// Cached display name (users) or display name (groups).
    name: Option<String>,
    nodes: Vec<Node>,
    parents: Vec<InheritanceEdge>,
}

impl Identity {
    pub fn user(uuid: Uuid, name: Option<String>) -> Self {
        Self {
            id: IdentityId::User(uuid),
            name,
            nodes: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn group(name: impl AsRef<str>) -> DomainResult<Self> {
        Ok(Self {
            id: IdentityId::group(name)?,
            name: None,
            nodes: Vec::new(),
            parents: Vec::new(),
        })
    }

    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn parents(&self) -> &[InheritanceEdge] {
        &self.parents
    }

    /// Builder-style node insertion.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Builder-style parent insertion.
    pub fn with_parent(mut self, edge: InheritanceEdge) -> Self {
        self.parents.push(edge);
        self
    }

    /// Sets a node, replacing any node occupying the same slot
    /// (same key, kind and context). Returns true if anything changed.
    pub fn set_node(&mut self, node: Node) -> bool {
        if let Some(existing) = self.nodes.iter_mut().find(|n| n.same_slot(&node)) {
            if *existing == node {
                return false;
            }
            *existing = node;
            return true;
        }
        self.nodes.push(node);
        true
    }

    /// Removes nodes in the same slot as `node`. Returns true if any were removed.
    pub fn unset_node(&mut self, node: &Node) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| !n.same_slot(node));
        before != self.nodes.len()
    }

    /// Adds a parent edge unless an edge to the same group with the same
    /// context already exists. Returns true if added.
    pub fn add_parent(&mut self, edge: InheritanceEdge) -> bool {
        if self
            .parents
            .iter()
            .any(|p| p.group == edge.group && p.context == edge.context)
        {
            return false;
        }
        self.parents.push(edge);
        true
    }

    /// Removes parent edges to `group`. Returns true if any were removed.
    pub fn remove_parent(&mut self, group: &str) -> bool {
        let group = group.trim().to_lowercase();
        let before = self.parents.len();
        self.parents.retain(|p| p.group != group);
        before != self.parents.len()
    }

    /// Removes the edge to `group` carrying exactly `context`.
    pub fn remove_parent_in(&mut self, group: &str, context: &ContextFilter) -> bool {
        let group = group.trim().to_lowercase();
        let before = self.parents.len();
        self.parents
            .retain(|p| !(p.group == group && p.context == *context));
        before != self.parents.len()
    }

    /// Looks up the value of a permission node set in the global context.
    pub fn global_permission(&self, key: &str) -> Option<bool> {
        let key = key.trim().to_lowercase();
        self.nodes.iter().find_map(|n| match n.value() {
            NodeValue::Permission(v) if n.key() == key && n.context().is_global() => Some(*v),
            _ => None,
        })
    }

    /// True if a parent edge to `group` exists in the global context.
    pub fn inherits_globally(&self, group: &str) -> bool {
        let group = group.trim().to_lowercase();
        self.parents
            .iter()
            .any(|p| p.group == group && p.context.is_global())
    }

    /// Drops expired nodes and edges. Returns true if anything was removed.
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.nodes.len() + self.parents.len();
        self.nodes.retain(|n| !n.is_expired(now));
        self.parents.retain(|p| !p.is_expired(now));
        before != self.nodes.len() + self.parents.len()
    }
}
