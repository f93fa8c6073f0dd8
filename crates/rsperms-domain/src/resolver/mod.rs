//! Permission and metadata resolution.
//!
//! The resolver walks the inheritance graph (see [`crate::graph`]) for an
//! identity under an active context set and picks the applicable node that
//! decides each key.
//!
//! # Precedence
//!
//! - **Permissions and meta** short-circuit per identity: the first identity
//!   in traversal order holding an applicable node for the key decides it.
//!   Within that identity the highest weight wins, then the earliest node.
//! - **Prefix and suffix** are "best found anywhere": the highest-weight
//!   applicable prefix (suffix) across the whole traversal wins, ties going
//!   to the one found first.
//! - **Meta** falls back to the collection defaults and then the service
//!   defaults when the hierarchy supplies nothing.
//!
//! Expired nodes and nodes with malformed context filters never apply.
//! Resolution always completes.

mod config;
mod traits;
mod types;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::context::ContextSet;
use crate::graph::InheritanceGraph;
use crate::model::{IdentityId, Node, NodeKind, NodeValue, Tristate};

pub use config::{DefaultsLayer, ResolverConfig};
pub use traits::{ContextCalculator, StaticContextCalculator};
pub use types::{ComputedData, MetaData};

/// Resolves permissions and metadata over an [`InheritanceGraph`].
#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    config: ResolverConfig,
}

/// Picks the better of two candidates within one identity: higher weight,
/// otherwise the incumbent (earlier insertion).
fn better<'a>(incumbent: Option<&'a Node>, candidate: &'a Node) -> &'a Node {
    match incumbent {
        Some(current) if current.weight() >= candidate.weight() => current,
        _ => candidate,
    }
}

impl PermissionResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves a single permission.
    pub fn resolve_permission(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        key: &str,
        active: &ContextSet,
    ) -> Tristate {
        self.resolve_permission_at(graph, identity, key, active, Utc::now())
    }

    pub(crate) fn resolve_permission_at(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        key: &str,
        active: &ContextSet,
        now: DateTime<Utc>,
    ) -> Tristate {
        let key = key.trim().to_lowercase();
        for current in graph.traversal(identity, active, now) {
            let winner = current
                .nodes()
                .iter()
                .filter(|n| n.kind() == NodeKind::Permission && n.key() == key)
                .filter(|n| n.applies(active, now))
                .fold(None, |best, n| Some(better(best, n)));

            if let Some(NodeValue::Permission(value)) = winner.map(Node::value) {
                return Tristate::from_bool(*value);
            }
        }
        Tristate::Undefined
    }

    /// Resolves a single meta option, falling back to the defaults layers.
    pub fn resolve_meta(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        key: &str,
        active: &ContextSet,
    ) -> Option<String> {
        self.resolve_meta_at(graph, identity, key, active, Utc::now())
    }

    pub(crate) fn resolve_meta_at(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        key: &str,
        active: &ContextSet,
        now: DateTime<Utc>,
    ) -> Option<String> {
        for current in graph.traversal(identity, active, now) {
            let winner = current
                .nodes()
                .iter()
                .filter(|n| n.kind() == NodeKind::Meta && n.key() == key)
                .filter(|n| n.applies(active, now))
                .fold(None, |best, n| Some(better(best, n)));

            if let Some(value) = winner.and_then(Node::string_value) {
                return Some(value.to_string());
            }
        }

        self.config
            .default_layers()
            .into_iter()
            .find_map(|layer| layer.resolve(key, active, now))
            .map(str::to_string)
    }

    /// Resolves the best prefix found anywhere in the hierarchy.
    pub fn resolve_prefix(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        active: &ContextSet,
    ) -> Option<String> {
        self.best_anywhere(graph, identity, active, NodeKind::Prefix, Utc::now())
    }

    /// Resolves the best suffix found anywhere in the hierarchy.
    pub fn resolve_suffix(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        active: &ContextSet,
    ) -> Option<String> {
        self.best_anywhere(graph, identity, active, NodeKind::Suffix, Utc::now())
    }

    fn best_anywhere(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        active: &ContextSet,
        kind: NodeKind,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let traversal = graph.traversal(identity, active, now);
        let mut best: Option<&Node> = None;
        for node in traversal
            .iter()
            .flat_map(|i| i.nodes())
            .filter(|n| n.kind() == kind && n.applies(active, now))
        {
            best = Some(better(best, node));
        }
        best.and_then(Node::string_value).map(str::to_string)
    }

    /// Resolves the full snapshot for `identity` under `active`.
    ///
    /// Every permission and meta key found in the applicable hierarchy is
    /// resolved, with the same precedence as the single-key lookups.
    pub fn compute(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        active: &ContextSet,
    ) -> ComputedData {
        self.compute_at(graph, identity, active, Utc::now())
    }

    pub(crate) fn compute_at(
        &self,
        graph: &InheritanceGraph,
        identity: &IdentityId,
        active: &ContextSet,
        now: DateTime<Utc>,
    ) -> ComputedData {
        let mut permissions: HashMap<String, bool> = HashMap::new();
        let mut meta_values: HashMap<String, String> = HashMap::new();
        let mut prefix: Option<&Node> = None;
        let mut suffix: Option<&Node> = None;

        let traversal = graph.traversal(identity, active, now);
        for current in &traversal {
            let mut local_permissions: HashMap<&str, &Node> = HashMap::new();
            let mut local_meta: HashMap<&str, &Node> = HashMap::new();

            for node in current.nodes().iter().filter(|n| n.applies(active, now)) {
                match node.kind() {
                    NodeKind::Permission => {
                        let slot = local_permissions.get(node.key()).copied();
                        local_permissions.insert(node.key(), better(slot, node));
                    }
                    NodeKind::Meta => {
                        let slot = local_meta.get(node.key()).copied();
                        local_meta.insert(node.key(), better(slot, node));
                    }
                    NodeKind::Prefix => prefix = Some(better(prefix, node)),
                    NodeKind::Suffix => suffix = Some(better(suffix, node)),
                }
            }

            // an earlier identity already decided these keys
            for (key, node) in local_permissions {
                if let NodeValue::Permission(value) = node.value() {
                    permissions.entry(key.to_string()).or_insert(*value);
                }
            }
            for (key, node) in local_meta {
                if let Some(value) = node.string_value() {
                    meta_values
                        .entry(key.to_string())
                        .or_insert_with(|| value.to_string());
                }
            }
        }

        for layer in self.config.default_layers() {
            for key in layer.keys() {
                if meta_values.contains_key(key) {
                    continue;
                }
                if let Some(value) = layer.resolve(key, active, now) {
                    meta_values.insert(key.to_string(), value.to_string());
                }
            }
        }

        let mut groups: Vec<String> = traversal
            .iter()
            .skip(1)
            .filter_map(|i| i.id().as_group().map(str::to_string))
            .collect();
        groups.sort();

        ComputedData {
            identity: identity.clone(),
            context: active.clone(),
            permissions,
            meta: MetaData {
                prefix: prefix.and_then(Node::string_value).map(str::to_string),
                suffix: suffix.and_then(Node::string_value).map(str::to_string),
                meta: meta_values,
            },
            groups,
            computed_at: now,
        }
    }
}
