//! Configuration for the permission resolver.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::context::ContextSet;
use crate::model::{InheritanceEdge, Node, NodeValue};

/// A layer of default meta options and parents consulted after the
/// inheritance walk.
///
/// Only meta nodes are considered. Within the layer the highest-weight
/// applicable node wins; ties go to the earliest node. Parents are reported
/// to the platform but never walked.
#[derive(Debug, Clone, Default)]
pub struct DefaultsLayer {
    nodes: Vec<Node>,
    parents: Vec<InheritanceEdge>,
}

impl DefaultsLayer {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<InheritanceEdge>) -> Self {
        self.parents = parents;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.parents.is_empty()
    }

    /// Parent groups of this layer applying under `active`.
    pub fn parents<'a>(
        &'a self,
        active: &'a ContextSet,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.parents
            .iter()
            .filter(move |edge| edge.applies(active, now))
            .map(|edge| edge.group.as_str())
    }

    /// Resolves `key` within this layer.
    pub fn resolve(&self, key: &str, active: &ContextSet, now: DateTime<Utc>) -> Option<&str> {
        let mut best: Option<(&Node, &str)> = None;
        for node in &self.nodes {
            let NodeValue::Meta(value) = node.value() else {
                continue;
            };
            if node.key() != key || !node.applies(active, now) {
                continue;
            }
            if best.map_or(true, |(b, _)| node.weight() > b.weight()) {
                best = Some((node, value));
            }
        }
        best.map(|(_, v)| v)
    }

    /// Meta keys defined anywhere in this layer.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.value(), NodeValue::Meta(_)))
            .map(Node::key)
    }
}

/// Configuration for the permission resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Defaults of the user collection, consulted first after the hierarchy.
    pub collection_defaults: Arc<DefaultsLayer>,
    /// Service-wide defaults, consulted last.
    pub service_defaults: Arc<DefaultsLayer>,
}

impl ResolverConfig {
    /// Sets the collection-level defaults layer.
    pub fn with_collection_defaults(mut self, layer: DefaultsLayer) -> Self {
        self.collection_defaults = Arc::new(layer);
        self
    }

    /// Sets the service-level defaults layer.
    pub fn with_service_defaults(mut self, layer: DefaultsLayer) -> Self {
        self.service_defaults = Arc::new(layer);
        self
    }

    /// Layers in lookup order.
    pub fn default_layers(&self) -> [&DefaultsLayer; 2] {
        [&self.collection_defaults, &self.service_defaults]
    }
}
