//! Inheritance graph of identities.
//!
//! Identities live in an arena (`slots`) addressed through an id index.
//! Forward edges are the parent lists carried by each [`Identity`]; a reverse
//! index (`inherited_by`) maps a group name to the identities that declare it
//! as a parent, so invalidation can find every dependent without a scan.
//!
//! # Traversal
//!
//! The traversal is an explicit-stack depth-first walk in pre-order:
//! the start identity first, then its applicable parents by descending edge
//! weight (ties keep edge insertion order), each fully expanded before the
//! next sibling. A group already visited is dropped. Revisiting a group that
//! is still on the current path means the stored graph has a cycle; this is
//! logged and otherwise treated like any other repeated visit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::context::ContextSet;
use crate::model::{Identity, IdentityId};

/// Arena-backed inheritance graph.
#[derive(Debug, Default, Clone)]
pub struct InheritanceGraph {
    slots: Vec<Option<Arc<Identity>>>,
    index: HashMap<IdentityId, usize>,
    free: Vec<usize>,
    inherited_by: HashMap<String, HashSet<IdentityId>>,
}

enum Frame {
    Enter(usize),
    Exit(usize),
}

impl InheritanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loaded identities.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &IdentityId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &IdentityId) -> Option<Arc<Identity>> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots[slot].clone())
    }

    /// Iterates over every loaded identity.
    pub fn identities(&self) -> impl Iterator<Item = &Arc<Identity>> {
        self.slots.iter().flatten()
    }

    /// Inserts or replaces an identity, returning the previous version.
    pub fn insert(&mut self, identity: Identity) -> Option<Arc<Identity>> {
        let id = identity.id().clone();
        let identity = Arc::new(identity);

        for edge in identity.parents() {
            self.inherited_by
                .entry(edge.group.clone())
                .or_default()
                .insert(id.clone());
        }

        match self.index.get(&id) {
            Some(&slot) => {
                let previous = self.slots[slot].replace(Arc::clone(&identity));
                if let Some(prev) = &previous {
                    self.unlink_stale_edges(prev, &identity);
                }
                previous
            }
            None => {
                let slot = match self.free.pop() {
                    Some(slot) => {
                        self.slots[slot] = Some(identity);
                        slot
                    }
                    None => {
                        self.slots.push(Some(identity));
                        self.slots.len() - 1
                    }
                };
                self.index.insert(id, slot);
                None
            }
        }
    }

    /// Removes an identity from the graph.
    ///
    /// Edges pointing at a removed group stay on their owners and are simply
    /// skipped during traversal until the group is loaded again.
    pub fn remove(&mut self, id: &IdentityId) -> Option<Arc<Identity>> {
        let slot = self.index.remove(id)?;
        let removed = self.slots[slot].take();
        self.free.push(slot);
        if let Some(identity) = &removed {
            for edge in identity.parents() {
                self.unlink(&edge.group, id);
            }
        }
        removed
    }

    fn unlink_stale_edges(&mut self, previous: &Identity, current: &Identity) {
        for edge in previous.parents() {
            if !current.parents().iter().any(|e| e.group == edge.group) {
                self.unlink(&edge.group, current.id());
            }
        }
    }

    fn unlink(&mut self, group: &str, child: &IdentityId) {
        if let Some(children) = self.inherited_by.get_mut(group) {
            children.remove(child);
            if children.is_empty() {
                self.inherited_by.remove(group);
            }
        }
    }

    /// Identities that declare `group` as a direct parent.
    pub fn direct_dependents(&self, group: &str) -> Vec<IdentityId> {
        self.inherited_by
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every identity that transitively inherits from `id`, excluding `id`.
    ///
    /// Context-gated edges are included: a mutation of the group may matter
    /// under some context.
    pub fn dependents(&self, id: &IdentityId) -> Vec<IdentityId> {
        let Some(group) = id.as_group() else {
            return Vec::new();
        };

        let mut seen: HashSet<IdentityId> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::from([group.to_string()]);

        while let Some(current) = queue.pop_front() {
            let Some(children) = self.inherited_by.get(&current) else {
                continue;
            };
            for child in children {
                if child == id || !seen.insert(child.clone()) {
                    continue;
                }
                out.push(child.clone());
                if let Some(name) = child.as_group() {
                    queue.push_back(name.to_string());
                }
            }
        }
        out
    }

    /// Ordered traversal starting at `start` under the `active` context.
    ///
    /// Returns an empty list when `start` is not loaded.
    pub fn traversal(
        &self,
        start: &IdentityId,
        active: &ContextSet,
        now: DateTime<Utc>,
    ) -> Vec<Arc<Identity>> {
        let Some(&root) = self.index.get(start) else {
            return Vec::new();
        };

        let mut order = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut on_path: HashSet<usize> = HashSet::new();
        let mut stack = vec![Frame::Enter(root)];

        while let Some(frame) = stack.pop() {
            let slot = match frame {
                Frame::Exit(slot) => {
                    on_path.remove(&slot);
                    continue;
                }
                Frame::Enter(slot) => slot,
            };

            let Some(identity) = self.slots[slot].as_ref() else {
                continue;
            };

            if !visited.insert(slot) {
                if on_path.contains(&slot) {
                    warn!(
                        start = %start,
                        group = %identity.id(),
                        "inheritance cycle detected, skipping repeated group"
                    );
                }
                continue;
            }

            order.push(Arc::clone(identity));
            on_path.insert(slot);
            stack.push(Frame::Exit(slot));

            let mut edges: Vec<_> = identity
                .parents()
                .iter()
                .filter(|edge| edge.applies(active, now))
                .collect();
            // stable: equal weights keep insertion order
            edges.sort_by(|a, b| b.weight.cmp(&a.weight));

            for edge in edges.into_iter().rev() {
                match self.index.get(&IdentityId::Group(edge.group.clone())) {
                    Some(&parent) => stack.push(Frame::Enter(parent)),
                    None => debug!(
                        identity = %identity.id(),
                        group = %edge.group,
                        "parent group not loaded, skipping"
                    ),
                }
            }
        }

        order
    }
}
