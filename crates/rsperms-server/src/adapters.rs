//! Adapters that bridge the storage layer to the domain layer.
//!
//! Storage keeps records in their flat shape (`rsperms_storage::StoredNode`
//! with an encoded key and a JSON context string). The domain works with
//! typed [`Node`]s and [`InheritanceEdge`]s. Key encodings:
//!
//! | key                       | domain value                     |
//! |---------------------------|----------------------------------|
//! | `group.<name>` (true)     | inheritance edge to `<name>`     |
//! | `prefix.<priority>.<v>`   | prefix `<v>` at `<priority>`     |
//! | `suffix.<priority>.<v>`   | suffix `<v>` at `<priority>`     |
//! | `meta.<key>.<v>`          | meta `<key>` = `<v>`             |
//! | anything else             | permission node                  |
//!
//! A context string that fails to parse is carried as
//! [`ContextFilter::Malformed`]: it round-trips back to storage untouched
//! and never applies during resolution.

use std::collections::BTreeMap;

use rsperms_domain::audit::{LogEntry, TargetType};
use rsperms_domain::context::MutableContextSet;
use rsperms_domain::error::{DomainError, DomainResult};
use rsperms_domain::model::{ContextFilter, Identity, InheritanceEdge, Node, NodeValue};
use rsperms_domain::ContextSet;
use rsperms_storage::{StoredGroup, StoredLogEntry, StoredNode, StoredUser};
use serde_json::Value;
use tracing::warn;

const GROUP_PREFIX: &str = "group.";
const PREFIX_PREFIX: &str = "prefix.";
const SUFFIX_PREFIX: &str = "suffix.";
const META_PREFIX: &str = "meta.";

/// A stored node decoded into its domain shape.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedNode {
    Node(Node),
    Parent(InheritanceEdge),
}

/// Parses a stored context string.
///
/// The empty string (or `{}`) is the global context. Otherwise the string
/// must be a JSON object mapping each key to a string or an array of
/// strings.
pub fn parse_contexts(raw: &str) -> ContextFilter {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ContextFilter::default();
    }
    match try_parse_contexts(trimmed) {
        Some(set) => ContextFilter::Valid(set),
        None => {
            warn!(contexts = raw, "malformed context string, node will never apply");
            ContextFilter::Malformed(raw.to_string())
        }
    }
}

fn try_parse_contexts(raw: &str) -> Option<ContextSet> {
    let Value::Object(map) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    let mut builder = MutableContextSet::new();
    for (key, value) in &map {
        match value {
            Value::String(v) => {
                builder.add(key, v).ok()?;
            }
            Value::Array(values) => {
                for v in values {
                    builder.add(key, v.as_str()?).ok()?;
                }
            }
            _ => return None,
        }
    }
    Some(builder.freeze())
}

/// Encodes a context filter for storage.
pub fn encode_contexts(filter: &ContextFilter) -> String {
    match filter {
        ContextFilter::Malformed(raw) => raw.clone(),
        ContextFilter::Valid(set) if set.is_empty() => String::new(),
        ContextFilter::Valid(set) => {
            let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for (key, value) in set.iter() {
                grouped.entry(key).or_default().push(value);
            }
            serde_json::to_string(&grouped).unwrap_or_default()
        }
    }
}

/// Splits `<priority>.<value>` as used by prefix and suffix keys.
fn split_priority(rest: &str) -> Option<(i32, &str)> {
    let (priority, value) = rest.split_once('.')?;
    Some((priority.parse().ok()?, value))
}

/// Decodes a stored node.
///
/// Negated group, meta, prefix and suffix entries have no domain meaning
/// beyond their key, so they decode to plain permission nodes.
pub fn decode_node(stored: &StoredNode) -> DecodedNode {
    let context = parse_contexts(&stored.contexts);
    let lower = stored.key.to_lowercase();

    if stored.value {
        if let Some(group) = lower.strip_prefix(GROUP_PREFIX) {
            if !group.trim().is_empty() {
                let mut edge = InheritanceEdge::new(group)
                    .with_context(context)
                    .with_weight(stored.weight);
                edge.expiry = stored.expiry;
                return DecodedNode::Parent(edge);
            }
        }

        let key = stored.key.as_str();
        let typed = if lower.starts_with(PREFIX_PREFIX) {
            split_priority(&key[PREFIX_PREFIX.len()..]).map(|(p, v)| Node::prefix(p, v))
        } else if lower.starts_with(SUFFIX_PREFIX) {
            split_priority(&key[SUFFIX_PREFIX.len()..]).map(|(p, v)| Node::suffix(p, v))
        } else if lower.starts_with(META_PREFIX) {
            key[META_PREFIX.len()..]
                .split_once('.')
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| Node::meta(k, v).with_weight(stored.weight))
        } else {
            None
        };

        if let Some(node) = typed {
            return DecodedNode::Node(with_common(node, context, stored));
        }
    }

    let node = Node::permission(&stored.key, stored.value).with_weight(stored.weight);
    DecodedNode::Node(with_common(node, context, stored))
}

fn with_common(node: Node, context: ContextFilter, stored: &StoredNode) -> Node {
    let node = node.with_context(context);
    match stored.expiry {
        Some(expiry) => node.with_expiry(expiry),
        None => node,
    }
}

/// Encodes a domain node for storage.
pub fn encode_node(node: &Node) -> StoredNode {
    let (key, value, weight) = match node.value() {
        NodeValue::Permission(v) => (node.key().to_string(), *v, node.weight()),
        NodeValue::Meta(v) => (format!("{META_PREFIX}{}.{v}", node.key()), true, node.weight()),
        NodeValue::Prefix(v) => (format!("{PREFIX_PREFIX}{}.{v}", node.weight()), true, 0),
        NodeValue::Suffix(v) => (format!("{SUFFIX_PREFIX}{}.{v}", node.weight()), true, 0),
    };
    StoredNode {
        key,
        value,
        contexts: encode_contexts(node.context()),
        weight,
        expiry: node.expiry(),
    }
}

/// Encodes an inheritance edge for storage.
pub fn encode_parent(edge: &InheritanceEdge) -> StoredNode {
    StoredNode {
        key: format!("{GROUP_PREFIX}{}", edge.group),
        value: true,
        contexts: encode_contexts(&edge.context),
        weight: edge.weight,
        expiry: edge.expiry,
    }
}

fn apply_nodes(mut identity: Identity, nodes: &[StoredNode]) -> Identity {
    for stored in nodes {
        identity = match decode_node(stored) {
            DecodedNode::Node(node) => identity.with_node(node),
            DecodedNode::Parent(edge) => identity.with_parent(edge),
        };
    }
    identity
}

fn encode_all(identity: &Identity) -> Vec<StoredNode> {
    identity
        .nodes()
        .iter()
        .map(encode_node)
        .chain(identity.parents().iter().map(encode_parent))
        .collect()
}

/// Builds a domain user from its stored record.
pub fn user_from_stored(stored: &StoredUser) -> Identity {
    apply_nodes(Identity::user(stored.uuid, stored.name.clone()), &stored.nodes)
}

/// Builds a domain group from its stored record.
pub fn group_from_stored(stored: &StoredGroup) -> DomainResult<Identity> {
    Ok(apply_nodes(Identity::group(&stored.name)?, &stored.nodes))
}

/// Builds the stored record of a domain user.
pub fn user_to_stored(identity: &Identity, primary_group: &str) -> DomainResult<StoredUser> {
    let rsperms_domain::IdentityId::User(uuid) = identity.id() else {
        return Err(DomainError::InvalidIdentity {
            value: format!("{} is not a user", identity.id()),
        });
    };
    Ok(StoredUser {
        uuid: *uuid,
        name: identity.name().map(str::to_string),
        primary_group: primary_group.to_string(),
        nodes: encode_all(identity),
    })
}

/// Builds the stored record of a domain group.
pub fn group_to_stored(identity: &Identity) -> DomainResult<StoredGroup> {
    let Some(name) = identity.id().as_group() else {
        return Err(DomainError::InvalidIdentity {
            value: format!("{} is not a group", identity.id()),
        });
    };
    Ok(StoredGroup {
        name: name.to_string(),
        nodes: encode_all(identity),
    })
}

/// Converts a stored log entry. Unknown target codes are rejected.
pub fn log_entry_from_stored(stored: &StoredLogEntry) -> DomainResult<LogEntry> {
    let target_type =
        TargetType::from_code(stored.target_type).ok_or_else(|| DomainError::InvalidLogEntry {
            message: format!("unknown target type '{}'", stored.target_type),
        })?;
    Ok(LogEntry {
        timestamp: stored.timestamp,
        seq: 0,
        actor: stored.actor,
        actor_name: stored.actor_name.clone(),
        target_type,
        target_id: stored.target_id,
        target_name: stored.target_name.clone(),
        action: stored.action.clone(),
        context: stored.context.clone(),
        extra_data: stored.extra_data.clone(),
    })
}

pub fn log_entry_to_stored(entry: &LogEntry) -> StoredLogEntry {
    StoredLogEntry {
        timestamp: entry.timestamp,
        actor: entry.actor,
        actor_name: entry.actor_name.clone(),
        target_type: entry.target_type.code(),
        target_id: entry.target_id,
        target_name: entry.target_name.clone(),
        action: entry.action.clone(),
        context: entry.context.clone(),
        extra_data: entry.extra_data.clone(),
    }
}
