//! Permission model: identities, nodes and inheritance edges.

mod identity;
mod types;

pub use identity::{Identity, IdentityId, InheritanceEdge};
pub use types::{ContextFilter, Node, NodeKind, NodeValue, Tristate, PREFIX_KEY, SUFFIX_KEY};
