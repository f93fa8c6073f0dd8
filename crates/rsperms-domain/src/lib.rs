//! rsperms-domain: Core permission resolution logic
//!
//! This crate contains the permission engine:
//! - Context sets and the node/identity model
//! - The inheritance graph and its traversal
//! - Permission and metadata resolution
//! - Computed data caching with debounced refresh
//! - Identity translation and the audit log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsperms-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  context/     - Context sets                │
//! │  model/       - Nodes, identities, edges    │
//! │  graph/       - Inheritance graph           │
//! │  resolver/    - Resolution engine           │
//! │  cache/       - Computed data cache         │
//! │  engine       - Facade over all of the above│
//! │  translation  - Platform id mapping         │
//! │  audit/       - Audit log                   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod resolver;
pub mod translation;

// Re-export commonly used types at the crate root
pub use audit::{AuditFilter, AuditLog, LogEntry, LogEntryBuilder, TargetType};
pub use cache::{CacheConfig, ComputedDataCache};
pub use context::{ContextSet, MutableContextSet};
pub use engine::PermissionEngine;
pub use error::{DomainError, DomainResult};
pub use graph::InheritanceGraph;
pub use model::{Identity, IdentityId, InheritanceEdge, Node, NodeValue, Tristate};
pub use resolver::{ComputedData, ContextCalculator, PermissionResolver, ResolverConfig};
pub use translation::IdentityTranslation;
