//! rsperms-server: session bootstrap, mutations and configuration
//!
//! This crate sits between a host platform and the resolution engine in
//! `rsperms-domain`:
//! - Login bootstrap (identity mapping, loading, default assignments)
//! - Administrative mutations with write-through and audit logging
//! - Storage record conversion
//! - The platform subject adapter
//! - Configuration and logging setup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsperms-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  observability.rs - Logging setup           │
//! │  service.rs       - Wiring                  │
//! │  handlers/        - Request handlers        │
//! │    login          - Session bootstrap       │
//! │    mutation       - Node/parent edits       │
//! │    audit          - Action log              │
//! │  adapters.rs      - Storage <-> domain      │
//! │  loader.rs        - Parent group loading    │
//! │  rules.rs         - Default assignments     │
//! │  subject.rs       - Platform subject        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod loader;
pub mod observability;
pub mod rules;
pub mod service;
pub mod subject;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{Actor, AuditRecorder, LoginHandler, Mutation, MutationHandler};
pub use observability::{init_logging, LoggingConfig};
pub use rules::DefaultAssignmentRule;
pub use service::{PermissionService, ServiceError};
pub use subject::{PlatformSubject, UserSubject};
