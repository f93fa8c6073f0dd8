//! rsperms-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for rsperms, including:
//! - DataStore trait for users, groups, tracks, id mappings and the audit log
//! - Stored record types
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rsperms-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DataStore trait + records    │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - Storage errors               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    validate_name, DataStore, StoredGroup, StoredLogEntry, StoredNode, StoredTrack, StoredUser,
    DEFAULT_GROUP, MAX_NAME_LENGTH,
};
