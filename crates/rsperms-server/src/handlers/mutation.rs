//! Administrative mutations.
//!
//! Edits (set/unset a node, add/remove a parent) flow through
//! [`MutationHandler`], which keeps the engine, storage and the audit log
//! in step.

mod handler;
mod types;

pub use handler::MutationHandler;
pub use types::{Actor, Mutation, MutationError, MutationOutcome, MutationResult};
