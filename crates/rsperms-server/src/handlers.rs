//! Request handlers.
//!
//! - [`login`]: session bootstrap for a connecting player
//! - [`mutation`]: administrative edits to users and groups
//! - [`audit`]: write-through recording and paging of the action log

pub mod audit;
pub mod login;
pub mod mutation;

#[cfg(test)]
mod test_support;

pub use audit::AuditRecorder;
pub use login::{LoginError, LoginHandler, LoginOutcome};
pub use mutation::{Actor, Mutation, MutationError, MutationHandler, MutationOutcome};
