//! Capability traits the resolver and cache depend on.
//!
//! Platform integrations implement these at the boundary; nothing in this
//! crate knows about a concrete platform.

use crate::context::ContextSet;
use crate::model::IdentityId;

/// Supplies the active context of a subject "right now".
pub trait ContextCalculator: Send + Sync {
    /// Returns the active context for `subject`.
    fn active_contexts(&self, subject: &IdentityId) -> ContextSet;
}

/// A calculator that returns the same context for every subject,
/// typically `server=<name>` for a single-instance deployment.
#[derive(Debug, Clone, Default)]
pub struct StaticContextCalculator {
    context: ContextSet,
}

impl StaticContextCalculator {
    pub fn new(context: ContextSet) -> Self {
        Self { context }
    }
}

impl ContextCalculator for StaticContextCalculator {
    fn active_contexts(&self, _subject: &IdentityId) -> ContextSet {
        self.context.clone()
    }
}
