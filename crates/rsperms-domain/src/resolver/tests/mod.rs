//! Tests for the permission resolver.
//!
//! Organized by property:
//! - Determinism and precedence
//! - Context filtering
//! - Cycle safety
//! - Tri-state results
//! - Prefix and suffix selection
//! - Meta defaults layering

mod resolver_tests;
