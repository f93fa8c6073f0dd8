//! Property-based tests for context sets.
