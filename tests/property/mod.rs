//! Property-based tests for registry and activation invariants

mod registry_model;
