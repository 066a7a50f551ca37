//! Integration tests for namespace isolation and code loading

mod activation_scoping;
mod bridge_drivers;
mod resolution_order;
pub mod test_utils;
