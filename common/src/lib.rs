//! Common utilities shared across the risk engine workspace: configuration
//! loading (YAML with `!include` layering) and, behind the `test-helpers`
//! feature, shared test helpers.

pub mod config;
pub mod yaml_include;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::{init_test_tracing, test_config};
