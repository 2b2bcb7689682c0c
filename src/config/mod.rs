//! Configuration module for the test grid scheduler
//!
//! This module provides the `GridConfig` struct and its type-safe builder
//! for configuring admission control, pool capacities, run logging and
//! browser launch behavior.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::{GridConfigBuilder, WithLogRoot};
pub use types::GridConfig;
