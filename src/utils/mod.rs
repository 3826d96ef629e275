//! Utility functions and helpers.
//!
//! Small pure modules the rest of the crate leans on: strict duration
//! parsing, the canonical boolean/option-flag handling, the single
//! amount converter, deterministic seeding, and binary path resolution.

pub mod amount;
pub mod binary;
pub mod duration;
pub mod options;
pub mod seed;

pub use amount::xmr_to_atomic;
pub use duration::parse_duration_to_seconds;
pub use options::parse_flexible_bool;
pub use seed::{agent_seed, stable_hash};
