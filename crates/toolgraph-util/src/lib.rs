//! Shared utilities for toolgraph.
//!
//! Cross-cutting concerns used by the other toolgraph crates: the unified
//! error type and cargo-style terminal status lines.

pub mod errors;
pub mod progress;
