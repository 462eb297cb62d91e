//! Core data types for toolgraph.
//!
//! This crate defines the declarative inputs of the dependency resolver:
//! tool manifests and their dependency declarations, target platforms,
//! conflict-resolution policy, and the global configuration file.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod dependency;
pub mod manifest;
pub mod platform;
pub mod policy;
