//! Install-time dependency resolution for developer tools.
//!
//! Turns tool manifests into a dependency graph, detects cycles and
//! conflicts, applies a resolution policy, and derives an installation
//! order partitioned into batches that can be installed in parallel.
//!
//! Everything here is synchronous and in-memory except the optional
//! [`lookup::PackageLookup`] seam used during conflict resolution.

pub mod builder;
pub mod cache;
pub mod conflict;
pub mod diagnostics;
pub mod graph;
pub mod lookup;
pub mod order;
pub mod resolution;
pub mod version;
