//! Operation: validate manifests without producing a plan.
//!
//! Builds and validates the graph, then reports cycles, diagnostics and any
//! conflicts the configured policy cannot settle.

use std::path::PathBuf;

use toolgraph_core::config::GlobalConfig;
use toolgraph_resolver::conflict::{ConflictDetector, ConflictRecord};
use toolgraph_resolver::diagnostics::Diagnostic;
use toolgraph_resolver::graph::CycleReport;
use toolgraph_resolver::lookup::StaticLookup;
use toolgraph_resolver::resolution::ConflictResolver;

use crate::ops_setup;

/// Options for `toolgraph check`.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub targets: Vec<String>,
    pub include_optional: bool,
    pub include_suggested: bool,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub tools: usize,
    pub edges: usize,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub cycles: CycleReport,
    pub conflicts: Vec<ConflictRecord>,
    /// Conflicts the resolution policy could not settle.
    pub unresolved: Vec<ConflictRecord>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        !self.errors.iter().any(|e| e.code.is_hard()) && !self.cycles.has_cycles && self.unresolved.is_empty()
    }
}

pub async fn check(manifests: &[PathBuf], config: &GlobalConfig, opts: &CheckOptions) -> miette::Result<CheckOutcome> {
    let build = ops_setup::build_options(config, opts.include_optional, opts.include_suggested);
    let target = build.target;
    let construction = ops_setup::construct(manifests, build)?;
    toolgraph_util::progress::status(
        "Checking",
        &format!("{} tools for {target}", construction.graph.node_count()),
    );

    let targets = ops_setup::target_refs(&opts.targets);
    let detection = ConflictDetector::new(target).detect(&construction.graph, &targets);
    let unresolved = if detection.is_empty() {
        Vec::new()
    } else {
        let lookup = StaticLookup::from_map(&config.native_versions);
        ConflictResolver::new(config.resolution.clone(), target)
            .execute_with_lookup(&construction.graph, &detection, &targets, &lookup)
            .await
            .remaining_conflicts
    };

    Ok(CheckOutcome {
        tools: construction.graph.node_count(),
        edges: construction.graph.edge_count(),
        errors: construction.errors,
        warnings: construction.warnings,
        cycles: construction.metadata.cycles,
        conflicts: detection.conflicts,
        unresolved,
    })
}
