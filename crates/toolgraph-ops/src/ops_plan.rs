//! Operation: compute an installation plan for a set of target tools.
//!
//! Builds the graph, detects conflicts, applies the configured resolution
//! policy (consulting `[native-versions]` for extra versions) and orders
//! what is left.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use toolgraph_core::config::GlobalConfig;
use toolgraph_core::platform::TargetPlatform;
use toolgraph_core::policy::OrderStrategy;
use toolgraph_resolver::conflict::{ConflictDetector, ConflictRecord};
use toolgraph_resolver::diagnostics::Diagnostic;
use toolgraph_resolver::lookup::StaticLookup;
use toolgraph_resolver::order::{InstallationOrder, InstallationOrderResolver, OrderOptions};
use toolgraph_resolver::resolution::{ConflictResolver, ResolutionStep};
use toolgraph_util::errors::ToolgraphError;

use crate::ops_setup;

/// Options for `toolgraph plan`.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Tools to install; empty means every tool in the manifests.
    pub targets: Vec<String>,
    pub include_optional: bool,
    pub include_suggested: bool,
    /// Overrides `[order] strategy`.
    pub strategy: Option<OrderStrategy>,
}

/// Everything a plan run produced, serializable for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub target: TargetPlatform,
    pub tools: usize,
    pub edges: usize,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub conflicts: Vec<ConflictRecord>,
    pub applied_steps: Vec<ResolutionStep>,
    pub remaining_conflicts: Vec<ConflictRecord>,
    pub order: InstallationOrder,
}

impl PlanReport {
    /// Human-readable plan for stdout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Installation plan for {}:", self.target);
        for (i, batch) in self.order.batches.iter().enumerate() {
            let _ = writeln!(out, "  batch {}: {}", i + 1, batch.join(", "));
        }
        if self.order.batches.is_empty() {
            let _ = writeln!(out, "  nothing to install");
        }
        if !self.order.deferred_dependencies.is_empty() {
            let _ = writeln!(out, "Deferred: {}", self.order.deferred_dependencies.join(", "));
        }
        if !self.order.circular_dependencies.is_empty() {
            let _ = writeln!(out, "Circular: {}", self.order.circular_dependencies.join(", "));
        }
        let _ = writeln!(out, "Estimated time: {}s", self.order.estimated_time.as_secs());
        out
    }

    pub fn to_json(&self) -> miette::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            ToolgraphError::Generic {
                message: format!("Failed to serialize plan: {e}"),
            }
            .into()
        })
    }
}

/// Compute the plan. Fails on hard construction errors; everything else is
/// reported in the returned [`PlanReport`].
pub async fn plan(manifests: &[PathBuf], config: &GlobalConfig, opts: &PlanOptions) -> miette::Result<PlanReport> {
    let build = ops_setup::build_options(config, opts.include_optional, opts.include_suggested);
    let target = build.target;
    let mut order_options = OrderOptions::from_config(&config.build, &config.order);
    order_options.include_optional = build.include_optional;
    order_options.include_suggested = build.include_suggested;
    if let Some(strategy) = opts.strategy {
        order_options.strategy = strategy;
    }

    let construction = ops_setup::construct(manifests, build)?;
    if !construction.success {
        ops_setup::report_diagnostics(&construction.errors, &construction.warnings);
        return Err(ToolgraphError::Resolution {
            message: format!(
                "graph construction failed with {} error(s)",
                construction.errors.iter().filter(|e| e.code.is_hard()).count()
            ),
        }
        .into());
    }
    toolgraph_util::progress::status(
        "Resolved",
        &format!(
            "{} tools, {} dependencies",
            construction.graph.node_count(),
            construction.graph.edge_count()
        ),
    );

    let targets = ops_setup::target_refs(&opts.targets);
    let detection = ConflictDetector::new(target).detect(&construction.graph, &targets);
    let lookup = StaticLookup::from_map(&config.native_versions);
    let resolution = ConflictResolver::new(config.resolution.clone(), target)
        .with_order_options(order_options.clone())
        .execute_with_lookup(&construction.graph, &detection, &targets, &lookup)
        .await;

    let order = match resolution.updated_installation_order {
        Some(order) => order,
        None => InstallationOrderResolver::resolve_with_conflicts(
            &resolution.modified_graph,
            &targets,
            &order_options,
            &resolution.remaining_conflicts,
        ),
    };

    let mut errors = construction.errors;
    errors.extend(resolution.errors);
    let mut warnings = construction.warnings;
    warnings.extend(resolution.warnings);

    Ok(PlanReport {
        target,
        tools: resolution.modified_graph.node_count(),
        edges: resolution.modified_graph.edge_count(),
        errors,
        warnings,
        conflicts: detection.conflicts,
        applied_steps: resolution.applied_steps,
        remaining_conflicts: resolution.remaining_conflicts,
        order,
    })
}
