//! Graph construction from tool manifests.
//!
//! Construction runs in phases, each finishing for every manifest before the
//! next starts: validate and cache manifests, create nodes, create edges,
//! validate structure, check for cycles. Problems are collected as
//! diagnostics; only hard errors make the result unsuccessful.

use std::sync::Arc;
use std::time::{Duration, Instant};

use toolgraph_core::dependency::DependencyKind;
use toolgraph_core::manifest::ToolManifest;
use toolgraph_core::platform::TargetPlatform;

use crate::cache::ManifestCache;
use crate::diagnostics::{dependency_path, tool_path, Diagnostic, DiagnosticCode, Diagnostics};
use crate::graph::{CycleReport, DependencyEdge, EdgeKind, ToolGraph, ToolNode, ValidationRules};
use crate::version::VersionInterval;

/// Options controlling which dependencies become edges.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub include_optional: bool,
    pub include_suggested: bool,
    /// Run [`ToolGraph::validate`] after edges are created.
    pub validate: bool,
    pub validation: ValidationRules,
    pub target: TargetPlatform,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_optional: false,
            include_suggested: false,
            validate: true,
            validation: ValidationRules::default(),
            target: TargetPlatform::current(),
        }
    }
}

/// Whether a dependency of `kind` becomes an edge under `options`.
pub fn should_include_dependency(kind: DependencyKind, options: &BuildOptions) -> bool {
    match kind {
        DependencyKind::Required => true,
        DependencyKind::Optional => options.include_optional,
        DependencyKind::Suggests => options.include_suggested,
        DependencyKind::Conflicts => false,
    }
}

/// Counters gathered during construction.
#[derive(Debug, Clone, Default)]
pub struct ConstructionStatistics {
    pub manifests_processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    /// Included dependency declarations whose target manifest was found.
    pub dependencies_resolved: usize,
    /// Declared incompatibilities between tools that are both present.
    pub conflicts_detected: usize,
    /// Wall-clock construction time, never below 1ms.
    pub construction_time: Duration,
}

impl ConstructionStatistics {
    /// Compare every counter except `construction_time`.
    pub fn same_counts(&self, other: &Self) -> bool {
        self.manifests_processed == other.manifests_processed
            && self.nodes_created == other.nodes_created
            && self.edges_created == other.edges_created
            && self.dependencies_resolved == other.dependencies_resolved
            && self.conflicts_detected == other.conflicts_detected
    }
}

#[derive(Debug, Clone)]
pub struct GraphMetadata {
    pub target: TargetPlatform,
    pub include_optional: bool,
    pub include_suggested: bool,
    pub cycles: CycleReport,
}

/// Everything construction produced.
#[derive(Debug, Clone)]
pub struct GraphConstructionResult {
    pub graph: ToolGraph,
    /// True iff no hard errors were recorded.
    pub success: bool,
    pub statistics: ConstructionStatistics,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub metadata: GraphMetadata,
}

/// Result of adding or removing one tool on an already-built graph.
#[derive(Debug, Clone, Default)]
pub struct ToolUpdateResult {
    pub success: bool,
    /// Whether the graph changed.
    pub changed: bool,
    pub edges_created: usize,
    pub edges_removed: usize,
    pub has_cycles: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Diagnostics and counters for one construction or update run.
#[derive(Debug, Default)]
struct BuildContext {
    diagnostics: Diagnostics,
    stats: ConstructionStatistics,
}

/// Builds a [`ToolGraph`] from manifests and keeps the manifest cache for
/// incremental updates.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    options: BuildOptions,
    cache: ManifestCache,
}

impl GraphBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            cache: ManifestCache::new(),
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Manifests that made it into the last built graph.
    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    /// Build a fresh graph, replacing any previously cached manifests.
    pub fn build_from_manifests(&mut self, manifests: &[ToolManifest]) -> GraphConstructionResult {
        let started = Instant::now();
        let mut ctx = BuildContext::default();
        let mut cache = ManifestCache::new();
        let mut graph = ToolGraph::new();

        tracing::debug!("Building graph from {} manifests", manifests.len());

        // Phase 1: validate and cache.
        let mut valid: Vec<Arc<ToolManifest>> = Vec::with_capacity(manifests.len());
        for (position, manifest) in manifests.iter().enumerate() {
            ctx.stats.manifests_processed += 1;
            if !validate_manifest(manifest, position, &self.options, &mut ctx.diagnostics) {
                continue;
            }
            let manifest = Arc::new(manifest.clone());
            cache.insert(Arc::clone(&manifest));
            valid.push(manifest);
        }

        // Phase 2: nodes.
        for manifest in &valid {
            if graph.add_node(ToolNode::new(Arc::clone(manifest))) {
                ctx.stats.nodes_created += 1;
            } else {
                ctx.diagnostics.warn(
                    DiagnosticCode::DuplicateTool,
                    format!("duplicate tool id '{}', later definition ignored", manifest.id),
                    tool_path(&manifest.id),
                );
            }
        }

        // Phase 3: edges, from the first definition of each tool.
        for manifest in cache.iter() {
            link_dependencies(manifest, None, &self.options, &cache, &mut graph, &mut ctx);
        }

        // Phase 4: structure.
        if self.options.validate {
            ctx.diagnostics.extend(graph.validate(&self.options.validation));
        }

        // Phase 5: cycles.
        let cycles = check_cycles(&graph, &mut ctx.diagnostics);

        ctx.stats.construction_time = started.elapsed().max(Duration::from_millis(1));
        let success = !ctx.diagnostics.has_hard_errors();
        tracing::info!(
            "Built graph: {} nodes, {} edges, {} errors, {} warnings",
            graph.node_count(),
            graph.edge_count(),
            ctx.diagnostics.errors.len(),
            ctx.diagnostics.warnings.len()
        );

        self.cache = cache;
        GraphConstructionResult {
            graph,
            success,
            statistics: ctx.stats,
            errors: ctx.diagnostics.errors,
            warnings: ctx.diagnostics.warnings,
            metadata: GraphMetadata {
                target: self.options.target,
                include_optional: self.options.include_optional,
                include_suggested: self.options.include_suggested,
                cycles,
            },
        }
    }

    /// Add one tool to a graph previously built by this builder.
    ///
    /// Applies the same validation and edge filtering as bulk construction,
    /// and links existing tools that were waiting on this one.
    pub fn add_tool_to_graph(&mut self, graph: &mut ToolGraph, manifest: ToolManifest) -> ToolUpdateResult {
        let mut ctx = BuildContext::default();
        let mut result = ToolUpdateResult::default();

        if !validate_manifest(&manifest, self.cache.len(), &self.options, &mut ctx.diagnostics) {
            return finish_update(result, ctx);
        }
        if self.cache.contains(&manifest.id) || graph.contains(&manifest.id) {
            ctx.diagnostics.warn(
                DiagnosticCode::DuplicateTool,
                format!("tool '{}' is already in the graph", manifest.id),
                tool_path(&manifest.id),
            );
            return finish_update(result, ctx);
        }

        let manifest = Arc::new(manifest);
        self.cache.insert(Arc::clone(&manifest));
        if !graph.add_node(ToolNode::new(Arc::clone(&manifest))) {
            ctx.diagnostics.error(
                DiagnosticCode::NodeCreationFailed,
                format!("could not create node for '{}'", manifest.id),
                tool_path(&manifest.id),
            );
            self.cache.remove(&manifest.id);
            return finish_update(result, ctx);
        }
        result.changed = true;

        link_dependencies(&manifest, None, &self.options, &self.cache, graph, &mut ctx);
        let waiting: Vec<Arc<ToolManifest>> = self
            .cache
            .declaring_dependency_on(&manifest.id)
            .filter(|m| graph.contains(&m.id))
            .cloned()
            .collect();
        for dependent in &waiting {
            link_dependencies(dependent, Some(&manifest.id), &self.options, &self.cache, graph, &mut ctx);
        }

        result.edges_created = ctx.stats.edges_created;
        result.has_cycles = check_cycles(graph, &mut ctx.diagnostics).has_cycles;
        finish_update(result, ctx)
    }

    /// Remove one tool and every edge touching it.
    ///
    /// Tools that required it get the same missing-dependency warning a
    /// fresh build would produce.
    pub fn remove_tool_from_graph(&mut self, graph: &mut ToolGraph, id: &str) -> ToolUpdateResult {
        let mut ctx = BuildContext::default();
        let mut result = ToolUpdateResult::default();

        if !graph.contains(id) {
            ctx.diagnostics.warn(
                DiagnosticCode::UnknownTarget,
                format!("tool '{id}' is not in the graph"),
                tool_path(id),
            );
            return finish_update(result, ctx);
        }

        let incoming = graph.dependents_of(id);
        result.edges_removed = graph.dependencies_of(id).len() + incoming.len();
        let options = &self.options;
        let stranded: Vec<String> = incoming
            .into_iter()
            .filter(|e| {
                graph.node(&e.from).is_some_and(|n| {
                    n.manifest.dependencies.iter().any(|d| {
                        d.tool == id
                            && should_include_dependency(d.kind, options)
                            && d.applies_to(options.target.platform)
                    })
                })
            })
            .map(|e| e.from.clone())
            .collect();

        result.changed = graph.remove_node(id);
        self.cache.remove(id);

        for dependent in stranded {
            ctx.diagnostics.warn(
                DiagnosticCode::MissingDependency,
                format!("{dependent} depends on '{id}' which was removed"),
                dependency_path(id),
            );
        }

        result.has_cycles = graph.detect_cycles().has_cycles;
        finish_update(result, ctx)
    }
}

fn finish_update(mut result: ToolUpdateResult, ctx: BuildContext) -> ToolUpdateResult {
    result.success = !ctx.diagnostics.has_hard_errors();
    result.errors = ctx.diagnostics.errors;
    result.warnings = ctx.diagnostics.warnings;
    result
}

/// Check required fields and platform support. Returns whether the manifest is usable.
fn validate_manifest(
    manifest: &ToolManifest,
    position: usize,
    options: &BuildOptions,
    diags: &mut Diagnostics,
) -> bool {
    let missing = manifest.missing_fields();
    if !missing.is_empty() {
        let label = if manifest.id.trim().is_empty() {
            format!("#{position}")
        } else {
            manifest.id.clone()
        };
        diags.error(
            DiagnosticCode::MissingRequiredField,
            format!("manifest {label} is missing required field(s): {}", missing.join(", ")),
            tool_path(&label),
        );
        return false;
    }

    if !manifest.system_requirements.supports(&options.target) {
        diags.warn(
            DiagnosticCode::PlatformIncompatible,
            format!("{} does not support {}", manifest.id, options.target),
            tool_path(&manifest.id),
        );
    }
    true
}

/// Create edges for `manifest`'s declared dependencies, optionally only
/// those pointing at `only_target`.
fn link_dependencies(
    manifest: &ToolManifest,
    only_target: Option<&str>,
    options: &BuildOptions,
    cache: &ManifestCache,
    graph: &mut ToolGraph,
    ctx: &mut BuildContext,
) {
    for dep in &manifest.dependencies {
        if only_target.is_some_and(|t| t != dep.tool) {
            continue;
        }

        if dep.kind == DependencyKind::Conflicts {
            if cache.contains(&dep.tool) {
                ctx.stats.conflicts_detected += 1;
            }
            continue;
        }
        if !should_include_dependency(dep.kind, options) {
            tracing::debug!("Skipping {} dependency {} -> {}", dep.kind, manifest.id, dep.tool);
            continue;
        }
        if !dep.applies_to(options.target.platform) {
            tracing::debug!(
                "Skipping {} -> {}: not applicable on {}",
                manifest.id,
                dep.tool,
                options.target.platform
            );
            continue;
        }
        if dep.tool == manifest.id {
            ctx.diagnostics.warn(
                DiagnosticCode::SelfDependency,
                format!("{} declares a dependency on itself", manifest.id),
                dependency_path(&dep.tool),
            );
            continue;
        }
        if !cache.contains(&dep.tool) {
            ctx.diagnostics.warn(
                DiagnosticCode::MissingDependency,
                format!("{} depends on '{}' which has no manifest", manifest.id, dep.tool),
                dependency_path(&dep.tool),
            );
            continue;
        }
        ctx.stats.dependencies_resolved += 1;

        if let Err(reason) = VersionInterval::from_constraint(&dep.constraint) {
            ctx.diagnostics.warn(
                DiagnosticCode::InvalidVersionConstraint,
                format!("{} -> {}: {reason}; treating as unconstrained", manifest.id, dep.tool),
                dependency_path(&dep.tool),
            );
        }

        let Some(kind) = EdgeKind::from_dependency(dep.kind) else {
            continue;
        };
        if graph.edge(&manifest.id, &dep.tool).is_some() {
            tracing::debug!("Ignoring repeated dependency {} -> {}", manifest.id, dep.tool);
            continue;
        }
        let edge = DependencyEdge::new(manifest.id.clone(), dep.tool.clone(), kind)
            .with_constraint(dep.constraint.clone())
            .with_platforms(dep.platforms.clone());
        if graph.add_edge(edge) {
            ctx.stats.edges_created += 1;
        } else {
            ctx.diagnostics.error(
                DiagnosticCode::EdgeCreationFailed,
                format!("could not create edge {} -> {}", manifest.id, dep.tool),
                dependency_path(&dep.tool),
            );
        }
    }
}

fn check_cycles(graph: &ToolGraph, diags: &mut Diagnostics) -> CycleReport {
    let report = graph.detect_cycles();
    if report.has_cycles {
        let chains: Vec<String> = report
            .cycles
            .iter()
            .map(|cycle| {
                let mut chain = cycle.clone();
                if let Some(first) = cycle.first() {
                    chain.push(first.clone());
                }
                chain.join(" -> ")
            })
            .collect();
        diags.error(
            DiagnosticCode::CircularDependencies,
            format!(
                "{} circular dependency chain(s): {}",
                report.cycle_count,
                chains.join("; ")
            ),
            "tools",
        );
    }
    report
}
