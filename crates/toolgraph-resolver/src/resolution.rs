//! Policy-driven conflict resolution on a working copy of the graph.
//!
//! Each conflict is attempted with the allowed actions in a fixed order:
//! defer soft edges, substitute a version or provider, configure a platform
//! workaround. Whatever none of them settles is handed back as a remaining
//! conflict for the caller to decide on.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use semver::Version;
use serde::Serialize;
use toolgraph_core::platform::TargetPlatform;
use toolgraph_core::policy::{ResolutionAction, ResolutionPolicy, VersioningPolicy};

use crate::conflict::{
    declared_incompatible, relevant_tools, ConflictDetectionResult, ConflictKind, ConflictRecord, ConflictStatus,
};
use crate::diagnostics::{tool_path, Diagnostic, DiagnosticCode, Diagnostics};
use crate::graph::{DependencyEdge, ToolGraph};
use crate::lookup::PackageLookup;
use crate::order::{InstallationOrder, InstallationOrderResolver, OrderOptions};
use crate::version::{parse_version, VersionInterval};

/// One action the resolver applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionStep {
    pub action: ResolutionAction,
    /// Tools the action changed.
    pub tools: Vec<String>,
    pub description: String,
    /// False when the user has to confirm or carry out the step.
    pub automated: bool,
}

impl fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            ResolutionAction::Defer => "defer",
            ResolutionAction::Substitute => "substitute",
            ResolutionAction::Configure => "configure",
        };
        write!(f, "{action}: {}", self.description)?;
        if !self.automated {
            f.write_str(" (needs confirmation)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStatistics {
    pub conflicts_resolved: usize,
    pub steps_executed: usize,
    #[serde(skip)]
    pub execution_time: Duration,
    pub interactive_steps: usize,
    pub automated_steps: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub impact: Impact,
    /// False once a tool has been dropped from the graph.
    pub reversible: bool,
    pub side_effects: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ResolutionExecutionResult {
    pub modified_graph: ToolGraph,
    /// Recomputed order, present when any step was applied.
    pub updated_installation_order: Option<InstallationOrder>,
    pub applied_steps: Vec<ResolutionStep>,
    pub remaining_conflicts: Vec<ConflictRecord>,
    pub statistics: ResolutionStatistics,
    pub summary: ResolutionSummary,
    /// False when the step budget ran out before every conflict was tried.
    pub complete: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ResolutionExecutionResult {
    pub fn is_fully_resolved(&self) -> bool {
        self.remaining_conflicts.is_empty()
    }
}

/// State for one resolution run.
struct Run<'a> {
    graph: ToolGraph,
    targets: &'a [&'a str],
    extra_versions: &'a HashMap<String, Vec<String>>,
    steps: Vec<ResolutionStep>,
    side_effects: Vec<String>,
    removed: usize,
    impact: Impact,
}

impl Run<'_> {
    fn is_target(&self, id: &str) -> bool {
        self.targets.contains(&id)
    }

    fn record(&mut self, step: ResolutionStep, impact: Impact) {
        tracing::debug!("Resolution step: {step}");
        self.impact = self.impact.max(impact);
        self.steps.push(step);
    }

    fn defer_edges(&mut self, edges: &[(String, String)]) {
        for (from, to) in edges {
            if let Some(edge) = self.graph.edge_mut(from, to) {
                edge.deferred = true;
                self.side_effects.push(format!("deferred {from} -> {to}"));
            }
        }
    }

    /// Point every dependent of `from` at `to` instead, then drop `from` if
    /// nothing needs it and it was not asked for.
    fn rewire(&mut self, from: &str, to: &str) {
        let incoming: Vec<DependencyEdge> = self.graph.dependents_of(from).into_iter().cloned().collect();
        for edge in incoming {
            self.graph.remove_edge(&edge.from, from);
            if edge.from != to && self.graph.edge(&edge.from, to).is_none() {
                let replacement = DependencyEdge::new(edge.from.clone(), to, edge.kind).with_platforms(edge.platforms);
                self.graph.add_edge(replacement);
            }
            self.side_effects.push(format!("{} now uses {to} instead of {from}", edge.from));
        }
        if !self.is_target(from) && self.graph.dependents_of(from).is_empty() && self.graph.remove_node(from) {
            self.removed += 1;
            self.side_effects.push(format!("removed {from} from the plan"));
        }
    }
}

/// Applies a [`ResolutionPolicy`] to detected conflicts.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    policy: ResolutionPolicy,
    target: TargetPlatform,
    order: OrderOptions,
}

impl ConflictResolver {
    pub fn new(policy: ResolutionPolicy, target: TargetPlatform) -> Self {
        Self {
            policy,
            target,
            order: OrderOptions::default(),
        }
    }

    /// Options used to recompute the installation order after changes.
    pub fn with_order_options(mut self, order: OrderOptions) -> Self {
        self.order = order;
        self
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Resolve using only the versions manifests declare.
    pub fn execute(
        &self,
        graph: &ToolGraph,
        detection: &ConflictDetectionResult,
        targets: &[&str],
    ) -> ResolutionExecutionResult {
        self.run(graph, detection, targets, &HashMap::new(), Diagnostics::new())
    }

    /// Resolve with extra versions from `lookup`, queried once per contended
    /// tool, one at a time, before any step is applied.
    pub async fn execute_with_lookup<L: PackageLookup>(
        &self,
        graph: &ToolGraph,
        detection: &ConflictDetectionResult,
        targets: &[&str],
        lookup: &L,
    ) -> ResolutionExecutionResult {
        let mut extra: HashMap<String, Vec<String>> = HashMap::new();
        let mut diags = Diagnostics::new();
        let may_substitute = self.policy.allows(ResolutionAction::Substitute);

        for conflict in &detection.conflicts {
            if !may_substitute || !matches!(conflict.kind, ConflictKind::VersionRange { .. }) {
                continue;
            }
            if extra.contains_key(&conflict.subject) {
                continue;
            }
            let Some(node) = graph.node(&conflict.subject) else {
                continue;
            };
            match lookup.available_versions(&node.manifest).await {
                Ok(versions) => {
                    tracing::debug!("Lookup found {} versions of {}", versions.len(), node.id);
                    extra.insert(conflict.subject.clone(), versions);
                }
                Err(e) => {
                    diags.warn(
                        DiagnosticCode::LookupFailed,
                        format!("version lookup for {} failed: {e}", node.id),
                        tool_path(&node.id),
                    );
                    extra.insert(conflict.subject.clone(), Vec::new());
                }
            }
        }

        self.run(graph, detection, targets, &extra, diags)
    }

    fn run(
        &self,
        graph: &ToolGraph,
        detection: &ConflictDetectionResult,
        targets: &[&str],
        extra_versions: &HashMap<String, Vec<String>>,
        mut diags: Diagnostics,
    ) -> ResolutionExecutionResult {
        let started = Instant::now();

        if detection.conflicts.is_empty() {
            return ResolutionExecutionResult {
                modified_graph: graph.clone(),
                updated_installation_order: None,
                applied_steps: Vec::new(),
                remaining_conflicts: Vec::new(),
                statistics: ResolutionStatistics {
                    execution_time: started.elapsed(),
                    ..Default::default()
                },
                summary: ResolutionSummary {
                    impact: Impact::Low,
                    reversible: true,
                    side_effects: Vec::new(),
                    message: "No conflicts to resolve".to_string(),
                },
                complete: true,
                errors: diags.errors,
                warnings: diags.warnings,
            };
        }

        let mut run = Run {
            graph: graph.clone(),
            targets,
            extra_versions,
            steps: Vec::new(),
            side_effects: Vec::new(),
            removed: 0,
            impact: Impact::Low,
        };
        let mut remaining = Vec::new();
        let mut resolved = 0;
        let mut complete = true;

        for conflict in &detection.conflicts {
            let mut conflict = conflict.clone();

            if !still_applies(&run.graph, &conflict, targets) {
                tracing::debug!("Conflict settled by an earlier step: {}", conflict.message);
                conflict.status = ConflictStatus::Resolved;
                resolved += 1;
                continue;
            }

            if run.steps.len() >= self.policy.automatic.max_steps {
                if complete {
                    diags.error(
                        DiagnosticCode::MaxStepsExceeded,
                        format!(
                            "step budget of {} exhausted with conflicts left",
                            self.policy.automatic.max_steps
                        ),
                        "resolution",
                    );
                    complete = false;
                }
                conflict.status = ConflictStatus::Unresolved;
                remaining.push(conflict);
                continue;
            }

            let settled = self.policy.automatic.enabled
                && (self.try_defer(&mut run, &conflict)
                    || self.try_substitute(&mut run, &conflict)
                    || self.try_configure(&mut run, &conflict));

            conflict.status = if settled {
                resolved += 1;
                ConflictStatus::Resolved
            } else {
                ConflictStatus::Unresolved
            };
            mark_edges(&mut run.graph, &conflict);
            if !settled {
                remaining.push(conflict);
            }
        }

        let interactive = run.steps.iter().filter(|s| !s.automated).count();
        let statistics = ResolutionStatistics {
            conflicts_resolved: resolved,
            steps_executed: run.steps.len(),
            execution_time: started.elapsed(),
            interactive_steps: interactive,
            automated_steps: run.steps.len() - interactive,
        };

        let updated_installation_order = (!run.steps.is_empty()).then(|| {
            InstallationOrderResolver::resolve_with_conflicts(&run.graph, targets, &self.order, &remaining)
        });

        let message = format!(
            "Resolved {resolved} of {} conflicts in {} steps",
            detection.conflicts.len(),
            statistics.steps_executed
        );
        tracing::info!("{message}");

        ResolutionExecutionResult {
            modified_graph: run.graph,
            updated_installation_order,
            applied_steps: run.steps,
            remaining_conflicts: remaining,
            statistics,
            summary: ResolutionSummary {
                impact: run.impact,
                reversible: run.removed == 0,
                side_effects: run.side_effects,
                message,
            },
            complete,
            errors: diags.errors,
            warnings: diags.warnings,
        }
    }

    /// Defer the soft edges that pull a contending tool into the plan.
    fn try_defer(&self, run: &mut Run<'_>, conflict: &ConflictRecord) -> bool {
        if !self.policy.allows(ResolutionAction::Defer) {
            return false;
        }

        // A soft requirement on the contended version loses first.
        if let ConflictKind::VersionRange { requirements } = &conflict.kind {
            let soft = requirements.iter().find_map(|r| {
                run.graph
                    .edge(&r.dependent, &conflict.subject)
                    .filter(|e| e.kind.is_soft() && !e.deferred)
                    .map(|e| (e.from.clone(), e.to.clone()))
            });
            if let Some(edge) = soft {
                let description = format!("drop optional requirement {} -> {}", edge.0, edge.1);
                run.defer_edges(std::slice::from_ref(&edge));
                run.record(
                    ResolutionStep {
                        action: ResolutionAction::Defer,
                        tools: vec![edge.0, edge.1],
                        description,
                        automated: true,
                    },
                    Impact::Low,
                );
                return true;
            }
        }

        if run.targets.is_empty() {
            return false;
        }
        let hard_reach = run
            .graph
            .reachable_from(run.targets.iter().copied(), |e| !e.deferred && !e.kind.is_soft());

        let mut candidates: Vec<&str> = conflict.tools.iter().map(String::as_str).collect();
        if matches!(conflict.kind, ConflictKind::VersionRange { .. }) {
            candidates.push(&conflict.subject);
        }

        for candidate in candidates {
            if run.is_target(candidate) || hard_reach.contains(candidate) {
                continue;
            }
            let cut = soft_frontier(&run.graph, &hard_reach, candidate);
            if cut.is_empty() {
                continue;
            }
            let description = format!(
                "defer {candidate} by skipping {}",
                cut.iter().map(|(f, t)| format!("{f} -> {t}")).collect::<Vec<_>>().join(", ")
            );
            run.defer_edges(&cut);
            run.record(
                ResolutionStep {
                    action: ResolutionAction::Defer,
                    tools: vec![candidate.to_string()],
                    description,
                    automated: true,
                },
                Impact::Low,
            );
            return true;
        }
        false
    }

    fn try_substitute(&self, run: &mut Run<'_>, conflict: &ConflictRecord) -> bool {
        if !self.policy.allows(ResolutionAction::Substitute) {
            return false;
        }
        match &conflict.kind {
            ConflictKind::VersionRange { .. } => self.substitute_version(run, conflict),
            ConflictKind::DuplicateProvider { capability } => self.substitute_provider(run, conflict, capability),
            ConflictKind::PlatformIncompatible { .. } | ConflictKind::Declared => {
                self.policy.platform.use_alternatives && self.substitute_alternative(run, conflict)
            }
        }
    }

    fn substitute_version(&self, run: &mut Run<'_>, conflict: &ConflictRecord) -> bool {
        let ConflictKind::VersionRange { requirements } = &conflict.kind else {
            return false;
        };
        let intervals: Vec<VersionInterval> = requirements
            .iter()
            .filter_map(|r| VersionInterval::from_constraint(&r.constraint).ok())
            .collect();
        let [left, right] = intervals.as_slice() else {
            return false;
        };
        let Some(node) = run.graph.node(&conflict.subject) else {
            return false;
        };
        let versioning = &self.policy.versioning;
        let settles_pair = |v: &Version| {
            (left.contains(v) && bridges(right, v, versioning)) || (right.contains(v) && bridges(left, v, versioning))
        };

        // An earlier substitution stands; it either covers this pair too or the pair stays open.
        if let Some(ref current) = node.versions.selected {
            let settled = parse_version(current).is_some_and(|v| settles_pair(&v));
            if settled {
                tracing::debug!("{} {current} already settles: {}", conflict.subject, conflict.message);
            }
            return settled;
        }

        let reachable = relevant_tools(&run.graph, run.targets);
        let every_constraint: Vec<VersionInterval> = run
            .graph
            .dependents_of(&conflict.subject)
            .into_iter()
            .filter(|e| !e.deferred && reachable.contains(&e.from))
            .filter_map(|e| VersionInterval::from_constraint(&e.constraint).ok())
            .collect();

        let mut candidates: Vec<Version> = node
            .versions
            .available
            .iter()
            .chain(run.extra_versions.get(&conflict.subject).into_iter().flatten())
            .filter_map(|v| parse_version(v))
            .filter(|v| settles_pair(v) && every_constraint.iter().all(|i| bridges(i, v, versioning)))
            .collect();
        candidates.sort();
        candidates.dedup();
        let chosen = if self.policy.versioning.prefer_latest {
            candidates.pop()
        } else {
            candidates.into_iter().next()
        };
        let Some(version) = chosen else {
            return false;
        };

        let selected = version.to_string();
        let pinned = self.policy.versioning.pinning.pin(&selected);
        if let Some(node) = run.graph.node_mut(&conflict.subject) {
            node.versions.selected = Some(selected.clone());
            node.versions.pinned = Some(pinned.clone());
        }
        run.side_effects
            .push(format!("{} pinned to {pinned}", conflict.subject));
        run.record(
            ResolutionStep {
                action: ResolutionAction::Substitute,
                tools: vec![conflict.subject.clone()],
                description: format!("install {} {selected} ({pinned})", conflict.subject),
                automated: false,
            },
            Impact::Medium,
        );
        true
    }

    fn substitute_provider(&self, run: &mut Run<'_>, conflict: &ConflictRecord, capability: &str) -> bool {
        let providers: Vec<&str> = conflict
            .tools
            .iter()
            .map(String::as_str)
            .filter(|t| run.graph.contains(t))
            .collect();
        if providers.iter().filter(|p| run.is_target(p)).count() > 1 {
            return false;
        }
        let Some(&winner) = providers.iter().min_by_key(|p| {
            (
                !run.is_target(p),
                std::cmp::Reverse(run.graph.dependents_of(p).len()),
                **p,
            )
        }) else {
            return false;
        };

        let losers: Vec<String> = providers
            .iter()
            .filter(|p| **p != winner)
            .map(|p| p.to_string())
            .collect();
        if losers.iter().any(|l| would_cycle(&run.graph, l, winner)) {
            return false;
        }

        let winner = winner.to_string();
        for loser in &losers {
            run.rewire(loser, &winner);
        }
        let mut tools = losers.clone();
        tools.push(winner.clone());
        run.record(
            ResolutionStep {
                action: ResolutionAction::Substitute,
                tools,
                description: format!("use {winner} for '{capability}' instead of {}", losers.join(", ")),
                automated: true,
            },
            Impact::High,
        );
        true
    }

    fn substitute_alternative(&self, run: &mut Run<'_>, conflict: &ConflictRecord) -> bool {
        let reachable = relevant_tools(&run.graph, run.targets);
        for offender in &conflict.tools {
            if run.is_target(offender) {
                continue;
            }
            let Some(node) = run.graph.node(offender) else {
                continue;
            };
            let alternative = node.manifest.alternatives.iter().find(|alt| {
                *alt != offender
                    && run.graph.node(alt).is_some_and(|n| n.versions.requirements.supports(&self.target))
                    && !conflict.tools.contains(alt)
                    && !reachable.iter().any(|r| r != offender && declared_incompatible(&run.graph, alt, r))
                    && !would_cycle(&run.graph, offender, alt)
            });
            let Some(alternative) = alternative.cloned() else {
                continue;
            };

            let offender = offender.clone();
            run.rewire(&offender, &alternative);
            run.record(
                ResolutionStep {
                    action: ResolutionAction::Substitute,
                    tools: vec![offender.clone(), alternative.clone()],
                    description: format!("replace {offender} with {alternative}"),
                    automated: true,
                },
                Impact::High,
            );
            return true;
        }
        false
    }

    fn try_configure(&self, run: &mut Run<'_>, conflict: &ConflictRecord) -> bool {
        let ConflictKind::PlatformIncompatible { .. } = conflict.kind else {
            return false;
        };
        if !self.policy.allows(ResolutionAction::Configure) || !self.policy.platform.allow_workarounds {
            return false;
        }
        run.side_effects
            .push(format!("{} needs a manual workaround on {}", conflict.subject, self.target));
        run.record(
            ResolutionStep {
                action: ResolutionAction::Configure,
                tools: vec![conflict.subject.clone()],
                description: format!("install {} on {} through a workaround", conflict.subject, self.target),
                automated: false,
            },
            Impact::Medium,
        );
        true
    }
}

/// Whether `interval` can be stretched to admit `v` under the versioning policy.
fn bridges(interval: &VersionInterval, v: &Version, policy: &VersioningPolicy) -> bool {
    if interval.is_below(v) {
        return policy.allow_downgrades;
    }
    if let Some(ref upper) = interval.upper {
        if interval.is_above(v) {
            // `<2.0.0` caps major 1; `<=1.4` and `<1.4.0` cap major 1 too.
            let capped_major = if !upper.inclusive && upper.version.minor == 0 && upper.version.patch == 0 {
                upper.version.major.saturating_sub(1)
            } else {
                upper.version.major
            };
            return v.major == capped_major || policy.allow_major_upgrades;
        }
    }
    true
}

/// Whether the conflict's tools are all still in play.
fn still_applies(graph: &ToolGraph, conflict: &ConflictRecord, targets: &[&str]) -> bool {
    let reachable = relevant_tools(graph, targets);
    match &conflict.kind {
        ConflictKind::VersionRange { requirements } => requirements.iter().all(|r| {
            reachable.contains(&r.dependent)
                && graph
                    .edge(&r.dependent, &conflict.subject)
                    .is_some_and(|e| !e.deferred)
        }),
        ConflictKind::DuplicateProvider { .. } => {
            conflict.tools.iter().filter(|t| reachable.contains(*t)).count() > 1
        }
        ConflictKind::PlatformIncompatible { .. } | ConflictKind::Declared => {
            conflict.tools.iter().all(|t| reachable.contains(t))
        }
    }
}

/// Soft edges leaving the hard-reachable set that lead towards `tool`.
fn soft_frontier(graph: &ToolGraph, hard_reach: &BTreeSet<String>, tool: &str) -> Vec<(String, String)> {
    let mut cut = Vec::new();
    for from in hard_reach {
        for edge in graph.dependencies_of(from) {
            if edge.deferred || !edge.kind.is_soft() || hard_reach.contains(&edge.to) {
                continue;
            }
            if edge.to == tool || graph.reachable_from([edge.to.as_str()], |e| !e.deferred).contains(tool) {
                cut.push((edge.from.clone(), edge.to.clone()));
            }
        }
    }
    cut
}

/// Whether pointing `from`'s dependents at `to` would close a cycle.
fn would_cycle(graph: &ToolGraph, from: &str, to: &str) -> bool {
    let below_to = graph.reachable_from([to], |_| true);
    graph
        .dependents_of(from)
        .iter()
        .any(|e| e.from != to && below_to.contains(&e.from))
}

/// Record the outcome on the edges carrying a version conflict.
fn mark_edges(graph: &mut ToolGraph, conflict: &ConflictRecord) {
    let ConflictKind::VersionRange { requirements } = &conflict.kind else {
        return;
    };
    for r in requirements {
        if let Some(edge) = graph.edge_mut(&r.dependent, &conflict.subject) {
            edge.resolution.attempts += 1;
            edge.resolution.last_result = Some(conflict.status.to_string());
            edge.resolution.conflict = Some(conflict.status);
        }
    }
}
