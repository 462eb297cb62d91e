//! Installation order: a topological sequence split into batches whose
//! members can be installed in parallel.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use toolgraph_core::config::{BuildConfig, OrderConfig};
use toolgraph_core::dependency::DependencyKind;
use toolgraph_core::policy::OrderStrategy;

use crate::conflict::{ConflictRecord, ConflictStatus};
use crate::diagnostics::{tool_path, Diagnostic, DiagnosticCode, Diagnostics};
use crate::graph::{DependencyEdge, EdgeKind, ToolGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAlgorithm {
    #[default]
    Topological,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOptions {
    pub algorithm: OrderAlgorithm,
    pub strategy: OrderStrategy,
    pub include_optional: bool,
    pub include_suggested: bool,
    /// Upper bound on extracted batches.
    pub max_iterations: usize,
    pub timeout: Duration,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            algorithm: OrderAlgorithm::Topological,
            strategy: OrderStrategy::Eager,
            include_optional: false,
            include_suggested: false,
            max_iterations: 10_000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl OrderOptions {
    pub fn from_config(build: &BuildConfig, order: &OrderConfig) -> Self {
        Self {
            algorithm: OrderAlgorithm::Topological,
            strategy: order.strategy,
            include_optional: build.include_optional,
            include_suggested: build.include_suggested,
            max_iterations: order.max_iterations,
            timeout: Duration::from_secs(order.timeout_secs),
        }
    }

    /// Whether `edge` constrains the order under these options.
    pub fn includes(&self, edge: &DependencyEdge) -> bool {
        !edge.deferred
            && match edge.kind {
                EdgeKind::Required => true,
                EdgeKind::Optional => self.include_optional,
                EdgeKind::Suggested => self.include_suggested,
            }
    }

    fn includes_kind(&self, kind: DependencyKind) -> bool {
        match kind {
            DependencyKind::Required => true,
            DependencyKind::Optional => self.include_optional,
            DependencyKind::Suggests => self.include_suggested,
            DependencyKind::Conflicts => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationOrder {
    /// Every dependency precedes its dependents.
    pub installation_sequence: Vec<String>,
    /// No two members of a batch share an edge; batches run in sequence.
    pub batches: Vec<Vec<String>>,
    /// Optional or suggested targets left out of the plan.
    pub deferred_dependencies: Vec<String>,
    /// Tools on, or blocked by, a dependency cycle.
    pub circular_dependencies: Vec<String>,
    #[serde(rename = "estimated_secs", serialize_with = "as_secs")]
    pub estimated_time: Duration,
    pub success: bool,
    /// False when an iteration or time limit cut ordering short.
    pub complete: bool,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl InstallationOrder {
    /// Index of the batch containing `id`.
    pub fn batch_of(&self, id: &str) -> Option<usize> {
        self.batches.iter().position(|b| b.iter().any(|t| t == id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.installation_sequence.iter().any(|t| t == id)
    }
}

/// Derives [`InstallationOrder`]s with Kahn's algorithm.
pub struct InstallationOrderResolver;

impl InstallationOrderResolver {
    /// Order the tools reachable from `targets`; an empty list means every tool.
    pub fn resolve(graph: &ToolGraph, targets: &[&str], options: &OrderOptions) -> InstallationOrder {
        Self::resolve_with_conflicts(graph, targets, options, &[])
    }

    /// Like [`resolve`](Self::resolve), but the conflict-aware strategy
    /// isolates every tool touched by a conflict that is not resolved.
    pub fn resolve_with_conflicts(
        graph: &ToolGraph,
        targets: &[&str],
        options: &OrderOptions,
        conflicts: &[ConflictRecord],
    ) -> InstallationOrder {
        let started = Instant::now();
        let mut diags = Diagnostics::new();
        let mut complete = true;

        let mut roots: BTreeSet<&str> = BTreeSet::new();
        if targets.is_empty() {
            roots.extend(graph.node_ids());
        }
        for target in targets {
            if graph.contains(target) {
                roots.insert(*target);
            } else {
                diags.error(
                    DiagnosticCode::UnknownTarget,
                    format!("unknown target '{target}'"),
                    tool_path(target),
                );
            }
        }

        let reachable = graph.reachable_from(roots.iter().copied(), |e| options.includes(e));
        let deferred = deferred_targets(graph, &reachable, options);

        // prerequisites[n] = included dependencies of n not yet installed.
        let mut prerequisites: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for id in &reachable {
            let deps: Vec<&DependencyEdge> = graph
                .dependencies_of(id)
                .into_iter()
                .filter(|e| options.includes(e) && reachable.contains(&e.to))
                .collect();
            prerequisites.insert(id.as_str(), deps.len());
            for edge in deps {
                dependents.entry(edge.to.as_str()).or_default().push(id.as_str());
            }
        }

        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        loop {
            let ready: Vec<&str> = reachable
                .iter()
                .map(String::as_str)
                .filter(|id| !placed.contains(id) && prerequisites.get(id) == Some(&0))
                .collect();
            if ready.is_empty() {
                break;
            }
            if levels.len() >= options.max_iterations {
                diags.error(
                    DiagnosticCode::MaxIterationsExceeded,
                    format!("stopped after {} batches", options.max_iterations),
                    "order",
                );
                complete = false;
                break;
            }
            if started.elapsed() > options.timeout {
                diags.error(
                    DiagnosticCode::Timeout,
                    format!("ordering exceeded {}s", options.timeout.as_secs()),
                    "order",
                );
                complete = false;
                break;
            }
            for id in &ready {
                placed.insert(*id);
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = prerequisites.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            levels.push(ready.into_iter().map(String::from).collect());
        }

        let mut circular = Vec::new();
        if complete {
            let stuck: BTreeSet<&str> = reachable
                .iter()
                .map(String::as_str)
                .filter(|id| !placed.contains(id))
                .collect();
            if !stuck.is_empty() {
                let (cyclic, blocked): (Vec<&str>, Vec<&str>) = stuck
                    .iter()
                    .copied()
                    .partition(|id| on_cycle(graph, id, &stuck, options));
                diags.error(
                    DiagnosticCode::CircularDependencies,
                    format!("cannot order circular dependencies: {}", cyclic.join(", ")),
                    "tools",
                );
                for id in &blocked {
                    diags.warn(
                        DiagnosticCode::BlockedByCycle,
                        format!("{id} depends on a circular dependency"),
                        tool_path(id),
                    );
                }
                circular = stuck.into_iter().map(String::from).collect();
            }
        }

        let batches = match options.strategy {
            OrderStrategy::Eager => levels,
            OrderStrategy::Lazy => as_late_as_possible(graph, levels, options),
            OrderStrategy::ConflictAware => isolate_conflicts(levels, conflicts),
        };
        let installation_sequence: Vec<String> = batches.iter().flatten().cloned().collect();
        let estimated_time = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(|id| graph.node(id))
                    .map(|n| n.manifest.install_secs())
                    .max()
                    .unwrap_or(0)
            })
            .sum();

        tracing::info!(
            "Ordered {} tools in {} batches ({} deferred, {} circular)",
            installation_sequence.len(),
            batches.len(),
            deferred.len(),
            circular.len()
        );

        InstallationOrder {
            installation_sequence,
            batches,
            deferred_dependencies: deferred,
            circular_dependencies: circular,
            estimated_time: Duration::from_secs(estimated_time),
            success: diags.errors.is_empty(),
            complete,
            warnings: diags.warnings,
            errors: diags.errors,
        }
    }
}

/// Tools that reachable tools depend on through excluded or deferred
/// dependencies, and that nothing pulls into the plan.
fn deferred_targets(graph: &ToolGraph, reachable: &BTreeSet<String>, options: &OrderOptions) -> Vec<String> {
    let mut deferred = BTreeSet::new();
    for id in reachable {
        for edge in graph.dependencies_of(id) {
            if !options.includes(edge) {
                deferred.insert(edge.to.clone());
            }
        }
        if let Some(node) = graph.node(id) {
            for dep in &node.manifest.dependencies {
                if dep.kind != DependencyKind::Conflicts
                    && !options.includes_kind(dep.kind)
                    && graph.contains(&dep.tool)
                {
                    deferred.insert(dep.tool.clone());
                }
            }
        }
    }
    deferred.into_iter().filter(|id| !reachable.contains(id)).collect()
}

/// Whether `id` can reach itself through included edges among `stuck` tools.
fn on_cycle(graph: &ToolGraph, id: &str, stuck: &BTreeSet<&str>, options: &OrderOptions) -> bool {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        for edge in graph.dependencies_of(current) {
            if !options.includes(edge) || !stuck.contains(edge.to.as_str()) {
                continue;
            }
            if edge.to == id {
                return true;
            }
            if let Some(&next) = stuck.get(edge.to.as_str()) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
    }
    false
}

/// Move every tool to the latest batch its dependents allow.
fn as_late_as_possible(graph: &ToolGraph, levels: Vec<Vec<String>>, options: &OrderOptions) -> Vec<Vec<String>> {
    if levels.is_empty() {
        return levels;
    }
    let placed: BTreeSet<&str> = levels.iter().flatten().map(String::as_str).collect();
    // height[n] = longest chain of dependents above n.
    let mut height: HashMap<&str, usize> = HashMap::new();
    for level in levels.iter().rev() {
        for id in level {
            let h = graph
                .dependents_of(id)
                .into_iter()
                .filter(|e| options.includes(e) && placed.contains(e.from.as_str()))
                .filter_map(|e| height.get(e.from.as_str()).map(|h| h + 1))
                .max()
                .unwrap_or(0);
            height.insert(id.as_str(), h);
        }
    }
    let top = height.values().copied().max().unwrap_or(0);
    let mut batches: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (id, h) in &height {
        batches.entry(top - h).or_default().push(id.to_string());
    }
    batches
        .into_values()
        .map(|mut batch| {
            batch.sort();
            batch
        })
        .collect()
}

/// Split tools touched by unresolved conflicts into singleton batches.
fn isolate_conflicts(levels: Vec<Vec<String>>, conflicts: &[ConflictRecord]) -> Vec<Vec<String>> {
    let open: Vec<&ConflictRecord> = conflicts
        .iter()
        .filter(|c| c.status != ConflictStatus::Resolved)
        .collect();
    let mut batches = Vec::new();
    for level in levels {
        let (isolated, rest): (Vec<String>, Vec<String>) = level
            .into_iter()
            .partition(|id| open.iter().any(|c| c.involves(id)));
        if !rest.is_empty() {
            batches.push(rest);
        }
        batches.extend(isolated.into_iter().map(|id| vec![id]));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ToolNode;
    use std::sync::Arc;
    use toolgraph_core::manifest::ToolManifest;

    fn graph(ids: &[&str], edges: &[(&str, &str, EdgeKind)]) -> ToolGraph {
        let mut g = ToolGraph::new();
        for id in ids {
            g.add_node(ToolNode::new(Arc::new(ToolManifest::new(*id, *id, "cli"))));
        }
        for (from, to, kind) in edges {
            g.add_edge(DependencyEdge::new(*from, *to, *kind));
        }
        g
    }

    #[test]
    fn diamond_batches() {
        use EdgeKind::Required as R;
        let g = graph(
            &["app", "a", "b", "base"],
            &[("app", "a", R), ("app", "b", R), ("a", "base", R), ("b", "base", R)],
        );
        let order = InstallationOrderResolver::resolve(&g, &["app"], &OrderOptions::default());
        assert!(order.success);
        assert_eq!(
            order.batches,
            vec![vec!["base"], vec!["a", "b"], vec!["app"]]
        );
        assert_eq!(order.installation_sequence, vec!["base", "a", "b", "app"]);
        assert_eq!(order.estimated_time, Duration::from_secs(90));
    }

    #[test]
    fn lazy_moves_leaves_late() {
        use EdgeKind::Required as R;
        let g = graph(
            &["app", "mid", "base", "tool"],
            &[("app", "mid", R), ("mid", "base", R), ("app", "tool", R)],
        );
        let eager = InstallationOrderResolver::resolve(&g, &[], &OrderOptions::default());
        assert_eq!(eager.batches[0], vec!["base", "tool"]);

        let lazy = InstallationOrderResolver::resolve(
            &g,
            &[],
            &OrderOptions {
                strategy: OrderStrategy::Lazy,
                ..Default::default()
            },
        );
        assert_eq!(
            lazy.batches,
            vec![vec!["base"], vec!["mid", "tool"], vec!["app"]]
        );
    }

    #[test]
    fn conflict_aware_isolates() {
        let g = graph(&["a", "b", "c"], &[]);
        let conflict = ConflictRecord {
            tools: vec!["b".into()],
            subject: "b".into(),
            kind: crate::conflict::ConflictKind::Declared,
            status: ConflictStatus::Unresolved,
            message: String::new(),
        };
        let order = InstallationOrderResolver::resolve_with_conflicts(
            &g,
            &[],
            &OrderOptions {
                strategy: OrderStrategy::ConflictAware,
                ..Default::default()
            },
            &[conflict],
        );
        assert_eq!(order.batches, vec![vec!["a", "c"], vec!["b"]]);
    }

    #[test]
    fn blocked_by_cycle() {
        use EdgeKind::Required as R;
        let g = graph(
            &["app", "x", "y"],
            &[("app", "x", R), ("x", "y", R), ("y", "x", R)],
        );
        let order = InstallationOrderResolver::resolve(&g, &["app"], &OrderOptions::default());
        assert!(order.installation_sequence.is_empty());
        assert_eq!(order.circular_dependencies, vec!["app", "x", "y"]);
        assert_eq!(order.warnings.len(), 1);
        assert_eq!(order.warnings[0].code, DiagnosticCode::BlockedByCycle);
        assert!(!order.success);
        assert!(order.complete);
    }

    #[test]
    fn iteration_limit_gives_partial_result() {
        use EdgeKind::Required as R;
        let g = graph(&["a", "b", "c"], &[("a", "b", R), ("b", "c", R)]);
        let order = InstallationOrderResolver::resolve(
            &g,
            &["a"],
            &OrderOptions {
                max_iterations: 2,
                ..Default::default()
            },
        );
        assert_eq!(order.batches, vec![vec!["c"], vec!["b"]]);
        assert!(!order.complete);
        assert!(!order.success);
        assert_eq!(order.errors[0].code, DiagnosticCode::MaxIterationsExceeded);
        assert!(order.circular_dependencies.is_empty());
    }

    #[test]
    fn unknown_target_is_reported() {
        let g = graph(&["a"], &[]);
        let order = InstallationOrderResolver::resolve(&g, &["a", "nope"], &OrderOptions::default());
        assert_eq!(order.installation_sequence, vec!["a"]);
        assert!(!order.success);
        assert_eq!(order.errors[0].code, DiagnosticCode::UnknownTarget);
    }

    #[test]
    fn deferred_edges_are_ignored() {
        let mut g = graph(&["a", "b"], &[("a", "b", EdgeKind::Optional)]);
        let opts = OrderOptions {
            include_optional: true,
            ..Default::default()
        };
        let order = InstallationOrderResolver::resolve(&g, &["a"], &opts);
        assert_eq!(order.installation_sequence, vec!["b", "a"]);

        g.edge_mut("a", "b").unwrap().deferred = true;
        let order = InstallationOrderResolver::resolve(&g, &["a"], &opts);
        assert_eq!(order.installation_sequence, vec!["a"]);
        assert_eq!(order.deferred_dependencies, vec!["b"]);
    }
}
