//! Dependency graph storage, traversal, cycle detection, and structural validation.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use toolgraph_core::dependency::{DependencyKind, VersionConstraint};
use toolgraph_core::manifest::ToolManifest;
use toolgraph_core::platform::{Platform, SystemRequirements};

use crate::conflict::ConflictStatus;
use crate::diagnostics::{dependency_path, tool_path, DiagnosticCode, Diagnostics};

/// Relationship carried by an edge. Declared incompatibilities never become edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Required,
    Optional,
    Suggested,
}

impl EdgeKind {
    pub fn from_dependency(kind: DependencyKind) -> Option<Self> {
        match kind {
            DependencyKind::Required => Some(EdgeKind::Required),
            DependencyKind::Optional => Some(EdgeKind::Optional),
            DependencyKind::Suggests => Some(EdgeKind::Suggested),
            DependencyKind::Conflicts => None,
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            EdgeKind::Required => DependencyKind::Required.priority(),
            EdgeKind::Optional => DependencyKind::Optional.priority(),
            EdgeKind::Suggested => DependencyKind::Suggests.priority(),
        }
    }

    /// `priority / 100`: required 1.0, optional 0.5, suggested 0.25.
    pub fn weight(&self) -> f64 {
        f64::from(self.priority()) / 100.0
    }

    /// Optional and suggested edges may be deferred out of a plan.
    pub fn is_soft(&self) -> bool {
        !matches!(self, EdgeKind::Required)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EdgeKind::Required => "required",
            EdgeKind::Optional => "optional",
            EdgeKind::Suggested => "suggested",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStatus {
    #[default]
    NotInstalled,
    Installed,
    Outdated,
    Failed,
}

/// Per-node traversal colour used by cycle detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisitState {
    #[default]
    Unvisited,
    InProgress,
    Done,
}

/// Versions a tool can be installed at and where it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCompatibility {
    pub available: Vec<String>,
    pub requirements: SystemRequirements,
    /// Version chosen by conflict resolution, if any.
    pub selected: Option<String>,
    /// Requirement the installer should honour for `selected`.
    pub pinned: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphPosition {
    pub dependency_count: usize,
    pub dependent_count: usize,
}

/// A tool in the graph.
#[derive(Debug, Clone)]
pub struct ToolNode {
    pub id: String,
    pub manifest: Arc<ToolManifest>,
    pub status: InstallStatus,
    pub versions: VersionCompatibility,
    pub position: GraphPosition,
}

impl ToolNode {
    pub fn new(manifest: Arc<ToolManifest>) -> Self {
        Self {
            id: manifest.id.clone(),
            versions: VersionCompatibility {
                available: manifest.versions.clone(),
                requirements: manifest.system_requirements.clone(),
                selected: None,
                pinned: None,
            },
            manifest,
            status: InstallStatus::default(),
            position: GraphPosition::default(),
        }
    }
}

impl fmt::Display for ToolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.versions.selected {
            Some(ref v) => write!(f, "{} v{v}", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Bookkeeping the conflict resolver leaves on an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeResolution {
    pub attempts: u32,
    pub last_result: Option<String>,
    pub conflict: Option<ConflictStatus>,
}

/// A directed edge from a dependent tool to its prerequisite.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub weight: f64,
    pub platforms: Vec<Platform>,
    pub constraint: VersionConstraint,
    /// Excluded from installation ordering by conflict resolution.
    pub deferred: bool,
    pub resolution: EdgeResolution,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            weight: kind.weight(),
            platforms: Vec::new(),
            constraint: VersionConstraint::default(),
            deferred: false,
            resolution: EdgeResolution::default(),
        }
    }

    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn applies_to(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }
}

/// Outcome of [`ToolGraph::detect_cycles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub has_cycles: bool,
    pub cycle_count: usize,
    /// Tool ids of each distinct cycle, in traversal order.
    pub cycles: Vec<Vec<String>>,
}

/// Which optional checks [`ToolGraph::validate`] runs on top of the structural ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    pub cross_platform: bool,
    pub performance: bool,
    pub max_fan_out: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            cross_platform: true,
            performance: true,
            max_fan_out: 25,
        }
    }
}

/// The tool dependency graph: an arena of nodes and edges with an id lookup.
///
/// The graph is the single owner of its nodes and edges. Callers get shared
/// references or clone the whole graph.
#[derive(Debug, Clone, Default)]
pub struct ToolGraph {
    graph: StableDiGraph<ToolNode, DependencyEdge>,
    index: HashMap<String, NodeIndex>,
}

impl ToolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node unless its id is already present. Returns whether it was inserted.
    pub fn add_node(&mut self, node: ToolNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        true
    }

    /// Insert `from -> to` if both endpoints exist and the edge is new.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(&edge.from), self.index.get(&edge.to)) else {
            return false;
        };
        if self.graph.edges(from).any(|e| e.target() == to) {
            return false;
        }
        self.graph.add_edge(from, to, edge);
        self.graph[from].position.dependency_count += 1;
        self.graph[to].position.dependent_count += 1;
        true
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(idx) = self.index.remove(id) else {
            return false;
        };
        let touching: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        for edge in touching {
            self.detach_edge(edge);
        }
        self.graph.remove_node(idx).is_some()
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<DependencyEdge> {
        let edge = self.find_edge(from, to)?;
        self.detach_edge(edge)
    }

    fn detach_edge(&mut self, edge: EdgeIndex) -> Option<DependencyEdge> {
        let (from, to) = self.graph.edge_endpoints(edge)?;
        self.graph[from].position.dependency_count =
            self.graph[from].position.dependency_count.saturating_sub(1);
        self.graph[to].position.dependent_count =
            self.graph[to].position.dependent_count.saturating_sub(1);
        self.graph.remove_edge(edge)
    }

    fn find_edge(&self, from: &str, to: &str) -> Option<EdgeIndex> {
        let from = *self.index.get(from)?;
        let to = *self.index.get(to)?;
        self.graph.find_edge(from, to)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&ToolNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut ToolNode> {
        let idx = *self.index.get(id)?;
        self.graph.node_weight_mut(idx)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DependencyEdge> {
        self.find_edge(from, to).map(|e| &self.graph[e])
    }

    pub(crate) fn edge_mut(&mut self, from: &str, to: &str) -> Option<&mut DependencyEdge> {
        let e = self.find_edge(from, to)?;
        self.graph.edge_weight_mut(e)
    }

    /// All tool ids, sorted.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.index.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ToolNode> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// Every edge, sorted by `(from, to)`.
    pub fn all_edges(&self) -> Vec<&DependencyEdge> {
        let mut edges: Vec<&DependencyEdge> =
            self.graph.edge_indices().map(|e| &self.graph[e]).collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        edges
    }

    /// Outgoing edges of `id` (what it depends on), sorted by target.
    pub fn dependencies_of(&self, id: &str) -> Vec<&DependencyEdge> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Incoming edges of `id` (who depends on it), sorted by source.
    pub fn dependents_of(&self, id: &str) -> Vec<&DependencyEdge> {
        self.edges_directed(id, Direction::Incoming)
    }

    fn edges_directed(&self, id: &str, dir: Direction) -> Vec<&DependencyEdge> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&DependencyEdge> = self
            .graph
            .edges_directed(idx, dir)
            .map(|e| e.weight())
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        edges
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.index.clear();
    }

    /// Ids reachable from `roots` (roots included) following edges accepted by `follow`.
    ///
    /// Roots missing from the graph are ignored.
    pub fn reachable_from<'a, F>(&self, roots: impl IntoIterator<Item = &'a str>, follow: F) -> BTreeSet<String>
    where
        F: Fn(&DependencyEdge) -> bool,
    {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = roots
            .into_iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(self.graph[idx].id.clone()) {
                continue;
            }
            for edge in self.graph.edges(idx) {
                if follow(edge.weight()) && !seen.contains(&self.graph[edge.target()].id) {
                    queue.push_back(edge.target());
                }
            }
        }
        seen
    }

    /// Find cycles with a three-colour depth-first search.
    ///
    /// Every node is used as a root once if still unvisited, so disconnected
    /// components are covered. An edge from an in-progress node to another
    /// in-progress node closes a cycle. Traversal colours live in a side
    /// table; the graph itself is not touched.
    pub fn detect_cycles(&self) -> CycleReport {
        let mut state: HashMap<NodeIndex, VisitState> = HashMap::new();
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
        let mut cycles = Vec::new();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].id.cmp(&self.graph[*b].id));

        for root in roots {
            if state.get(&root).copied().unwrap_or_default() == VisitState::Unvisited {
                self.cycle_dfs(root, &mut state, &mut stack, &mut seen_cycles, &mut cycles);
            }
        }

        CycleReport {
            has_cycles: !cycles.is_empty(),
            cycle_count: cycles.len(),
            cycles,
        }
    }

    fn cycle_dfs(
        &self,
        idx: NodeIndex,
        state: &mut HashMap<NodeIndex, VisitState>,
        stack: &mut Vec<NodeIndex>,
        seen_cycles: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        state.insert(idx, VisitState::InProgress);
        stack.push(idx);

        let mut targets: Vec<NodeIndex> = self.graph.edges(idx).map(|e| e.target()).collect();
        targets.sort_by(|a, b| self.graph[*a].id.cmp(&self.graph[*b].id));

        for target in targets {
            match state.get(&target).copied().unwrap_or_default() {
                VisitState::Unvisited => self.cycle_dfs(target, state, stack, seen_cycles, cycles),
                VisitState::InProgress => {
                    let start = stack.iter().position(|&n| n == target).unwrap_or(0);
                    let cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&n| self.graph[n].id.clone())
                        .collect();
                    if seen_cycles.insert(rotation_key(&cycle)) {
                        cycles.push(cycle);
                    }
                }
                VisitState::Done => {}
            }
        }

        stack.pop();
        state.insert(idx, VisitState::Done);
    }

    /// Run structural checks plus the optional checks enabled in `rules`.
    ///
    /// Every problem is collected; nothing stops at the first failure.
    pub fn validate(&self, rules: &ValidationRules) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for (id, &idx) in &self.index {
            if self.graph.node_weight(idx).map(|n| &n.id) != Some(id) {
                diags.error(
                    DiagnosticCode::NodeCreationFailed,
                    format!("index entry '{id}' does not point at its node"),
                    tool_path(id),
                );
            }
        }

        for edge in self.graph.edge_indices() {
            let Some((source, target)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let (from, to) = (&self.graph[source], &self.graph[target]);
            let data = &self.graph[edge];
            if from.id != data.from
                || to.id != data.to
                || !self.index.contains_key(&data.from)
                || !self.index.contains_key(&data.to)
            {
                diags.error(
                    DiagnosticCode::DanglingEdge,
                    format!("edge {} -> {} does not match its endpoints", data.from, data.to),
                    dependency_path(&data.to),
                );
            }
        }

        for id in self.node_ids() {
            let node = &self.graph[self.index[id]];
            for dep in node.manifest.dependencies_of_kind(DependencyKind::Required) {
                if !self.contains(&dep.tool) {
                    diags.warn(
                        DiagnosticCode::OrphanedRequiredDependency,
                        format!("{id} requires '{}' which is not in the graph", dep.tool),
                        dependency_path(&dep.tool),
                    );
                }
            }
        }

        if rules.cross_platform {
            for edge in self.all_edges() {
                let gap = self.platform_gap(edge);
                if !gap.is_empty() {
                    let names: Vec<&str> = gap.iter().map(|p| p.as_str()).collect();
                    diags.warn(
                        DiagnosticCode::CrossPlatformGap,
                        format!(
                            "{} supports {} but its dependency {} does not",
                            edge.from,
                            names.join(", "),
                            edge.to
                        ),
                        dependency_path(&edge.to),
                    );
                }
            }
        }

        if rules.performance {
            for id in self.node_ids() {
                let fan_out = self.dependencies_of(id).len();
                if fan_out > rules.max_fan_out {
                    diags.warn(
                        DiagnosticCode::ExcessiveFanOut,
                        format!(
                            "{id} has {fan_out} direct dependencies (limit {})",
                            rules.max_fan_out
                        ),
                        tool_path(id),
                    );
                }
            }
        }

        diags
    }

    /// Platforms the dependent supports, the edge applies to, but the dependency lacks.
    fn platform_gap(&self, edge: &DependencyEdge) -> Vec<Platform> {
        const ALL: [Platform; 3] = [Platform::Linux, Platform::Macos, Platform::Windows];
        let (Some(from), Some(to)) = (self.node(&edge.from), self.node(&edge.to)) else {
            return Vec::new();
        };
        ALL.into_iter()
            .filter(|&p| {
                from.versions.requirements.supports_platform(p)
                    && edge.applies_to(p)
                    && !to.versions.requirements.supports_platform(p)
            })
            .collect()
    }

    /// Render the dependency tree below `roots`.
    pub fn print_tree(&self, roots: &[&str], max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let mut visited = HashSet::new();
        for root in roots {
            let Some(&idx) = self.index.get(*root) else {
                continue;
            };
            output.push_str(&format!("{}\n", self.graph[idx]));
            visited.insert(idx);
            let deps = self.sorted_children(idx);
            let count = deps.len();
            for (i, (child, edge)) in deps.into_iter().enumerate() {
                let is_last = i == count - 1;
                self.print_subtree(&mut output, child, edge, "", is_last, 1, max_depth, &mut visited);
            }
            visited.remove(&idx);
        }
        output
    }

    fn sorted_children(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
        let mut deps: Vec<(NodeIndex, &DependencyEdge)> =
            self.graph.edges(idx).map(|e| (e.target(), e.weight())).collect();
        deps.sort_by(|a, b| a.1.to.cmp(&b.1.to));
        deps
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &DependencyEdge,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        let mut label = node.to_string();
        if edge.kind != EdgeKind::Required {
            label.push_str(&format!(" ({})", edge.kind));
        }
        if edge.deferred {
            label.push_str(" [deferred]");
        }

        if !visited.insert(idx) {
            output.push_str(&format!("{prefix}{connector}{label} (cycle)\n"));
            return;
        }
        output.push_str(&format!("{prefix}{connector}{label}\n"));

        let within_depth = max_depth.map_or(true, |max| depth < max);
        if within_depth {
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            let deps = self.sorted_children(idx);
            let count = deps.len();
            for (i, (child, child_edge)) in deps.into_iter().enumerate() {
                let is_last = i == count - 1;
                self.print_subtree(
                    output,
                    child,
                    child_edge,
                    &child_prefix,
                    is_last,
                    depth + 1,
                    max_depth,
                    visited,
                );
            }
        }

        visited.remove(&idx);
    }

    /// Find a dependency path from `from` down to `to`.
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<&str>> {
        let start = *self.index.get(from)?;
        let target = *self.index.get(to)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(start, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| self.graph[idx].id.as_str()).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for (child, _) in self.sorted_children(current) {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }
}

/// The cycle rotated to start at its smallest id, so one loop found from
/// different entry points compares equal while opposite directions do not.
fn rotation_key(cycle: &[String]) -> Vec<String> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map_or(0, |(i, _)| i);
    cycle[start..].iter().chain(&cycle[..start]).cloned().collect()
}
