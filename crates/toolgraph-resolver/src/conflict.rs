//! Conflict detection over the part of the graph a plan actually needs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use toolgraph_core::dependency::{DependencyKind, VersionConstraint};
use toolgraph_core::platform::{Architecture, Platform, TargetPlatform};

use crate::graph::{DependencyEdge, ToolGraph};
use crate::version::VersionInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Detected,
    Resolved,
    Unresolved,
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictStatus::Detected => "detected",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Unresolved => "unresolved",
        })
    }
}

/// One dependent's requirement on a contended tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRequirement {
    pub dependent: String,
    pub constraint: VersionConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Two dependents ask for non-overlapping versions of the subject.
    VersionRange {
        requirements: Vec<VersionRequirement>,
    },
    /// Several reachable tools provide the same capability.
    DuplicateProvider { capability: String },
    /// The subject does not run on the target platform.
    PlatformIncompatible {
        platform: Platform,
        arch: Architecture,
    },
    /// One tool declares itself incompatible with another.
    Declared,
}

impl ConflictKind {
    fn rank(&self) -> u8 {
        match self {
            ConflictKind::VersionRange { .. } => 0,
            ConflictKind::DuplicateProvider { .. } => 1,
            ConflictKind::PlatformIncompatible { .. } => 2,
            ConflictKind::Declared => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::VersionRange { .. } => "version",
            ConflictKind::DuplicateProvider { .. } => "duplicate-provider",
            ConflictKind::PlatformIncompatible { .. } => "platform",
            ConflictKind::Declared => "declared",
        }
    }
}

/// A set of tools in contention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    /// Tools in contention, sorted.
    pub tools: Vec<String>,
    /// The contended tool, or the capability for duplicate providers.
    pub subject: String,
    pub kind: ConflictKind,
    pub status: ConflictStatus,
    pub message: String,
}

impl ConflictRecord {
    fn new(mut tools: Vec<String>, subject: impl Into<String>, kind: ConflictKind, message: String) -> Self {
        tools.sort();
        tools.dedup();
        Self {
            tools,
            subject: subject.into(),
            kind,
            status: ConflictStatus::Detected,
            message,
        }
    }

    /// Whether `id` is one of the contending tools or the contended tool.
    pub fn involves(&self, id: &str) -> bool {
        self.tools.iter().any(|t| t == id)
            || (!matches!(self.kind, ConflictKind::DuplicateProvider { .. }) && self.subject == id)
    }

    /// Whether `other` names the same contention, whatever its status.
    pub fn same_conflict(&self, other: &ConflictRecord) -> bool {
        self.tools == other.tools && self.subject == other.subject && self.kind == other.kind
    }

    fn sort_key(&self) -> (&[String], &str, u8) {
        (&self.tools, &self.subject, self.kind.rank())
    }
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} conflict [{}]: {}", self.kind.label(), self.status, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictDetectionResult {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictRecord>,
}

impl ConflictDetectionResult {
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl fmt::Display for ConflictDetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No conflicts.");
        }
        writeln!(f, "Conflicts ({}):", self.conflicts.len())?;
        for c in &self.conflicts {
            writeln!(f, "  {c}")?;
        }
        Ok(())
    }
}

/// Finds version, duplicate-provider, platform and declared conflicts.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    target: TargetPlatform,
}

impl ConflictDetector {
    pub fn new(target: TargetPlatform) -> Self {
        Self { target }
    }

    /// Detect conflicts among tools reachable from `targets` over
    /// non-deferred edges. An empty target list means every tool.
    ///
    /// Output order depends only on the graph contents.
    pub fn detect(&self, graph: &ToolGraph, targets: &[&str]) -> ConflictDetectionResult {
        let reachable = relevant_tools(graph, targets);
        tracing::debug!("Checking {} reachable tools for conflicts", reachable.len());

        let mut conflicts = Vec::new();
        self.version_conflicts(graph, &reachable, &mut conflicts);
        self.provider_conflicts(graph, &reachable, &mut conflicts);
        self.platform_conflicts(graph, &reachable, &mut conflicts);
        self.declared_conflicts(graph, &reachable, &mut conflicts);
        conflicts.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        if !conflicts.is_empty() {
            tracing::info!("Detected {} conflicts", conflicts.len());
        }
        ConflictDetectionResult {
            has_conflicts: !conflicts.is_empty(),
            conflicts,
        }
    }

    fn version_conflicts(&self, graph: &ToolGraph, reachable: &BTreeSet<String>, out: &mut Vec<ConflictRecord>) {
        for id in reachable {
            let incoming: Vec<(&DependencyEdge, VersionInterval)> = graph
                .dependents_of(id)
                .into_iter()
                .filter(|e| !e.deferred && reachable.contains(&e.from))
                .filter_map(|e| {
                    let interval = VersionInterval::from_constraint(&e.constraint).ok()?;
                    (!interval.is_unbounded()).then_some((e, interval))
                })
                .collect();

            for (i, (left, left_range)) in incoming.iter().enumerate() {
                for (right, right_range) in &incoming[i + 1..] {
                    if left_range.intersects(right_range) {
                        continue;
                    }
                    let message = format!(
                        "{} needs {id} {} but {} needs {}",
                        left.from, left.constraint, right.from, right.constraint
                    );
                    out.push(ConflictRecord::new(
                        vec![left.from.clone(), right.from.clone()],
                        id.clone(),
                        ConflictKind::VersionRange {
                            requirements: vec![
                                VersionRequirement {
                                    dependent: left.from.clone(),
                                    constraint: left.constraint.clone(),
                                },
                                VersionRequirement {
                                    dependent: right.from.clone(),
                                    constraint: right.constraint.clone(),
                                },
                            ],
                        },
                        message,
                    ));
                }
            }
        }
    }

    fn provider_conflicts(&self, graph: &ToolGraph, reachable: &BTreeSet<String>, out: &mut Vec<ConflictRecord>) {
        let mut providers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in reachable {
            let Some(node) = graph.node(id) else { continue };
            for capability in &node.manifest.provides {
                providers.entry(capability.as_str()).or_default().insert(id.as_str());
            }
        }
        for (capability, tools) in providers {
            if tools.len() < 2 {
                continue;
            }
            let names: Vec<String> = tools.iter().map(|t| t.to_string()).collect();
            let message = format!("{} all provide '{capability}'", names.join(", "));
            out.push(ConflictRecord::new(
                names,
                capability,
                ConflictKind::DuplicateProvider {
                    capability: capability.to_string(),
                },
                message,
            ));
        }
    }

    fn platform_conflicts(&self, graph: &ToolGraph, reachable: &BTreeSet<String>, out: &mut Vec<ConflictRecord>) {
        for id in reachable {
            let Some(node) = graph.node(id) else { continue };
            if node.versions.requirements.supports(&self.target) {
                continue;
            }
            out.push(ConflictRecord::new(
                vec![id.clone()],
                id.clone(),
                ConflictKind::PlatformIncompatible {
                    platform: self.target.platform,
                    arch: self.target.arch,
                },
                format!("{id} does not support {}", self.target),
            ));
        }
    }

    fn declared_conflicts(&self, graph: &ToolGraph, reachable: &BTreeSet<String>, out: &mut Vec<ConflictRecord>) {
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        for id in reachable {
            let Some(node) = graph.node(id) else { continue };
            for dep in node.manifest.dependencies_of_kind(DependencyKind::Conflicts) {
                if dep.tool == *id || !reachable.contains(&dep.tool) {
                    continue;
                }
                let pair = if *id < dep.tool {
                    (id.clone(), dep.tool.clone())
                } else {
                    (dep.tool.clone(), id.clone())
                };
                if !seen.insert(pair) {
                    continue;
                }
                out.push(ConflictRecord::new(
                    vec![id.clone(), dep.tool.clone()],
                    dep.tool.clone(),
                    ConflictKind::Declared,
                    format!("{id} cannot be installed alongside {}", dep.tool),
                ));
            }
        }
    }
}

/// Tools reachable from `targets` over non-deferred edges, or every tool
/// when no targets are given.
pub(crate) fn relevant_tools(graph: &ToolGraph, targets: &[&str]) -> BTreeSet<String> {
    if targets.is_empty() {
        graph.node_ids().into_iter().map(String::from).collect()
    } else {
        graph.reachable_from(targets.iter().copied(), |e| !e.deferred)
    }
}

/// Whether `a` and `b` declare an incompatibility in either direction.
pub(crate) fn declared_incompatible(graph: &ToolGraph, a: &str, b: &str) -> bool {
    let declares = |from: &str, to: &str| {
        graph.node(from).is_some_and(|n| {
            n.manifest
                .dependencies_of_kind(DependencyKind::Conflicts)
                .any(|d| d.tool == to)
        })
    };
    declares(a, b) || declares(b, a)
}
