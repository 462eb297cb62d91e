use std::future::{ready, Future};

use toolgraph_core::dependency::{DependencyKind, DependencySpec};
use toolgraph_core::manifest::ToolManifest;
use toolgraph_core::platform::{Architecture, Platform, TargetPlatform};
use toolgraph_core::policy::{ResolutionAction, ResolutionPolicy};
use toolgraph_resolver::builder::{BuildOptions, GraphBuilder};
use toolgraph_resolver::conflict::{ConflictDetector, ConflictKind, ConflictStatus};
use toolgraph_resolver::diagnostics::DiagnosticCode;
use toolgraph_resolver::graph::ToolGraph;
use toolgraph_resolver::lookup::{PackageLookup, StaticLookup};
use toolgraph_resolver::order::OrderOptions;
use toolgraph_resolver::resolution::{ConflictResolver, Impact};

fn target(platform: Platform) -> TargetPlatform {
    TargetPlatform::new(platform, Architecture::X64)
}

fn tool(id: &str) -> ToolManifest {
    ToolManifest::new(id, id, "cli")
}

fn ranged(tool: &str, kind: DependencyKind, range: &str) -> DependencySpec {
    let mut dep = DependencySpec::new(tool, kind);
    dep.constraint.version_range = Some(range.into());
    dep
}

fn build(manifests: &[ToolManifest], platform: Platform, include_optional: bool) -> ToolGraph {
    let options = BuildOptions {
        target: target(platform),
        include_optional,
        ..Default::default()
    };
    GraphBuilder::new(options).build_from_manifests(manifests).graph
}

fn node_with_versions(versions: &[&str]) -> ToolManifest {
    let mut node = ToolManifest::new("node", "Node.js", "runtime");
    node.versions = versions.iter().map(|v| v.to_string()).collect();
    node
}

#[test]
fn no_conflicts_is_a_no_op() {
    let graph = build(
        &[tool("a").with_dependency(DependencySpec::required("b")), tool("b")],
        Platform::Linux,
        false,
    );
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["a"]);
    assert!(!detection.has_conflicts);

    let mut policy = ResolutionPolicy::default();
    policy.automatic.max_steps = 0;
    let result = ConflictResolver::new(policy, target(Platform::Linux)).execute(&graph, &detection, &["a"]);
    assert!(result.complete);
    assert!(result.applied_steps.is_empty());
    assert!(result.updated_installation_order.is_none());
    assert_eq!(result.summary.impact, Impact::Low);
    assert!(result.summary.reversible);
    assert!(result.summary.side_effects.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(result.modified_graph.node_ids(), graph.node_ids());
}

#[test]
fn optional_branch_is_deferred() {
    let manifests = vec![
        tool("app")
            .with_dependency(ranged("node", DependencyKind::Required, "^18"))
            .with_dependency(DependencySpec::new("web", DependencyKind::Optional)),
        tool("web").with_dependency(ranged("node", DependencyKind::Required, "^20")),
        node_with_versions(&["18.19.0", "20.11.1"]),
    ];
    let graph = build(&manifests, Platform::Linux, true);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app"]);
    assert_eq!(detection.len(), 1);

    let order = OrderOptions {
        include_optional: true,
        ..Default::default()
    };
    let result = ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux))
        .with_order_options(order)
        .execute(&graph, &detection, &["app"]);

    assert!(result.is_fully_resolved());
    assert_eq!(result.applied_steps.len(), 1);
    assert_eq!(result.applied_steps[0].action, ResolutionAction::Defer);
    assert!(result.modified_graph.edge("app", "web").unwrap().deferred);
    assert!(!graph.edge("app", "web").unwrap().deferred, "input graph untouched");

    let plan = result.updated_installation_order.unwrap();
    assert_eq!(plan.installation_sequence, vec!["node", "app"]);
    assert_eq!(plan.deferred_dependencies, vec!["web"]);
    assert_eq!(result.statistics.automated_steps, 1);
}

#[test]
fn upgrade_within_major_is_substituted() {
    let manifests = vec![
        tool("app")
            .with_dependency(ranged("node", DependencyKind::Required, "<=18.2"))
            .with_dependency(DependencySpec::required("web")),
        tool("web").with_dependency(ranged("node", DependencyKind::Required, ">=18.5")),
        node_with_versions(&["18.1.0", "18.9.0", "20.0.0"]),
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app"]);
    let result =
        ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux)).execute(&graph, &detection, &["app"]);

    assert!(result.is_fully_resolved());
    let node = result.modified_graph.node("node").unwrap();
    assert_eq!(node.versions.selected.as_deref(), Some("18.9.0"));
    assert_eq!(node.versions.pinned.as_deref(), Some("~18.9.0"));
    assert_eq!(result.statistics.interactive_steps, 1);
    assert_eq!(result.summary.impact, Impact::Medium);
    let edge = result.modified_graph.edge("app", "node").unwrap();
    assert_eq!(edge.resolution.attempts, 1);
    assert_eq!(edge.resolution.conflict, Some(ConflictStatus::Resolved));
}

#[test]
fn major_upgrade_needs_policy() {
    let manifests = vec![
        tool("app")
            .with_dependency(ranged("node", DependencyKind::Required, "^18"))
            .with_dependency(DependencySpec::required("web")),
        tool("web").with_dependency(ranged("node", DependencyKind::Required, ">=20")),
        node_with_versions(&["18.19.0", "20.11.1"]),
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app"]);

    let strict =
        ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux)).execute(&graph, &detection, &["app"]);
    assert_eq!(strict.remaining_conflicts.len(), 1);
    assert_eq!(strict.remaining_conflicts[0].status, ConflictStatus::Unresolved);
    assert!(strict.updated_installation_order.is_none());

    let mut policy = ResolutionPolicy::default();
    policy.versioning.allow_major_upgrades = true;
    let relaxed = ConflictResolver::new(policy, target(Platform::Linux)).execute(&graph, &detection, &["app"]);
    assert!(relaxed.is_fully_resolved());
    assert_eq!(
        relaxed.modified_graph.node("node").unwrap().versions.selected.as_deref(),
        Some("20.11.1")
    );
    assert!(relaxed.updated_installation_order.unwrap().success);
}

#[test]
fn duplicate_provider_keeps_one() {
    let mut nvm = tool("nvm");
    nvm.provides = vec!["node".into()];
    let mut fnm = tool("fnm");
    fnm.provides = vec!["node".into()];
    let manifests = vec![
        tool("app").with_dependency(DependencySpec::required("nvm")),
        tool("site").with_dependency(DependencySpec::required("fnm")),
        nvm,
        fnm,
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app", "site"]);
    assert!(matches!(
        detection.conflicts[0].kind,
        ConflictKind::DuplicateProvider { .. }
    ));

    let result = ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux))
        .execute(&graph, &detection, &["app", "site"]);
    assert!(result.is_fully_resolved());
    assert!(result.modified_graph.contains("fnm"));
    assert!(!result.modified_graph.contains("nvm"));
    assert!(result.modified_graph.edge("app", "fnm").is_some());
    assert!(!result.summary.reversible);
    assert_eq!(result.summary.impact, Impact::High);

    let plan = result.updated_installation_order.unwrap();
    assert_eq!(plan.batches, vec![vec!["fnm"], vec!["app", "site"]]);
}

#[test]
fn platform_conflict_uses_alternative() {
    let mut docker = tool("docker");
    docker.system_requirements.platforms = vec![Platform::Linux];
    docker.alternatives = vec!["colima".into()];
    let manifests = vec![
        tool("dev").with_dependency(DependencySpec::required("docker")),
        docker,
        tool("colima"),
    ];
    let graph = build(&manifests, Platform::Macos, false);
    let detection = ConflictDetector::new(target(Platform::Macos)).detect(&graph, &["dev"]);
    assert_eq!(detection.len(), 1);

    let result =
        ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Macos)).execute(&graph, &detection, &["dev"]);
    assert!(result.is_fully_resolved());
    assert!(!result.modified_graph.contains("docker"));
    let plan = result.updated_installation_order.unwrap();
    assert_eq!(plan.installation_sequence, vec!["colima", "dev"]);
}

#[test]
fn platform_conflict_workaround_or_unresolved() {
    let mut brew = tool("brew");
    brew.system_requirements.platforms = vec![Platform::Macos];
    let manifests = vec![brew];
    let graph = build(&manifests, Platform::Windows, false);
    let detector = ConflictDetector::new(target(Platform::Windows));
    let detection = detector.detect(&graph, &["brew"]);

    let result = ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Windows))
        .execute(&graph, &detection, &["brew"]);
    assert_eq!(result.remaining_conflicts.len(), 1);

    let mut policy = ResolutionPolicy::default();
    policy.platform.allow_workarounds = true;
    let result = ConflictResolver::new(policy, target(Platform::Windows)).execute(&graph, &detection, &["brew"]);
    assert!(result.is_fully_resolved());
    assert_eq!(result.applied_steps[0].action, ResolutionAction::Configure);
    assert!(!result.applied_steps[0].automated);
    assert_eq!(result.statistics.interactive_steps, 1);
}

#[test]
fn step_budget_flags_incomplete() {
    let mut a = tool("a");
    a.system_requirements.platforms = vec![Platform::Macos];
    let mut b = tool("b");
    b.system_requirements.platforms = vec![Platform::Macos];
    let graph = build(&[a, b], Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["a", "b"]);
    assert_eq!(detection.len(), 2);

    let mut policy = ResolutionPolicy::default();
    policy.automatic.max_steps = 1;
    policy.platform.allow_workarounds = true;
    let result = ConflictResolver::new(policy, target(Platform::Linux)).execute(&graph, &detection, &["a", "b"]);
    assert!(!result.complete);
    assert_eq!(result.applied_steps.len(), 1);
    assert_eq!(result.remaining_conflicts.len(), 1);
    assert_eq!(result.errors[0].code, DiagnosticCode::MaxStepsExceeded);
}

#[test]
fn settled_conflicts_do_not_spend_budget() {
    let mut nvm = tool("nvm");
    nvm.provides = vec!["node".into()];
    nvm.system_requirements.platforms = vec![Platform::Macos];
    let mut fnm = tool("fnm");
    fnm.provides = vec!["node".into()];
    let manifests = vec![
        tool("app").with_dependency(DependencySpec::required("nvm")),
        tool("site").with_dependency(DependencySpec::required("fnm")),
        nvm,
        fnm,
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app", "site"]);
    assert_eq!(detection.len(), 2);

    let mut policy = ResolutionPolicy::default();
    policy.automatic.max_steps = 1;
    let result = ConflictResolver::new(policy, target(Platform::Linux)).execute(&graph, &detection, &["app", "site"]);
    assert_eq!(result.applied_steps.len(), 1);
    assert!(!result.modified_graph.contains("nvm"));
    assert!(result.is_fully_resolved());
    assert!(result.complete);
    assert!(result.errors.is_empty());
    assert_eq!(result.statistics.conflicts_resolved, 2);
}

#[test]
fn one_selection_serves_every_dependent() {
    let mut lib = tool("lib");
    lib.versions = vec!["1.4.0".into(), "1.5.0".into(), "1.8.0".into()];
    let manifests = vec![
        tool("app")
            .with_dependency(DependencySpec::required("a"))
            .with_dependency(DependencySpec::required("b"))
            .with_dependency(DependencySpec::required("c")),
        tool("a").with_dependency(ranged("lib", DependencyKind::Required, "<=1.4.0")),
        tool("b").with_dependency(ranged("lib", DependencyKind::Required, ">=1.6.0")),
        tool("c").with_dependency(ranged("lib", DependencyKind::Required, "=1.5.0")),
        lib,
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app"]);
    assert_eq!(detection.len(), 3);

    let result =
        ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux)).execute(&graph, &detection, &["app"]);
    assert_eq!(result.applied_steps.len(), 1);
    assert_eq!(
        result.modified_graph.node("lib").unwrap().versions.selected.as_deref(),
        Some("1.8.0")
    );
    assert_eq!(result.statistics.conflicts_resolved, 2);
    assert_eq!(result.remaining_conflicts.len(), 1);
    assert_eq!(result.remaining_conflicts[0].tools, vec!["a", "c"]);
    assert_eq!(result.remaining_conflicts[0].status, ConflictStatus::Unresolved);
    assert!(result.updated_installation_order.is_some());
}

#[test]
fn disabled_policy_leaves_everything() {
    let mut a = tool("a");
    a.system_requirements.platforms = vec![Platform::Macos];
    let graph = build(&[a], Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["a"]);

    let mut policy = ResolutionPolicy::default();
    policy.automatic.enabled = false;
    policy.platform.allow_workarounds = true;
    let result = ConflictResolver::new(policy, target(Platform::Linux)).execute(&graph, &detection, &["a"]);
    assert!(result.applied_steps.is_empty());
    assert_eq!(result.remaining_conflicts.len(), 1);
    assert!(result.complete);
}

struct FailingLookup;

impl PackageLookup for FailingLookup {
    fn available_versions(
        &self,
        manifest: &ToolManifest,
    ) -> impl Future<Output = miette::Result<Vec<String>>> + Send {
        ready(Err(miette::miette!("registry for {} unreachable", manifest.id)))
    }
}

fn major_split() -> Vec<ToolManifest> {
    vec![
        tool("app")
            .with_dependency(ranged("node", DependencyKind::Required, "^18"))
            .with_dependency(DependencySpec::required("web")),
        tool("web").with_dependency(ranged("node", DependencyKind::Required, "^18.4")),
        tool("legacy").with_dependency(ranged("node", DependencyKind::Required, "<18.2")),
        node_with_versions(&[]),
    ]
}

#[tokio::test]
async fn lookup_supplies_versions() {
    let manifests = vec![
        tool("app")
            .with_dependency(ranged("node", DependencyKind::Required, "<=18.2"))
            .with_dependency(DependencySpec::required("web")),
        tool("web").with_dependency(ranged("node", DependencyKind::Required, ">=18.5")),
        node_with_versions(&[]),
    ];
    let graph = build(&manifests, Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app"]);
    let resolver = ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux));

    let without = resolver.execute(&graph, &detection, &["app"]);
    assert_eq!(without.remaining_conflicts.len(), 1);

    let lookup = StaticLookup::new().with("node", &["18.6.0", "18.7.2"]);
    let with = resolver.execute_with_lookup(&graph, &detection, &["app"], &lookup).await;
    assert!(with.is_fully_resolved());
    assert_eq!(
        with.modified_graph.node("node").unwrap().versions.selected.as_deref(),
        Some("18.7.2")
    );
}

#[tokio::test]
async fn failed_lookup_is_a_warning() {
    let graph = build(&major_split(), Platform::Linux, false);
    let detection = ConflictDetector::new(target(Platform::Linux)).detect(&graph, &["app", "legacy"]);
    assert!(detection.has_conflicts);

    let result = ConflictResolver::new(ResolutionPolicy::default(), target(Platform::Linux))
        .execute_with_lookup(&graph, &detection, &["app", "legacy"], &FailingLookup)
        .await;
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, DiagnosticCode::LookupFailed);
    assert!(result.errors.is_empty());
    assert!(!result.remaining_conflicts.is_empty());
}
