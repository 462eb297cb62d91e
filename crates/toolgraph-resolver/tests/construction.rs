use toolgraph_core::dependency::{DependencyKind, DependencySpec};
use toolgraph_core::manifest::ToolManifest;
use toolgraph_core::platform::{Architecture, Platform, TargetPlatform};
use toolgraph_resolver::builder::{BuildOptions, GraphBuilder};
use toolgraph_resolver::diagnostics::DiagnosticCode;
use toolgraph_resolver::order::{InstallationOrderResolver, OrderOptions};

fn linux() -> BuildOptions {
    BuildOptions {
        target: TargetPlatform::new(Platform::Linux, Architecture::X64),
        ..Default::default()
    }
}

fn tool(id: &str) -> ToolManifest {
    ToolManifest::new(id, id, "cli")
}

#[test]
fn dependency_installs_first() {
    let manifests = vec![tool("a").with_dependency(DependencySpec::required("b")), tool("b")];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert!(result.success);
    assert_eq!(result.statistics.nodes_created, 2);
    assert_eq!(result.statistics.edges_created, 1);
    assert_eq!(result.statistics.dependencies_resolved, 1);

    let order = InstallationOrderResolver::resolve(&result.graph, &["a"], &OrderOptions::default());
    assert!(order.success);
    assert_eq!(order.installation_sequence, vec!["b", "a"]);
    assert_eq!(order.batches, vec![vec!["b"], vec!["a"]]);
}

#[test]
fn duplicate_id_keeps_first() {
    let manifests = vec![tool("a").with_dependency(DependencySpec::required("b")), tool("a")];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert_eq!(result.graph.node_count(), 1);
    let duplicates: Vec<_> = result
        .warnings
        .iter()
        .filter(|w| w.code == DiagnosticCode::DuplicateTool)
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].path, "tools.a");
    assert!(result.success);
}

#[test]
fn missing_dependency_is_a_warning() {
    let manifests = vec![tool("x").with_dependency(DependencySpec::required("missing"))];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert!(result.success);
    assert_eq!(result.graph.edge_count(), 0);
    assert!(result.graph.dependencies_of("x").is_empty());
    let warning = result
        .warnings
        .iter()
        .find(|w| w.code == DiagnosticCode::MissingDependency)
        .unwrap();
    assert_eq!(warning.path, "dependencies.missing");
}

#[test]
fn missing_fields_exclude_manifest() {
    let manifests = vec![ToolManifest::new("ghost", "", "cli"), tool("real")];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert!(!result.success);
    assert_eq!(result.errors[0].code, DiagnosticCode::MissingRequiredField);
    assert_eq!(result.errors[0].path, "tools.ghost");
    assert_eq!(result.graph.node_ids(), vec!["real"]);
    assert_eq!(result.statistics.manifests_processed, 2);
}

#[test]
fn platform_mismatch_still_included() {
    let mut winget = tool("winget");
    winget.system_requirements.platforms = vec![Platform::Windows];
    let result = GraphBuilder::new(linux()).build_from_manifests(&[winget]);
    assert!(result.success);
    assert!(result.graph.contains("winget"));
    assert_eq!(result.warnings[0].code, DiagnosticCode::PlatformIncompatible);
}

#[test]
fn two_node_cycle() {
    let manifests = vec![
        tool("a").with_dependency(DependencySpec::required("b")),
        tool("b").with_dependency(DependencySpec::required("a")),
    ];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert!(result.success, "a cycle alone is not a hard error");
    assert!(result.metadata.cycles.has_cycles);
    assert_eq!(result.metadata.cycles.cycle_count, 1);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == DiagnosticCode::CircularDependencies));

    let order = InstallationOrderResolver::resolve(&result.graph, &["a"], &OrderOptions::default());
    assert!(order.installation_sequence.is_empty());
    assert_eq!(order.circular_dependencies, vec!["a", "b"]);
}

#[test]
fn acyclic_sets_report_no_cycles() {
    let manifests = vec![
        tool("app")
            .with_dependency(DependencySpec::required("lib"))
            .with_dependency(DependencySpec::required("cli")),
        tool("cli").with_dependency(DependencySpec::required("lib")),
        tool("lib").with_dependency(DependencySpec::required("base")),
        tool("base"),
    ];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert!(!result.metadata.cycles.has_cycles);
    assert!(!result.graph.detect_cycles().has_cycles);
}

#[test]
fn optional_dependency_is_deferred() {
    let manifests = vec![
        tool("editor")
            .with_dependency(DependencySpec::required("runtime"))
            .with_dependency(DependencySpec::new("plugins", DependencyKind::Optional))
            .with_dependency(DependencySpec::new("themes", DependencyKind::Suggests)),
        tool("runtime"),
        tool("plugins"),
        tool("themes"),
    ];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    assert_eq!(result.graph.edge_count(), 1);

    let order = InstallationOrderResolver::resolve(&result.graph, &["editor"], &OrderOptions::default());
    assert_eq!(order.installation_sequence, vec!["runtime", "editor"]);
    assert_eq!(order.deferred_dependencies, vec!["plugins", "themes"]);
}

#[test]
fn optional_dependency_required_elsewhere_is_not_deferred() {
    let manifests = vec![
        tool("app")
            .with_dependency(DependencySpec::new("jq", DependencyKind::Optional))
            .with_dependency(DependencySpec::required("scripts")),
        tool("scripts").with_dependency(DependencySpec::required("jq")),
        tool("jq"),
    ];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    let order = InstallationOrderResolver::resolve(&result.graph, &["app"], &OrderOptions::default());
    assert!(order.contains("jq"));
    assert!(order.deferred_dependencies.is_empty());
}

#[test]
fn building_twice_is_idempotent() {
    let manifests = vec![
        tool("a").with_dependency(DependencySpec::required("b")),
        tool("b").with_dependency(DependencySpec::required("c")),
        tool("c"),
        tool("d").with_dependency(DependencySpec::required("nope")),
    ];
    let mut builder = GraphBuilder::new(linux());
    let first = builder.build_from_manifests(&manifests);
    let second = builder.build_from_manifests(&manifests);

    assert_eq!(first.graph.node_ids(), second.graph.node_ids());
    let edges = |r: &toolgraph_resolver::builder::GraphConstructionResult| {
        r.graph
            .all_edges()
            .iter()
            .map(|e| (e.from.clone(), e.to.clone(), e.kind))
            .collect::<Vec<_>>()
    };
    assert_eq!(edges(&first), edges(&second));
    assert!(first.statistics.same_counts(&second.statistics));
    assert_eq!(first.warnings, second.warnings);
}

#[test]
fn batches_respect_every_edge() {
    let manifests = vec![
        tool("ide")
            .with_dependency(DependencySpec::required("node"))
            .with_dependency(DependencySpec::required("git"))
            .with_dependency(DependencySpec::required("python")),
        tool("node").with_dependency(DependencySpec::required("openssl")),
        tool("python")
            .with_dependency(DependencySpec::required("openssl"))
            .with_dependency(DependencySpec::required("zlib")),
        tool("git").with_dependency(DependencySpec::required("zlib")),
        tool("openssl"),
        tool("zlib"),
    ];
    let result = GraphBuilder::new(linux()).build_from_manifests(&manifests);
    let order = InstallationOrderResolver::resolve(&result.graph, &["ide"], &OrderOptions::default());
    assert!(order.success);
    assert_eq!(order.installation_sequence.len(), 6);

    for edge in result.graph.all_edges() {
        let dependent = order.batch_of(&edge.from).unwrap();
        let dependency = order.batch_of(&edge.to).unwrap();
        assert!(dependency < dependent, "{} must precede {}", edge.to, edge.from);
    }
    for batch in &order.batches {
        for a in batch {
            for b in batch {
                assert!(result.graph.edge(a, b).is_none());
            }
        }
    }
}

#[test]
fn invalid_constraint_warns_but_links() {
    let mut dep = DependencySpec::required("b");
    dep.constraint.version_range = Some("not a range".into());
    let result = GraphBuilder::new(linux()).build_from_manifests(&[tool("a").with_dependency(dep), tool("b")]);
    assert!(result.success);
    assert_eq!(result.graph.edge_count(), 1);
    assert_eq!(result.warnings[0].code, DiagnosticCode::InvalidVersionConstraint);
}

#[test]
fn incremental_add_links_waiting_dependents() {
    let mut builder = GraphBuilder::new(linux());
    let mut result = builder.build_from_manifests(&[tool("app").with_dependency(DependencySpec::required("lib"))]);
    assert_eq!(result.graph.edge_count(), 0);

    let update = builder.add_tool_to_graph(
        &mut result.graph,
        tool("lib").with_dependency(DependencySpec::new("docs", DependencyKind::Optional)),
    );
    assert!(update.success);
    assert!(update.changed);
    assert_eq!(update.edges_created, 1);
    assert!(result.graph.edge("app", "lib").is_some());

    let again = builder.add_tool_to_graph(&mut result.graph, tool("lib"));
    assert!(!again.changed);
    assert_eq!(again.warnings[0].code, DiagnosticCode::DuplicateTool);

    let invalid = builder.add_tool_to_graph(&mut result.graph, ToolManifest::new("x", "X", ""));
    assert!(!invalid.success);
    assert!(!result.graph.contains("x"));
}

#[test]
fn incremental_remove_warns_dependents() {
    let mut builder = GraphBuilder::new(linux());
    let mut result = builder.build_from_manifests(&[
        tool("app").with_dependency(DependencySpec::required("lib")),
        tool("lib"),
    ]);

    let update = builder.remove_tool_from_graph(&mut result.graph, "lib");
    assert!(update.changed);
    assert_eq!(update.edges_removed, 1);
    assert_eq!(update.warnings[0].code, DiagnosticCode::MissingDependency);
    assert_eq!(result.graph.edge_count(), 0);
    assert!(!builder.cache().contains("lib"));

    let unknown = builder.remove_tool_from_graph(&mut result.graph, "lib");
    assert!(!unknown.changed);
    assert_eq!(unknown.warnings[0].code, DiagnosticCode::UnknownTarget);
}

#[test]
fn incremental_remove_warns_included_optional_dependents() {
    let mut builder = GraphBuilder::new(BuildOptions {
        include_optional: true,
        ..linux()
    });
    let mut result = builder.build_from_manifests(&[
        tool("editor").with_dependency(DependencySpec::new("plugins", DependencyKind::Optional)),
        tool("plugins"),
    ]);
    assert_eq!(result.graph.edge_count(), 1);

    let update = builder.remove_tool_from_graph(&mut result.graph, "plugins");
    assert!(update.changed);
    assert_eq!(update.warnings.len(), 1);
    assert_eq!(update.warnings[0].code, DiagnosticCode::MissingDependency);
    assert_eq!(update.warnings[0].path, "dependencies.plugins");
}

#[test]
fn huge_version_range_does_not_abort_construction() {
    let mut dep = DependencySpec::required("b");
    dep.constraint.version_range = Some("=18446744073709551615.0.0".into());
    let result = GraphBuilder::new(linux()).build_from_manifests(&[tool("a").with_dependency(dep), tool("b")]);
    assert!(result.success);
    assert_eq!(result.graph.edge_count(), 1);
}
