//! Operation: display the dependency tree.

use std::fmt::Write as _;
use std::path::PathBuf;

use toolgraph_core::config::GlobalConfig;
use toolgraph_resolver::conflict::ConflictDetector;

use crate::ops_setup;

/// Options for `toolgraph tree`.
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Roots to print; empty means every tool nothing depends on.
    pub targets: Vec<String>,
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show how a tool is reached from the roots.
    pub why: Option<String>,
    /// Show detected conflicts instead of the tree.
    pub conflicts: bool,
}

/// Render the dependency tree for the given manifests.
pub fn tree(manifests: &[PathBuf], config: &GlobalConfig, opts: &TreeOptions) -> miette::Result<String> {
    let build = ops_setup::build_options(config, false, false);
    let target = build.target;
    let construction = ops_setup::construct(manifests, build)?;
    let graph = &construction.graph;

    let roots: Vec<&str> = if opts.targets.is_empty() {
        graph
            .node_ids()
            .into_iter()
            .filter(|id| graph.dependents_of(id).is_empty())
            .collect()
    } else {
        ops_setup::target_refs(&opts.targets)
    };

    let mut out = String::new();

    if let Some(ref wanted) = opts.why {
        match roots.iter().find_map(|root| graph.find_path(root, wanted)) {
            Some(path) => {
                let _ = writeln!(out, "Path to {wanted}:");
                for (i, node) in path.iter().enumerate() {
                    let indent = "  ".repeat(i);
                    let _ = writeln!(out, "{indent}{node}");
                }
            }
            None => {
                let _ = writeln!(out, "Tool '{wanted}' not found in the graph.");
            }
        }
        return Ok(out);
    }

    if opts.conflicts {
        let detection = ConflictDetector::new(target).detect(graph, &ops_setup::target_refs(&opts.targets));
        let _ = writeln!(out, "{}", detection.to_string().trim_end());
        return Ok(out);
    }

    let rendered = graph.print_tree(&roots, opts.depth);
    if rendered.is_empty() {
        out.push_str("No tools.\n");
    } else {
        out.push_str(&rendered);
    }
    Ok(out)
}
