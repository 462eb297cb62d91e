//! Shared setup for every operation: read manifest files, derive build
//! options from the global config, construct the graph.

use std::path::{Path, PathBuf};

use toolgraph_core::config::GlobalConfig;
use toolgraph_core::manifest::{ManifestSet, ToolManifest};
use toolgraph_resolver::builder::{BuildOptions, GraphBuilder, GraphConstructionResult};
use toolgraph_resolver::diagnostics::Diagnostic;
use toolgraph_resolver::graph::ValidationRules;
use toolgraph_util::errors::ToolgraphError;

/// Read manifests from files, or from every `.toml`/`.json` file directly
/// inside a directory. Files are read in path order.
pub fn load_manifests(paths: &[PathBuf]) -> miette::Result<Vec<ToolManifest>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(manifest_files_in(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let mut manifests = Vec::new();
    for file in &files {
        let set = ManifestSet::from_path(file)?;
        tracing::debug!("Loaded {} manifests from {}", set.len(), file.display());
        manifests.extend(set.tool);
    }
    Ok(manifests)
}

fn manifest_files_in(dir: &Path) -> miette::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ToolgraphError::Manifest {
        message: format!("Failed to read {}: {e}", dir.display()),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext == "toml" || ext == "json")
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Graph construction options from `[build]`, with command-line switches
/// able to turn optional and suggested dependencies on.
pub fn build_options(config: &GlobalConfig, include_optional: bool, include_suggested: bool) -> BuildOptions {
    BuildOptions {
        include_optional: include_optional || config.build.include_optional,
        include_suggested: include_suggested || config.build.include_suggested,
        validate: config.build.validate,
        validation: ValidationRules {
            max_fan_out: config.build.max_fan_out,
            ..Default::default()
        },
        target: config.build.target(),
    }
}

/// Load manifests and build the graph.
pub fn construct(paths: &[PathBuf], options: BuildOptions) -> miette::Result<GraphConstructionResult> {
    let manifests = load_manifests(paths)?;
    if manifests.is_empty() {
        return Err(ToolgraphError::Manifest {
            message: "No tool manifests found".to_string(),
        }
        .into());
    }
    toolgraph_util::progress::status("Loading", &format!("{} tool manifests", manifests.len()));
    Ok(GraphBuilder::new(options).build_from_manifests(&manifests))
}

/// Print diagnostics as status lines on stderr.
pub fn report_diagnostics(errors: &[Diagnostic], warnings: &[Diagnostic]) {
    for e in errors {
        toolgraph_util::progress::status_error("error", &e.to_string());
    }
    for w in warnings {
        toolgraph_util::progress::status_warn("warning", &w.to_string());
    }
}

/// Borrow target ids as `&str`.
pub fn target_refs(targets: &[String]) -> Vec<&str> {
    targets.iter().map(String::as_str).collect()
}
