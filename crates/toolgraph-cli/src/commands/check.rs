//! Handler for `toolgraph check`.

use std::path::PathBuf;

use miette::Result;

use toolgraph_core::config::GlobalConfig;
use toolgraph_ops::ops_check::{self, CheckOptions};
use toolgraph_ops::ops_setup;
use toolgraph_util::errors::ToolgraphError;
use toolgraph_util::progress;

pub async fn exec(manifests: &[PathBuf], config: &GlobalConfig, targets: Vec<String>, verbose: bool) -> Result<()> {
    let opts = CheckOptions {
        targets,
        ..Default::default()
    };
    let outcome = ops_check::check(manifests, config, &opts).await?;

    ops_setup::report_diagnostics(&outcome.errors, &outcome.warnings);
    for cycle in &outcome.cycles.cycles {
        progress::status_error("cycle", &cycle.join(" -> "));
    }
    for conflict in &outcome.conflicts {
        let label = if outcome.unresolved.iter().any(|u| u.same_conflict(conflict)) {
            "conflict"
        } else {
            "resolvable"
        };
        progress::status_warn(label, &conflict.to_string());
    }
    if verbose {
        progress::status_info("Graph", &format!("{} tools, {} dependencies", outcome.tools, outcome.edges));
    }

    if outcome.passed() {
        progress::status("Finished", &format!("{} tools checked, no problems found", outcome.tools));
        Ok(())
    } else {
        Err(ToolgraphError::Resolution {
            message: "check found problems".to_string(),
        }
        .into())
    }
}
