//! Handler for `toolgraph plan`.

use std::path::PathBuf;

use miette::Result;

use toolgraph_core::config::GlobalConfig;
use toolgraph_core::policy::OrderStrategy;
use toolgraph_ops::ops_plan::{self, PlanOptions};
use toolgraph_ops::ops_setup;
use toolgraph_util::errors::ToolgraphError;
use toolgraph_util::progress;

pub async fn exec(
    manifests: &[PathBuf],
    config: &GlobalConfig,
    targets: Vec<String>,
    include_optional: bool,
    include_suggested: bool,
    strategy: Option<OrderStrategy>,
    json: bool,
) -> Result<()> {
    let opts = PlanOptions {
        targets,
        include_optional,
        include_suggested,
        strategy,
    };
    let report = ops_plan::plan(manifests, config, &opts).await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        ops_setup::report_diagnostics(&report.errors, &report.warnings);
        for step in &report.applied_steps {
            progress::status_info("Applied", &step.to_string());
        }
        for conflict in &report.remaining_conflicts {
            progress::status_warn("Unresolved", &conflict.to_string());
        }
        print!("{}", report.render());
    }

    if !report.order.success {
        return Err(ToolgraphError::Resolution {
            message: "no complete installation order could be produced".to_string(),
        }
        .into());
    }
    Ok(())
}
