//! Command dispatch and handler modules.

mod check;
mod plan;
mod tree;

use miette::Result;
use toolgraph_core::config::GlobalConfig;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Plan {
            manifests,
            targets,
            include_optional,
            include_suggested,
            strategy,
            json,
        } => {
            plan::exec(
                &manifests,
                &config,
                targets,
                include_optional,
                include_suggested,
                strategy,
                json,
            )
            .await
        }
        Command::Check { manifests, targets } => check::exec(&manifests, &config, targets, cli.verbose).await,
        Command::Tree {
            manifests,
            targets,
            depth,
            why,
            conflicts,
        } => tree::exec(&manifests, &config, targets, depth, why, conflicts),
    }
}

/// Global config with `--platform`/`--arch` applied on top.
fn load_config(cli: &Cli) -> Result<GlobalConfig> {
    let mut config = match cli.config {
        Some(ref path) => GlobalConfig::load_from(path)?,
        None => GlobalConfig::load()?,
    };
    if let Some(platform) = cli.platform {
        config.build.platform = Some(platform);
    }
    if let Some(arch) = cli.arch {
        config.build.arch = Some(arch);
    }
    tracing::debug!("Target platform: {}", config.build.target());
    Ok(config)
}
