//! CLI argument definitions for toolgraph.
//!
//! Each command corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use toolgraph_core::platform::{Architecture, Platform};
use toolgraph_core::policy::OrderStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "toolgraph",
    version,
    about = "Dependency planning for developer tool installations",
    long_about = "toolgraph reads tool manifests, builds a dependency graph, resolves \
                  version and platform conflicts, and prints a batched installation order."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.toolgraph/config.toml)
    #[arg(long, global = true, env = "TOOLGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target platform: linux, macos, windows
    #[arg(long, global = true)]
    pub platform: Option<Platform>,

    /// Target architecture: x64, arm64, x86
    #[arg(long, global = true)]
    pub arch: Option<Architecture>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute an installation plan
    Plan {
        /// Manifest files or directories
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        /// Tool to install (repeatable); defaults to every tool
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// Treat optional dependencies as part of the plan
        #[arg(long)]
        include_optional: bool,
        /// Treat suggested dependencies as part of the plan
        #[arg(long)]
        include_suggested: bool,
        /// Batch layout: eager, lazy, conflict-aware
        #[arg(long)]
        strategy: Option<OrderStrategy>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate manifests and report conflicts
    Check {
        /// Manifest files or directories
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        /// Tool to check (repeatable); defaults to every tool
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },

    /// Display the dependency tree
    Tree {
        /// Manifest files or directories
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        /// Root tool (repeatable); defaults to tools nothing depends on
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// Maximum depth
        #[arg(long)]
        depth: Option<usize>,
        /// Explain why a tool is included
        #[arg(long)]
        why: Option<String>,
        /// Show detected conflicts
        #[arg(long)]
        conflicts: bool,
    },
}

/// Parse command-line arguments.
pub fn parse() -> Cli {
    Cli::parse()
}
