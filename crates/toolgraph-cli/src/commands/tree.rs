//! Handler for `toolgraph tree`.

use std::path::PathBuf;

use miette::Result;

use toolgraph_core::config::GlobalConfig;
use toolgraph_ops::ops_tree::{self, TreeOptions};

pub fn exec(
    manifests: &[PathBuf],
    config: &GlobalConfig,
    targets: Vec<String>,
    depth: Option<usize>,
    why: Option<String>,
    conflicts: bool,
) -> Result<()> {
    let opts = TreeOptions {
        targets,
        depth,
        why,
        conflicts,
    };
    print!("{}", ops_tree::tree(manifests, config, &opts)?);
    Ok(())
}
