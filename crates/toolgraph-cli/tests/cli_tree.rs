use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[allow(deprecated)]
fn toolgraph_cmd(tmp: &Path) -> Command {
    let mut cmd = Command::cargo_bin("toolgraph").unwrap();
    cmd.current_dir(tmp)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(tmp.join("config.toml"))
        .args(["--platform", "linux", "--arch", "x64"]);
    cmd
}

const TOOLS: &str = r#"
[[tool]]
id = "ide"
name = "IDE"
category = "editor"
dependencies = [{ tool = "node" }, { tool = "git" }]

[[tool]]
id = "node"
name = "Node.js"
category = "runtime"
dependencies = [{ tool = "openssl" }]

[[tool]]
id = "git"
name = "Git"
category = "vcs"

[[tool]]
id = "openssl"
name = "OpenSSL"
category = "library"
"#;

#[test]
fn test_tree_prints_roots() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("tools.toml"), TOOLS).unwrap();

    toolgraph_cmd(tmp.path())
        .args(["tree", "tools.toml"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("ide\n"))
        .stdout(predicate::str::contains("├── git"))
        .stdout(predicate::str::contains("└── node"))
        .stdout(predicate::str::contains("    └── openssl"));
}

#[test]
fn test_tree_depth() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("tools.toml"), TOOLS).unwrap();

    toolgraph_cmd(tmp.path())
        .args(["tree", "tools.toml", "--depth", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("openssl").not());
}

#[test]
fn test_tree_why() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("tools.toml"), TOOLS).unwrap();

    toolgraph_cmd(tmp.path())
        .args(["tree", "tools.toml", "--why", "openssl"])
        .assert()
        .success()
        .stdout(predicate::str::diff("Path to openssl:\nide\n  node\n    openssl\n"));
}

#[test]
fn test_tree_conflicts() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("tools.toml"), TOOLS).unwrap();

    toolgraph_cmd(tmp.path())
        .args(["tree", "tools.toml", "--conflicts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conflicts."));
}
