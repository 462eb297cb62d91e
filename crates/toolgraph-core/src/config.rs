use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::platform::{Architecture, Platform, TargetPlatform};
use crate::policy::{OrderStrategy, ResolutionPolicy};

/// Global user configuration loaded from `~/.toolgraph/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub order: OrderConfig,

    #[serde(default)]
    pub resolution: ResolutionPolicy,

    /// Extra installable versions per tool id, as a native package manager would report them.
    #[serde(default, rename = "native-versions")]
    pub native_versions: BTreeMap<String, Vec<String>>,
}

/// Graph construction settings from `[build]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    #[serde(default)]
    pub include_optional: bool,
    #[serde(default)]
    pub include_suggested: bool,
    #[serde(default = "default_validate")]
    pub validate: bool,
    #[serde(default = "default_max_fan_out")]
    pub max_fan_out: usize,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub arch: Option<Architecture>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            include_optional: false,
            include_suggested: false,
            validate: default_validate(),
            max_fan_out: default_max_fan_out(),
            platform: None,
            arch: None,
        }
    }
}

impl BuildConfig {
    /// The configured target, with unset halves filled from the host.
    pub fn target(&self) -> TargetPlatform {
        let host = TargetPlatform::current();
        TargetPlatform {
            platform: self.platform.unwrap_or(host.platform),
            arch: self.arch.unwrap_or(host.arch),
        }
    }
}

fn default_validate() -> bool {
    true
}

fn default_max_fan_out() -> usize {
    25
}

/// Installation ordering settings from `[order]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderConfig {
    #[serde(default)]
    pub strategy: OrderStrategy,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            strategy: OrderStrategy::default(),
            max_iterations: default_max_iterations(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_iterations() -> usize {
    10_000
}

fn default_timeout_secs() -> u64 {
    30
}

impl GlobalConfig {
    /// Load the global configuration from `~/.toolgraph/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from an explicit path, or return defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                toolgraph_util::errors::ToolgraphError::Config {
                    message: format!("Failed to read {}: {e}", path.display()),
                }
            })?;
            Self::from_toml_str(&content)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            toolgraph_util::errors::ToolgraphError::Config {
                message: format!("Failed to parse global config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the toolgraph data directory (`~/.toolgraph/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".toolgraph")
}
