//! Rules governing how detected conflicts may be eliminated automatically,
//! and how installation batches are laid out.

use serde::{Deserialize, Serialize};

/// Conflict-resolution policy, read from `[resolution]` in the global config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    #[serde(default)]
    pub automatic: AutomaticPolicy,
    #[serde(default)]
    pub versioning: VersioningPolicy,
    #[serde(default)]
    pub platform: PlatformPolicy,
}

impl ResolutionPolicy {
    pub fn allows(&self, action: ResolutionAction) -> bool {
        self.automatic.enabled && self.automatic.allowed_actions.contains(&action)
    }
}

/// An action the resolver may take against a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    /// Exclude optional/suggested edges from the plan.
    Defer,
    /// Pick another version or provider.
    Substitute,
    /// Record a platform workaround the user must confirm.
    Configure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutomaticPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_actions")]
    pub allowed_actions: Vec<ResolutionAction>,
}

impl Default for AutomaticPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_steps: default_max_steps(),
            allowed_actions: default_actions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_steps() -> usize {
    50
}

fn default_actions() -> Vec<ResolutionAction> {
    vec![
        ResolutionAction::Defer,
        ResolutionAction::Substitute,
        ResolutionAction::Configure,
    ]
}

/// How far a substituted version may stray from what was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersioningPolicy {
    #[serde(default = "default_true")]
    pub prefer_latest: bool,
    #[serde(default)]
    pub allow_major_upgrades: bool,
    #[serde(default)]
    pub allow_downgrades: bool,
    #[serde(default)]
    pub pinning: PinningStrategy,
}

impl Default for VersioningPolicy {
    fn default() -> Self {
        Self {
            prefer_latest: true,
            allow_major_upgrades: false,
            allow_downgrades: false,
            pinning: PinningStrategy::default(),
        }
    }
}

/// How a substituted version is recorded for the installer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinningStrategy {
    /// `=1.4.2`
    Exact,
    /// `~1.4.2`
    #[default]
    Minor,
    /// `^1.4.2`
    Major,
    /// No pin; the installer picks.
    None,
}

impl PinningStrategy {
    /// Render the requirement the installer should honour for `version`.
    pub fn pin(&self, version: &str) -> String {
        match self {
            PinningStrategy::Exact => format!("={version}"),
            PinningStrategy::Minor => format!("~{version}"),
            PinningStrategy::Major => format!("^{version}"),
            PinningStrategy::None => "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformPolicy {
    #[serde(default = "default_true")]
    pub use_alternatives: bool,
    #[serde(default)]
    pub allow_workarounds: bool,
    #[serde(default = "default_true")]
    pub prefer_native: bool,
}

impl Default for PlatformPolicy {
    fn default() -> Self {
        Self {
            use_alternatives: true,
            allow_workarounds: false,
            prefer_native: true,
        }
    }
}

/// Batch layout used when ordering an installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStrategy {
    /// Install every tool as early as its prerequisites allow.
    #[default]
    Eager,
    /// Install every tool as late as its dependents allow.
    Lazy,
    /// Like eager, but tools touched by unresolved conflicts get their own batch.
    ConflictAware,
}

impl std::str::FromStr for OrderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(OrderStrategy::Eager),
            "lazy" => Ok(OrderStrategy::Lazy),
            "conflict-aware" => Ok(OrderStrategy::ConflictAware),
            other => Err(format!(
                "unknown strategy '{other}' (expected eager, lazy, conflict-aware)"
            )),
        }
    }
}
