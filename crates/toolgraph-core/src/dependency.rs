use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// A dependency declared by a tool manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencySpec {
    /// Id of the tool depended upon.
    #[serde(alias = "tool-id", alias = "toolId")]
    pub tool: String,
    #[serde(default, alias = "type")]
    pub kind: DependencyKind,
    #[serde(flatten)]
    pub constraint: VersionConstraint,
    /// Platforms this dependency applies to. Empty means all platforms.
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

impl DependencySpec {
    /// A required dependency on `tool` with no version constraint.
    pub fn required(tool: impl Into<String>) -> Self {
        Self::new(tool, DependencyKind::Required)
    }

    pub fn new(tool: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            tool: tool.into(),
            kind,
            constraint: VersionConstraint::default(),
            platforms: Vec::new(),
        }
    }

    pub fn applies_to(&self, platform: Platform) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&platform)
    }
}

/// Relationship between a tool and one of its declared dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    #[serde(alias = "suggested")]
    Suggests,
    /// The two tools must not be installed together. Never becomes a graph edge.
    Conflicts,
}

impl DependencyKind {
    /// Installation priority of the relationship, out of 100.
    pub fn priority(&self) -> u32 {
        match self {
            DependencyKind::Required => 100,
            DependencyKind::Optional => 50,
            DependencyKind::Suggests => 25,
            DependencyKind::Conflicts => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Required => "required",
            DependencyKind::Optional => "optional",
            DependencyKind::Suggests => "suggests",
            DependencyKind::Conflicts => "conflicts",
        }
    }
}

impl Default for DependencyKind {
    fn default() -> Self {
        Self::Required
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw version requirements attached to a dependency.
///
/// `min_version` and `max_version` are inclusive bounds; `version_range`
/// uses semver requirement syntax (`^1.2`, `>=1.0, <2.0`, `~3.4`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersionConstraint {
    #[serde(default, alias = "minVersion", skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    #[serde(default, alias = "maxVersion", skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
    #[serde(default, alias = "versionRange", skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,
}

impl VersionConstraint {
    pub fn is_unconstrained(&self) -> bool {
        self.min_version.is_none() && self.max_version.is_none() && self.version_range.is_none()
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref min) = self.min_version {
            parts.push(format!(">={min}"));
        }
        if let Some(ref max) = self.max_version {
            parts.push(format!("<={max}"));
        }
        if let Some(ref range) = self.version_range {
            parts.push(range.clone());
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
