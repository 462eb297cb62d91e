use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dependency::{DependencyKind, DependencySpec};
use crate::platform::SystemRequirements;

/// Install-time estimate used when a manifest does not declare one.
pub const DEFAULT_INSTALL_SECS: u64 = 30;

/// The declarative description of one installable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolManifest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Version strings this tool can be installed at.
    #[serde(default)]
    pub versions: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    #[serde(default, alias = "systemRequirements")]
    pub system_requirements: SystemRequirements,

    /// Logical capabilities this tool satisfies (e.g. `python3`, `jdk`).
    #[serde(default)]
    pub provides: Vec<String>,

    /// Ids of tools that may stand in for this one.
    #[serde(default)]
    pub alternatives: Vec<String>,

    #[serde(default)]
    pub estimated_install_secs: Option<u64>,
}

impl ToolManifest {
    /// A minimal manifest with the required identity fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: None,
            versions: Vec::new(),
            dependencies: Vec::new(),
            system_requirements: SystemRequirements::default(),
            provides: Vec::new(),
            alternatives: Vec::new(),
            estimated_install_secs: None,
        }
    }

    pub fn with_dependency(mut self, dep: DependencySpec) -> Self {
        self.dependencies.push(dep);
        self
    }

    /// Names of the required identity fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.category.trim().is_empty() {
            missing.push("category");
        }
        missing
    }

    /// Declared dependencies of the given kind.
    pub fn dependencies_of_kind(&self, kind: DependencyKind) -> impl Iterator<Item = &DependencySpec> {
        self.dependencies.iter().filter(move |d| d.kind == kind)
    }

    pub fn install_secs(&self) -> u64 {
        self.estimated_install_secs.unwrap_or(DEFAULT_INSTALL_SECS)
    }
}

/// A collection of manifests loaded from one file.
///
/// TOML files list tools as `[[tool]]` tables; JSON files may be either a
/// bare array or an object with a `tool` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSet {
    #[serde(default, alias = "tools")]
    pub tool: Vec<ToolManifest>,
}

impl ManifestSet {
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            toolgraph_util::errors::ToolgraphError::Manifest {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_toml(&content)
        }
    }

    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            toolgraph_util::errors::ToolgraphError::Manifest {
                message: format!("Failed to parse manifest TOML: {e}"),
            }
            .into()
        })
    }

    pub fn parse_json(content: &str) -> miette::Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum JsonForm {
            Bare(Vec<ToolManifest>),
            Wrapped(ManifestSet),
        }

        let parsed: JsonForm = serde_json::from_str(content).map_err(|e| {
            toolgraph_util::errors::ToolgraphError::Manifest {
                message: format!("Failed to parse manifest JSON: {e}"),
            }
        })?;
        Ok(match parsed {
            JsonForm::Bare(tool) => Self { tool },
            JsonForm::Wrapped(set) => set,
        })
    }

    pub fn len(&self) -> usize {
        self.tool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tool.is_empty()
    }
}
