//! Injected source of extra installable versions, consulted while
//! resolving version conflicts.
//!
//! Real implementations query a native package manager; the resolver only
//! awaits them, one conflict at a time.

use std::collections::{BTreeMap, HashMap};
use std::future::{ready, Future};

use toolgraph_core::manifest::ToolManifest;

pub trait PackageLookup {
    /// Versions of `manifest`'s tool installable beyond those it declares.
    fn available_versions(
        &self,
        manifest: &ToolManifest,
    ) -> impl Future<Output = miette::Result<Vec<String>>> + Send;
}

/// A lookup that never knows any extra versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl PackageLookup for NoLookup {
    fn available_versions(
        &self,
        _manifest: &ToolManifest,
    ) -> impl Future<Output = miette::Result<Vec<String>>> + Send {
        ready(Ok(Vec::new()))
    }
}

/// Versions from a fixed table, typically the `[native-versions]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    versions: HashMap<String, Vec<String>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            versions: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn with(mut self, tool: impl Into<String>, versions: &[&str]) -> Self {
        self.versions
            .entry(tool.into())
            .or_default()
            .extend(versions.iter().map(|v| v.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl PackageLookup for StaticLookup {
    fn available_versions(
        &self,
        manifest: &ToolManifest,
    ) -> impl Future<Output = miette::Result<Vec<String>>> + Send {
        ready(Ok(self.versions.get(&manifest.id).cloned().unwrap_or_default()))
    }
}
