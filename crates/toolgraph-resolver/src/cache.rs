//! Manifest cache kept alongside a built graph.
//!
//! Bulk construction fills it once; incremental additions and removals
//! consult it so that edges to and from a newly added tool follow the same
//! rules as a full rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use toolgraph_core::manifest::ToolManifest;

/// Validated manifests by tool id, remembering insertion order.
#[derive(Debug, Clone, Default)]
pub struct ManifestCache {
    by_id: HashMap<String, Arc<ToolManifest>>,
    order: Vec<String>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a manifest. Returns `false` if the id was already cached.
    pub fn insert(&mut self, manifest: impl Into<Arc<ToolManifest>>) -> bool {
        let manifest = manifest.into();
        if self.by_id.contains_key(&manifest.id) {
            return false;
        }
        self.order.push(manifest.id.clone());
        self.by_id.insert(manifest.id.clone(), manifest);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ToolManifest>> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<ToolManifest>> {
        let removed = self.by_id.remove(id)?;
        self.order.retain(|o| o != id);
        Some(removed)
    }

    /// Manifests in the order they were cached.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolManifest>> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Cached manifests that declare a dependency on `id`.
    pub fn declaring_dependency_on<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Arc<ToolManifest>> + 'a {
        self.iter()
            .filter(move |m| m.id != id && m.dependencies.iter().any(|d| d.tool == id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgraph_core::dependency::DependencySpec;

    #[test]
    fn insert_tracking() {
        let mut cache = ManifestCache::new();
        assert!(cache.insert(ToolManifest::new("git", "Git", "vcs")));
        assert!(!cache.insert(ToolManifest::new("git", "Git 2", "vcs")));
        assert_eq!(cache.get("git").unwrap().name, "Git");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut cache = ManifestCache::new();
        for id in ["zsh", "bash", "fish"] {
            cache.insert(ToolManifest::new(id, id, "shell"));
        }
        cache.remove("bash");
        let ids: Vec<&str> = cache.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["zsh", "fish"]);
    }

    #[test]
    fn finds_declaring_manifests() {
        let mut cache = ManifestCache::new();
        cache.insert(
            ToolManifest::new("app", "App", "cli").with_dependency(DependencySpec::required("lib")),
        );
        cache.insert(ToolManifest::new("other", "Other", "cli"));
        let ids: Vec<&str> = cache
            .declaring_dependency_on("lib")
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["app"]);
    }
}
