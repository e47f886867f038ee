use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// In-memory overrides for generated or not-yet-saved files.
///
/// Workers consult this map instead of disk when reading a file's content.
/// The handle is cheap to clone and shared between the indexer and every
/// in-flight task.
#[derive(Debug, Clone, Default)]
pub struct GeneratedFiles {
    entries: Arc<RwLock<HashMap<PathBuf, Arc<str>>>>,
}

impl GeneratedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or replaces the in-memory content for `path`.
    pub fn update(&self, path: impl Into<PathBuf>, content: impl Into<Arc<str>>) {
        self.entries.write().insert(path.into(), content.into());
    }

    /// Removes the override for `path`; subsequent reads go back to disk.
    pub fn remove(&self, path: &Path) {
        self.entries.write().remove(path);
    }

    /// Returns the overridden content for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.entries.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_remove_round_trip() {
        let generated = GeneratedFiles::new();
        let path = Path::new("/virtual/gen.h");

        assert!(generated.get(path).is_none());

        generated.update(path, "def gen");
        assert_eq!(generated.get(path).as_deref(), Some("def gen"));
        assert!(generated.contains(path));

        generated.remove(path);
        assert!(generated.get(path).is_none());
    }

    #[test]
    fn clones_share_state() {
        let generated = GeneratedFiles::new();
        let clone = generated.clone();

        generated.update("/virtual/gen.h", "def gen");
        assert!(clone.contains(Path::new("/virtual/gen.h")));
    }
}
