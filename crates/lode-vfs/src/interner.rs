use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lode_core::FilePathId;

/// Allocates stable [`FilePathId`]s for paths and supports reverse lookup.
///
/// Ids are unique per path and valid for the process lifetime; the interner
/// never forgets a path.
#[derive(Debug, Default)]
pub struct PathInterner {
    path_to_id: HashMap<PathBuf, FilePathId>,
    id_to_path: Vec<PathBuf>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stable id for `path`, allocating a new one if necessary.
    pub fn intern(&mut self, path: impl Into<PathBuf>) -> FilePathId {
        let path = path.into();
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }

        let raw = u32::try_from(self.id_to_path.len()).expect("too many file path ids allocated");
        let id = FilePathId::from_raw(raw);
        self.id_to_path.push(path.clone());
        self.path_to_id.insert(path, id);
        id
    }

    /// Returns the id for `path` if it has been interned.
    pub fn get(&self, path: &Path) -> Option<FilePathId> {
        self.path_to_id.get(path).copied()
    }

    /// Returns the path for `id`.
    pub fn path(&self, id: FilePathId) -> Option<&Path> {
        self.id_to_path.get(id.to_raw() as usize).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.id_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_path.is_empty()
    }
}
