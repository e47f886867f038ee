use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use lode_core::{FilePathId, FileStatus};

/// Reads the current [`FileStatus`] of `path`, or `None` if it cannot be
/// stat'ed (missing file, permission error, ...).
pub fn stat_file(path: &Path) -> Option<FileStatus> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    Some(FileStatus::new(mtime, meta.len()))
}

/// Cheap change detection via cached mtimes and sizes.
///
/// Entries are created lazily on first query, refreshed after successful
/// indexing via [`update`](FileStatusCache::update) and dropped only on
/// explicit [`invalidate`](FileStatusCache::invalidate). Workers call
/// `update` after committing, so every entry mutation happens under one
/// mutex held only for the duration of the call.
#[derive(Debug, Default)]
pub struct FileStatusCache {
    entries: Mutex<HashMap<FilePathId, FileStatus>>,
}

impl FileStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares a live stat of `path` against the cached entry.
    ///
    /// Lazily populates a missing entry from the live stat and reports the
    /// file as modified in that case (nothing committed yet used this
    /// status). A stat failure also counts as modified, so the file is queued
    /// and the underlying error surfaces during collection.
    pub fn is_unmodified(&self, id: FilePathId, path: &Path) -> bool {
        let Some(current) = stat_file(path) else {
            return false;
        };

        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(cached) => *cached == current,
            None => {
                entries.insert(id, current);
                false
            }
        }
    }

    /// Records `status` as the snapshot the store now reflects for `id`.
    ///
    /// Called after a successful commit; never called when a commit fails, so
    /// the file stays eligible for re-indexing.
    pub fn update(&self, id: FilePathId, status: FileStatus) {
        self.entries.lock().insert(id, status);
    }

    /// Forces the next [`is_unmodified`](FileStatusCache::is_unmodified) call
    /// for `id` to report the file as modified.
    pub fn invalidate(&self, id: FilePathId) {
        self.entries.lock().remove(&id);
    }

    /// Returns the cached status for `id`, if any.
    pub fn recorded(&self, id: FilePathId) -> Option<FileStatus> {
        self.entries.lock().get(&id).copied()
    }
}
