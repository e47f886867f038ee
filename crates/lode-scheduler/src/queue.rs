use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use lode_core::{FilePathId, ProjectPart};

/// One unit of indexing work: re-collect `file` under `part`'s settings.
///
/// The project part is shared, never owned, so a thousand tasks against one
/// part cost a thousand pointers.
#[derive(Debug, Clone)]
pub struct IndexingTask {
    pub file: FilePathId,
    pub part: Arc<ProjectPart>,
}

/// Deduplicating, thread-safe holding area for pending indexing work.
///
/// Backed by an insertion-ordered map keyed by file id: pushing a task for a
/// file that is already queued replaces the stored project-part context in
/// place (keeping the original queue position), so the queue is bounded by
/// the number of distinct files rather than the number of update requests.
/// `pop` is FIFO relative to first push.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<IndexMap<FilePathId, IndexingTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `task`, replacing any pending task for the same file.
    pub fn push(&self, task: IndexingTask) {
        let mut tasks = self.tasks.lock();
        match tasks.entry(task.file) {
            indexmap::map::Entry::Occupied(mut entry) => {
                // Dedup-by-replace: newest compile context wins, position is
                // preserved.
                entry.insert(task);
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(task);
            }
        }
    }

    /// Pops the first pending task whose file passes `ready`.
    ///
    /// The scheduler uses the filter to skip files that are currently in
    /// flight, which keeps the "at most one pending-or-in-flight task per
    /// file" invariant intact without blocking unrelated work behind them.
    pub fn pop_ready(&self, ready: impl Fn(FilePathId) -> bool) -> Option<IndexingTask> {
        let mut tasks = self.tasks.lock();
        let index = tasks.keys().position(|&file| ready(file))?;
        tasks.shift_remove_index(index).map(|(_, task)| task)
    }

    /// Pops the first pending task in FIFO order.
    pub fn pop(&self) -> Option<IndexingTask> {
        self.pop_ready(|_| true)
    }

    /// Drops the pending task for `file`, if any.
    pub fn remove(&self, file: FilePathId) -> Option<IndexingTask> {
        self.tasks.lock().shift_remove(&file)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}
