use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;
use parking_lot::Mutex;

use lode_collect::{CollectorFactory, CollectorPool};
use lode_core::{FilePathId, ProjectPart};
use lode_scheduler::{
    IndexingTask, SchedulerConfig, TaskOutcome, TaskQueue, TaskScheduler,
};
use lode_store::SymbolStore;
use lode_vfs::{
    ChangeDebouncer, FileChangeKind, FileStatusCache, FileWatcher, GeneratedFiles, PathInterner,
    SharedPathInterner, WatchEvent, DEFAULT_QUIET_INTERVAL,
};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Concurrency limit handed to the scheduler and the collector pool.
    pub slots: usize,
    /// Quiet interval for coalescing watcher event bursts.
    pub debounce: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            slots: SchedulerConfig::default().slots,
            debounce: DEFAULT_QUIET_INTERVAL,
        }
    }
}

/// Background symbol indexer.
///
/// [`update_project_parts`](SymbolIndexer::update_project_parts) is the entry
/// point: it registers files, queues the new or modified ones and returns
/// once the work is enqueued. Collection, commits and watcher-triggered
/// re-indexing all happen on background threads; per-task results arrive on
/// [`outcomes`](SymbolIndexer::outcomes).
pub struct SymbolIndexer {
    interner: SharedPathInterner,
    status: Arc<FileStatusCache>,
    queue: Arc<TaskQueue>,
    generated: GeneratedFiles,
    store: Arc<SymbolStore>,
    scheduler: Arc<TaskScheduler>,
    parts: Arc<Mutex<HashMap<FilePathId, Arc<ProjectPart>>>>,
    watcher: Mutex<Box<dyn FileWatcher>>,
    driver_stop: channel::Sender<()>,
    driver: Option<std::thread::JoinHandle<()>>,
}

impl SymbolIndexer {
    pub fn new(
        config: IndexerConfig,
        watcher: Box<dyn FileWatcher>,
        collectors: CollectorFactory,
        store: Arc<SymbolStore>,
    ) -> Self {
        let slots = config.slots.max(1);
        let interner: SharedPathInterner =
            Arc::new(parking_lot::RwLock::new(PathInterner::new()));
        let status = Arc::new(FileStatusCache::new());
        let queue = Arc::new(TaskQueue::new());
        let generated = GeneratedFiles::new();
        let parts = Arc::new(Mutex::new(HashMap::new()));

        let scheduler = Arc::new(TaskScheduler::new(
            SchedulerConfig { slots },
            Arc::clone(&queue),
            Arc::new(CollectorPool::new(slots, collectors)),
            Arc::clone(&store),
            Arc::clone(&status),
            generated.clone(),
            Arc::clone(&interner),
        ));

        // The debouncer taps the watcher's event stream; the watcher itself
        // stays here so the watch set can grow on later project updates.
        let debouncer = ChangeDebouncer::spawn(watcher.receiver().clone(), config.debounce);
        let (driver_stop, stop_rx) = channel::bounded::<()>(0);
        let driver_state = WatchDriver {
            interner: Arc::clone(&interner),
            status: Arc::clone(&status),
            queue: Arc::clone(&queue),
            generated: generated.clone(),
            scheduler: Arc::clone(&scheduler),
            parts: Arc::clone(&parts),
        };
        let driver = std::thread::Builder::new()
            .name("lode-watch".into())
            .spawn(move || driver_state.run(debouncer, stop_rx))
            .expect("failed to spawn watch driver thread");

        Self {
            interner,
            status,
            queue,
            generated,
            store,
            scheduler,
            parts,
            watcher: Mutex::new(watcher),
            driver_stop,
            driver: Some(driver),
        }
    }

    /// Registers (or re-registers) project parts and queues indexing work for
    /// every referenced file that is new or has changed since its last
    /// successful commit. Returns once the work is enqueued; completion is
    /// observed via [`sync_tasks`](SymbolIndexer::sync_tasks) or
    /// [`outcomes`](SymbolIndexer::outcomes).
    pub fn update_project_parts(&self, parts: impl IntoIterator<Item = ProjectPart>) {
        let mut queued = 0usize;
        for part in parts {
            let part = Arc::new(part);
            for path in &part.files {
                let id = self.interner.write().intern(path);
                if let Err(err) = self.watcher.lock().watch_path(path) {
                    tracing::warn!(
                        target = "lode.indexer",
                        path = %path.display(),
                        error = %err,
                        "failed to watch file"
                    );
                }
                self.parts.lock().insert(id, Arc::clone(&part));

                // Overlay-backed files are re-queued through
                // `update_generated_files`, not by disk stats.
                let needs_indexing = if self.generated.contains(path) {
                    self.status.recorded(id).is_none()
                } else {
                    !self.status.is_unmodified(id, path)
                };
                if needs_indexing {
                    self.queue.push(IndexingTask {
                        file: id,
                        part: Arc::clone(&part),
                    });
                    queued += 1;
                }
            }
        }

        tracing::debug!(target = "lode.indexer", queued, "project parts updated");
        if queued > 0 {
            self.scheduler.schedule();
        }
    }

    /// Sets the in-memory content for a generated or unsaved file and queues
    /// a re-index if the file belongs to a known project part.
    pub fn update_generated_file(&self, path: impl Into<PathBuf>, content: impl Into<Arc<str>>) {
        let path = path.into();
        self.generated.update(path.clone(), content);
        self.requeue_if_tracked(&path);
    }

    /// Drops the in-memory override for `path`; the next collection reads
    /// from disk again.
    pub fn remove_generated_file(&self, path: &Path) {
        self.generated.remove(path);
        self.requeue_if_tracked(path);
    }

    fn requeue_if_tracked(&self, path: &Path) {
        let Some(id) = self.interner.read().get(path) else {
            return;
        };
        self.status.invalidate(id);
        let part = self.parts.lock().get(&id).cloned();
        if let Some(part) = part {
            self.queue.push(IndexingTask { file: id, part });
            self.scheduler.schedule();
        }
    }

    /// Blocks until every queued and in-flight task has completed.
    pub fn sync_tasks(&self) {
        self.scheduler.sync_tasks();
    }

    /// Stops dispatching new tasks; work already in flight still completes.
    pub fn disable(&self) {
        self.scheduler.disable();
    }

    /// Receiver of per-task completion reports.
    pub fn outcomes(&self) -> channel::Receiver<TaskOutcome> {
        self.scheduler.outcomes()
    }

    pub fn store(&self) -> &Arc<SymbolStore> {
        &self.store
    }

    /// The interned id for `path`, if the file has ever been registered.
    pub fn file_id(&self, path: &Path) -> Option<FilePathId> {
        self.interner.read().get(path)
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Number of tasks currently being collected.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }
}

impl Drop for SymbolIndexer {
    fn drop(&mut self) {
        // Shutdown sequence: no new dispatch, stop the watch driver, then
        // drain whatever is still in flight before collaborators go away.
        self.scheduler.disable();
        let _ = self.driver_stop.send(());
        if let Some(thread) = self.driver.take() {
            if thread.join().is_err() {
                tracing::debug!(target = "lode.indexer", "watch driver panicked during join");
            }
        }
        self.scheduler.sync_tasks();
    }
}

/// State shared with the watch driver thread.
struct WatchDriver {
    interner: SharedPathInterner,
    status: Arc<FileStatusCache>,
    queue: Arc<TaskQueue>,
    generated: GeneratedFiles,
    scheduler: Arc<TaskScheduler>,
    parts: Arc<Mutex<HashMap<FilePathId, Arc<ProjectPart>>>>,
}

impl WatchDriver {
    fn run(self, debouncer: ChangeDebouncer, stop_rx: channel::Receiver<()>) {
        loop {
            channel::select! {
                recv(stop_rx) -> _ => break,
                recv(debouncer.receiver()) -> msg => {
                    let Ok(msg) = msg else {
                        break;
                    };
                    match msg {
                        Ok(WatchEvent::Changes(changes)) => self.apply_changes(changes),
                        Ok(WatchEvent::Rescan) => self.rescan(),
                        Err(err) => {
                            // Lost events are indistinguishable from none;
                            // re-validate everything we track.
                            tracing::warn!(
                                target = "lode.indexer",
                                error = %err,
                                "watcher error, re-validating watched files"
                            );
                            self.rescan();
                        }
                    }
                }
            }
        }
    }

    fn apply_changes(&self, changes: Vec<lode_vfs::FileChange>) {
        let mut queued = 0usize;
        for change in changes {
            let id = self.interner.read().get(&change.path);
            let Some(id) = id else {
                continue;
            };

            match change.kind {
                FileChangeKind::Deleted => {
                    tracing::debug!(
                        target = "lode.indexer",
                        file = id.to_raw(),
                        path = %change.path.display(),
                        "watched file deleted"
                    );
                    self.status.invalidate(id);
                    self.queue.remove(id);
                }
                FileChangeKind::Created | FileChangeKind::Modified => {
                    self.status.invalidate(id);
                    let part = self.parts.lock().get(&id).cloned();
                    if let Some(part) = part {
                        self.queue.push(IndexingTask { file: id, part });
                        queued += 1;
                    }
                }
            }
        }

        if queued > 0 {
            tracing::debug!(target = "lode.indexer", queued, "queued watcher-triggered re-index");
            self.scheduler.schedule();
        }
    }

    /// Re-validates every tracked file against the status cache; used when
    /// the watcher reports lost events.
    fn rescan(&self) {
        let tracked: Vec<(FilePathId, Arc<ProjectPart>)> = self
            .parts
            .lock()
            .iter()
            .map(|(&id, part)| (id, Arc::clone(part)))
            .collect();

        let mut queued = 0usize;
        for (id, part) in tracked {
            let path = self.interner.read().path(id).map(PathBuf::from);
            let Some(path) = path else {
                continue;
            };
            let needs_indexing = if self.generated.contains(&path) {
                self.status.recorded(id).is_none()
            } else {
                !self.status.is_unmodified(id, &path)
            };
            if needs_indexing {
                self.queue.push(IndexingTask { file: id, part });
                queued += 1;
            }
        }

        tracing::debug!(target = "lode.indexer", queued, "rescan complete");
        if queued > 0 {
            self.scheduler.schedule();
        }
    }
}
