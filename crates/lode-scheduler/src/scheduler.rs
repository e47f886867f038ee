use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crossbeam_channel as channel;
use parking_lot::Mutex;
use rayon::ThreadPool;

use lode_collect::{CollectError, CollectorPool};
use lode_core::{panic_payload_to_str, FilePathId, FileStatus, IndexingResult};
use lode_store::{StoreError, SymbolStore};
use lode_vfs::{stat_file, FileStatusCache, GeneratedFiles, SharedPathInterner};

use crate::queue::{IndexingTask, TaskQueue};

/// Why one indexing task failed.
///
/// Per-task failures are reported individually on the outcome channel and
/// never halt the scheduler or other in-flight tasks.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("indexing worker panicked: {0}")]
    Panicked(String),
}

/// How a finished task left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDisposition {
    /// The result was committed and the file status cache advanced.
    Committed,
    /// The file changed while its old content was being collected; the
    /// result was discarded and nothing was written. The watcher or the next
    /// project-part update re-enqueues the file.
    Stale,
}

/// Per-task completion report delivered to the orchestrator.
#[derive(Debug)]
pub struct TaskOutcome {
    pub file: FilePathId,
    pub result: Result<TaskDisposition, IndexError>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrency limit: number of slots, worker threads and pooled
    /// collectors.
    pub slots: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        // Clamped to 1..=8; each slot also pins a collector instance.
        Self {
            slots: available.clamp(1, 8),
        }
    }
}

enum WorkerPool {
    Rayon(ThreadPool),
    Inline,
}

impl WorkerPool {
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            WorkerPool::Rayon(pool) => pool.spawn(job),
            WorkerPool::Inline => job(),
        }
    }
}

fn build_worker_pool(threads: usize) -> WorkerPool {
    // Thread creation can fail in constrained CI/sandbox environments (low
    // RLIMIT_NPROC, EAGAIN). Degrade to a smaller pool, and as a last resort
    // to inline execution, instead of failing startup.
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("lode-worker-{idx}"))
            .build()
        {
            Ok(pool) => return WorkerPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(_) => return WorkerPool::Inline,
        }
    }
}

struct Slot {
    file: FilePathId,
    done_rx: channel::Receiver<Result<TaskDisposition, IndexError>>,
}

/// The core scheduling state machine.
///
/// A fixed number of slots bounds concurrent indexing work. On every
/// scheduling opportunity (a task enqueued or a task finished) the scheduler
/// pops at most one task per free slot and dispatches it to the worker pool,
/// recording the in-flight work against the slot. Every worker completion
/// wakes a bookkeeping thread that releases finished slots, reports their
/// outcomes and refills the freed slots from the queue, so the pool stays
/// saturated without any external polling. [`sync_tasks`] drains without
/// busy-polling by blocking on the set of in-flight completions.
///
/// [`sync_tasks`]: TaskScheduler::sync_tasks
pub struct TaskScheduler {
    core: Arc<SchedulerCore>,
    refill_stop: channel::Sender<()>,
    refill: Option<std::thread::JoinHandle<()>>,
}

struct SchedulerCore {
    queue: Arc<TaskQueue>,
    collectors: Arc<CollectorPool>,
    store: Arc<SymbolStore>,
    status: Arc<FileStatusCache>,
    generated: GeneratedFiles,
    interner: SharedPathInterner,
    pool: WorkerPool,
    slots: Mutex<Vec<Option<Slot>>>,
    enabled: AtomicBool,
    outcome_tx: channel::Sender<TaskOutcome>,
    outcome_rx: channel::Receiver<TaskOutcome>,
    // Workers ping this after reporting; the refill thread reacts.
    completed_tx: channel::Sender<()>,
}

impl TaskScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        queue: Arc<TaskQueue>,
        collectors: Arc<CollectorPool>,
        store: Arc<SymbolStore>,
        status: Arc<FileStatusCache>,
        generated: GeneratedFiles,
        interner: SharedPathInterner,
    ) -> Self {
        let slots = config.slots.max(1);
        assert_eq!(
            collectors.size(),
            slots,
            "collector pool must provide one collector per scheduler slot"
        );

        let (outcome_tx, outcome_rx) = channel::unbounded();
        let (completed_tx, completed_rx) = channel::unbounded();
        let core = Arc::new(SchedulerCore {
            queue,
            collectors,
            store,
            status,
            generated,
            interner,
            pool: build_worker_pool(slots),
            slots: Mutex::new((0..slots).map(|_| None).collect()),
            enabled: AtomicBool::new(true),
            outcome_tx,
            outcome_rx,
            completed_tx,
        });

        let (refill_stop, stop_rx) = channel::bounded::<()>(0);
        let refill = std::thread::Builder::new()
            .name("lode-refill".into())
            .spawn({
                let core = Arc::clone(&core);
                move || run_refill_loop(&core, &completed_rx, &stop_rx)
            })
            .expect("failed to spawn scheduler refill thread");

        Self {
            core,
            refill_stop,
            refill: Some(refill),
        }
    }

    /// Receiver of per-task completion reports.
    pub fn outcomes(&self) -> channel::Receiver<TaskOutcome> {
        self.core.outcome_rx.clone()
    }

    /// Number of tasks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.core.in_flight()
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    /// Stops new dispatch. Futures already running are unaffected; pending
    /// queue entries stay queued and are never dispatched.
    pub fn disable(&self) {
        self.core.disable();
    }

    /// Releases finished slots, then dispatches queued tasks into the free
    /// ones, one task per slot.
    ///
    /// Called by producers after enqueueing; the refill thread runs the same
    /// pass after every worker completion.
    pub fn schedule(&self) {
        self.core.schedule();
    }

    /// Releases every slot whose task has finished and reports the outcomes.
    ///
    /// Returns the number of slots freed.
    pub fn free_slots(&self) -> usize {
        self.core.free_slots()
    }

    /// Blocks until no tracked work remains.
    ///
    /// While dispatch is enabled this drains the queue completely; after
    /// [`disable`](TaskScheduler::disable) it only waits for tasks already
    /// in flight. Waiting uses a blocking select over the in-flight
    /// completion channels, so no cycles are burned polling.
    pub fn sync_tasks(&self) {
        self.core.sync_tasks();
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Shutdown sequence: stop dispatch, drain until no worker holds a
        // reference to the collector pool or the store, then stop the refill
        // thread.
        self.core.disable();
        self.core.sync_tasks();
        let _ = self.refill_stop.send(());
        if let Some(thread) = self.refill.take() {
            if thread.join().is_err() {
                tracing::debug!(target = "lode.scheduler", "refill thread panicked during join");
            }
        }
    }
}

fn run_refill_loop(
    core: &SchedulerCore,
    completed_rx: &channel::Receiver<()>,
    stop_rx: &channel::Receiver<()>,
) {
    loop {
        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(completed_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                core.schedule();
            }
        }
    }
}

impl SchedulerCore {
    fn in_flight(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        tracing::debug!(target = "lode.scheduler", "dispatch disabled");
    }

    fn schedule(&self) {
        self.free_slots();
        if !self.is_enabled() {
            return;
        }

        let mut slots = self.slots.lock();
        for index in 0..slots.len() {
            if slots[index].is_some() {
                continue;
            }

            // Never run two collections for the same file concurrently: a
            // task whose file is in flight stays queued until the slot
            // holding it frees.
            let task = {
                let in_flight: Vec<FilePathId> =
                    slots.iter().flatten().map(|slot| slot.file).collect();
                self.queue.pop_ready(|file| !in_flight.contains(&file))
            };
            let Some(task) = task else {
                break;
            };

            slots[index] = Some(self.dispatch(task));
        }
    }

    fn dispatch(&self, task: IndexingTask) -> Slot {
        let file = task.file;
        let path = self
            .interner
            .read()
            .path(file)
            .map(PathBuf::from)
            .unwrap_or_else(|| panic!("dispatching task for unknown file id {}", file.to_raw()));

        tracing::debug!(
            target = "lode.scheduler",
            file = file.to_raw(),
            path = %path.display(),
            part = task.part.id.as_str(),
            "dispatching indexing task"
        );

        let (done_tx, done_rx) = channel::bounded(1);
        let collectors = Arc::clone(&self.collectors);
        let store = Arc::clone(&self.store);
        let status = Arc::clone(&self.status);
        let generated = self.generated.clone();
        let completed = self.completed_tx.clone();

        self.pool.spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run_task(&task, &path, &collectors, &store, &status, &generated)
            }))
            .unwrap_or_else(|panic| {
                let message = panic_payload_to_str(&*panic).to_string();
                tracing::error!(
                    target = "lode.scheduler",
                    file = file.to_raw(),
                    panic = %message,
                    "indexing task panicked"
                );
                Err(IndexError::Panicked(message))
            });

            // A failed file must stay flagged as modified so the next
            // project update retries it.
            if result.is_err() {
                status.invalidate(file);
            }

            // The receiver only disappears if the scheduler itself is torn
            // down mid-drain, which the shutdown sequence prevents.
            let _ = done_tx.send(result);
            let _ = completed.send(());
        });

        Slot { file, done_rx }
    }

    fn free_slots(&self) -> usize {
        let mut freed = 0;
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            let Some(in_flight) = slot.as_ref() else {
                continue;
            };
            match in_flight.done_rx.try_recv() {
                Ok(result) => {
                    let file = in_flight.file;
                    if let Err(err) = &result {
                        tracing::warn!(
                            target = "lode.scheduler",
                            file = file.to_raw(),
                            error = %err,
                            "indexing task failed"
                        );
                    }
                    let _ = self.outcome_tx.send(TaskOutcome { file, result });
                    *slot = None;
                    freed += 1;
                }
                Err(channel::TryRecvError::Empty) => {}
                Err(channel::TryRecvError::Disconnected) => {
                    panic!("indexing worker dropped its completion channel without reporting");
                }
            }
        }
        freed
    }

    fn sync_tasks(&self) {
        loop {
            self.schedule();

            let pending: Vec<channel::Receiver<Result<TaskDisposition, IndexError>>> = self
                .slots
                .lock()
                .iter()
                .flatten()
                .map(|slot| slot.done_rx.clone())
                .collect();

            if pending.is_empty() {
                // With dispatch enabled an empty slot table means the queue
                // is empty too (schedule above would have filled it).
                break;
            }

            let mut select = channel::Select::new();
            for rx in &pending {
                select.recv(rx);
            }
            // The message stays in the channel (or the channel is already
            // disconnected after the refill thread consumed it); either way
            // the next free_slots pass settles the slot.
            select.ready();
        }
    }
}

fn run_task(
    task: &IndexingTask,
    path: &std::path::Path,
    collectors: &CollectorPool,
    store: &SymbolStore,
    status: &FileStatusCache,
    generated: &GeneratedFiles,
) -> Result<TaskDisposition, IndexError> {
    let overlay = generated.get(path);
    let (source, snapshot) = match &overlay {
        Some(text) => {
            // Generated content is the source of truth; synthesize a status
            // from it when the file has no on-disk presence.
            let snapshot = stat_file(path)
                .unwrap_or_else(|| FileStatus::new(UNIX_EPOCH, text.len() as u64));
            (Arc::clone(text), snapshot)
        }
        None => {
            let snapshot = stat_file(path).ok_or_else(|| {
                CollectError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot stat {}", path.display()),
                ))
            })?;
            let text = std::fs::read_to_string(path).map_err(CollectError::Io)?;
            (Arc::from(text.as_str()), snapshot)
        }
    };

    let collected = {
        let mut collector = collectors.acquire();
        collector.collect(task.file, &source, &task.part)?
    };

    // Discard results whose input changed under the collection; committing
    // them would record symbols the file no longer contains. The file stays
    // flagged as modified, so the next update or watcher event re-runs it.
    if overlay.is_none() && stat_file(path) != Some(snapshot) {
        tracing::debug!(
            target = "lode.scheduler",
            file = task.file.to_raw(),
            "discarding stale indexing result"
        );
        return Ok(TaskDisposition::Stale);
    }

    store.commit(&IndexingResult {
        file: task.file,
        status: snapshot,
        collected,
    })?;
    status.update(task.file, snapshot);

    Ok(TaskDisposition::Committed)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::time::{Duration, Instant};

    use lode_collect::testing::{GatedCollector, ScriptCollector};
    use lode_collect::CollectorFactory;
    use lode_core::ProjectPart;
    use lode_vfs::PathInterner;

    struct Fixture {
        _dir: tempfile::TempDir,
        dir_path: PathBuf,
        queue: Arc<TaskQueue>,
        store: Arc<SymbolStore>,
        status: Arc<FileStatusCache>,
        generated: GeneratedFiles,
        interner: SharedPathInterner,
        part: Arc<ProjectPart>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let dir_path = dir.path().to_path_buf();
            Self {
                _dir: dir,
                dir_path,
                queue: Arc::new(TaskQueue::new()),
                store: Arc::new(SymbolStore::open_in_memory().unwrap()),
                status: Arc::new(FileStatusCache::new()),
                generated: GeneratedFiles::new(),
                interner: Arc::new(parking_lot::RwLock::new(PathInterner::new())),
                part: Arc::new(ProjectPart::new("test.part")),
            }
        }

        fn scheduler(&self, slots: usize, factory: CollectorFactory) -> TaskScheduler {
            self.scheduler_with_pool(slots, Arc::new(CollectorPool::new(slots, factory)))
        }

        fn scheduler_with_pool(&self, slots: usize, pool: Arc<CollectorPool>) -> TaskScheduler {
            TaskScheduler::new(
                SchedulerConfig { slots },
                Arc::clone(&self.queue),
                pool,
                Arc::clone(&self.store),
                Arc::clone(&self.status),
                self.generated.clone(),
                Arc::clone(&self.interner),
            )
        }

        fn add_file(&self, name: &str, content: &str) -> FilePathId {
            let path = self.dir_path.join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(content.as_bytes()).unwrap();
            self.interner.write().intern(path)
        }

        fn enqueue(&self, file: FilePathId) {
            self.queue.push(IndexingTask {
                file,
                part: Arc::clone(&self.part),
            });
        }

        fn path_of(&self, file: FilePathId) -> PathBuf {
            self.interner.read().path(file).unwrap().to_path_buf()
        }
    }

    fn script_factory() -> CollectorFactory {
        Box::new(|| Box::new(ScriptCollector::new()))
    }

    #[test]
    fn default_slot_count_is_clamped() {
        let slots = SchedulerConfig::default().slots;
        assert!((1..=8).contains(&slots));
    }

    #[test]
    fn drains_queue_and_commits_results() {
        let fixture = Fixture::new();
        let a = fixture.add_file("a.src", "def alpha\n");
        let b = fixture.add_file("b.src", "def beta\nref alpha\n");

        let scheduler = fixture.scheduler(2, script_factory());
        fixture.enqueue(a);
        fixture.enqueue(b);
        scheduler.schedule();
        scheduler.sync_tasks();

        assert_eq!(scheduler.in_flight(), 0);
        assert!(fixture.queue.is_empty());
        assert_eq!(fixture.store.locations_in_file(a).unwrap().len(), 1);
        assert_eq!(fixture.store.locations_in_file(b).unwrap().len(), 2);

        let outcomes: Vec<_> = scheduler.outcomes().try_iter().collect();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Ok(TaskDisposition::Committed))));
    }

    #[test]
    fn single_slot_processes_many_tasks() {
        let fixture = Fixture::new();
        let files: Vec<_> = (0..6)
            .map(|i| fixture.add_file(&format!("f{i}.src"), &format!("def sym{i}\n")))
            .collect();

        let scheduler = fixture.scheduler(1, script_factory());
        for &file in &files {
            fixture.enqueue(file);
        }
        scheduler.schedule();
        scheduler.sync_tasks();

        for &file in &files {
            assert_eq!(fixture.store.locations_in_file(file).unwrap().len(), 1);
        }
    }

    #[test]
    fn completions_refill_slots_without_external_calls() {
        let fixture = Fixture::new();
        let files: Vec<_> = (0..3)
            .map(|i| fixture.add_file(&format!("f{i}.src"), &format!("def sym{i}\n")))
            .collect();

        let scheduler = fixture.scheduler(1, script_factory());
        for &file in &files {
            fixture.enqueue(file);
        }
        // One scheduling pass, then only the outcome channel: every task
        // beyond the first must be dispatched by the completion of its
        // predecessor, never by another schedule/sync call from here.
        scheduler.schedule();

        let rx = scheduler.outcomes();
        for _ in 0..files.len() {
            let outcome = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("outcome never delivered");
            assert!(matches!(outcome.result, Ok(TaskDisposition::Committed)));
        }

        assert!(fixture.queue.is_empty());
        for &file in &files {
            assert_eq!(fixture.store.locations_in_file(file).unwrap().len(), 1);
        }
    }

    #[test]
    fn in_flight_never_exceeds_slot_count() {
        let fixture = Fixture::new();
        let (gate_tx, gate_rx) = channel::unbounded::<()>();

        let files: Vec<_> = (0..5)
            .map(|i| fixture.add_file(&format!("f{i}.src"), "def sym\n"))
            .collect();

        let scheduler = fixture.scheduler(2, {
            let gate_rx = gate_rx.clone();
            Box::new(move || Box::new(GatedCollector::new(gate_rx.clone())))
        });
        for &file in &files {
            fixture.enqueue(file);
        }
        scheduler.schedule();

        assert_eq!(scheduler.in_flight(), 2);
        assert_eq!(fixture.queue.len(), 3);

        // Releasing one task frees its slot and the refill thread pulls in
        // the next file; the concurrency bound holds throughout.
        gate_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while fixture.queue.len() != 2 {
            assert!(Instant::now() < deadline, "freed slot was never refilled");
            assert!(scheduler.in_flight() <= 2);
            std::thread::yield_now();
        }
        assert!(scheduler.in_flight() <= 2);

        // Open the gate for everyone and drain.
        drop(gate_tx);
        scheduler.sync_tasks();
        assert_eq!(scheduler.in_flight(), 0);
        assert!(fixture.queue.is_empty());
    }

    #[test]
    fn disable_stops_dispatch_but_not_running_tasks() {
        let fixture = Fixture::new();
        let (gate_tx, gate_rx) = channel::unbounded::<()>();

        let files: Vec<_> = (0..8)
            .map(|i| fixture.add_file(&format!("f{i}.src"), "def sym\n"))
            .collect();

        let scheduler = fixture.scheduler(3, {
            let gate_rx = gate_rx.clone();
            Box::new(move || Box::new(GatedCollector::new(gate_rx.clone())))
        });
        for &file in &files {
            fixture.enqueue(file);
        }
        scheduler.schedule();
        assert_eq!(scheduler.in_flight(), 3);
        assert_eq!(fixture.queue.len(), 5);

        scheduler.disable();
        drop(gate_tx);
        scheduler.sync_tasks();

        // The three in-flight tasks ran to completion; the five pending were
        // never dispatched.
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(fixture.queue.len(), 5);
        let outcomes: Vec<_> = scheduler.outcomes().try_iter().collect();
        assert_eq!(outcomes.len(), 3);
    }

    #[test]
    fn never_runs_two_collections_for_the_same_file() {
        let fixture = Fixture::new();
        let (gate_tx, gate_rx) = channel::unbounded::<()>();

        let file = fixture.add_file("a.src", "def alpha\n");

        let scheduler = fixture.scheduler(2, {
            let gate_rx = gate_rx.clone();
            Box::new(move || Box::new(GatedCollector::new(gate_rx.clone())))
        });
        fixture.enqueue(file);
        scheduler.schedule();
        assert_eq!(scheduler.in_flight(), 1);

        // A second request for the in-flight file stays queued even though a
        // slot is free.
        fixture.enqueue(file);
        scheduler.schedule();
        assert_eq!(scheduler.in_flight(), 1);
        assert_eq!(fixture.queue.len(), 1);

        drop(gate_tx);
        scheduler.sync_tasks();
        assert!(fixture.queue.is_empty());
        assert_eq!(scheduler.outcomes().try_iter().count(), 2);
    }

    #[test]
    fn collect_failure_is_reported_and_leaves_file_modified() {
        let fixture = Fixture::new();
        let good = fixture.add_file("good.src", "def alpha\n");
        let bad = fixture.add_file("bad.src", "!error broken\n");

        // Populate the cache the way a project update does, so the failure
        // path has an entry to discard.
        assert!(!fixture.status.is_unmodified(bad, &fixture.path_of(bad)));
        assert!(fixture.status.recorded(bad).is_some());

        let scheduler = fixture.scheduler(2, script_factory());
        fixture.enqueue(good);
        fixture.enqueue(bad);
        scheduler.schedule();
        scheduler.sync_tasks();

        let outcomes: Vec<_> = scheduler.outcomes().try_iter().collect();
        assert_eq!(outcomes.len(), 2);

        let bad_outcome = outcomes.iter().find(|o| o.file == bad).unwrap();
        assert!(matches!(
            bad_outcome.result,
            Err(IndexError::Collect(CollectError::Parse(_)))
        ));

        // The failure dropped the cache entry, so the file stays flagged as
        // modified and eligible for retry; the good one is committed
        // regardless.
        assert!(fixture.status.recorded(bad).is_none());
        assert!(!fixture.status.is_unmodified(bad, &fixture.path_of(bad)));
        assert!(fixture.status.recorded(good).is_some());
        assert_eq!(fixture.store.locations_in_file(good).unwrap().len(), 1);
        assert!(fixture.store.locations_in_file(bad).unwrap().is_empty());
    }

    #[test]
    fn missing_file_fails_with_io_error() {
        let fixture = Fixture::new();
        let missing = fixture
            .interner
            .write()
            .intern(fixture.dir_path.join("missing.src"));

        let scheduler = fixture.scheduler(1, script_factory());
        fixture.enqueue(missing);
        scheduler.schedule();
        scheduler.sync_tasks();

        let outcome = scheduler.outcomes().try_iter().next().unwrap();
        assert!(matches!(
            outcome.result,
            Err(IndexError::Collect(CollectError::Io(_)))
        ));
    }

    #[test]
    fn stale_result_is_discarded_not_committed() {
        let fixture = Fixture::new();
        let (gate_tx, gate_rx) = channel::unbounded::<()>();

        let file = fixture.add_file("a.src", "def alpha\n");

        let pool = Arc::new(CollectorPool::new(1, {
            let gate_rx = gate_rx.clone();
            Box::new(move || Box::new(GatedCollector::new(gate_rx.clone())))
        }));
        let scheduler = fixture.scheduler_with_pool(1, Arc::clone(&pool));
        fixture.enqueue(file);
        scheduler.schedule();
        assert_eq!(scheduler.in_flight(), 1);

        // The worker checks its collector out only after reading the file, so
        // once the pool is empty the old content is captured.
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.idle() > 0 {
            assert!(Instant::now() < deadline, "worker never started");
            std::thread::yield_now();
        }

        // Rewrite the file while its old content sits in the collector.
        let path = fixture.path_of(file);
        let mut handle = std::fs::File::create(&path).unwrap();
        handle.write_all(b"def alpha\ndef beta\n").unwrap();
        drop(handle);

        drop(gate_tx);
        scheduler.sync_tasks();

        let outcome = scheduler.outcomes().try_iter().next().unwrap();
        assert!(matches!(outcome.result, Ok(TaskDisposition::Stale)));
        assert!(fixture.store.locations_in_file(file).unwrap().is_empty());
        assert!(fixture.status.recorded(file).is_none());
    }

    #[test]
    fn generated_override_is_collected_instead_of_disk() {
        let fixture = Fixture::new();
        let path = fixture.dir_path.join("gen.src");
        let file = fixture.interner.write().intern(&path);
        fixture.generated.update(&path, "def generated\n");

        let scheduler = fixture.scheduler(1, script_factory());
        fixture.enqueue(file);
        scheduler.schedule();
        scheduler.sync_tasks();

        let outcome = scheduler.outcomes().try_iter().next().unwrap();
        assert!(matches!(outcome.result, Ok(TaskDisposition::Committed)));

        let symbols = fixture.store.symbols_named("generated").unwrap();
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn drop_drains_in_flight_work() {
        let fixture = Fixture::new();
        let (gate_tx, gate_rx) = channel::unbounded::<()>();
        let file = fixture.add_file("a.src", "def alpha\n");

        let scheduler = fixture.scheduler(1, {
            let gate_rx = gate_rx.clone();
            Box::new(move || Box::new(GatedCollector::new(gate_rx.clone())))
        });
        fixture.enqueue(file);
        scheduler.schedule();
        drop(gate_tx);
        drop(scheduler);

        // The worker finished before the scheduler tore down its
        // collaborators.
        assert_eq!(fixture.store.locations_in_file(file).unwrap().len(), 1);
    }
}
