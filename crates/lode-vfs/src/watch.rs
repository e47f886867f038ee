//! File watching.
//!
//! Lode watches the set of currently-indexed files for create/modify/delete
//! notifications. Backends normalize their native events into the small
//! [`FileChange`] model; consumers drain the [`FileWatcher::receiver`]
//! stream, usually through a [`crate::ChangeDebouncer`].
//!
//! Tests should never rely on real OS watcher timing: use
//! [`ManualFileWatcher`] and inject events deterministically.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;

use crate::change::FileChange;

/// An event produced by a file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// One or more normalized file changes. Backends may batch changes.
    Changes(Vec<FileChange>),
    /// The watcher dropped events due to overflow; consumers should re-stat
    /// every watched file.
    Rescan,
}

impl WatchEvent {
    pub fn changes(&self) -> &[FileChange] {
        match self {
            WatchEvent::Changes(changes) => changes,
            WatchEvent::Rescan => &[],
        }
    }
}

/// Message type delivered by a [`FileWatcher`].
///
/// Backends may surface errors asynchronously; these arrive on the same
/// stream as events.
pub type WatchMessage = io::Result<WatchEvent>;

/// Event-driven watcher abstraction over a set of watched file paths.
///
/// Watch-set changes are idempotent: watching an already-watched path or
/// unwatching an unknown one is a no-op.
pub trait FileWatcher: Send {
    /// Begin watching `path` for changes.
    fn watch_path(&mut self, path: &Path) -> io::Result<()>;

    /// Stop watching `path`.
    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    /// Returns the receiver used to consume watcher events.
    fn receiver(&self) -> &channel::Receiver<WatchMessage>;

    /// Drains all currently pending events without blocking.
    fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let mut out = Vec::new();
        for msg in self.receiver().try_iter() {
            out.push(msg?);
        }
        Ok(out)
    }
}

impl<W: ?Sized + FileWatcher> FileWatcher for Box<W> {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().watch_path(path)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().unwatch_path(path)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        self.as_ref().receiver()
    }
}

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 1024;

/// Deterministic watcher implementation for tests.
///
/// Does not interact with the OS; callers inject events via
/// [`ManualFileWatcher::push`] or a [`ManualFileWatcherHandle`]. The queue is
/// bounded; injection returns `WouldBlock` when it is full.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    watched: HashSet<PathBuf>,
}

/// Cloneable handle for injecting events into a [`ManualFileWatcher`] after
/// it has been moved into another thread (e.g. the indexer's watch driver).
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
}

impl ManualFileWatcherHandle {
    /// Inject a synthetic watcher event.
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        match self.tx.try_send(Ok(event)) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }

    /// Inject an asynchronous watcher error.
    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        match self.tx.try_send(Err(error)) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            watched: HashSet::new(),
        }
    }

    /// Returns a handle that can inject events after the watcher has been
    /// handed to the indexer.
    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
        }
    }

    /// Inject a synthetic watcher event.
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.handle().push(event)
    }

    /// Returns the currently watched paths (sorted for determinism).
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watched.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watched.remove(path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}

#[cfg(feature = "watch-notify")]
mod notify_impl {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use notify::{EventKind, RecursiveMode, Watcher};

    const EVENTS_QUEUE_CAPACITY: usize = 4096;

    fn notify_error_to_io(err: notify::Error) -> io::Error {
        io::Error::other(err)
    }

    fn event_requests_rescan(event: &notify::Event) -> bool {
        matches!(event.attrs.flag(), Some(notify::event::Flag::Rescan))
            || (matches!(event.kind, EventKind::Other) && event.paths.is_empty())
    }

    /// Normalizes one notify event into [`FileChange`]s.
    ///
    /// Lode tracks files, not directory trees, so renames collapse into a
    /// delete of the old path plus a create of the new one; any pairing
    /// heuristics would only matter for whole-tree consumers.
    fn normalize(event: notify::Event) -> Vec<FileChange> {
        use notify::event::{ModifyKind, RenameMode};

        match event.kind {
            EventKind::Create(_) => event.paths.into_iter().map(FileChange::created).collect(),
            EventKind::Remove(_) => event.paths.into_iter().map(FileChange::deleted).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => event.paths.into_iter().map(FileChange::deleted).collect(),
                RenameMode::To => event.paths.into_iter().map(FileChange::created).collect(),
                RenameMode::Both => {
                    let mut out = Vec::new();
                    let mut it = event.paths.into_iter();
                    while let Some(from) = it.next() {
                        out.push(FileChange::deleted(from));
                        if let Some(to) = it.next() {
                            out.push(FileChange::created(to));
                        }
                    }
                    out
                }
                RenameMode::Any | RenameMode::Other => {
                    event.paths.into_iter().map(FileChange::modified).collect()
                }
            },
            _ => event.paths.into_iter().map(FileChange::modified).collect(),
        }
    }

    fn try_send_or_overflow(
        tx: &channel::Sender<WatchMessage>,
        overflowed: &AtomicBool,
        msg: WatchMessage,
    ) {
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(channel::TrySendError::Full(_)) => {
                overflowed.store(true, Ordering::Release);
            }
            Err(channel::TrySendError::Disconnected(_)) => {
                // The watcher is shutting down; dropping the message is fine.
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct ActualWatch {
        ref_count: usize,
    }

    /// OS watcher backed by the `notify` crate.
    ///
    /// Watching a file registers the file path itself when possible and falls
    /// back to the parent directory (non-recursively) for paths the backend
    /// refuses, e.g. files that don't exist yet. Events are filtered back to
    /// the requested file set by the consumer re-stat, not here.
    pub struct NotifyFileWatcher {
        watcher: notify::RecommendedWatcher,
        events_rx: channel::Receiver<WatchMessage>,
        // Requested file path -> path actually registered with the backend.
        requested: HashMap<PathBuf, PathBuf>,
        actual: HashMap<PathBuf, ActualWatch>,
    }

    impl NotifyFileWatcher {
        pub fn new() -> io::Result<Self> {
            let (events_tx, events_rx) = channel::bounded::<WatchMessage>(EVENTS_QUEUE_CAPACITY);
            let overflowed = Arc::new(AtomicBool::new(false));

            let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                // Runs on notify's callback thread; never block here.
                match res {
                    Ok(event) => {
                        if event_requests_rescan(&event) {
                            overflowed.store(false, Ordering::Release);
                            try_send_or_overflow(&events_tx, &overflowed, Ok(WatchEvent::Rescan));
                            return;
                        }
                        if overflowed.swap(false, Ordering::AcqRel) {
                            try_send_or_overflow(&events_tx, &overflowed, Ok(WatchEvent::Rescan));
                        }
                        let changes = normalize(event);
                        if !changes.is_empty() {
                            try_send_or_overflow(
                                &events_tx,
                                &overflowed,
                                Ok(WatchEvent::Changes(changes)),
                            );
                        }
                    }
                    Err(err) => {
                        // Many notify backends use errors to signal lost
                        // events; ask for a rescan as well.
                        try_send_or_overflow(&events_tx, &overflowed, Err(notify_error_to_io(err)));
                        try_send_or_overflow(&events_tx, &overflowed, Ok(WatchEvent::Rescan));
                    }
                }
            })
            .map_err(notify_error_to_io)?;

            Ok(Self {
                watcher,
                events_rx,
                requested: HashMap::new(),
                actual: HashMap::new(),
            })
        }

        fn add_actual(&mut self, actual: &Path) -> io::Result<()> {
            match self.actual.get_mut(actual) {
                Some(watch) => {
                    watch.ref_count += 1;
                    Ok(())
                }
                None => {
                    self.watcher
                        .watch(actual, RecursiveMode::NonRecursive)
                        .map_err(notify_error_to_io)?;
                    self.actual
                        .insert(actual.to_path_buf(), ActualWatch { ref_count: 1 });
                    Ok(())
                }
            }
        }

        fn remove_actual(&mut self, actual: PathBuf) -> io::Result<()> {
            let Some(mut watch) = self.actual.remove(&actual) else {
                return Ok(());
            };
            watch.ref_count = watch.ref_count.saturating_sub(1);
            if watch.ref_count > 0 {
                self.actual.insert(actual, watch);
                return Ok(());
            }
            self.watcher.unwatch(&actual).map_err(notify_error_to_io)
        }
    }

    impl FileWatcher for NotifyFileWatcher {
        fn watch_path(&mut self, path: &Path) -> io::Result<()> {
            if self.requested.contains_key(path) {
                return Ok(());
            }

            match self.add_actual(path) {
                Ok(()) => {
                    self.requested.insert(path.to_path_buf(), path.to_path_buf());
                    Ok(())
                }
                Err(_) => {
                    let parent = path.parent().ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent")
                    })?;
                    self.add_actual(parent)?;
                    self.requested
                        .insert(path.to_path_buf(), parent.to_path_buf());
                    Ok(())
                }
            }
        }

        fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
            let Some(actual) = self.requested.remove(path) else {
                return Ok(());
            };
            self.remove_actual(actual)
        }

        fn receiver(&self) -> &channel::Receiver<WatchMessage> {
            &self.events_rx
        }
    }
}

#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;
