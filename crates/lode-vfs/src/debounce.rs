use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use crate::change::{FileChange, FileChangeKind};
use crate::watch::{WatchEvent, WatchMessage};

/// Default quiet interval before a burst of changes is delivered.
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(50);

/// Coalesces bursts of file change events into single notifications.
///
/// Editors and build tools routinely touch the same file several times within
/// a few milliseconds (atomic saves, formatters, generators). Re-indexing on
/// every raw event would dispatch the same file repeatedly, so the debouncer
/// holds changes until `quiet` has elapsed without further events for the
/// batch, then emits one merged [`WatchEvent::Changes`] downstream.
///
/// `Rescan` events and watcher errors flush the current batch and pass
/// through immediately.
pub struct ChangeDebouncer {
    rx: channel::Receiver<WatchMessage>,
    stop_tx: channel::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ChangeDebouncer {
    /// Spawns the debounce thread over `input`.
    pub fn spawn(input: channel::Receiver<WatchMessage>, quiet: Duration) -> Self {
        let (out_tx, out_rx) = channel::unbounded::<WatchMessage>();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("lode-debounce".into())
            .spawn(move || run_debounce_loop(input, out_tx, stop_rx, quiet))
            .expect("failed to spawn debounce thread");

        Self {
            rx: out_rx,
            stop_tx,
            thread: Some(thread),
        }
    }

    /// Returns the receiver of debounced events.
    pub fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}

impl Drop for ChangeDebouncer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::debug!(target = "lode.vfs", "debounce thread panicked during join");
            }
        }
    }
}

/// Merges a newly observed change kind into the pending kind for a path.
fn merge_kinds(pending: FileChangeKind, new: FileChangeKind) -> FileChangeKind {
    use FileChangeKind::*;
    match (pending, new) {
        // A freshly created file that keeps changing is still "created" from
        // the consumer's point of view.
        (Created, Modified) => Created,
        // Delete followed by create within one burst is an atomic-save
        // pattern; the file exists with new content.
        (Deleted, Created) => Modified,
        (_, new) => new,
    }
}

struct PendingChanges {
    // Path -> index into `order`, so bursts stay insertion-ordered.
    by_path: HashMap<PathBuf, usize>,
    order: Vec<FileChange>,
    last_event: Option<Instant>,
}

impl PendingChanges {
    fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            order: Vec::new(),
            last_event: None,
        }
    }

    fn merge(&mut self, change: FileChange, now: Instant) {
        self.last_event = Some(now);
        match self.by_path.get(&change.path) {
            Some(&idx) => {
                let pending = &mut self.order[idx];
                pending.kind = merge_kinds(pending.kind, change.kind);
            }
            None => {
                self.by_path.insert(change.path.clone(), self.order.len());
                self.order.push(change);
            }
        }
    }

    fn take(&mut self) -> Vec<FileChange> {
        self.by_path.clear();
        self.last_event = None;
        std::mem::take(&mut self.order)
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn run_debounce_loop(
    input: channel::Receiver<WatchMessage>,
    out_tx: channel::Sender<WatchMessage>,
    stop_rx: channel::Receiver<()>,
    quiet: Duration,
) {
    let mut pending = PendingChanges::new();

    let flush = |pending: &mut PendingChanges, out_tx: &channel::Sender<WatchMessage>| {
        if !pending.is_empty() {
            let changes = pending.take();
            tracing::debug!(target = "lode.vfs", count = changes.len(), "flushing debounced changes");
            let _ = out_tx.send(Ok(WatchEvent::Changes(changes)));
        }
    };

    loop {
        let tick = match pending.last_event {
            Some(last) => {
                let deadline = last + quiet;
                channel::after(deadline.saturating_duration_since(Instant::now()))
            }
            None => channel::after(Duration::from_secs(3600)),
        };

        channel::select! {
            recv(stop_rx) -> _ => {
                flush(&mut pending, &out_tx);
                break;
            },
            recv(input) -> msg => {
                let Ok(msg) = msg else {
                    // Watcher dropped; deliver what we have and shut down.
                    flush(&mut pending, &out_tx);
                    break;
                };
                match msg {
                    Ok(WatchEvent::Changes(changes)) => {
                        let now = Instant::now();
                        for change in changes {
                            pending.merge(change, now);
                        }
                    }
                    Ok(WatchEvent::Rescan) => {
                        flush(&mut pending, &out_tx);
                        if out_tx.send(Ok(WatchEvent::Rescan)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        flush(&mut pending, &out_tx);
                        if out_tx.send(Err(err)).is_err() {
                            break;
                        }
                    }
                }
            },
            recv(tick) -> _ => {
                flush(&mut pending, &out_tx);
            }
        }
    }
}
