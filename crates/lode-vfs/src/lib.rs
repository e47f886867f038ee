//! Filesystem-facing pieces of Lode: path interning, cheap change detection,
//! file watching and the generated-file overlay.
//!
//! This crate owns all operating-system integration for file watching. Higher
//! layers (the scheduler and indexer) depend only on the [`FileWatcher`] trait
//! and the normalized [`FileChange`] model. The OS backend (a Notify-based
//! implementation) is feature-gated behind `watch-notify` so library crates
//! don't take on platform watcher dependencies; binaries and integration
//! tests that need OS watching enable it explicitly.

mod change;
mod debounce;
mod interner;
mod overlay;
mod status;
mod watch;

pub use change::{FileChange, FileChangeKind};
pub use debounce::{ChangeDebouncer, DEFAULT_QUIET_INTERVAL};
pub use interner::PathInterner;
pub use overlay::GeneratedFiles;
pub use status::{stat_file, FileStatusCache};
pub use watch::{FileWatcher, ManualFileWatcher, ManualFileWatcherHandle, WatchEvent, WatchMessage};

/// Interner shared between the orchestrator, the watch driver and workers.
pub type SharedPathInterner = std::sync::Arc<parking_lot::RwLock<PathInterner>>;

#[cfg(feature = "watch-notify")]
pub use watch::NotifyFileWatcher;
