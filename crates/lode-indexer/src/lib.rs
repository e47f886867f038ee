//! Top-level orchestration: project-part updates, watcher-driven incremental
//! re-indexing and lifecycle management.
//!
//! [`SymbolIndexer`] wires the pipeline together: it interns paths, diffs
//! files against the status cache, feeds the deduplicating task queue and
//! drives the slot-based scheduler. A background thread consumes debounced
//! watcher events so edits on disk re-index affected files without another
//! project update.

mod indexer;

pub use indexer::{IndexerConfig, SymbolIndexer};
