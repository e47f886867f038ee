//! Symbol collection.
//!
//! A *collector* parses one file under a given compile context and extracts
//! symbols and their locations. Lode itself does not understand source
//! syntax; real language frontends implement [`SymbolCollector`], and the
//! scheduler checks instances out of a [`CollectorPool`] sized to its
//! concurrency limit.

mod pool;
pub mod testing;

pub use pool::{CollectorFactory, CollectorPool, PooledCollector};

use lode_core::{CollectedSymbols, FilePathId, ProjectPart, SymbolId};

/// Errors produced while collecting symbols from one file.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse source: {0}")]
    Parse(String),
}

/// Derives the stable [`SymbolId`] for a unified symbol signature.
///
/// The id is content-derived (first 8 bytes of the BLAKE3 hash of the
/// signature string), so re-indexing unrelated files never perturbs it.
pub fn symbol_id(signature: &str) -> SymbolId {
    let hash = blake3::hash(signature.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&hash.as_bytes()[..8]);
    SymbolId::from_raw(u64::from_le_bytes(raw))
}

/// A per-slot capability that extracts symbols from one file at a time.
///
/// Collectors are `Send` but deliberately not `Sync`: each instance may hold
/// per-file parser caches, and ownership is exclusive per checkout from the
/// pool. [`clear`](SymbolCollector::clear) is called when an instance is
/// returned so stale per-file state never leaks into the next task.
pub trait SymbolCollector: Send {
    /// Parses `source` under `part`'s compile settings and extracts symbols.
    ///
    /// A collector that can produce a partial result for malformed input
    /// should return it rather than failing; an empty [`CollectedSymbols`] is
    /// a valid outcome.
    fn collect(
        &mut self,
        file: FilePathId,
        source: &str,
        part: &ProjectPart,
    ) -> Result<CollectedSymbols, CollectError>;

    /// Resets any stateful per-file caches.
    fn clear(&mut self) {}
}
