//! Core shared types for Lode.
//!
//! This crate is intentionally small and dependency-free.

mod project;
mod symbols;

pub use project::{ProjectPart, ProjectPartId};
pub use symbols::{
    CollectedSymbols, IndexingResult, LocationKind, SymbolKind, SymbolLocation, SymbolRecord,
};

use std::time::SystemTime;

/// Stable, interned identifier for a file path.
///
/// Allocated by `lode_vfs::PathInterner`; valid for the process lifetime and
/// used everywhere instead of raw paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePathId(u32);

impl FilePathId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

/// Content-derived symbol identifier.
///
/// Derived from the symbol's unified signature (see `lode_collect::symbol_id`),
/// so it is stable across re-indexing of unrelated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u64);

impl SymbolId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

/// A filesystem snapshot of one file, used for cheap change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatus {
    pub mtime: SystemTime,
    pub size: u64,
}

impl FileStatus {
    pub fn new(mtime: SystemTime, size: u64) -> Self {
        Self { mtime, size }
    }
}

/// Extracts a printable message from a panic payload.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("<non-string panic>")
}
