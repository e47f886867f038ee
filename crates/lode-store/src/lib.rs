//! Transactional symbol storage.
//!
//! Two logically related tables: `symbols` (one row per content-derived
//! symbol id) and `locations` (one row per declaration/definition/reference
//! of a symbol in a file). A third table, `file_status`, persists the
//! filesystem snapshot each file's rows were committed against, so a fresh
//! process can tell what the store was built from.
//!
//! All writes for one file happen inside a single transaction: prior location
//! rows are deleted, the new batch inserted and the status snapshot recorded
//! atomically. A reader never observes a half-updated file.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use lode_core::{
    FilePathId, FileStatus, IndexingResult, LocationKind, SymbolId, SymbolKind, SymbolLocation,
    SymbolRecord,
};

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    symbol_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    signature TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

CREATE TABLE IF NOT EXISTS locations (
    symbol_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    line INTEGER NOT NULL CHECK (line >= 1),
    col INTEGER NOT NULL CHECK (col >= 1),
    kind TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_locations_file ON locations(file_id);
CREATE INDEX IF NOT EXISTS idx_locations_symbol ON locations(symbol_id);

CREATE TABLE IF NOT EXISTS file_status (
    file_id INTEGER PRIMARY KEY,
    mtime_nanos INTEGER NOT NULL,
    size INTEGER NOT NULL
);
"#;

/// SQLite-backed symbol store.
///
/// The connection is shared across workers; each commit runs inside its own
/// transaction serialized by SQLite, so concurrent commits are safe but may
/// contend on the single connection mutex.
pub struct SymbolStore {
    conn: Mutex<Connection>,
}

impl SymbolStore {
    /// Opens (and migrates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a transient in-memory store, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // WAL lets readers proceed while a worker is committing.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\n\
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Commits one file's collected symbols atomically.
    ///
    /// On failure the transaction is rolled back: the store keeps the file's
    /// previous rows in full and the error becomes the task outcome.
    pub fn commit(&self, result: &IndexingResult) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let file_id = result.file.to_raw() as i64;
        tx.execute("DELETE FROM locations WHERE file_id = ?1", params![file_id])?;

        {
            let mut upsert_symbol = tx.prepare_cached(
                "INSERT INTO symbols (symbol_id, name, kind, signature)\n\
                 VALUES (?1, ?2, ?3, ?4)\n\
                 ON CONFLICT(symbol_id) DO UPDATE SET\n\
                     name = excluded.name,\n\
                     kind = excluded.kind,\n\
                     signature = excluded.signature",
            )?;
            for symbol in &result.collected.symbols {
                upsert_symbol.execute(params![
                    symbol.id.to_raw() as i64,
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.signature,
                ])?;
            }

            let mut insert_location = tx.prepare_cached(
                "INSERT INTO locations (symbol_id, file_id, line, col, kind)\n\
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for location in &result.collected.locations {
                insert_location.execute(params![
                    location.symbol.to_raw() as i64,
                    location.file.to_raw() as i64,
                    location.line,
                    location.column,
                    location.kind.as_str(),
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO file_status (file_id, mtime_nanos, size)\n\
             VALUES (?1, ?2, ?3)\n\
             ON CONFLICT(file_id) DO UPDATE SET\n\
                 mtime_nanos = excluded.mtime_nanos,\n\
                 size = excluded.size",
            params![
                file_id,
                mtime_to_nanos(result.status.mtime),
                result.status.size as i64,
            ],
        )?;

        tx.commit()?;
        tracing::debug!(
            target = "lode.store",
            file = result.file.to_raw(),
            symbols = result.collected.symbols.len(),
            locations = result.collected.locations.len(),
            "committed indexing result"
        );
        Ok(())
    }

    /// Returns the symbol row for `id`, if present.
    pub fn symbol(&self, id: SymbolId) -> Result<Option<SymbolRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol_id, name, kind, signature FROM symbols WHERE symbol_id = ?1",
        )?;
        let record = stmt
            .query_row(params![id.to_raw() as i64], row_to_symbol)
            .optional()?;
        Ok(record)
    }

    /// Returns every symbol with the given name.
    pub fn symbols_named(&self, name: &str) -> Result<Vec<SymbolRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol_id, name, kind, signature FROM symbols\n\
             WHERE name = ?1 ORDER BY symbol_id",
        )?;
        let rows = stmt.query_map(params![name], row_to_symbol)?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    /// Returns all location rows touching `file`, ordered by position.
    pub fn locations_in_file(&self, file: FilePathId) -> Result<Vec<SymbolLocation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol_id, file_id, line, col, kind FROM locations\n\
             WHERE file_id = ?1 ORDER BY line, col",
        )?;
        let rows = stmt.query_map(params![file.to_raw() as i64], row_to_location)?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    /// Returns all locations of `symbol` across files.
    pub fn locations_of(&self, symbol: SymbolId) -> Result<Vec<SymbolLocation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol_id, file_id, line, col, kind FROM locations\n\
             WHERE symbol_id = ?1 ORDER BY file_id, line, col",
        )?;
        let rows = stmt.query_map(params![symbol.to_raw() as i64], row_to_location)?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    /// Returns the status snapshot the store's rows for `file` were committed
    /// against, if the file was ever committed.
    pub fn recorded_status(&self, file: FilePathId) -> Result<Option<FileStatus>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT mtime_nanos, size FROM file_status WHERE file_id = ?1")?;
        let status = stmt
            .query_row(params![file.to_raw() as i64], |row| {
                let nanos: i64 = row.get(0)?;
                let size: i64 = row.get(1)?;
                Ok(FileStatus::new(nanos_to_mtime(nanos), size as u64))
            })
            .optional()?;
        Ok(status)
    }
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord> {
    let raw_id: i64 = row.get(0)?;
    let kind: String = row.get(2)?;
    Ok(SymbolRecord {
        id: SymbolId::from_raw(raw_id as u64),
        name: row.get(1)?,
        kind: SymbolKind::from_str(&kind),
        signature: row.get(3)?,
    })
}

fn row_to_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolLocation> {
    let raw_symbol: i64 = row.get(0)?;
    let raw_file: i64 = row.get(1)?;
    let kind: String = row.get(4)?;
    Ok(SymbolLocation {
        symbol: SymbolId::from_raw(raw_symbol as u64),
        file: FilePathId::from_raw(raw_file as u32),
        line: row.get(2)?,
        column: row.get(3)?,
        kind: LocationKind::from_str(&kind),
    })
}

fn mtime_to_nanos(mtime: SystemTime) -> i64 {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos() as i64,
        Err(err) => -(err.duration().as_nanos() as i64),
    }
}

fn nanos_to_mtime(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
