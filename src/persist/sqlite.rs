//! SQLite-backed key-value history store.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};

use crate::scan::ScanEntry;

use super::{decode_history, encode_history, HistoryStore, PersistResult, STORAGE_KEY};

/// SQLite implementation of [`crate::persist::HistoryStore`].
///
/// History lives in a single row of `kv_store` under a fixed key, rewritten
/// whole on every save.
pub struct SqliteHistoryStore {
    conn: Connection,
    key: String,
}

impl SqliteHistoryStore {
    /// Opens or creates a SQLite-backed store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    /// Stores history under `key` instead of [`STORAGE_KEY`].
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            key: STORAGE_KEY.to_string(),
        })
    }

    /// Millisecond timestamp of the last write, if any.
    pub fn last_written_ms(&self) -> PersistResult<Option<u64>> {
        let ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT ts_ms FROM kv_store WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts.map(|v| v as u64))
    }

    /// Writes a raw payload under the current key.
    pub fn put_raw(&mut self, payload: &[u8]) -> PersistResult<()> {
        self.conn.execute(
            "INSERT INTO kv_store(key, ts_ms, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET ts_ms = excluded.ts_ms, payload = excluded.payload",
            params![self.key, now_ms() as i64, payload],
        )?;
        Ok(())
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn load(&self) -> PersistResult<Vec<ScanEntry>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM kv_store WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        decode_history(&payload)
    }

    fn save(&mut self, entries: &[ScanEntry]) -> PersistResult<()> {
        let payload = encode_history(entries)?;
        self.put_raw(&payload)
    }

    fn clear(&mut self) -> PersistResult<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![self.key])?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
