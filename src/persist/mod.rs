//! Scan history persistence port and its implementations.

/// Shared in-memory store, used where no durable backend is wanted.
pub mod memory;
/// SQLite key-value store.
pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::ScanEntry;

/// Fixed key the serialized history is stored under.
pub const STORAGE_KEY: &str = "WEB_SCAN_HISTORY";

/// Version number for serialized [`HistoryEnvelope`] payloads.
pub const HISTORY_FORMAT_VERSION: u16 = 1;

/// Errors raised by a [`HistoryStore`].
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Payload written by an incompatible version.
    #[error("unsupported history format version {0}")]
    UnsupportedFormat(u16),
    /// Anything else, e.g. a failed blocking task.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Versioned wrapper for stable payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Entries, newest first.
    pub entries: Vec<ScanEntry>,
}

impl HistoryEnvelope {
    /// Wraps `entries` using [`HISTORY_FORMAT_VERSION`].
    pub fn new(entries: Vec<ScanEntry>) -> Self {
        Self {
            format_version: HISTORY_FORMAT_VERSION,
            entries,
        }
    }
}

/// Persistence port for scan history.
///
/// `load` runs once at session start; `save` receives the whole history
/// after every mutation.
pub trait HistoryStore: Send {
    /// Returns the stored history, newest first, or empty when none exists.
    fn load(&self) -> PersistResult<Vec<ScanEntry>>;
    /// Replaces the stored history.
    fn save(&mut self, entries: &[ScanEntry]) -> PersistResult<()>;
    /// Removes the stored history.
    fn clear(&mut self) -> PersistResult<()> {
        self.save(&[])
    }
}

/// Encodes entries into the on-disk payload.
pub fn encode_history(entries: &[ScanEntry]) -> PersistResult<Vec<u8>> {
    Ok(serde_json::to_vec(&HistoryEnvelope::new(entries.to_vec()))?)
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    format_version: u16,
}

/// Decodes a stored payload. The version is checked before the entries are
/// parsed, so a newer writer's layout reports [`PersistError::UnsupportedFormat`].
pub fn decode_history(payload: &[u8]) -> PersistResult<Vec<ScanEntry>> {
    let header: EnvelopeHeader = serde_json::from_slice(payload)?;
    if header.format_version != HISTORY_FORMAT_VERSION {
        return Err(PersistError::UnsupportedFormat(header.format_version));
    }
    Ok(serde_json::from_slice::<HistoryEnvelope>(payload)?.entries)
}
