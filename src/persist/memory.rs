use std::sync::{Arc, Mutex};

use crate::scan::ScanEntry;

use super::{decode_history, encode_history, HistoryStore, PersistError, PersistResult};

#[derive(Debug, Default)]
struct Slot {
    payload: Option<Vec<u8>>,
    writes: usize,
}

/// In-memory [`HistoryStore`] holding the encoded payload.
///
/// Clones share one slot, so a test can keep a clone and inspect what the
/// runtime persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    slot: Arc<Mutex<Slot>>,
}

impl MemoryHistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `entries`.
    pub fn with_entries(entries: &[ScanEntry]) -> PersistResult<Self> {
        let store = Self::new();
        store.lock()?.payload = Some(encode_history(entries)?);
        Ok(store)
    }

    /// Decoded contents of the last save, if any.
    pub fn saved(&self) -> PersistResult<Option<Vec<ScanEntry>>> {
        let slot = self.lock()?;
        slot.payload.as_deref().map(decode_history).transpose()
    }

    /// Number of `save`/`clear` calls observed.
    pub fn writes(&self) -> usize {
        self.slot.lock().map(|s| s.writes).unwrap_or(0)
    }

    fn lock(&self) -> PersistResult<std::sync::MutexGuard<'_, Slot>> {
        self.slot
            .lock()
            .map_err(|_| PersistError::Message("memory store poisoned".to_string()))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> PersistResult<Vec<ScanEntry>> {
        Ok(self.saved()?.unwrap_or_default())
    }

    fn save(&mut self, entries: &[ScanEntry]) -> PersistResult<()> {
        let payload = encode_history(entries)?;
        let mut slot = self.lock()?;
        slot.payload = Some(payload);
        slot.writes += 1;
        Ok(())
    }

    fn clear(&mut self) -> PersistResult<()> {
        let mut slot = self.lock()?;
        slot.payload = None;
        slot.writes += 1;
        Ok(())
    }
}
