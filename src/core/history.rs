use std::collections::VecDeque;

use thiserror::Error;

use crate::{
    core::stats::ScanStats,
    scan::{ScanDraft, ScanEntry},
    types::{ScanId, ScanStatus, Verdict},
};

/// Default number of entries kept in history.
pub const HISTORY_CAP: usize = 50;

/// Errors from applying a verdict to a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// No entry with this id; it was evicted or cleared.
    #[error("scan entry {0} is not in history")]
    MissingEntry(ScanId),
    /// The entry already holds a terminal status.
    #[error("scan entry {id} is already {status:?}")]
    AlreadyTerminal {
        /// Entry id.
        id: ScanId,
        /// Status the entry keeps.
        status: ScanStatus,
    },
}

/// Newest-first scan history bounded to `cap` entries.
///
/// Insertion is always at the head; once the cap is exceeded the oldest
/// insertion is evicted regardless of its status.
#[derive(Debug, Clone)]
pub struct ScanHistory {
    entries: VecDeque<ScanEntry>,
    cap: usize,
    next_id: ScanId,
}

impl Default for ScanHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAP)
    }
}

impl ScanHistory {
    /// Creates an empty history holding at most `cap` entries.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.max(1)),
            cap: cap.max(1),
            next_id: 1,
        }
    }

    /// Rebuilds history from persisted entries, newest first.
    ///
    /// Anything beyond `cap` is dropped from the tail. Id allocation resumes
    /// above the highest loaded id.
    pub fn from_entries(entries: Vec<ScanEntry>, cap: usize) -> Self {
        let mut history = Self::new(cap);
        history.next_id = entries
            .iter()
            .map(|e| e.id)
            .max()
            .map_or(1, |id| id.saturating_add(1));
        history.entries = entries.into_iter().take(history.cap).collect();
        history
    }

    /// Prepends a new pending entry and evicts past the cap.
    pub fn record(&mut self, draft: ScanDraft) -> &ScanEntry {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.push_front(ScanEntry {
            id,
            code: draft.code,
            captured_at_ms: draft.captured_at_ms,
            event_id: draft.event_id,
            status: ScanStatus::Pending,
        });
        self.entries.truncate(self.cap);
        &self.entries[0]
    }

    /// Moves the pending entry `id` to its terminal status.
    pub fn resolve(&mut self, id: ScanId, verdict: Verdict) -> Result<&ScanEntry, HistoryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(HistoryError::MissingEntry(id))?;

        if entry.status.is_terminal() {
            return Err(HistoryError::AlreadyTerminal {
                id,
                status: entry.status,
            });
        }

        entry.status = verdict.into();
        Ok(entry)
    }

    /// Marks every pending entry `Invalid`, returning the ids touched.
    pub fn fail_pending(&mut self) -> Vec<ScanId> {
        self.entries
            .iter_mut()
            .filter(|e| e.status == ScanStatus::Pending)
            .map(|e| {
                e.status = ScanStatus::Invalid;
                e.id
            })
            .collect()
    }

    /// Drops every entry. Id allocation keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: ScanId) -> Option<&ScanEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.iter()
    }

    /// Owned copy, newest first.
    pub fn to_vec(&self) -> Vec<ScanEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts entries by status.
    pub fn stats(&self) -> ScanStats {
        ScanStats::from_entries(self.entries.iter())
    }
}
