use serde::{Deserialize, Serialize};

use crate::{scan::ScanEntry, types::ScanStatus};

/// Counts derived from a history snapshot; never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Entries accepted by the endpoint.
    pub valid: usize,
    /// Entries rejected or unconfirmed.
    pub invalid: usize,
    /// Entries still awaiting a verdict.
    pub pending: usize,
    /// History length.
    pub total: usize,
}

impl ScanStats {
    /// Counts `entries` by status.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ScanEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            match entry.status {
                ScanStatus::Valid => stats.valid += 1,
                ScanStatus::Invalid => stats.invalid += 1,
                ScanStatus::Pending => stats.pending += 1,
            }
            stats.total += 1;
        }
        stats
    }
}
