//! Scan domain records and the event context a session runs under.

use serde::{Deserialize, Serialize};

use crate::types::{EventId, ScanId, ScanStatus};

/// Characters shown by [`ScanEntry::short_code`] before truncation.
pub const SHORT_CODE_CHARS: usize = 8;

/// One attempted decode, as kept in history.
///
/// Entries are created `Pending` the moment a code clears the debounce guard,
/// before any network call is made, and reach `Valid` or `Invalid` exactly
/// once. Everything except `status` is fixed at creation.
///
/// Serialized as a flat JSON object:
///
/// ```
/// use ticketscan::{scan::ScanEntry, types::ScanStatus};
///
/// let entry = ScanEntry {
///     id: 3,
///     code: "TKT-0001-ALPHA".to_string(),
///     captured_at_ms: 1_700_000_000_000,
///     event_id: "42".to_string(),
///     status: ScanStatus::Pending,
/// };
/// let json = serde_json::to_value(&entry).unwrap();
/// assert_eq!(json["status"], "PENDING");
/// assert_eq!(entry.short_code(), "TKT-0001…");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Stable, monotonic identifier assigned at decode time.
    pub id: ScanId,
    /// Opaque decoded payload.
    pub code: String,
    /// Wall-clock decode time in milliseconds since epoch.
    pub captured_at_ms: u64,
    /// Event that was selected when the code was decoded.
    pub event_id: EventId,
    /// Current lifecycle state.
    pub status: ScanStatus,
}

impl ScanEntry {
    /// Code prefix suitable for compact listings.
    ///
    /// Counts characters, not bytes, so multi-byte payloads are never split.
    /// Codes of at most [`SHORT_CODE_CHARS`] characters are returned whole.
    pub fn short_code(&self) -> String {
        let mut chars = self.code.chars();
        let head: String = chars.by_ref().take(SHORT_CODE_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}

/// Insert payload used to create a new pending [`ScanEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDraft {
    /// Decoded payload.
    pub code: String,
    /// Wall-clock decode time in milliseconds since epoch.
    pub captured_at_ms: u64,
    /// Active event.
    pub event_id: EventId,
}

/// Event a scan session validates tickets against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Backend event id.
    pub id: EventId,
    /// Display label.
    #[serde(default)]
    pub title: String,
}

impl EventContext {
    /// Builds a context from an id and label.
    pub fn new(id: impl Into<EventId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// True when no event has been selected.
    ///
    /// A whitespace-only id counts as empty; `start` refuses such a context
    /// before touching the camera.
    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty()
    }
}
