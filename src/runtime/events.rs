//! Runtime event stream payloads.

use crate::types::{EventId, ScanId};

/// Why an entry ended `Invalid`.
///
/// All variants look the same in history; the distinction is only kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Endpoint answered with a non-success status.
    Status(u16),
    /// Endpoint could not be reached.
    Unreachable(String),
    /// No answer arrived before the session shut down.
    Abandoned,
}

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The camera session is live.
    Started {
        /// Event tickets are validated against.
        event_id: EventId,
    },
    /// The camera session was stopped.
    Stopped,
    /// The decoder's stream ended on its own.
    DecoderEnded,
    /// A decode produced a new pending entry.
    Captured {
        /// New entry id.
        id: ScanId,
        /// Decoded payload.
        code: String,
    },
    /// Success feedback: the ticket was accepted.
    Accepted {
        /// Resolved entry id.
        id: ScanId,
    },
    /// Failure feedback: the ticket was rejected or unconfirmed.
    Rejected {
        /// Resolved entry id.
        id: ScanId,
        /// Internal cause.
        reason: RejectReason,
    },
    /// History was wiped.
    HistoryCleared,
    /// A write-through save failed; in-memory history is unaffected.
    PersistFailed {
        /// Store error text.
        reason: String,
    },
}
