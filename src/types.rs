//! Shared primitive IDs and scan-related enums.

use serde::{Deserialize, Serialize};

/// Monotonic scan entry identifier.
pub type ScanId = u64;
/// Remote event identifier as issued by the REST backend.
pub type EventId = String;

/// Lifecycle of a single scan attempt.
///
/// `Pending` is the only non-terminal state; an entry moves to exactly one of
/// `Valid` or `Invalid` and never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    /// Captured, waiting on the validation endpoint.
    Pending,
    /// Accepted by the validation endpoint.
    Valid,
    /// Rejected, or validity could not be confirmed.
    Invalid,
}

impl ScanStatus {
    /// True for `Valid` and `Invalid`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Terminal outcome applied to a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Ticket accepted.
    Valid,
    /// Ticket rejected or unconfirmed.
    Invalid,
}

impl From<Verdict> for ScanStatus {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Valid => Self::Valid,
            Verdict::Invalid => Self::Invalid,
        }
    }
}

/// Preferred camera orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// User-facing camera.
    Front,
    /// Environment-facing camera.
    #[default]
    Rear,
}
