//! Remote ticket validation port.

/// REST client for the organizer backend.
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{EventId, Verdict};

/// Body sent to the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Decoded ticket payload.
    pub ticket_code: String,
    /// Event the ticket is checked against.
    pub event_id: EventId,
}

/// What the validation endpoint said, or why it said nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Success status.
    Accepted,
    /// Non-success status.
    Rejected {
        /// HTTP status code.
        status: u16,
    },
    /// Transport failure or timeout; no response was received.
    Unreachable {
        /// Transport error text.
        reason: String,
    },
}

impl ValidationOutcome {
    /// Verdict recorded in history. Unreachable fails closed.
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Accepted => Verdict::Valid,
            Self::Rejected { .. } | Self::Unreachable { .. } => Verdict::Invalid,
        }
    }
}

/// A remote authority that accepts or rejects ticket codes.
///
/// Implementations never fail: transport problems are reported as
/// [`ValidationOutcome::Unreachable`].
#[async_trait]
pub trait Validator: Send + Sync + 'static {
    /// Checks one ticket code.
    async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome;
}
