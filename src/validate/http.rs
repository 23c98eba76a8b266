use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::scan::EventContext;

use super::{ValidationOutcome, ValidationRequest, Validator};

const SCAN_PATH: &str = "/api/tickets/scan/";
const ORGANIZER_EVENTS_PATH: &str = "/api/events/organizer/";

/// Errors from REST calls other than validation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport or decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success response.
    #[error("API error: status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
}

impl From<RemoteEvent> for EventContext {
    fn from(value: RemoteEvent) -> Self {
        let id = match value.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        EventContext::new(id, value.title)
    }
}

/// Client for the organizer REST backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ApiClient {
    /// Creates a client for `base_url` authenticating with `access_token`.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: trim_base(base_url.into()),
            access_token: access_token.into(),
        }
    }

    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: trim_base(base_url.into()),
            access_token: access_token.into(),
        })
    }

    /// Lists the events owned by the authenticated organizer.
    #[instrument(skip(self))]
    pub async fn organizer_events(&self) -> Result<Vec<EventContext>, ApiError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, ORGANIZER_EVENTS_PATH))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        let events: Vec<RemoteEvent> = response.json().await?;
        debug!(count = events.len(), "Loaded organizer events");
        Ok(events.into_iter().map(EventContext::from).collect())
    }
}

#[async_trait]
impl Validator for ApiClient {
    #[instrument(skip(self, request), fields(event_id = %request.event_id))]
    async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        let sent = self
            .http
            .post(format!("{}{}", self.base_url, SCAN_PATH))
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => ValidationOutcome::Accepted,
            Ok(response) => ValidationOutcome::Rejected {
                status: response.status().as_u16(),
            },
            Err(err) => {
                warn!(error = %err, "Validation endpoint unreachable");
                ValidationOutcome::Unreachable {
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}
