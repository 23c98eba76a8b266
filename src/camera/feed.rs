use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CameraConfig, CameraError, DecodeStream, Decoder};

const FEED_BUFFER: usize = 64;

#[derive(Debug, Default)]
struct FeedState {
    tx: Option<mpsc::Sender<String>>,
    fail_with: Option<CameraError>,
    last_config: Option<CameraConfig>,
    starts: usize,
    stops: usize,
}

/// Decoder whose decode events are pushed through a [`DecodeFeed`].
///
/// Useful for manual code entry and for driving the runtime in tests.
#[derive(Debug)]
pub struct FeedDecoder {
    state: Arc<Mutex<FeedState>>,
}

/// Producer side of a [`FeedDecoder`].
#[derive(Debug, Clone)]
pub struct DecodeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FeedDecoder {
    /// Creates a decoder and its feed.
    pub fn pair() -> (Self, DecodeFeed) {
        let state = Arc::new(Mutex::new(FeedState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            DecodeFeed { state },
        )
    }

    /// Creates a decoder that fails every `start` with `err`.
    pub fn failing(err: CameraError) -> (Self, DecodeFeed) {
        let (decoder, feed) = Self::pair();
        if let Ok(mut state) = decoder.state.lock() {
            state.fail_with = Some(err);
        }
        (decoder, feed)
    }
}

#[async_trait]
impl Decoder for FeedDecoder {
    async fn start(&mut self, config: &CameraConfig) -> Result<DecodeStream, CameraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CameraError::Unavailable("feed poisoned".to_string()))?;
        state.starts += 1;
        state.last_config = Some(config.clone());
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        state.tx = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.tx = None;
            state.stops += 1;
        }
    }
}

impl DecodeFeed {
    /// Delivers one decoded payload. Returns `false` when no session is active.
    pub async fn push(&self, code: impl Into<String>) -> bool {
        let tx = match self.state.lock() {
            Ok(state) => state.tx.clone(),
            Err(_) => None,
        };
        match tx {
            Some(tx) => tx.send(code.into()).await.is_ok(),
            None => false,
        }
    }

    /// Ends the current session's stream as if the source ran dry.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.tx = None;
        }
    }

    /// True while a session is active.
    pub fn is_active(&self) -> bool {
        self.state.lock().map(|s| s.tx.is_some()).unwrap_or(false)
    }

    /// Number of `start` calls seen.
    pub fn starts(&self) -> usize {
        self.state.lock().map(|s| s.starts).unwrap_or(0)
    }

    /// Number of `stop` calls seen.
    pub fn stops(&self) -> usize {
        self.state.lock().map(|s| s.stops).unwrap_or(0)
    }

    /// Settings passed to the most recent `start`.
    pub fn last_config(&self) -> Option<CameraConfig> {
        self.state.lock().ok().and_then(|s| s.last_config.clone())
    }
}
