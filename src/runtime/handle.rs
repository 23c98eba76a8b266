use std::{
    future,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use hashbrown::HashSet;
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    camera::{CameraConfig, CameraError, DecodeStream, Decoder},
    core::{
        debounce::{DebounceGuard, SCAN_LOCK_MS},
        history::{ScanHistory, HISTORY_CAP},
        stats::ScanStats,
    },
    persist::{HistoryStore, PersistError},
    scan::{EventContext, ScanDraft, ScanEntry},
    types::ScanId,
    validate::{ValidationOutcome, ValidationRequest, Validator},
};

use super::{
    clock::{Clock, MonotonicClock},
    events::{RejectReason, ScanEvent},
};

/// Errors returned by [`ScannerHandle`] operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `start` was called without a selected event.
    #[error("no event selected")]
    MissingContext,
    /// `start` was called while a camera session is live.
    #[error("scanner is already running")]
    AlreadyScanning,
    /// The decoder failed to initialize.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    /// The history store failed.
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
    /// The runtime task is gone.
    #[error("scanner runtime has shut down")]
    ChannelClosed,
}

/// Scan session tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Lock window for a repeated code.
    pub debounce_ms: u64,
    /// Maximum history length.
    pub history_cap: usize,
    /// Settings passed to the decoder on start.
    pub camera: CameraConfig,
    /// How long shutdown waits for in-flight validations.
    pub shutdown_grace_ms: u64,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: SCAN_LOCK_MS,
            history_cap: HISTORY_CAP,
            camera: CameraConfig::default(),
            shutdown_grace_ms: 2000,
            event_buffer: 256,
        }
    }
}

/// Camera session state owned by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    /// No camera session.
    Idle,
    /// Decoding is live.
    Scanning,
}

/// Cloneable handle to a running scan session.
pub struct ScannerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<ScanEvent>,
}

impl Clone for ScannerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Start {
        context: EventContext,
        resp: oneshot::Sender<Result<(), ScanError>>,
    },
    Stop {
        resp: oneshot::Sender<()>,
    },
    ClearHistory {
        confirmed: bool,
        resp: oneshot::Sender<Result<bool, ScanError>>,
    },
    History {
        resp: oneshot::Sender<Vec<ScanEntry>>,
    },
    Stats {
        resp: oneshot::Sender<ScanStats>,
    },
    State {
        resp: oneshot::Sender<ScannerState>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), ScanError>>,
    },
}

struct ValidationDone {
    id: ScanId,
    outcome: ValidationOutcome,
}

/// Spawns the session loop with `history` as loaded from `store`.
pub fn spawn_scanner(
    history: Vec<ScanEntry>,
    store: Box<dyn HistoryStore>,
    validator: Arc<dyn Validator>,
    decoder: Box<dyn Decoder>,
    config: RuntimeConfig,
) -> ScannerHandle {
    spawn_scanner_with_clock(
        history,
        store,
        validator,
        decoder,
        config,
        Arc::new(MonotonicClock::default()),
    )
}

/// Like [`spawn_scanner`], reading debounce time from `clock`.
pub fn spawn_scanner_with_clock(
    history: Vec<ScanEntry>,
    store: Box<dyn HistoryStore>,
    validator: Arc<dyn Validator>,
    decoder: Box<dyn Decoder>,
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
) -> ScannerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<ScanEvent>(config.event_buffer.max(1));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<ValidationDone>();

    let mut session = Session {
        history: ScanHistory::from_entries(history, config.history_cap),
        guard: DebounceGuard::new(config.debounce_ms),
        state: ScannerState::Idle,
        context: None,
        decoder,
        decodes: None,
        store: Arc::new(Mutex::new(store)),
        validator,
        inflight: HashSet::new(),
        done_tx,
        events_tx: events_tx.clone(),
        clock,
        config,
    };

    tokio::spawn(async move {
        session.recover_stale_pending().await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        session.stop().await;
                        if let Err(err) = session.drain(&mut done_rx).await {
                            warn!(error = %err, "Drain after last handle dropped failed");
                        }
                        break;
                    };
                    if session.handle_command(cmd, &mut done_rx).await {
                        break;
                    }
                }
                code = next_decode(&mut session.decodes) => {
                    match code {
                        Some(code) => session.on_decode(code).await,
                        None => session.decoder_ended().await,
                    }
                }
                Some(done) = done_rx.recv() => {
                    session.on_validated(done).await;
                }
            }
        }
    });

    ScannerHandle { cmd_tx, events_tx }
}

impl ScannerHandle {
    /// Subscribes to feedback events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events_tx.subscribe()
    }

    /// Starts decoding against `context`.
    pub async fn start(&self, context: EventContext) -> Result<(), ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { context, resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)?
    }

    /// Stops decoding. In-flight validations still complete.
    pub async fn stop(&self) -> Result<(), ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stop { resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)
    }

    /// Wipes history when `confirmed`; returns whether anything was done.
    pub async fn clear_history(&self, confirmed: bool) -> Result<bool, ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ClearHistory {
                confirmed,
                resp: tx,
            })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)?
    }

    /// History snapshot, newest first.
    pub async fn history(&self) -> Result<Vec<ScanEntry>, ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::History { resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)
    }

    /// Counts derived from current history.
    pub async fn stats(&self) -> Result<ScanStats, ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stats { resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)
    }

    /// Current camera session state.
    pub async fn state(&self) -> Result<ScannerState, ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::State { resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)
    }

    /// Stops the camera, waits briefly for in-flight validations, and fails
    /// closed whatever is still pending.
    pub async fn shutdown(&self) -> Result<(), ScanError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| ScanError::ChannelClosed)?;
        rx.await.map_err(|_| ScanError::ChannelClosed)?
    }
}

struct Session {
    history: ScanHistory,
    guard: DebounceGuard,
    state: ScannerState,
    context: Option<EventContext>,
    decoder: Box<dyn Decoder>,
    decodes: Option<DecodeStream>,
    store: Arc<Mutex<Box<dyn HistoryStore>>>,
    validator: Arc<dyn Validator>,
    inflight: HashSet<ScanId>,
    done_tx: mpsc::UnboundedSender<ValidationDone>,
    events_tx: broadcast::Sender<ScanEvent>,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
}

impl Session {
    async fn handle_command(
        &mut self,
        cmd: Command,
        done_rx: &mut mpsc::UnboundedReceiver<ValidationDone>,
    ) -> bool {
        match cmd {
            Command::Start { context, resp } => {
                let _ = resp.send(self.start(context).await);
            }
            Command::Stop { resp } => {
                self.stop().await;
                let _ = resp.send(());
            }
            Command::ClearHistory { confirmed, resp } => {
                let _ = resp.send(self.clear_history(confirmed).await);
            }
            Command::History { resp } => {
                let _ = resp.send(self.history.to_vec());
            }
            Command::Stats { resp } => {
                let _ = resp.send(self.history.stats());
            }
            Command::State { resp } => {
                let _ = resp.send(self.state);
            }
            Command::Shutdown { resp } => {
                self.stop().await;
                let _ = resp.send(self.drain(done_rx).await);
                return true;
            }
        }

        false
    }

    async fn start(&mut self, context: EventContext) -> Result<(), ScanError> {
        if context.is_empty() {
            return Err(ScanError::MissingContext);
        }
        if self.state == ScannerState::Scanning {
            return Err(ScanError::AlreadyScanning);
        }

        match self.decoder.start(&self.config.camera).await {
            Ok(stream) => {
                info!(event_id = %context.id, title = %context.title, "Scan session started");
                let _ = self.events_tx.send(ScanEvent::Started {
                    event_id: context.id.clone(),
                });
                self.decodes = Some(stream);
                self.context = Some(context);
                self.state = ScannerState::Scanning;
                Ok(())
            }
            Err(err) => {
                self.decoder.stop().await;
                warn!(error = %err, "Camera failed to start");
                Err(ScanError::CameraUnavailable(err))
            }
        }
    }

    async fn stop(&mut self) {
        if self.state == ScannerState::Idle {
            return;
        }
        self.decoder.stop().await;
        self.decodes = None;
        self.state = ScannerState::Idle;
        info!(inflight = self.inflight.len(), "Scan session stopped");
        let _ = self.events_tx.send(ScanEvent::Stopped);
    }

    async fn decoder_ended(&mut self) {
        self.decoder.stop().await;
        self.decodes = None;
        self.state = ScannerState::Idle;
        info!("Decoder stream ended");
        let _ = self.events_tx.send(ScanEvent::DecoderEnded);
    }

    async fn on_decode(&mut self, code: String) {
        if !self.guard.admit(&code, self.clock.now_ms()) {
            debug!(%code, "Suppressed repeat decode");
            return;
        }
        let Some(event_id) = self.context.as_ref().map(|c| c.id.clone()) else {
            return;
        };

        let id = self
            .history
            .record(ScanDraft {
                code: code.clone(),
                captured_at_ms: now_ms(),
                event_id: event_id.clone(),
            })
            .id;
        self.write_through().await;
        let _ = self.events_tx.send(ScanEvent::Captured {
            id,
            code: code.clone(),
        });

        self.inflight.insert(id);
        let validator = Arc::clone(&self.validator);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let request = ValidationRequest {
                ticket_code: code,
                event_id,
            };
            let outcome = validator.validate(&request).await;
            let _ = done_tx.send(ValidationDone { id, outcome });
        });
    }

    async fn on_validated(&mut self, done: ValidationDone) {
        self.inflight.remove(&done.id);

        if let Err(err) = self.history.resolve(done.id, done.outcome.verdict()) {
            debug!(error = %err, "Dropped validation result");
            return;
        }
        self.write_through().await;

        let event = match done.outcome {
            ValidationOutcome::Accepted => {
                info!(id = done.id, "Ticket valid");
                ScanEvent::Accepted { id: done.id }
            }
            ValidationOutcome::Rejected { status } => {
                warn!(id = done.id, status, "Ticket rejected");
                ScanEvent::Rejected {
                    id: done.id,
                    reason: RejectReason::Status(status),
                }
            }
            ValidationOutcome::Unreachable { reason } => {
                warn!(id = done.id, %reason, "Ticket unconfirmed, marked invalid");
                ScanEvent::Rejected {
                    id: done.id,
                    reason: RejectReason::Unreachable(reason),
                }
            }
        };
        let _ = self.events_tx.send(event);
    }

    async fn clear_history(&mut self, confirmed: bool) -> Result<bool, ScanError> {
        if !confirmed {
            return Ok(false);
        }

        self.history.clear();
        info!("Scan history cleared");
        let _ = self.events_tx.send(ScanEvent::HistoryCleared);

        let store = Arc::clone(&self.store);
        let cleared = tokio::task::spawn_blocking(move || {
            let mut store = store.blocking_lock();
            store.clear()
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))
        .and_then(|r| r);

        if let Err(err) = cleared {
            self.report_persist_failure(&err);
            return Err(ScanError::Persist(err));
        }
        Ok(true)
    }

    async fn drain(
        &mut self,
        done_rx: &mut mpsc::UnboundedReceiver<ValidationDone>,
    ) -> Result<(), ScanError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_grace_ms);
        while !self.inflight.is_empty() {
            match tokio::time::timeout_at(deadline, done_rx.recv()).await {
                Ok(Some(done)) => self.on_validated(done).await,
                _ => break,
            }
        }

        let abandoned = self.history.fail_pending();
        if abandoned.is_empty() {
            return Ok(());
        }
        warn!(count = abandoned.len(), "Failing closed unresolved scans");
        for id in abandoned {
            let _ = self.events_tx.send(ScanEvent::Rejected {
                id,
                reason: RejectReason::Abandoned,
            });
        }
        self.persist().await.map_err(ScanError::from)
    }

    async fn recover_stale_pending(&mut self) {
        let stale = self.history.fail_pending();
        if !stale.is_empty() {
            info!(count = stale.len(), "Failing closed scans left pending by a previous session");
            self.write_through().await;
        }
    }

    async fn write_through(&mut self) {
        if let Err(err) = self.persist().await {
            self.report_persist_failure(&err);
        }
    }

    async fn persist(&mut self) -> Result<(), PersistError> {
        let entries = self.history.to_vec();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut store = store.blocking_lock();
            store.save(&entries)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?
    }

    fn report_persist_failure(&self, err: &PersistError) {
        warn!(error = %err, "Failed to persist scan history");
        let _ = self.events_tx.send(ScanEvent::PersistFailed {
            reason: err.to_string(),
        });
    }
}

async fn next_decode(decodes: &mut Option<DecodeStream>) -> Option<String> {
    match decodes.as_mut() {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
