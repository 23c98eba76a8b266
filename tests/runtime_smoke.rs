use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use ticketscan::{
    camera::{feed::{DecodeFeed, FeedDecoder}, CameraError},
    persist::memory::MemoryHistoryStore,
    runtime::{
        clock::ManualClock,
        events::{RejectReason, ScanEvent},
        handle::{spawn_scanner_with_clock, RuntimeConfig, ScanError, ScannerHandle, ScannerState},
    },
    scan::{EventContext, ScanEntry},
    types::{ScanId, ScanStatus},
    validate::{ValidationOutcome, ValidationRequest, Validator},
};

#[derive(Default)]
struct ScriptedValidator {
    outcomes: HashMap<String, ValidationOutcome>,
    gates: HashMap<String, Arc<Semaphore>>,
    seen: Arc<Mutex<Vec<ValidationRequest>>>,
}

impl ScriptedValidator {
    fn outcome(mut self, code: &str, outcome: ValidationOutcome) -> Self {
        self.outcomes.insert(code.to_string(), outcome);
        self
    }

    fn gated(mut self, code: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.insert(code.to_string(), Arc::clone(&gate));
        (self, gate)
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        self.seen.lock().expect("lock").push(request.clone());
        if let Some(gate) = self.gates.get(&request.ticket_code) {
            gate.acquire().await.expect("gate").forget();
        }
        self.outcomes
            .get(&request.ticket_code)
            .cloned()
            .unwrap_or(ValidationOutcome::Accepted)
    }
}

struct Rig {
    handle: ScannerHandle,
    feed: DecodeFeed,
    store: MemoryHistoryStore,
    clock: ManualClock,
    events: broadcast::Receiver<ScanEvent>,
}

fn rig_with(
    validator: ScriptedValidator,
    decoder: (FeedDecoder, DecodeFeed),
    store: MemoryHistoryStore,
    history: Vec<ScanEntry>,
    config: RuntimeConfig,
) -> Rig {
    let clock = ManualClock::new();
    let (decoder, feed) = decoder;
    let handle = spawn_scanner_with_clock(
        history,
        Box::new(store.clone()),
        Arc::new(validator),
        Box::new(decoder),
        config,
        Arc::new(clock.clone()),
    );
    let events = handle.subscribe();
    Rig {
        handle,
        feed,
        store,
        clock,
        events,
    }
}

fn rig(validator: ScriptedValidator) -> Rig {
    rig_with(
        validator,
        FeedDecoder::pair(),
        MemoryHistoryStore::new(),
        Vec::new(),
        RuntimeConfig::default(),
    )
}

fn event_ctx() -> EventContext {
    EventContext::new("42", "Launch Night")
}

async fn next_matching(
    events: &mut broadcast::Receiver<ScanEvent>,
    pred: impl Fn(&ScanEvent) -> bool,
) -> ScanEvent {
    loop {
        let evt = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timeout")
            .expect("recv");
        if pred(&evt) {
            return evt;
        }
    }
}

async fn capture(rig: &mut Rig, code: &str) -> ScanId {
    assert!(rig.feed.push(code).await, "decoder not active");
    let code = code.to_string();
    match next_matching(&mut rig.events, |e| matches!(e, ScanEvent::Captured { code: c, .. } if *c == code)).await {
        ScanEvent::Captured { id, .. } => id,
        other => panic!("unexpected event {other:?}"),
    }
}

async fn resolved(rig: &mut Rig, id: ScanId) -> ScanEvent {
    next_matching(&mut rig.events, |e| {
        matches!(e, ScanEvent::Accepted { id: i } | ScanEvent::Rejected { id: i, .. } if *i == id)
    })
    .await
}

fn status_of(history: &[ScanEntry], id: ScanId) -> Option<ScanStatus> {
    history.iter().find(|e| e.id == id).map(|e| e.status)
}

#[tokio::test]
async fn accepted_decode_ends_valid_and_is_written_through() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");

    let id = capture(&mut rig, "ABC123").await;
    assert_eq!(resolved(&mut rig, id).await, ScanEvent::Accepted { id });

    let history = rig.handle.history().await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].code, "ABC123");
    assert_eq!(history[0].event_id, "42");
    assert_eq!(history[0].status, ScanStatus::Valid);

    let saved = rig.store.saved().expect("saved").expect("payload");
    assert_eq!(saved, history);
    assert!(rig.store.writes() >= 2, "pending and terminal states are both persisted");

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn repeat_inside_lock_window_is_discarded() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");

    capture(&mut rig, "ABC123").await;
    rig.clock.set_ms(1000);
    assert!(rig.feed.push("ABC123").await);
    capture(&mut rig, "SENTINEL").await;

    let history = rig.handle.history().await.expect("history");
    assert_eq!(history.iter().filter(|e| e.code == "ABC123").count(), 1);
    assert_eq!(history.len(), 2);

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn repeat_after_lock_window_or_other_code_is_processed() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");

    capture(&mut rig, "ABC123").await;
    rig.clock.set_ms(3100);
    capture(&mut rig, "ABC123").await;

    rig.clock.set_ms(3200);
    capture(&mut rig, "XYZ").await;
    rig.clock.set_ms(3300);
    capture(&mut rig, "ABC123").await;

    let history = rig.handle.history().await.expect("history");
    let codes: Vec<&str> = history.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["ABC123", "XYZ", "ABC123", "ABC123"]);

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn rejected_and_unreachable_both_end_invalid() {
    let validator = ScriptedValidator::default()
        .outcome("XYZ", ValidationOutcome::Rejected { status: 400 })
        .outcome(
            "OFFLINE",
            ValidationOutcome::Unreachable {
                reason: "connection refused".to_string(),
            },
        );
    let mut rig = rig(validator);
    rig.handle.start(event_ctx()).await.expect("start");

    let rejected = capture(&mut rig, "XYZ").await;
    assert_eq!(
        resolved(&mut rig, rejected).await,
        ScanEvent::Rejected {
            id: rejected,
            reason: RejectReason::Status(400),
        }
    );

    let offline = capture(&mut rig, "OFFLINE").await;
    match resolved(&mut rig, offline).await {
        ScanEvent::Rejected {
            reason: RejectReason::Unreachable(_),
            ..
        } => {}
        other => panic!("unexpected event {other:?}"),
    }

    let history = rig.handle.history().await.expect("history");
    assert_eq!(status_of(&history, rejected), Some(ScanStatus::Invalid));
    assert_eq!(status_of(&history, offline), Some(ScanStatus::Invalid));

    let stats = rig.handle.stats().await.expect("stats");
    assert_eq!((stats.valid, stats.invalid, stats.pending, stats.total), (0, 2, 0, 2));

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn out_of_order_responses_update_the_matching_entry() {
    let (validator, gate_a) = ScriptedValidator::default()
        .outcome("AAA", ValidationOutcome::Rejected { status: 404 })
        .gated("AAA");
    let (validator, gate_b) = validator.gated("BBB");
    let mut rig = rig(validator);
    rig.handle.start(event_ctx()).await.expect("start");

    let a = capture(&mut rig, "AAA").await;
    let b = capture(&mut rig, "BBB").await;

    gate_b.add_permits(1);
    assert_eq!(resolved(&mut rig, b).await, ScanEvent::Accepted { id: b });
    let history = rig.handle.history().await.expect("history");
    assert_eq!(status_of(&history, a), Some(ScanStatus::Pending));
    assert_eq!(status_of(&history, b), Some(ScanStatus::Valid));

    gate_a.add_permits(1);
    resolved(&mut rig, a).await;
    let history = rig.handle.history().await.expect("history");
    assert_eq!(status_of(&history, a), Some(ScanStatus::Invalid));
    assert_eq!(status_of(&history, b), Some(ScanStatus::Valid));
    assert_eq!(history[0].id, b, "newest entry stays at the head");

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stop_mid_flight_still_resolves_the_entry() {
    let (validator, gate) = ScriptedValidator::default().gated("ABC123");
    let mut rig = rig(validator);
    rig.handle.start(event_ctx()).await.expect("start");

    let id = capture(&mut rig, "ABC123").await;
    rig.handle.stop().await.expect("stop");
    assert!(!rig.feed.is_active());
    assert!(!rig.feed.push("LATE").await);
    assert_eq!(rig.handle.state().await.expect("state"), ScannerState::Idle);

    gate.add_permits(1);
    assert_eq!(resolved(&mut rig, id).await, ScanEvent::Accepted { id });

    let history = rig.handle.history().await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ScanStatus::Valid);

    rig.handle.stop().await.expect("second stop is a no-op");
    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn start_guards_context_and_double_start() {
    let rig = rig(ScriptedValidator::default());

    let err = rig.handle.start(EventContext::new("", "")).await.unwrap_err();
    assert!(matches!(err, ScanError::MissingContext));
    assert_eq!(rig.feed.starts(), 0, "camera untouched without context");

    rig.handle.start(event_ctx()).await.expect("start");
    let err = rig.handle.start(event_ctx()).await.unwrap_err();
    assert!(matches!(err, ScanError::AlreadyScanning));
    assert_eq!(rig.feed.starts(), 1);
    assert_eq!(rig.feed.last_config(), Some(RuntimeConfig::default().camera));

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn camera_failure_propagates_and_releases() {
    let rig = rig_with(
        ScriptedValidator::default(),
        FeedDecoder::failing(CameraError::PermissionDenied),
        MemoryHistoryStore::new(),
        Vec::new(),
        RuntimeConfig::default(),
    );

    let err = rig.handle.start(event_ctx()).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::CameraUnavailable(CameraError::PermissionDenied)
    ));
    assert_eq!(rig.handle.state().await.expect("state"), ScannerState::Idle);
    assert!(rig.feed.stops() >= 1, "partial start is released");

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn clear_history_requires_confirmation() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");
    let id = capture(&mut rig, "ABC123").await;
    resolved(&mut rig, id).await;

    assert!(!rig.handle.clear_history(false).await.expect("declined"));
    assert_eq!(rig.handle.history().await.expect("history").len(), 1);

    assert!(rig.handle.clear_history(true).await.expect("clear"));
    next_matching(&mut rig.events, |e| matches!(e, ScanEvent::HistoryCleared)).await;
    assert!(rig.handle.history().await.expect("history").is_empty());
    assert_eq!(rig.store.saved().expect("saved"), None);

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn decoder_ending_returns_to_idle() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");

    rig.feed.close();
    next_matching(&mut rig.events, |e| matches!(e, ScanEvent::DecoderEnded)).await;
    assert_eq!(rig.handle.state().await.expect("state"), ScannerState::Idle);

    rig.handle.start(event_ctx()).await.expect("restart");
    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stale_pending_entries_fail_closed_on_load() {
    let stale = ScanEntry {
        id: 7,
        code: "OLD".to_string(),
        captured_at_ms: 1,
        event_id: "42".to_string(),
        status: ScanStatus::Pending,
    };
    let store = MemoryHistoryStore::with_entries(std::slice::from_ref(&stale)).expect("seed");
    let mut rig = rig_with(
        ScriptedValidator::default(),
        FeedDecoder::pair(),
        store,
        vec![stale],
        RuntimeConfig::default(),
    );

    let history = rig.handle.history().await.expect("history");
    assert_eq!(status_of(&history, 7), Some(ScanStatus::Invalid));
    let saved = rig.store.saved().expect("saved").expect("payload");
    assert_eq!(saved[0].status, ScanStatus::Invalid);

    rig.handle.start(event_ctx()).await.expect("start");
    let id = capture(&mut rig, "NEW").await;
    assert!(id > 7, "ids continue above loaded history");

    rig.handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_never_leaves_pending_entries() {
    let (validator, _gate) = ScriptedValidator::default().gated("STUCK");
    let config = RuntimeConfig {
        shutdown_grace_ms: 50,
        ..RuntimeConfig::default()
    };
    let mut rig = rig_with(
        validator,
        FeedDecoder::pair(),
        MemoryHistoryStore::new(),
        Vec::new(),
        config,
    );
    rig.handle.start(event_ctx()).await.expect("start");
    let id = capture(&mut rig, "STUCK").await;

    rig.handle.shutdown().await.expect("shutdown");
    assert_eq!(
        resolved(&mut rig, id).await,
        ScanEvent::Rejected {
            id,
            reason: RejectReason::Abandoned,
        }
    );

    let saved = rig.store.saved().expect("saved").expect("payload");
    assert_eq!(status_of(&saved, id), Some(ScanStatus::Invalid));
    assert!(matches!(
        rig.handle.history().await,
        Err(ScanError::ChannelClosed)
    ));
}

#[tokio::test]
async fn dropping_every_handle_settles_in_flight_scans() {
    let (validator, slow_gate) = ScriptedValidator::default().gated("SLOW");
    let (validator, _stuck_gate) = validator.gated("STUCK");
    let config = RuntimeConfig {
        shutdown_grace_ms: 300,
        ..RuntimeConfig::default()
    };
    let mut rig = rig_with(
        validator,
        FeedDecoder::pair(),
        MemoryHistoryStore::new(),
        Vec::new(),
        config,
    );
    rig.handle.start(event_ctx()).await.expect("start");
    let slow = capture(&mut rig, "SLOW").await;
    let stuck = capture(&mut rig, "STUCK").await;

    drop(rig.handle);
    slow_gate.add_permits(1);

    let mut tail = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), rig.events.recv())
            .await
            .expect("runtime did not exit")
        {
            Ok(evt) => tail.push(evt),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    assert!(tail.contains(&ScanEvent::Accepted { id: slow }));
    assert!(tail.contains(&ScanEvent::Rejected {
        id: stuck,
        reason: RejectReason::Abandoned,
    }));

    let saved = rig.store.saved().expect("saved").expect("payload");
    assert_eq!(status_of(&saved, slow), Some(ScanStatus::Valid));
    assert_eq!(status_of(&saved, stuck), Some(ScanStatus::Invalid));
    assert!(saved.iter().all(|e| e.status.is_terminal()));
}

#[tokio::test]
async fn debounce_survives_stop_and_restart() {
    let mut rig = rig(ScriptedValidator::default());
    rig.handle.start(event_ctx()).await.expect("start");
    capture(&mut rig, "ABC123").await;

    rig.handle.stop().await.expect("stop");
    rig.handle.start(event_ctx()).await.expect("restart");

    rig.clock.set_ms(1000);
    assert!(rig.feed.push("ABC123").await);
    capture(&mut rig, "SENTINEL").await;

    let history = rig.handle.history().await.expect("history");
    assert_eq!(history.iter().filter(|e| e.code == "ABC123").count(), 1);
    assert_eq!(history.len(), 2);

    rig.handle.shutdown().await.expect("shutdown");
}
