use super::*;

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

const TEST_POLL_INTERVAL: Duration = Duration::from_millis(5);

struct ScriptedBackend {
    begin_result: Mutex<Option<ClientResult<String>>>,
    polls: Mutex<VecDeque<ClientResult<LearningStatusReport>>>,
    poll_delay: Duration,
    begin_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    begun_names: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn accepting(polls: Vec<ClientResult<LearningStatusReport>>) -> Self {
        Self {
            begin_result: Mutex::new(Some(Ok(
                "Learning 'Wave'. Go to Dashboard and hold pose...".to_string()
            ))),
            polls: Mutex::new(polls.into()),
            poll_delay: Duration::from_millis(2),
            begin_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            begun_names: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(reason: &str) -> Self {
        let mut backend = Self::accepting(Vec::new());
        backend.begin_result = Mutex::new(Some(Err(ClientError::ServerRejection(
            reason.to_string(),
        ))));
        backend
    }

    fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LearningBackend for ScriptedBackend {
    async fn begin_learning(&self, gesture_name: &str) -> ClientResult<String> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.begun_names.lock().await.push(gesture_name.to_string());
        self.begin_result
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| Ok("accepted".to_string()))
    }

    async fn learning_status(&self) -> ClientResult<LearningStatusReport> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(self.poll_delay).await;
        let next = self.polls.lock().await.pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next.unwrap_or_else(|| Err(ClientError::transport("poll script exhausted")))
    }
}

struct StaticModes(AtomicBool);

impl StaticModes {
    fn enabled() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    fn disabled() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(false)))
    }
}

#[async_trait]
impl ModeGate for StaticModes {
    async fn gesture_mode_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct CountingReloader {
    reloads: AtomicUsize,
    delay: Duration,
}

impl CountingReloader {
    fn slow(delay: Duration) -> Self {
        Self {
            reloads: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl SnapshotReloader for CountingReloader {
    async fn reload_snapshot(&self) -> ClientResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn report(status: LearningStatus, message: &str) -> ClientResult<LearningStatusReport> {
    Ok(LearningStatusReport {
        status,
        message: message.to_string(),
    })
}

struct Harness {
    controller: Arc<LearningController>,
    backend: Arc<ScriptedBackend>,
    reloader: Arc<CountingReloader>,
    events: broadcast::Receiver<ClientEvent>,
}

fn harness(backend: ScriptedBackend, modes: Arc<StaticModes>) -> Harness {
    harness_with_reloader(backend, modes, CountingReloader::default())
}

fn harness_with_reloader(
    backend: ScriptedBackend,
    modes: Arc<StaticModes>,
    reloader: CountingReloader,
) -> Harness {
    let (events_tx, events) = broadcast::channel(256);
    let backend = Arc::new(backend);
    let reloader = Arc::new(reloader);
    let controller = LearningController::with_poll_interval(
        backend.clone(),
        modes,
        reloader.clone(),
        events_tx,
        TEST_POLL_INTERVAL,
    );
    Harness {
        controller,
        backend,
        reloader,
        events,
    }
}

fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn learning_panels(events: &[ClientEvent]) -> Vec<LearnPanel> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Learning(panel) => Some(panel.clone()),
            _ => None,
        })
        .collect()
}

fn requested_tabs(events: &[ClientEvent]) -> Vec<Tab> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::ViewRequested(tab) => Some(*tab),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn blank_names_never_reach_the_server() {
    let h = harness(ScriptedBackend::accepting(Vec::new()), StaticModes::enabled());

    for name in ["", "   ", "\t\n "] {
        h.controller.set_name_input(name).await;
        let err = h.controller.start().await.expect_err("must be refused");
        assert_eq!(err, ClientError::Validation(ValidationError::EmptyGestureName));
        assert_eq!(h.controller.state().await, LearningState::Idle);
    }

    assert_eq!(h.backend.begin_calls(), 0);
    assert_eq!(h.backend.poll_calls(), 0);
    assert!(h.controller.panel().await.affordance_enabled);
}

#[tokio::test]
async fn disabled_gesture_mode_blocks_start_without_request() {
    let h = harness(ScriptedBackend::accepting(Vec::new()), StaticModes::disabled());

    h.controller.set_name_input("Wave").await;
    let err = h.controller.start().await.expect_err("must be refused");
    assert_eq!(
        err,
        ClientError::Validation(ValidationError::GestureModeDisabled)
    );
    assert_eq!(h.backend.begin_calls(), 0);
    assert_eq!(h.controller.state().await, LearningState::Idle);
}

#[tokio::test]
async fn name_is_validated_before_gesture_mode() {
    let h = harness(ScriptedBackend::accepting(Vec::new()), StaticModes::disabled());

    h.controller.set_name_input("  ").await;
    let err = h.controller.start().await.expect_err("must be refused");
    assert_eq!(err, ClientError::Validation(ValidationError::EmptyGestureName));
}

#[tokio::test]
async fn learning_then_success_keeps_form_locked_until_success_and_reloads_once() {
    let mut h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Learning, "Hold still... (10/30)"),
            report(LearningStatus::Learning, "Hold still... (20/30)"),
            report(LearningStatus::Success, "Gesture 'Wave' saved."),
        ]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("  Wave ").await;
    h.controller.start().await.expect("start");
    h.controller.wait_for_completion().await;

    let events = drain(&mut h.events);
    let panels = learning_panels(&events);
    let (last, before) = panels.split_last().expect("panel updates");
    assert!(before.iter().all(|panel| !panel.affordance_enabled));
    assert!(before
        .iter()
        .any(|panel| panel.status_message == "Hold still... (20/30)"));
    assert!(last.affordance_enabled);
    assert_eq!(last.tone, StatusTone::Success);
    assert_eq!(last.status_message, "Gesture 'Wave' saved.");
    assert_eq!(last.button_label, LEARN_BUTTON_LABEL);
    assert!(last.name_input.is_empty());

    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 1);
    assert_eq!(requested_tabs(&events), vec![Tab::Dashboard, Tab::Gestures]);
    assert_eq!(h.backend.poll_calls(), 3);
    assert_eq!(h.backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.begun_names.lock().await.as_slice(), ["Wave"]);
    assert_eq!(h.controller.state().await, LearningState::Succeeded);
}

#[tokio::test]
async fn learning_then_error_keeps_name_and_rearms_form() {
    let mut h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Learning, "Hold still... (4/30)"),
            report(
                LearningStatus::Error,
                "Conflict: Too similar to 'Open_Palm'. Try a different pose.",
            ),
        ]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("start");
    h.controller.wait_for_completion().await;

    let panel = h.controller.panel().await;
    assert_eq!(panel.name_input, "Wave");
    assert!(panel.affordance_enabled);
    assert_eq!(panel.tone, StatusTone::Error);
    assert_eq!(
        panel.status_message,
        "Conflict: Too similar to 'Open_Palm'. Try a different pose."
    );

    let session = h.controller.session().await.expect("session");
    assert_eq!(session.state, LearningState::Failed);
    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 0);
    assert!(!requested_tabs(&drain(&mut h.events)).contains(&Tab::Gestures));
}

#[tokio::test]
async fn rejected_start_rearms_immediately_with_server_reason() {
    let h = harness(
        ScriptedBackend::rejecting("This name is already used. Please choose another."),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Fist").await;
    let err = h.controller.start().await.expect_err("rejected");
    assert_eq!(
        err,
        ClientError::ServerRejection("This name is already used. Please choose another.".into())
    );

    let panel = h.controller.panel().await;
    assert!(panel.affordance_enabled);
    assert_eq!(
        panel.status_message,
        "Error: This name is already used. Please choose another."
    );
    assert_eq!(panel.name_input, "Fist");
    assert_eq!(h.controller.state().await, LearningState::Failed);
    assert_eq!(h.backend.poll_calls(), 0);
}

#[tokio::test]
async fn poll_transport_failure_ends_loop_and_rearms() {
    let h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Learning, "Hold still... (1/30)"),
            Err(ClientError::transport("connection reset")),
        ]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("start");
    h.controller.wait_for_completion().await;

    let panel = h.controller.panel().await;
    assert!(panel.affordance_enabled);
    assert_eq!(panel.status_message, STATUS_CHECK_FAILED);
    assert_eq!(h.controller.state().await, LearningState::Failed);
    assert_eq!(h.backend.poll_calls(), 2);
}

#[tokio::test]
async fn idle_status_from_server_does_not_lock_the_form() {
    let h = harness(
        ScriptedBackend::accepting(vec![report(LearningStatus::Idle, "")]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("start");
    h.controller.wait_for_completion().await;

    let panel = h.controller.panel().await;
    assert!(panel.affordance_enabled);
    assert_eq!(panel.status_message, SESSION_FORGOTTEN);
}

#[tokio::test]
async fn second_start_while_polling_is_refused_before_any_request() {
    let h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Learning, "Hold still... (1/30)"),
            report(LearningStatus::Success, "done"),
        ])
        .with_poll_delay(Duration::from_millis(40)),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("start");
    assert_eq!(h.controller.state().await, LearningState::Polling);

    h.controller.set_name_input("Other").await;
    let err = h.controller.start().await.expect_err("busy");
    assert_eq!(err, ClientError::Validation(ValidationError::SessionInProgress));
    assert_eq!(h.backend.begin_calls(), 1);

    h.controller.wait_for_completion().await;
    assert_eq!(h.backend.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn acknowledge_returns_finished_session_to_idle() {
    let h = harness(
        ScriptedBackend::accepting(vec![report(LearningStatus::Error, "too similar")]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("start");
    h.controller.wait_for_completion().await;
    assert_eq!(h.controller.state().await, LearningState::Failed);

    h.controller.acknowledge().await;
    assert_eq!(h.controller.state().await, LearningState::Idle);
    let panel = h.controller.panel().await;
    assert!(panel.status_message.is_empty());
    assert_eq!(panel.name_input, "Wave");
}

#[tokio::test]
async fn retry_after_failure_starts_a_fresh_session() {
    let h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Error, "too similar"),
            report(LearningStatus::Success, "saved"),
        ]),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("first start");
    h.controller.wait_for_completion().await;
    let first = h.controller.session().await.expect("first session");

    h.controller.start().await.expect("retry without retyping");
    h.controller.wait_for_completion().await;
    let second = h.controller.session().await.expect("second session");

    assert_ne!(first.id, second.id);
    assert_eq!(second.gesture_name, "Wave");
    assert_eq!(second.state, LearningState::Succeeded);
    assert_eq!(h.backend.begin_calls(), 2);
}

#[tokio::test]
async fn restart_during_success_reload_lets_the_reload_finish() {
    let mut h = harness_with_reloader(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Success, "Gesture 'Wave' saved."),
            report(LearningStatus::Error, "too similar"),
        ]),
        StaticModes::enabled(),
        CountingReloader::slow(Duration::from_millis(150)),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("first start");
    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.controller.panel().await.affordance_enabled {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("form re-armed after success");
    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 0);

    h.controller.set_name_input("Peace").await;
    h.controller.start().await.expect("second start");
    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 1);
    h.controller.wait_for_completion().await;

    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 1);
    assert_eq!(
        requested_tabs(&drain(&mut h.events)),
        vec![Tab::Dashboard, Tab::Gestures, Tab::Dashboard]
    );
    assert_eq!(
        h.backend.begun_names.lock().await.as_slice(),
        ["Wave", "Peace"]
    );
}

#[tokio::test]
async fn poll_result_for_superseded_session_is_dropped() {
    let h = harness(
        ScriptedBackend::accepting(vec![
            report(LearningStatus::Error, "too similar"),
            report(LearningStatus::Learning, "Hold still... (5/30)"),
        ])
        .with_poll_delay(Duration::from_millis(100)),
        StaticModes::enabled(),
    );

    h.controller.set_name_input("Wave").await;
    h.controller.start().await.expect("first start");
    h.controller.wait_for_completion().await;
    let first = h.controller.session().await.expect("first session");
    assert_eq!(first.state, LearningState::Failed);

    h.controller.start().await.expect("second start");
    let panel_before = h.controller.panel().await;
    let current_before = h.controller.session().await.expect("second session");
    assert_eq!(current_before.state, LearningState::Polling);

    let step = h
        .controller
        .apply_poll_outcome(first.id, report(LearningStatus::Success, "late success"))
        .await;
    assert!(matches!(step, PollStep::Finished));

    assert_eq!(h.controller.panel().await, panel_before);
    assert_eq!(h.controller.session().await, Some(current_before));
    assert_eq!(h.reloader.reloads.load(Ordering::SeqCst), 0);
    h.controller.shutdown().await;
}
