//! Gesture-learning workflow: start a server-side capture session, poll its
//! status until it finishes, then reconcile the learn panel and mapping view.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::protocol::{LearningStatus, LearningStatusReport};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{ClientError, ClientResult, ValidationError},
    ClientEvent, Tab,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const LEARN_BUTTON_LABEL: &str = "Learn New Gesture";
pub const LEARNING_BUTTON_LABEL: &str = "Learning...";
const STARTING_MESSAGE: &str = "Starting...";
const STATUS_CHECK_FAILED: &str = "Error checking learning status.";
const SESSION_FORGOTTEN: &str = "Learning session is no longer active on the server.";
const LEARNED_NOTICE: &str = "Gesture learned successfully! It has been added to the gesture list.";
const RELOAD_FAILED: &str = "Failed to load configuration from server.";

#[async_trait]
pub trait LearningBackend: Send + Sync {
    /// Returns the server's acceptance message.
    async fn begin_learning(&self, gesture_name: &str) -> ClientResult<String>;
    async fn learning_status(&self) -> ClientResult<LearningStatusReport>;
}

/// Whether gesture recognition is switched on for this client.
#[async_trait]
pub trait ModeGate: Send + Sync {
    async fn gesture_mode_enabled(&self) -> bool;
}

/// Reloads the action catalog and mapping snapshot after the server's
/// gesture set changed.
#[async_trait]
pub trait SnapshotReloader: Send + Sync {
    async fn reload_snapshot(&self) -> ClientResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningState {
    Idle,
    Starting,
    Polling,
    Succeeded,
    Failed,
}

impl LearningState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Neutral,
    Learning,
    Success,
    Error,
}

/// View model of the learn form. `affordance_enabled` is the single-flight
/// guard: while it is false no new session can be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnPanel {
    pub name_input: String,
    pub affordance_enabled: bool,
    pub button_label: String,
    pub status_message: String,
    pub tone: StatusTone,
}

impl Default for LearnPanel {
    fn default() -> Self {
        Self {
            name_input: String::new(),
            affordance_enabled: true,
            button_label: LEARN_BUTTON_LABEL.to_string(),
            status_message: String::new(),
            tone: StatusTone::Neutral,
        }
    }
}

impl LearnPanel {
    fn arm(&mut self, message: impl Into<String>, tone: StatusTone) {
        self.affordance_enabled = true;
        self.button_label = LEARN_BUTTON_LABEL.to_string();
        self.status_message = message.into();
        self.tone = tone;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningSession {
    pub id: Uuid,
    pub gesture_name: String,
    pub state: LearningState,
    pub last_message: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct LearningInner {
    panel: LearnPanel,
    session: Option<LearningSession>,
}

impl LearningInner {
    fn current_session_mut(&mut self, session_id: Uuid) -> Option<&mut LearningSession> {
        self.session
            .as_mut()
            .filter(|session| session.id == session_id)
    }

    fn fail(&mut self, session_id: Uuid, reason: &str, status_line: String) {
        if let Some(session) = self.current_session_mut(session_id) {
            session.state = LearningState::Failed;
            session.last_message = reason.to_string();
        }
        self.panel.arm(status_line, StatusTone::Error);
    }
}

enum PollStep {
    Continue,
    Succeeded,
    Finished,
}

pub struct LearningController {
    backend: Arc<dyn LearningBackend>,
    modes: Arc<dyn ModeGate>,
    reloader: Arc<dyn SnapshotReloader>,
    poll_interval: Duration,
    inner: Mutex<LearningInner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl LearningController {
    pub fn new(
        backend: Arc<dyn LearningBackend>,
        modes: Arc<dyn ModeGate>,
        reloader: Arc<dyn SnapshotReloader>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        Self::with_poll_interval(backend, modes, reloader, events, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        backend: Arc<dyn LearningBackend>,
        modes: Arc<dyn ModeGate>,
        reloader: Arc<dyn SnapshotReloader>,
        events: broadcast::Sender<ClientEvent>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            modes,
            reloader,
            poll_interval,
            inner: Mutex::new(LearningInner::default()),
            poll_task: Mutex::new(None),
            events,
        })
    }

    pub async fn panel(&self) -> LearnPanel {
        self.inner.lock().await.panel.clone()
    }

    pub async fn session(&self) -> Option<LearningSession> {
        self.inner.lock().await.session.clone()
    }

    pub async fn state(&self) -> LearningState {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map_or(LearningState::Idle, |session| session.state)
    }

    pub async fn set_name_input(&self, name: impl Into<String>) {
        self.inner.lock().await.panel.name_input = name.into();
    }

    /// Re-arms the form after a finished session.
    pub async fn acknowledge(&self) {
        let panel = {
            let mut guard = self.inner.lock().await;
            let finished = guard
                .session
                .as_ref()
                .is_some_and(|session| session.state.is_terminal());
            if !finished {
                return;
            }
            guard.session = None;
            guard.panel.arm(String::new(), StatusTone::Neutral);
            guard.panel.clone()
        };
        self.publish(ClientEvent::Learning(panel));
    }

    /// Starts learning the gesture named in the form. Checks run in a fixed
    /// order: a busy form, then the name, then the gesture mode.
    pub async fn start(self: &Arc<Self>) -> ClientResult<()> {
        if !self.inner.lock().await.panel.affordance_enabled {
            return Err(ValidationError::SessionInProgress.into());
        }
        // The form is armed, so any previous task is past polling but may
        // still be reloading the snapshot. Let it finish.
        let finishing = self.poll_task.lock().await.take();
        if let Some(finishing) = finishing {
            let _ = finishing.await;
        }

        let (session_id, gesture_name, panel) = {
            let mut guard = self.inner.lock().await;
            if !guard.panel.affordance_enabled {
                return Err(ValidationError::SessionInProgress.into());
            }
            if guard
                .session
                .as_ref()
                .is_some_and(|session| session.state.is_terminal())
            {
                guard.session = None;
            }

            let gesture_name = guard.panel.name_input.trim().to_string();
            if gesture_name.is_empty() {
                return Err(self.reject(ValidationError::EmptyGestureName));
            }
            if !self.modes.gesture_mode_enabled().await {
                return Err(self.reject(ValidationError::GestureModeDisabled));
            }

            let session = LearningSession {
                id: Uuid::new_v4(),
                gesture_name: gesture_name.clone(),
                state: LearningState::Starting,
                last_message: STARTING_MESSAGE.to_string(),
                started_at: Utc::now(),
            };
            let session_id = session.id;
            guard.session = Some(session);
            guard.panel.affordance_enabled = false;
            guard.panel.button_label = LEARNING_BUTTON_LABEL.to_string();
            guard.panel.status_message = STARTING_MESSAGE.to_string();
            guard.panel.tone = StatusTone::Learning;
            (session_id, gesture_name, guard.panel.clone())
        };
        self.publish(ClientEvent::Learning(panel));
        info!(session = %session_id, gesture = %gesture_name, "learning: starting session");

        let accepted = self.backend.begin_learning(&gesture_name).await;

        let mut guard = self.inner.lock().await;
        let message = match accepted {
            Ok(message) => message,
            Err(err) => {
                let reason = match &err {
                    ClientError::ServerRejection(reason) => reason.clone(),
                    other => other.user_message(),
                };
                warn!(session = %session_id, gesture = %gesture_name, "learning: start rejected: {reason}");
                guard.fail(session_id, &reason, format!("Error: {reason}"));
                let panel = guard.panel.clone();
                drop(guard);
                self.publish(ClientEvent::Learning(panel));
                return Err(err);
            }
        };

        if let Some(session) = guard.current_session_mut(session_id) {
            session.state = LearningState::Polling;
            session.last_message = message.clone();
        }
        guard.panel.status_message = message;
        let panel = guard.panel.clone();
        drop(guard);

        self.publish(ClientEvent::Learning(panel));
        self.publish(ClientEvent::ViewRequested(Tab::Dashboard));

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            controller.poll_until_finished(session_id).await;
        });
        if self.poll_task.lock().await.replace(task).is_some() {
            debug!(session = %session_id, "learning: detached an earlier poll task");
        }
        Ok(())
    }

    /// Waits for the running poll loop, if any, to reach a terminal state.
    pub async fn wait_for_completion(&self) {
        let task = self.poll_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
        }
    }

    fn reject(&self, err: ValidationError) -> ClientError {
        debug!("learning: request refused locally: {err}");
        self.publish(ClientEvent::Error(err.to_string()));
        err.into()
    }

    async fn poll_until_finished(self: Arc<Self>, session_id: Uuid) {
        loop {
            let outcome = self.backend.learning_status().await;
            match self.apply_poll_outcome(session_id, outcome).await {
                PollStep::Continue => tokio::time::sleep(self.poll_interval).await,
                PollStep::Succeeded => {
                    self.publish(ClientEvent::Info(LEARNED_NOTICE.to_string()));
                    if let Err(err) = self.reloader.reload_snapshot().await {
                        warn!(session = %session_id, "learning: reload after success failed: {err}");
                        self.publish(ClientEvent::Error(RELOAD_FAILED.to_string()));
                    }
                    self.publish(ClientEvent::ViewRequested(Tab::Gestures));
                    break;
                }
                PollStep::Finished => break,
            }
        }
    }

    async fn apply_poll_outcome(
        &self,
        session_id: Uuid,
        outcome: ClientResult<LearningStatusReport>,
    ) -> PollStep {
        let mut guard = self.inner.lock().await;
        let Some(session) = guard.current_session_mut(session_id) else {
            debug!(session = %session_id, "learning: dropping poll result for superseded session");
            return PollStep::Finished;
        };
        if session.state != LearningState::Polling {
            return PollStep::Finished;
        }

        let step = match outcome {
            Ok(report) => match report.status {
                LearningStatus::Learning => {
                    session.last_message = report.message.clone();
                    guard.panel.status_message = report.message;
                    PollStep::Continue
                }
                LearningStatus::Success => {
                    info!(session = %session_id, gesture = %session.gesture_name, "learning: gesture learned");
                    session.state = LearningState::Succeeded;
                    session.last_message = report.message.clone();
                    guard.panel.name_input.clear();
                    guard.panel.arm(report.message, StatusTone::Success);
                    PollStep::Succeeded
                }
                LearningStatus::Error => {
                    warn!(session = %session_id, "learning: server reported failure: {}", report.message);
                    let message = report.message;
                    guard.fail(session_id, &message, message.clone());
                    PollStep::Finished
                }
                LearningStatus::Idle | LearningStatus::Unknown => {
                    warn!(session = %session_id, status = ?report.status, "learning: server no longer tracks session");
                    guard.fail(session_id, SESSION_FORGOTTEN, SESSION_FORGOTTEN.to_string());
                    PollStep::Finished
                }
            },
            Err(err) => {
                warn!(session = %session_id, "learning: status poll failed: {err}");
                guard.fail(
                    session_id,
                    STATUS_CHECK_FAILED,
                    STATUS_CHECK_FAILED.to_string(),
                );
                PollStep::Finished
            }
        };

        let panel = guard.panel.clone();
        drop(guard);
        self.publish(ClientEvent::Learning(panel));
        step
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/learning_tests.rs"]
mod tests;
