use std::sync::Arc;

use anyhow::{Context, Result};
use shared::domain::{RecognitionMode, RecognizedAction};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info};

pub mod config;
pub mod config_store;
pub mod error;
pub mod learning;
pub mod live_channel;
pub mod mapping_editor;
pub mod transport;

use config::ClientConfig;
use error::ClientResult;
use learning::{LearnPanel, LearningController};
use live_channel::{LiveChannel, RecognitionStats};
use mapping_editor::MappingEditor;
use transport::RestBackend;

/// Views a front end can show. The client only tracks which one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Dashboard,
    Gestures,
    Voice,
    Settings,
    Learn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ChannelConnected,
    ChannelClosed,
    ModeChanged {
        mode: RecognitionMode,
        enabled: bool,
    },
    /// The server's view of both toggles, sent after connecting.
    ModesSynced {
        gesture_enabled: bool,
        voice_enabled: bool,
    },
    ModeStatus {
        mode: RecognitionMode,
        status_line: String,
    },
    GestureRecognized {
        gesture: String,
        confidence: f64,
        action: Option<RecognizedAction>,
        summary: String,
    },
    VoiceRecognized {
        text: String,
        action: Option<RecognizedAction>,
        summary: String,
    },
    StatsUpdated(RecognitionStats),
    /// Decoded JPEG bytes of the latest camera frame.
    VideoFrame(Arc<Vec<u8>>),
    Learning(LearnPanel),
    ViewRequested(Tab),
    MappingReloaded,
    Info(String),
    Error(String),
}

/// Wires the store client, live channel, mapping editor and learning
/// controller together over one event bus.
pub struct ControlClient {
    config: ClientConfig,
    backend: Arc<RestBackend>,
    channel: Arc<LiveChannel>,
    editor: Arc<MappingEditor>,
    learning: Arc<LearningController>,
    active_tab: Arc<RwLock<Tab>>,
    view_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ControlClient {
    pub fn new(config: ClientConfig) -> Result<Arc<Self>> {
        let backend = Arc::new(
            RestBackend::from_config(&config).context("failed to build HTTP client")?,
        );
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let channel = LiveChannel::new(events.clone());
        let editor = MappingEditor::new(backend.clone(), events.clone());
        let learning = LearningController::with_poll_interval(
            backend.clone(),
            channel.clone(),
            editor.clone(),
            events.clone(),
            config.poll_interval(),
        );
        Ok(Arc::new(Self {
            config,
            backend,
            channel,
            editor,
            learning,
            active_tab: Arc::new(RwLock::new(Tab::default())),
            view_task: Mutex::new(None),
            events,
        }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<RestBackend> {
        &self.backend
    }

    pub fn channel(&self) -> &Arc<LiveChannel> {
        &self.channel
    }

    pub fn editor(&self) -> &Arc<MappingEditor> {
        &self.editor
    }

    pub fn learning(&self) -> &Arc<LearningController> {
        &self.learning
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Opens the live channel and loads the first mapping snapshot.
    pub async fn start(&self) -> Result<()> {
        self.follow_view_requests().await;
        let ws_url = self.config.websocket_url()?;
        self.channel
            .connect(&ws_url)
            .await
            .with_context(|| format!("failed to open live channel at {ws_url}"))?;
        self.editor
            .reload()
            .await
            .context("failed to load configuration from server")?;
        info!(server = self.backend.server_url(), "client: started");
        Ok(())
    }

    pub async fn set_mode(&self, mode: RecognitionMode, enabled: bool) -> ClientResult<()> {
        self.channel.set_mode(mode, enabled).await
    }

    /// Fills the learn form and starts a session.
    pub async fn learn_gesture(&self, name: &str) -> ClientResult<()> {
        self.learning.set_name_input(name).await;
        self.learning.start().await
    }

    pub async fn active_tab(&self) -> Tab {
        *self.active_tab.read().await
    }

    pub async fn select_tab(&self, tab: Tab) {
        *self.active_tab.write().await = tab;
        let _ = self.events.send(ClientEvent::ViewRequested(tab));
    }

    pub async fn shutdown(&self) {
        self.learning.shutdown().await;
        self.channel.disconnect().await;
        if let Some(task) = self.view_task.lock().await.take() {
            task.abort();
        }
        info!("client: shut down");
    }

    async fn follow_view_requests(&self) {
        let mut guard = self.view_task.lock().await;
        if guard.is_some() {
            return;
        }
        let mut rx = self.events.subscribe();
        let active_tab = Arc::clone(&self.active_tab);
        *guard = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::ViewRequested(tab)) => {
                        debug!(?tab, "client: view switched");
                        *active_tab.write().await = tab;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "client: view follower lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
