//! Duplex push channel: mode toggles out, recognition events in.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::{RecognitionMode, RecognizedAction},
    protocol::{ClientCommand, ServerEvent},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ClientResult},
    learning::ModeGate,
    ClientEvent,
};

/// Per-process recognition counters. Reset whenever a new channel session is
/// established; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecognitionStats {
    pub gestures_recognized: u64,
    pub commands_recognized: u64,
    pub actions_triggered: u64,
}

impl RecognitionStats {
    fn record(&mut self, mode: RecognitionMode, action: Option<&RecognizedAction>) {
        match mode {
            RecognitionMode::Gesture => self.gestures_recognized += 1,
            RecognitionMode::Voice => self.commands_recognized += 1,
        }
        if action.is_some_and(RecognizedAction::is_triggerable) {
            self.actions_triggered += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeIndicator {
    pub enabled: bool,
    pub status_line: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    pub connected: bool,
    pub gesture: ModeIndicator,
    pub voice: ModeIndicator,
    pub last_gesture_result: Option<String>,
    pub last_voice_result: Option<String>,
    pub stats: RecognitionStats,
}

fn action_label(action: Option<&RecognizedAction>) -> &str {
    action.map_or("None", |action| action.label.as_str())
}

fn mentions_gesture_subsystem(message: &str) -> bool {
    message.to_ascii_lowercase().contains("gesture")
}

impl ChannelState {
    pub fn mode(&self, mode: RecognitionMode) -> &ModeIndicator {
        match mode {
            RecognitionMode::Gesture => &self.gesture,
            RecognitionMode::Voice => &self.voice,
        }
    }

    fn mode_mut(&mut self, mode: RecognitionMode) -> &mut ModeIndicator {
        match mode {
            RecognitionMode::Gesture => &mut self.gesture,
            RecognitionMode::Voice => &mut self.voice,
        }
    }

    /// Applies a user toggle. Turning a mode off resets its status line
    /// without waiting for the server.
    pub fn set_mode_enabled(&mut self, mode: RecognitionMode, enabled: bool) -> Vec<ClientEvent> {
        let indicator = self.mode_mut(mode);
        indicator.enabled = enabled;
        let mut events = vec![ClientEvent::ModeChanged { mode, enabled }];
        if !enabled {
            let label = match mode {
                RecognitionMode::Gesture => "Gesture",
                RecognitionMode::Voice => "Voice",
            };
            indicator.status_line = format!("Status: {label} recognition stopped");
            events.push(ClientEvent::ModeStatus {
                mode,
                status_line: indicator.status_line.clone(),
            });
        }
        events
    }

    /// Marks the session closed and switches enabled modes off.
    pub fn close(&mut self) -> Vec<ClientEvent> {
        self.connected = false;
        let mut events = Vec::new();
        for mode in [RecognitionMode::Gesture, RecognitionMode::Voice] {
            if self.mode(mode).enabled {
                events.extend(self.set_mode_enabled(mode, false));
            }
        }
        events
    }

    fn sync_mode(&mut self, mode: RecognitionMode, enabled: bool, events: &mut Vec<ClientEvent>) {
        let indicator = self.mode_mut(mode);
        if indicator.enabled != enabled {
            indicator.enabled = enabled;
            events.push(ClientEvent::ModeChanged { mode, enabled });
        }
    }

    /// Folds one inbound event into the state and returns what to publish.
    pub fn apply(&mut self, event: ServerEvent) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        match event {
            ServerEvent::Connected => {
                self.connected = true;
                events.push(ClientEvent::ChannelConnected);
            }
            ServerEvent::Status {
                gesture_enabled,
                voice_enabled,
            } => {
                self.sync_mode(RecognitionMode::Gesture, gesture_enabled, &mut events);
                self.sync_mode(RecognitionMode::Voice, voice_enabled, &mut events);
                events.push(ClientEvent::ModesSynced {
                    gesture_enabled,
                    voice_enabled,
                });
            }
            ServerEvent::GestureStatus { message } => {
                self.gesture.status_line = format!("Status: {message}");
                events.push(ClientEvent::ModeStatus {
                    mode: RecognitionMode::Gesture,
                    status_line: self.gesture.status_line.clone(),
                });
            }
            ServerEvent::VoiceStatus { message } => {
                self.voice.status_line = format!("Status: {message}");
                events.push(ClientEvent::ModeStatus {
                    mode: RecognitionMode::Voice,
                    status_line: self.voice.status_line.clone(),
                });
            }
            ServerEvent::GestureRecognized {
                gesture,
                confidence,
                action,
            } => {
                let action = RecognizedAction::classify(action.as_deref());
                let summary = format!(
                    "Gesture: {gesture} ({:.1}%) → Action: {}",
                    confidence * 100.0,
                    action_label(action.as_ref())
                );
                self.stats.record(RecognitionMode::Gesture, action.as_ref());
                self.last_gesture_result = Some(summary.clone());
                events.push(ClientEvent::GestureRecognized {
                    gesture,
                    confidence,
                    action,
                    summary,
                });
                events.push(ClientEvent::StatsUpdated(self.stats));
            }
            ServerEvent::VoiceRecognized {
                text,
                confidence: _,
                action,
            } => {
                let action = RecognizedAction::classify(action.as_deref());
                let summary = format!(
                    "Voice: \"{text}\" → Action: {}",
                    action_label(action.as_ref())
                );
                self.stats.record(RecognitionMode::Voice, action.as_ref());
                self.last_voice_result = Some(summary.clone());
                events.push(ClientEvent::VoiceRecognized {
                    text,
                    action,
                    summary,
                });
                events.push(ClientEvent::StatsUpdated(self.stats));
            }
            ServerEvent::VideoFrame { frame } => match STANDARD.decode(frame.as_bytes()) {
                Ok(bytes) => events.push(ClientEvent::VideoFrame(Arc::new(bytes))),
                Err(err) => debug!("channel: dropping undecodable video frame: {err}"),
            },
            ServerEvent::Error { message } => {
                if mentions_gesture_subsystem(&message) && self.gesture.enabled {
                    self.gesture.enabled = false;
                    events.push(ClientEvent::ModeChanged {
                        mode: RecognitionMode::Gesture,
                        enabled: false,
                    });
                }
                events.push(ClientEvent::Error(message));
            }
        }
        events
    }
}

pub struct LiveChannel {
    state: RwLock<ChannelState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl LiveChannel {
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(ChannelState::default()),
            outbound: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            events,
        })
    }

    /// Opens a new channel session. Any previous session is torn down and the
    /// view state, counters included, starts from scratch.
    pub async fn connect(self: &Arc<Self>, ws_url: &str) -> ClientResult<()> {
        self.disconnect().await;

        let (ws_stream, _) = connect_async(ws_url).await.map_err(|err| {
            ClientError::transport(format!("failed to connect websocket {ws_url}: {err}"))
        })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        info!(url = ws_url, "channel: websocket connected");

        *self.state.write().await = ChannelState {
            connected: true,
            ..ChannelState::default()
        };
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientCommand>();
        *self.outbound.lock().await = Some(outbound_tx);

        let writer = tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("channel: failed to encode {command:?}: {err}");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!("channel: websocket send failed: {err}");
                    break;
                }
                debug!(?command, "channel: command sent");
            }
            let _ = ws_writer.close().await;
        });

        let channel = Arc::clone(self);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => channel.apply_server_event(event).await,
                        Err(err) => {
                            channel.publish(ClientEvent::Error(format!("invalid server event: {err}")));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        channel.publish(ClientEvent::Error(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                }
            }
            channel.mark_closed().await;
        });

        self.tasks.lock().await.extend([writer, reader]);
        self.publish(ClientEvent::ChannelConnected);
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.outbound.lock().await.take();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.state.write().await.connected = false;
    }

    pub async fn snapshot(&self) -> ChannelState {
        self.state.read().await.clone()
    }

    pub async fn stats(&self) -> RecognitionStats {
        self.state.read().await.stats
    }

    pub async fn is_enabled(&self, mode: RecognitionMode) -> bool {
        self.state.read().await.mode(mode).enabled
    }

    /// Flips a recognition mode. The flag changes immediately; the server
    /// confirms later through a status event.
    pub async fn set_mode(&self, mode: RecognitionMode, enabled: bool) -> ClientResult<()> {
        let outbound = self.outbound.lock().await.clone();
        let Some(outbound) = outbound else {
            return Err(ClientError::transport("live channel is not connected"));
        };

        let events = self.state.write().await.set_mode_enabled(mode, enabled);
        for event in events {
            self.publish(event);
        }

        let command = ClientCommand::toggle(mode, enabled);
        if outbound.send(command).is_err() {
            let events = self.state.write().await.set_mode_enabled(mode, !enabled);
            for event in events {
                self.publish(event);
            }
            return Err(ClientError::transport("live channel closed"));
        }
        info!(%mode, enabled, "channel: mode toggled");
        Ok(())
    }

    pub async fn apply_server_event(&self, event: ServerEvent) {
        let events = self.state.write().await.apply(event);
        for event in events {
            self.publish(event);
        }
    }

    async fn mark_closed(&self) {
        self.outbound.lock().await.take();
        let events = self.state.write().await.close();
        info!("channel: websocket closed");
        for event in events {
            self.publish(event);
        }
        self.publish(ClientEvent::Error("Live channel disconnected.".to_string()));
        self.publish(ClientEvent::ChannelClosed);
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ModeGate for LiveChannel {
    async fn gesture_mode_enabled(&self) -> bool {
        self.is_enabled(RecognitionMode::Gesture).await
    }
}

#[cfg(test)]
#[path = "tests/live_channel_tests.rs"]
mod tests;
