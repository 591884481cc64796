//! Editable view over the gesture/voice → action mapping.
//!
//! The editor holds the last snapshot fetched from the store and a separate
//! buffer of pending selections. Saving submits the complete mapping; the
//! snapshot itself only ever changes on a successful reload.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{ActionCatalog, ActionName, BindingKind, MappingSet, RecognitionSettings},
    protocol::{encode_mapping, MappingUpdate},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::{
    config_store::ConfigStore,
    error::{ClientError, ClientResult, ValidationError},
    learning::SnapshotReloader,
    ClientEvent,
};

const LOAD_FAILED: &str = "Failed to load configuration from server.";
const CUSTOM_SUFFIX: &str = " (Custom)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureRow {
    pub key: String,
    pub label: String,
    pub selected: Option<ActionName>,
    pub kind: BindingKind,
    pub deletable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRow {
    pub key: String,
    pub command_text: String,
    pub selected: Option<ActionName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

pub fn delete_confirmation_prompt(key: &str) -> String {
    format!("Are you sure you want to delete the custom gesture \"{key}\"? This cannot be undone.")
}

#[derive(Default)]
struct EditorInner {
    catalog: ActionCatalog,
    snapshot: Option<MappingSet>,
    gesture_edits: BTreeMap<String, Option<ActionName>>,
    voice_edits: BTreeMap<String, Option<ActionName>>,
}

impl EditorInner {
    fn snapshot(&self) -> ClientResult<&MappingSet> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| ValidationError::SnapshotNotLoaded.into())
    }

    fn check_action(&self, action: Option<&ActionName>) -> ClientResult<()> {
        match action {
            Some(action) if !self.catalog.contains(action) => {
                Err(ValidationError::UnknownAction(action.to_string()).into())
            }
            _ => Ok(()),
        }
    }

    fn gesture_selection<'a>(&'a self, key: &str, bound: Option<&'a ActionName>) -> Option<&'a ActionName> {
        match self.gesture_edits.get(key) {
            Some(edit) => edit.as_ref(),
            None => bound,
        }
    }

    fn voice_selection<'a>(&'a self, key: &str, bound: Option<&'a ActionName>) -> Option<&'a ActionName> {
        match self.voice_edits.get(key) {
            Some(edit) => edit.as_ref(),
            None => bound,
        }
    }

    fn gesture_update(&self) -> ClientResult<MappingUpdate> {
        let snapshot = self.snapshot()?;
        Ok(encode_mapping(snapshot.gestures.iter().map(|(key, binding)| {
            (
                key.as_str(),
                self.gesture_selection(key, binding.bound_action.as_ref()),
            )
        })))
    }

    fn voice_update(&self) -> ClientResult<MappingUpdate> {
        let snapshot = self.snapshot()?;
        Ok(encode_mapping(snapshot.voice_commands.iter().map(
            |(key, binding)| {
                (
                    key.as_str(),
                    self.voice_selection(key, binding.bound_action.as_ref()),
                )
            },
        )))
    }
}

fn kind_rank(kind: BindingKind) -> u8 {
    match kind {
        BindingKind::BuiltIn => 0,
        BindingKind::Custom => 1,
    }
}

pub struct MappingEditor {
    store: Arc<dyn ConfigStore>,
    inner: RwLock<EditorInner>,
    events: broadcast::Sender<ClientEvent>,
}

impl MappingEditor {
    pub fn new(store: Arc<dyn ConfigStore>, events: broadcast::Sender<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: RwLock::new(EditorInner::default()),
            events,
        })
    }

    /// Fetches the catalog and then the mapping snapshot. Both are replaced
    /// together; a failure at either step leaves the previous view intact.
    pub async fn reload(&self) -> ClientResult<()> {
        let fetched = async {
            let catalog = self.store.fetch_action_catalog().await?;
            let snapshot = self.store.fetch_config().await?;
            Ok::<_, ClientError>((catalog, snapshot))
        }
        .await;

        let (catalog, snapshot) = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!("editor: reload failed: {err}");
                self.publish(ClientEvent::Error(LOAD_FAILED.to_string()));
                return Err(err);
            }
        };

        {
            let mut guard = self.inner.write().await;
            info!(
                actions = catalog.len(),
                gestures = snapshot.gestures.len(),
                voice_commands = snapshot.voice_commands.len(),
                "editor: snapshot loaded"
            );
            guard.catalog = catalog;
            guard.snapshot = Some(snapshot);
            guard.gesture_edits.clear();
            guard.voice_edits.clear();
        }
        self.publish(ClientEvent::MappingReloaded);
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.snapshot.is_some()
    }

    pub async fn catalog(&self) -> ActionCatalog {
        self.inner.read().await.catalog.clone()
    }

    pub async fn snapshot(&self) -> Option<MappingSet> {
        self.inner.read().await.snapshot.clone()
    }

    /// Built-in gestures first, then custom ones; alphabetical by display
    /// name within each group.
    pub async fn gesture_rows(&self) -> Vec<GestureRow> {
        let guard = self.inner.read().await;
        let Some(snapshot) = guard.snapshot.as_ref() else {
            return Vec::new();
        };
        let mut bindings: Vec<_> = snapshot.gestures.iter().collect();
        bindings.sort_by(|(_, a), (_, b)| {
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        bindings
            .into_iter()
            .map(|(key, binding)| {
                let mut label = binding.display_name.clone();
                if binding.is_custom() {
                    label.push_str(CUSTOM_SUFFIX);
                }
                GestureRow {
                    key: key.clone(),
                    label,
                    selected: guard
                        .gesture_selection(key, binding.bound_action.as_ref())
                        .cloned(),
                    kind: binding.kind,
                    deletable: binding.is_custom(),
                }
            })
            .collect()
    }

    pub async fn voice_rows(&self) -> Vec<VoiceRow> {
        let guard = self.inner.read().await;
        let Some(snapshot) = guard.snapshot.as_ref() else {
            return Vec::new();
        };
        snapshot
            .voice_commands
            .iter()
            .map(|(key, binding)| VoiceRow {
                key: key.clone(),
                command_text: binding.command_text.clone(),
                selected: guard
                    .voice_selection(key, binding.bound_action.as_ref())
                    .cloned(),
            })
            .collect()
    }

    pub async fn select_gesture_action(
        &self,
        key: &str,
        action: Option<ActionName>,
    ) -> ClientResult<()> {
        let mut guard = self.inner.write().await;
        if !guard.snapshot()?.gestures.contains_key(key) {
            return Err(ValidationError::UnknownGesture(key.to_string()).into());
        }
        guard.check_action(action.as_ref())?;
        debug!(key, action = ?action, "editor: gesture selection buffered");
        guard.gesture_edits.insert(key.to_string(), action);
        Ok(())
    }

    pub async fn select_voice_action(
        &self,
        key: &str,
        action: Option<ActionName>,
    ) -> ClientResult<()> {
        let mut guard = self.inner.write().await;
        if !guard.snapshot()?.voice_commands.contains_key(key) {
            return Err(ValidationError::UnknownVoiceCommand(key.to_string()).into());
        }
        guard.check_action(action.as_ref())?;
        debug!(key, action = ?action, "editor: voice selection buffered");
        guard.voice_edits.insert(key.to_string(), action);
        Ok(())
    }

    pub async fn save_gesture_mappings(&self) -> ClientResult<()> {
        let update = self.inner.read().await.gesture_update()?;
        self.submit(
            self.store.save_gesture_mappings(&update).await,
            "Gesture actions saved successfully!",
            "Error saving gesture actions",
        )
    }

    pub async fn save_voice_mappings(&self) -> ClientResult<()> {
        let update = self.inner.read().await.voice_update()?;
        self.submit(
            self.store.save_voice_mappings(&update).await,
            "Voice actions saved successfully!",
            "Error saving voice actions",
        )
    }

    pub async fn settings(&self) -> ClientResult<RecognitionSettings> {
        Ok(self.inner.read().await.snapshot()?.settings.clone())
    }

    pub async fn save_settings(&self, settings: &RecognitionSettings) -> ClientResult<()> {
        self.submit(
            self.store.save_settings(settings).await,
            "Settings saved successfully! Restarting gesture recognition if active.",
            "Error saving settings",
        )
    }

    /// Deletes a custom gesture after `confirm` accepts the prompt. On
    /// success the snapshot is reloaded; on rejection it is left as is.
    pub async fn delete_custom_gesture<F>(&self, key: &str, confirm: F) -> ClientResult<DeleteOutcome>
    where
        F: FnOnce(&str) -> bool,
    {
        if !confirm(&delete_confirmation_prompt(key)) {
            debug!(key, "editor: delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        let known_builtin = self
            .inner
            .read()
            .await
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.gestures.get(key))
            .is_some_and(|binding| binding.kind == BindingKind::BuiltIn);
        if known_builtin {
            let err = ValidationError::BuiltInNotDeletable;
            self.publish(ClientEvent::Error(err.to_string()));
            return Err(err.into());
        }

        if let Err(err) = self.store.delete_gesture(key).await {
            warn!(key, "editor: delete failed: {err}");
            self.publish(ClientEvent::Error(format!(
                "Error deleting gesture: {}",
                err.user_message()
            )));
            return Err(err);
        }

        info!(key, "editor: custom gesture deleted");
        self.publish(ClientEvent::Info("Gesture deleted successfully.".to_string()));
        if let Err(err) = self.reload().await {
            warn!(key, "editor: reload after delete failed: {err}");
        }
        Ok(DeleteOutcome::Deleted)
    }

    fn submit(&self, result: ClientResult<()>, success: &str, failure: &str) -> ClientResult<()> {
        match result {
            Ok(()) => {
                self.publish(ClientEvent::Info(success.to_string()));
                Ok(())
            }
            Err(err) => {
                self.publish(ClientEvent::Error(format!(
                    "{failure}: {}",
                    err.user_message()
                )));
                Err(err)
            }
        }
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SnapshotReloader for MappingEditor {
    async fn reload_snapshot(&self) -> ClientResult<()> {
        self.reload().await
    }
}

#[cfg(test)]
#[path = "tests/mapping_editor_tests.rs"]
mod tests;
