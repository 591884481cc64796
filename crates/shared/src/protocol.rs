use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    ActionName, BindingKind, GestureBinding, MappingSet, RecognitionMode, RecognitionSettings,
    VoiceBinding,
};

/// Wire value meaning "no action" in mapping updates.
pub const NO_ACTION_WIRE: &str = "null";

/// Bulk mapping update: binding key to action name or [`NO_ACTION_WIRE`].
pub type MappingUpdate = BTreeMap<String, String>;

pub fn encode_mapping<'a, I>(entries: I) -> MappingUpdate
where
    I: IntoIterator<Item = (&'a str, Option<&'a ActionName>)>,
{
    entries
        .into_iter()
        .map(|(key, action)| {
            let value = action
                .map(|action| action.0.clone())
                .unwrap_or_else(|| NO_ACTION_WIRE.to_string());
            (key.to_string(), value)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureEntry {
    pub name: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCommandEntry {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub settings: RecognitionSettings,
    #[serde(default)]
    pub gestures: BTreeMap<String, GestureEntry>,
    #[serde(default)]
    pub voice_commands: BTreeMap<String, VoiceCommandEntry>,
}

fn bound_action(raw: Option<String>) -> Option<ActionName> {
    raw.filter(|action| !action.is_empty() && action != NO_ACTION_WIRE)
        .map(ActionName)
}

impl ConfigResponse {
    /// Decodes the store's naming convention (a custom gesture's key equals
    /// its display name) into an explicit [`BindingKind`].
    pub fn into_mapping_set(self) -> MappingSet {
        let gestures = self
            .gestures
            .into_iter()
            .map(|(key, entry)| {
                let kind = if key == entry.name {
                    BindingKind::Custom
                } else {
                    BindingKind::BuiltIn
                };
                let binding = GestureBinding {
                    key: key.clone(),
                    display_name: entry.name,
                    bound_action: bound_action(entry.action),
                    kind,
                };
                (key, binding)
            })
            .collect();

        let voice_commands = self
            .voice_commands
            .into_iter()
            .map(|(key, entry)| {
                let binding = VoiceBinding {
                    key: key.clone(),
                    command_text: entry.command,
                    bound_action: bound_action(entry.action),
                };
                (key, binding)
            })
            .collect();

        MappingSet {
            settings: self.settings,
            gestures,
            voice_commands,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub settings: RecognitionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteGestureRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnGestureRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnGestureResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    Idle,
    Learning,
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningStatusReport {
    pub status: LearningStatus,
    #[serde(default)]
    pub message: String,
}

fn full_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected,
    Status {
        gesture_enabled: bool,
        voice_enabled: bool,
    },
    GestureStatus {
        message: String,
    },
    VoiceStatus {
        message: String,
    },
    GestureRecognized {
        gesture: String,
        confidence: f64,
        #[serde(default)]
        action: Option<String>,
    },
    VoiceRecognized {
        text: String,
        #[serde(default = "full_confidence")]
        confidence: f64,
        #[serde(default)]
        action: Option<String>,
    },
    VideoFrame {
        frame: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    StartGesture,
    StopGesture,
    StartVoice,
    StopVoice,
}

impl ClientCommand {
    pub fn toggle(mode: RecognitionMode, enabled: bool) -> Self {
        match (mode, enabled) {
            (RecognitionMode::Gesture, true) => Self::StartGesture,
            (RecognitionMode::Gesture, false) => Self::StopGesture,
            (RecognitionMode::Voice, true) => Self::StartVoice,
            (RecognitionMode::Voice, false) => Self::StopVoice,
        }
    }
}
