use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Display prefix the recognizer uses when a gesture flips cursor mode.
const MODE_TOGGLE_PREFIX: &str = "Cursor Mode";

/// Placeholder the backend sends instead of `null` on some recognition events.
pub const NO_ACTION_LABEL: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionName(pub String);

impl ActionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered list of actions the backend can trigger. "No action" is implicit
/// and never stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCatalog {
    pub actions: Vec<ActionName>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<ActionName>) -> Self {
        Self { actions }
    }

    pub fn contains(&self, action: &ActionName) -> bool {
        self.actions.iter().any(|candidate| candidate == action)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    BuiltIn,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureBinding {
    pub key: String,
    pub display_name: String,
    pub bound_action: Option<ActionName>,
    pub kind: BindingKind,
}

impl GestureBinding {
    pub fn is_custom(&self) -> bool {
        self.kind == BindingKind::Custom
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceBinding {
    pub key: String,
    pub command_text: String,
    pub bound_action: Option<ActionName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    pub camera_index: i64,
    pub camera_width: i64,
    pub camera_height: i64,
    pub gesture_cooldown: f64,
    pub voice_cooldown: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_sample_rate: Option<i64>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            camera_index: 0,
            camera_width: 640,
            camera_height: 480,
            gesture_cooldown: 0.5,
            voice_cooldown: 0.5,
            voice_sample_rate: None,
        }
    }
}

/// One atomic snapshot of the configuration store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingSet {
    pub settings: RecognitionSettings,
    pub gestures: BTreeMap<String, GestureBinding>,
    pub voice_commands: BTreeMap<String, VoiceBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    Gesture,
    Voice,
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gesture => f.write_str("gesture"),
            Self::Voice => f.write_str("voice"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCategory {
    Triggerable,
    ModeToggle,
}

/// Action reported on a recognition event, classified once when decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedAction {
    pub label: String,
    pub category: ActionCategory,
}

impl RecognizedAction {
    /// Returns `None` for a missing action or the backend's "None" placeholder.
    pub fn classify(raw: Option<&str>) -> Option<Self> {
        let label = raw.map(str::trim).filter(|label| !label.is_empty())?;
        if label == NO_ACTION_LABEL {
            return None;
        }
        let category = if label.starts_with(MODE_TOGGLE_PREFIX) {
            ActionCategory::ModeToggle
        } else {
            ActionCategory::Triggerable
        };
        Some(Self {
            label: label.to_string(),
            category,
        })
    }

    pub fn is_triggerable(&self) -> bool {
        self.category == ActionCategory::Triggerable
    }
}
