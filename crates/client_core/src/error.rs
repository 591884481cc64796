//! Client error taxonomy: local validation, transport failures, and server
//! rejections.

use shared::error::StoreRejection;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a name for the new gesture.")]
    EmptyGestureName,
    #[error("Please enable Gesture Recognition before learning a new gesture.")]
    GestureModeDisabled,
    #[error("A gesture is already being learned; wait for it to finish.")]
    SessionInProgress,
    #[error("unknown gesture binding '{0}'")]
    UnknownGesture(String),
    #[error("unknown voice binding '{0}'")]
    UnknownVoiceCommand(String),
    #[error("action '{0}' is not offered by the server")]
    UnknownAction(String),
    #[error("Cannot delete a built-in gesture.")]
    BuiltInNotDeletable,
    #[error("mapping snapshot has not been loaded yet")]
    SnapshotNotLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    ServerRejection(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Text shown to the user. Server rejections are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Transport(message) => format!("Failed to contact server: {message}"),
            Self::ServerRejection(message) => message.clone(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<StoreRejection> for ClientError {
    fn from(value: StoreRejection) -> Self {
        Self::ServerRejection(value.message)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Transport(format!("invalid server payload: {value}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(format!("websocket failure: {value}"))
    }
}
