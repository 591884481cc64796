use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNKNOWN_STORE_ERROR: &str = "unknown server error";

/// Body returned by every configuration-store write, for 2xx and error
/// statuses alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<(), StoreRejection> {
        if self.success {
            return Ok(());
        }
        Err(StoreRejection::new(
            self.error
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_STORE_ERROR.to_string()),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreRejection {
    pub message: String,
}

impl StoreRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
