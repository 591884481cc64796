//! HTTP implementation of the configuration store and learning endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::{
    domain::{ActionCatalog, MappingSet, RecognitionSettings},
    error::StoreAck,
    protocol::{
        ConfigResponse, DeleteGestureRequest, LearnGestureRequest, LearnGestureResponse,
        LearningStatusReport, MappingUpdate, SettingsUpdate,
    },
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    config_store::ConfigStore,
    error::{ClientError, ClientResult},
    learning::LearningBackend,
};

pub struct RestBackend {
    http: Client,
    server_url: String,
}

impl RestBackend {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(http, config.base_url()?))
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.server_url)
    }

    async fn post_for_ack<T>(&self, path: &str, body: &T) -> ClientResult<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let response = self.http.post(self.endpoint(path)).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let ack: StoreAck = serde_json::from_slice(&bytes).map_err(|err| {
            ClientError::transport(format!(
                "unexpected response from /api/{path} (status {status}): {err}"
            ))
        })?;
        if let Err(rejection) = ack.into_result() {
            warn!(path, %status, error = %rejection, "store: write rejected");
            return Err(rejection.into());
        }
        debug!(path, "store: write acknowledged");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for RestBackend {
    async fn fetch_action_catalog(&self) -> ClientResult<ActionCatalog> {
        let catalog: ActionCatalog = self
            .http
            .get(self.endpoint("actions"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(actions = catalog.len(), "store: action catalog fetched");
        Ok(catalog)
    }

    async fn fetch_config(&self) -> ClientResult<MappingSet> {
        let config: ConfigResponse = self
            .http
            .get(self.endpoint("config"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(config.into_mapping_set())
    }

    async fn save_settings(&self, settings: &RecognitionSettings) -> ClientResult<()> {
        self.post_for_ack(
            "config/settings",
            &SettingsUpdate {
                settings: settings.clone(),
            },
        )
        .await
    }

    async fn save_gesture_mappings(&self, mapping: &MappingUpdate) -> ClientResult<()> {
        self.post_for_ack("gestures", mapping).await
    }

    async fn save_voice_mappings(&self, mapping: &MappingUpdate) -> ClientResult<()> {
        self.post_for_ack("voice", mapping).await
    }

    async fn delete_gesture(&self, key: &str) -> ClientResult<()> {
        self.post_for_ack(
            "gesture/delete",
            &DeleteGestureRequest {
                name: key.to_string(),
            },
        )
        .await?;
        info!(gesture = key, "store: custom gesture deleted");
        Ok(())
    }
}

#[async_trait]
impl LearningBackend for RestBackend {
    async fn begin_learning(&self, gesture_name: &str) -> ClientResult<String> {
        let response = self
            .http
            .post(self.endpoint("learn_gesture"))
            .json(&LearnGestureRequest {
                name: gesture_name.to_string(),
            })
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: LearnGestureResponse = serde_json::from_slice(&bytes).map_err(|err| {
            ClientError::transport(format!(
                "unexpected response from /api/learn_gesture (status {status}): {err}"
            ))
        })?;

        if !status.is_success() {
            let message = if body.message.trim().is_empty() {
                format!("learning request rejected with status {status}")
            } else {
                body.message
            };
            return Err(ClientError::ServerRejection(message));
        }
        Ok(body.message)
    }

    async fn learning_status(&self) -> ClientResult<LearningStatusReport> {
        let report = self
            .http
            .get(self.endpoint("get_learning_status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
