use async_trait::async_trait;
use shared::{
    domain::{ActionCatalog, MappingSet, RecognitionSettings},
    protocol::MappingUpdate,
};

use crate::error::ClientResult;

/// Read/write contract of the remote mapping store. Every call is a single
/// request; implementations never retry and keep no state between calls.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn fetch_action_catalog(&self) -> ClientResult<ActionCatalog>;
    async fn fetch_config(&self) -> ClientResult<MappingSet>;
    async fn save_settings(&self, settings: &RecognitionSettings) -> ClientResult<()>;
    async fn save_gesture_mappings(&self, mapping: &MappingUpdate) -> ClientResult<()>;
    async fn save_voice_mappings(&self, mapping: &MappingUpdate) -> ClientResult<()>;
    /// Not idempotent: deleting a key twice yields the server's rejection.
    async fn delete_gesture(&self, key: &str) -> ClientResult<()>;
}
