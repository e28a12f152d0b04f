//! `ConversationStore` trait: async interface for per-conversation state.

use async_trait::async_trait;

use crate::activity::ConversationKey;
use crate::error::StoreError;
use crate::state::ConversationState;

/// Backend-agnostic conversation state store.
///
/// Implementations must give read-your-writes consistency for a single key.
/// Serialization must be deterministic so that loading and re-saving an
/// unchanged record leaves the stored bytes identical.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Read the state for `key`, or `None` if nothing has been saved yet.
    async fn load(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StoreError>;

    /// Write the full state for `key`.
    async fn save(&self, key: &ConversationKey, state: &ConversationState)
    -> Result<(), StoreError>;

    /// Remove the state for `key`. Returns whether anything was deleted.
    async fn delete(&self, key: &ConversationKey) -> Result<bool, StoreError>;
}

/// Serialize state for storage.
pub(crate) fn encode(state: &ConversationState) -> Result<String, StoreError> {
    serde_json::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse stored state.
pub(crate) fn decode(raw: &str) -> Result<ConversationState, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}
