//! Conversation state accessor.
//!
//! A `ConversationStateHandle` is created per turn. It loads the record
//! lazily on first access and writes it back exactly once in
//! `save_changes`, which the dispatcher calls at the end of every turn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::activity::ConversationKey;
use crate::dialogs::DialogState;
use crate::error::StoreError;
use crate::store::ConversationStore;

/// Everything persisted for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub dialog_state: DialogState,
}

/// Turn-scoped handle over one conversation's persisted state.
pub struct ConversationStateHandle {
    store: Arc<dyn ConversationStore>,
    key: ConversationKey,
    cached: Option<ConversationState>,
}

impl ConversationStateHandle {
    pub fn new(store: Arc<dyn ConversationStore>, key: ConversationKey) -> Self {
        Self {
            store,
            key,
            cached: None,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Whether the record has been read this turn.
    pub fn is_loaded(&self) -> bool {
        self.cached.is_some()
    }

    /// Load (once per turn) and return the state, creating it if absent.
    pub async fn load(&mut self) -> Result<&mut ConversationState, StoreError> {
        if self.cached.is_none() {
            let loaded = self.store.load(&self.key).await?;
            if loaded.is_none() {
                tracing::debug!(conversation = %self.key, "No stored state; starting fresh");
            }
            self.cached = Some(loaded.unwrap_or_default());
        }
        Ok(self.cached.get_or_insert_with(ConversationState::default))
    }

    /// Dialog stack accessor.
    pub async fn dialog_state(&mut self) -> Result<&mut DialogState, StoreError> {
        Ok(&mut self.load().await?.dialog_state)
    }

    /// Persist the state. Always writes, whether or not anything changed.
    pub async fn save_changes(&mut self) -> Result<(), StoreError> {
        self.load().await?;
        if let Some(state) = &self.cached {
            self.store.save(&self.key, state).await?;
            tracing::debug!(
                conversation = %self.key,
                depth = state.dialog_state.depth(),
                "Conversation state saved"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::DialogInstance;
    use crate::store::MemoryStore;

    fn key() -> ConversationKey {
        ConversationKey::new("test", "conv", "user")
    }

    #[tokio::test]
    async fn lazily_creates_state() {
        let store = Arc::new(MemoryStore::new());
        let mut handle = ConversationStateHandle::new(store.clone(), key());
        assert!(!handle.is_loaded());

        let dialogs = handle.dialog_state().await.unwrap();
        assert!(dialogs.is_empty());
        assert!(handle.is_loaded());
        assert!(store.load(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_changes_persists_mutations() {
        let store = Arc::new(MemoryStore::new());
        let mut handle = ConversationStateHandle::new(store.clone(), key());
        handle
            .dialog_state()
            .await
            .unwrap()
            .push(DialogInstance::new("AuthDialog"));
        handle.save_changes().await.unwrap();

        let mut next_turn = ConversationStateHandle::new(store, key());
        let dialogs = next_turn.dialog_state().await.unwrap();
        assert_eq!(dialogs.active().unwrap().id, "AuthDialog");
    }

    #[tokio::test]
    async fn save_without_load_writes_default() {
        let store = Arc::new(MemoryStore::new());
        let mut handle = ConversationStateHandle::new(store.clone(), key());
        handle.save_changes().await.unwrap();

        let stored = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(stored, ConversationState::default());
    }

    #[tokio::test]
    async fn load_then_save_is_byte_identical() {
        let store = Arc::new(MemoryStore::new());
        let mut seed = ConversationStateHandle::new(store.clone(), key());
        let mut instance = DialogInstance::new("login");
        instance
            .state
            .insert("expires".into(), serde_json::json!("2030-01-01T00:00:00+00:00"));
        seed.dialog_state().await.unwrap().push(instance);
        seed.save_changes().await.unwrap();
        let before = store.raw(&key()).await.unwrap();

        let mut handle = ConversationStateHandle::new(store.clone(), key());
        handle.load().await.unwrap();
        handle.save_changes().await.unwrap();

        assert_eq!(store.raw(&key()).await.unwrap(), before);
    }
}
