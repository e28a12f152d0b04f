//! In-memory store: serialized JSON per conversation, for tests and dev runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::activity::ConversationKey;
use crate::error::StoreError;
use crate::state::ConversationState;

use super::traits::{ConversationStore, decode, encode};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored JSON for `key`, exactly as written.
    pub async fn raw(&self, key: &ConversationKey) -> Option<String> {
        self.records.read().await.get(&key.storage_key()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StoreError> {
        let records = self.records.read().await;
        records
            .get(&key.storage_key())
            .map(|raw| decode(raw))
            .transpose()
    }

    async fn save(
        &self,
        key: &ConversationKey,
        state: &ConversationState,
    ) -> Result<(), StoreError> {
        let raw = encode(state)?;
        self.records.write().await.insert(key.storage_key(), raw);
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .await
            .remove(&key.storage_key())
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::DialogInstance;

    #[tokio::test]
    async fn save_load_delete() {
        let store = MemoryStore::new();
        let key = ConversationKey::new("test", "c1", "u1");
        assert!(store.load(&key).await.unwrap().is_none());

        let mut state = ConversationState::default();
        state.dialog_state.push(DialogInstance::new("AuthDialog"));
        store.save(&key, &state).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), Some(state));
        assert_eq!(store.len().await, 1);

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = MemoryStore::new();
        let a = ConversationKey::new("test", "c1", "u1");
        let b = ConversationKey::new("test", "c2", "u1");

        let mut state = ConversationState::default();
        state.dialog_state.push(DialogInstance::new("AuthDialog"));
        store.save(&a, &state).await.unwrap();

        assert!(store.load(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_serialization_error() {
        let store = MemoryStore::new();
        let key = ConversationKey::new("test", "c1", "u1");
        store
            .records
            .write()
            .await
            .insert(key.storage_key(), "{not json".into());

        let err = store.load(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
