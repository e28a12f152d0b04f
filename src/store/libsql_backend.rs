//! libSQL backend: durable `ConversationStore` implementation.
//!
//! Supports local file and in-memory databases. State is stored as the
//! serialized JSON record, one row per conversation key.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::activity::ConversationKey;
use crate::error::StoreError;
use crate::state::ConversationState;
use crate::store::migrations;
use crate::store::traits::{ConversationStore, decode, encode};

/// libSQL conversation state store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Conversation state database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests and throwaway runs).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        migrations::run_migrations(&self.conn).await
    }

    /// Stored JSON for `key`, exactly as written.
    pub async fn raw(&self, key: &ConversationKey) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT state FROM conversation_state WHERE key = ?1",
                params![key.storage_key()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| StoreError::Query(format!("load: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("load: {e}"))),
        }
    }
}

#[async_trait]
impl ConversationStore for LibSqlStore {
    async fn load(&self, key: &ConversationKey) -> Result<Option<ConversationState>, StoreError> {
        match self.raw(key).await? {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        key: &ConversationKey,
        state: &ConversationState,
    ) -> Result<(), StoreError> {
        let raw = encode(state)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO conversation_state
                    (key, channel_id, conversation_id, user_id, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (key) DO UPDATE SET state = ?5, updated_at = ?6",
                params![
                    key.storage_key(),
                    key.channel_id.as_str(),
                    key.conversation_id.as_str(),
                    key.user_id.as_str(),
                    raw,
                    now
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save: {e}")))?;

        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM conversation_state WHERE key = ?1",
                params![key.storage_key()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete: {e}")))?;
        Ok(count > 0)
    }
}
