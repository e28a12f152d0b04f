//! In-process identity provider for local runs and tests.
//!
//! `sign_in_link` mints a six-digit magic code bound to a token. Typing the
//! code back into the conversation redeems it, after which the token is
//! cached for that user and connection.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::activity::{ConversationKey, TokenResponse};
use crate::error::IdentityError;

use super::IdentityProvider;

/// A minted code waiting to be redeemed.
struct PendingCode {
    user: String,
    connection_name: String,
    token: SecretString,
}

#[derive(Default)]
struct Inner {
    /// (user scope, connection) -> token
    tokens: HashMap<(String, String), SecretString>,
    /// magic code -> pending redemption
    codes: HashMap<String, PendingCode>,
}

#[derive(Default)]
pub struct MemoryIdentityProvider {
    inner: Mutex<Inner>,
    /// Token bound to codes minted by `sign_in_link`. Random when unset.
    sign_in_token: Option<SecretString>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every minted sign-in code to this token.
    pub fn with_sign_in_token(mut self, token: impl Into<String>) -> Self {
        self.sign_in_token = Some(SecretString::from(token.into()));
        self
    }

    /// Cache a token as if the user had already signed in.
    pub async fn insert_token(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        token: impl Into<String>,
    ) {
        self.inner.lock().await.tokens.insert(
            (user_scope(key), connection_name.to_string()),
            SecretString::from(token.into()),
        );
    }

    /// Forget the cached token (sign out).
    pub async fn remove_token(&self, key: &ConversationKey, connection_name: &str) -> bool {
        self.inner
            .lock()
            .await
            .tokens
            .remove(&(user_scope(key), connection_name.to_string()))
            .is_some()
    }

    /// Mint a magic code that redeems to `token` for this user and connection.
    pub async fn issue_magic_code(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        token: impl Into<String>,
    ) -> String {
        let pending = PendingCode {
            user: user_scope(key),
            connection_name: connection_name.to_string(),
            token: SecretString::from(token.into()),
        };

        let mut inner = self.inner.lock().await;
        let code = loop {
            let candidate = new_code();
            if !inner.codes.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.codes.insert(code.clone(), pending);
        code
    }
}

/// Tokens belong to a user on a channel, not to a single conversation.
fn user_scope(key: &ConversationKey) -> String {
    format!("{}/{}", key.channel_id, key.user_id)
}

fn new_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn get_cached_token(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<Option<TokenResponse>, IdentityError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .get(&(user_scope(key), connection_name.to_string()))
            .map(|token| TokenResponse::new(connection_name, token.expose_secret())))
    }

    async fn exchange_magic_code(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, IdentityError> {
        let mut inner = self.inner.lock().await;
        let user = user_scope(key);

        let matches = inner
            .codes
            .get(code)
            .is_some_and(|p| p.user == user && p.connection_name == connection_name);
        if !matches {
            tracing::debug!(conversation = %key, "Magic code not recognized");
            return Ok(None);
        }

        let Some(pending) = inner.codes.remove(code) else {
            return Ok(None);
        };
        let response = TokenResponse::new(connection_name, pending.token.expose_secret());
        inner
            .tokens
            .insert((user, connection_name.to_string()), pending.token);
        Ok(Some(response))
    }

    async fn sign_in_link(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<String, IdentityError> {
        let token = match &self.sign_in_token {
            Some(token) => token.expose_secret().to_string(),
            None => format!("dev-{}", Uuid::new_v4()),
        };
        let code = self.issue_magic_code(key, connection_name, token).await;
        tracing::debug!(conversation = %key, code = %code, "Minted sign-in magic code");
        Ok(format!("memory://signin/{connection_name}?code={code}"))
    }
}
