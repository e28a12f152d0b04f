//! Identity provider: where user tokens and sign-in links come from.

pub mod memory;
pub mod token_service;

pub use memory::MemoryIdentityProvider;
pub use token_service::TokenServiceClient;

use async_trait::async_trait;

use crate::activity::{ConversationKey, TokenResponse};
use crate::error::IdentityError;

/// Source of user tokens for an OAuth connection.
///
/// Tokens are scoped to the user of a conversation on a given channel.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Token already held for this user and connection, if any.
    async fn get_cached_token(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<Option<TokenResponse>, IdentityError>;

    /// Redeem a magic code produced by the sign-in flow.
    async fn exchange_magic_code(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, IdentityError>;

    /// URL the user opens to sign in.
    async fn sign_in_link(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<String, IdentityError>;
}
