//! Token service client: REST calls to a Bot Framework-style token store.
//!
//! `GET /api/usertoken/GetToken` returns the user's token (200) or nothing
//! (404). `GET /api/botsignin/GetSignInUrl` returns a plain-text sign-in URL.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::activity::{ConversationKey, TokenResponse};
use crate::error::IdentityError;

use super::IdentityProvider;

pub struct TokenServiceClient {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl TokenServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(self.api_url(path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn get_token(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        code: Option<&str>,
    ) -> Result<Option<TokenResponse>, IdentityError> {
        let mut query = vec![
            ("userId", key.user_id.as_str()),
            ("connectionName", connection_name),
            ("channelId", key.channel_id.as_str()),
        ];
        if let Some(code) = code {
            query.push(("code", code));
        }

        let resp = self
            .get("usertoken/GetToken")
            .query(&query)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        Ok(Some(token).filter(TokenResponse::has_token))
    }
}

#[async_trait]
impl IdentityProvider for TokenServiceClient {
    async fn get_cached_token(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<Option<TokenResponse>, IdentityError> {
        self.get_token(key, connection_name, None).await
    }

    async fn exchange_magic_code(
        &self,
        key: &ConversationKey,
        connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, IdentityError> {
        self.get_token(key, connection_name, Some(code)).await
    }

    async fn sign_in_link(
        &self,
        key: &ConversationKey,
        connection_name: &str,
    ) -> Result<String, IdentityError> {
        let state = serde_json::json!({
            "connectionName": connection_name,
            "conversation": {
                "channelId": key.channel_id,
                "conversationId": key.conversation_id,
                "userId": key.user_id,
            },
        })
        .to_string();

        let resp = self
            .get("botsignin/GetSignInUrl")
            .query(&[("state", state.as_str())])
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            return Err(IdentityError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let link = body.trim().trim_matches('"').to_string();
        if link.is_empty() {
            return Err(IdentityError::InvalidResponse(
                "empty sign-in URL".to_string(),
            ));
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = TokenServiceClient::new("https://tokens.example.test/", None);
        assert_eq!(
            client.api_url("usertoken/GetToken"),
            "https://tokens.example.test/api/usertoken/GetToken"
        );
    }
}
