//! OAuth sign-in prompt.
//!
//! On begin the prompt sends a sign-in card and suspends. It resolves on a
//! later turn when the channel delivers a token (`tokens/response` event), a
//! verify-state invoke, or a typed magic code. When the sign-in window has
//! elapsed the prompt resolves with no token instead of raising an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::activity::{
    ActivityType, OutgoingActivity, TOKEN_RESPONSE_EVENT, TokenResponse, VERIFY_STATE_INVOKE,
    is_magic_code,
};
use crate::bot::TurnContext;
use crate::config::OAuthPromptSettings;
use crate::error::{DialogError, Result};

use super::dialog::{Dialog, DialogContext, DialogResult, DialogTurnResult};

/// Instance-state key holding the RFC 3339 expiry of the sign-in window.
const EXPIRES_KEY: &str = "expires";

/// What the current activity says about the pending sign-in.
enum Recognition {
    Token(TokenResponse),
    /// A sign-in signal arrived but carried no usable token.
    Failed,
    /// Activity is unrelated to sign-in; keep waiting.
    Unrecognized,
}

pub struct OAuthPrompt {
    id: String,
    settings: OAuthPromptSettings,
}

impl OAuthPrompt {
    pub fn new(id: impl Into<String>, settings: OAuthPromptSettings) -> Self {
        Self {
            id: id.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &OAuthPromptSettings {
        &self.settings
    }

    fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::from_std(self.settings.timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                DialogError::InvalidState {
                    id: self.id.clone(),
                    reason: format!("timeout {:?} out of range", self.settings.timeout),
                }
                .into()
            })
    }

    async fn send_card(&self, turn: &TurnContext) -> Result<()> {
        let sign_in_link = turn
            .identity()
            .sign_in_link(turn.key(), &self.settings.connection_name)
            .await?;
        turn.send(OutgoingActivity::SignInCard {
            connection_name: self.settings.connection_name.clone(),
            title: self.settings.title.clone(),
            text: self.settings.text.clone(),
            sign_in_link,
        })
        .await?;
        Ok(())
    }

    async fn redeem(&self, turn: &TurnContext, code: &str) -> Result<Option<TokenResponse>> {
        let token = turn
            .identity()
            .exchange_magic_code(turn.key(), &self.settings.connection_name, code)
            .await?;
        Ok(token.filter(TokenResponse::has_token))
    }

    async fn recognize(&self, turn: &TurnContext) -> Result<Recognition> {
        let activity = turn.activity();
        let recognized = match (activity.activity_type, activity.name()) {
            (ActivityType::Event, Some(TOKEN_RESPONSE_EVENT)) => activity
                .value
                .clone()
                .and_then(|v| serde_json::from_value::<TokenResponse>(v).ok())
                .filter(TokenResponse::has_token),
            (ActivityType::Invoke, Some(VERIFY_STATE_INVOKE)) => {
                let code = activity
                    .value
                    .as_ref()
                    .and_then(|v| v.get("state"))
                    .and_then(|s| s.as_str());
                let token = match code {
                    Some(code) => self.redeem(turn, code).await?,
                    None => None,
                };
                let status = if token.is_some() { 200 } else { 404 };
                turn.send(OutgoingActivity::InvokeResponse { status })
                    .await?;
                token
            }
            (ActivityType::Message, _) if is_magic_code(activity.text()) => {
                let token = self.redeem(turn, activity.text()).await?;
                if token.is_none() {
                    // A mistyped code leaves the prompt open for another try.
                    tracing::debug!(conversation = %turn.key(), "Magic code did not redeem");
                    return Ok(Recognition::Unrecognized);
                }
                token
            }
            _ => return Ok(Recognition::Unrecognized),
        };

        Ok(match recognized {
            Some(token) => Recognition::Token(token),
            None => Recognition::Failed,
        })
    }
}

#[async_trait]
impl Dialog for OAuthPrompt {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let expires = self.expires_at(Utc::now())?;
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        instance.state.insert(
            EXPIRES_KEY.to_string(),
            serde_json::Value::String(expires.to_rfc3339()),
        );

        self.send_card(dc.turn()).await?;
        tracing::info!(
            conversation = %dc.turn().key(),
            connection = %self.settings.connection_name,
            expires = %expires,
            "Sign-in prompt sent"
        );
        Ok(DialogTurnResult::Waiting)
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let turn = dc.turn();
        let expires = dc
            .active_dialog()
            .and_then(|i| i.state.get(EXPIRES_KEY))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        match expires {
            Some(expires) if Utc::now() <= expires => {}
            Some(_) => {
                tracing::info!(conversation = %turn.key(), "Sign-in prompt timed out");
                return dc.end_dialog(DialogResult::Empty).await;
            }
            None => {
                tracing::warn!(
                    conversation = %turn.key(),
                    "Sign-in prompt has no valid expiry; treating as timed out"
                );
                return dc.end_dialog(DialogResult::Empty).await;
            }
        }

        match self.recognize(turn).await? {
            Recognition::Token(token) => {
                tracing::info!(conversation = %turn.key(), "Sign-in token received");
                dc.end_dialog(DialogResult::Token(token)).await
            }
            Recognition::Failed => {
                tracing::warn!(conversation = %turn.key(), "Sign-in signal carried no token");
                dc.end_dialog(DialogResult::Empty).await
            }
            Recognition::Unrecognized => Ok(DialogTurnResult::Waiting),
        }
    }
}
