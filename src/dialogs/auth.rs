//! Auth dialog: prompt for sign-in, then report the outcome.

use async_trait::async_trait;

use crate::config::OAuthPromptSettings;
use crate::error::{DialogError, Result};

use super::dialog::{DialogContext, DialogResult, DialogSet, DialogTurnResult};
use super::oauth_prompt::OAuthPrompt;
use super::waterfall::{WaterfallDialog, WaterfallStep};

pub const AUTH_DIALOG_ID: &str = "AuthDialog";
pub const LOGIN_PROMPT_ID: &str = "login";

pub const LOGGED_IN_TEXT: &str = "You are logged in now :)";
pub const LOGIN_FAILED_TEXT: &str = "Error! Please try again...";

/// Where a conversation stands in the auth waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Step 0: the sign-in prompt is about to be (or has just been) issued.
    AwaitingLogin,
    /// Step 1: waiting for the prompt's token result.
    AwaitingToken,
}

impl AuthPhase {
    pub fn from_step(step_index: usize) -> Option<Self> {
        match step_index {
            0 => Some(Self::AwaitingLogin),
            1 => Some(Self::AwaitingToken),
            _ => None,
        }
    }
}

/// Step "prompt": start the OAuth prompt, which suspends the waterfall.
struct PromptStep;

#[async_trait]
impl WaterfallStep for PromptStep {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn run(
        &self,
        dc: &mut DialogContext<'_>,
        _result: DialogResult,
    ) -> Result<DialogTurnResult> {
        dc.begin_dialog(LOGIN_PROMPT_ID).await
    }
}

/// Step "check": report the prompt's result and end the dialog.
struct CheckStep;

#[async_trait]
impl WaterfallStep for CheckStep {
    fn name(&self) -> &str {
        "check"
    }

    async fn run(
        &self,
        dc: &mut DialogContext<'_>,
        result: DialogResult,
    ) -> Result<DialogTurnResult> {
        let turn = dc.turn();
        match result.into_token() {
            Some(_) => {
                tracing::info!(conversation = %turn.key(), "User signed in");
                turn.send_text(LOGGED_IN_TEXT).await?;
            }
            None => {
                tracing::info!(conversation = %turn.key(), "Sign-in failed or timed out");
                turn.send_text(LOGIN_FAILED_TEXT).await?;
            }
        }
        // Single pass; a fresh "sign in" is needed to retry.
        dc.end_dialog(DialogResult::Empty).await
    }
}

/// Registers the auth waterfall and its login prompt.
pub struct AuthDialog;

impl AuthDialog {
    pub fn register(
        dialogs: &mut DialogSet,
        settings: OAuthPromptSettings,
    ) -> std::result::Result<(), DialogError> {
        dialogs.add(
            WaterfallDialog::new(AUTH_DIALOG_ID)
                .step(PromptStep)
                .step(CheckStep),
        )?;
        dialogs.add(OAuthPrompt::new(LOGIN_PROMPT_ID, settings))
    }

    /// Phase of the auth dialog on `dc`'s stack, if one is running.
    pub fn phase(dc: &DialogContext<'_>) -> Option<AuthPhase> {
        dc.stack()
            .iter()
            .find(|i| i.id == AUTH_DIALOG_ID)
            .and_then(|i| AuthPhase::from_step(i.step_index))
    }
}
