//! Dialog trait, dialog registry, and the per-turn dialog context.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::activity::TokenResponse;
use crate::bot::TurnContext;
use crate::error::{DialogError, Result};

use super::state::{DialogInstance, DialogState};

/// Value handed from an ending dialog to its parent.
#[derive(Debug, Default)]
pub enum DialogResult {
    #[default]
    Empty,
    Token(TokenResponse),
}

impl DialogResult {
    pub fn from_token(token: Option<TokenResponse>) -> Self {
        token.map_or(Self::Empty, Self::Token)
    }

    pub fn into_token(self) -> Option<TokenResponse> {
        match self {
            Self::Token(token) => Some(token),
            Self::Empty => None,
        }
    }
}

/// Outcome of running the dialog stack for one turn.
#[derive(Debug)]
pub enum DialogTurnResult {
    /// No dialog was active.
    Empty,
    /// The active dialog is suspended until a later activity.
    Waiting,
    /// The stack emptied this turn.
    Complete(DialogResult),
}

impl DialogTurnResult {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }
}

/// A named, resumable unit of multi-turn interaction.
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> &str;

    /// Called right after the dialog is pushed.
    async fn begin(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult>;

    /// Called when a new activity arrives and this dialog is on top.
    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        dc.end_dialog(DialogResult::Empty).await
    }

    /// Called when a child dialog ends and this dialog is on top again.
    async fn resume(
        &self,
        dc: &mut DialogContext<'_>,
        result: DialogResult,
    ) -> Result<DialogTurnResult> {
        dc.end_dialog(result).await
    }
}

/// Lookup table of dialogs by id.
#[derive(Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Box<dyn Dialog>>,
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog. Ids must be unique.
    pub fn add(&mut self, dialog: impl Dialog + 'static) -> std::result::Result<(), DialogError> {
        let id = dialog.id().to_string();
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::Duplicate { id });
        }
        self.dialogs.insert(id, Box::new(dialog));
        Ok(())
    }

    pub fn find(&self, id: &str) -> std::result::Result<&dyn Dialog, DialogError> {
        self.dialogs
            .get(id)
            .map(|d| d.as_ref())
            .ok_or_else(|| DialogError::NotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dialogs.contains_key(id)
    }

    /// Bind the set to one turn and one conversation's stack.
    pub fn create_context<'a>(
        &'a self,
        turn: &'a TurnContext,
        state: &'a mut DialogState,
    ) -> DialogContext<'a> {
        DialogContext {
            dialogs: self,
            turn,
            state,
        }
    }
}

/// Turn-scoped handle for manipulating a conversation's dialog stack.
pub struct DialogContext<'a> {
    dialogs: &'a DialogSet,
    turn: &'a TurnContext,
    state: &'a mut DialogState,
}

impl<'a> DialogContext<'a> {
    pub fn turn(&self) -> &'a TurnContext {
        self.turn
    }

    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.state.active()
    }

    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.state.active_mut()
    }

    /// Whether `id` is anywhere on the stack.
    pub fn is_active(&self, id: &str) -> bool {
        self.state.contains(id)
    }

    /// The whole stack, bottom first.
    pub fn stack(&self) -> &[DialogInstance] {
        &self.state.stack
    }

    pub fn stack_depth(&self) -> usize {
        self.state.depth()
    }

    /// Push `id` and run its first step.
    pub async fn begin_dialog(&mut self, id: &str) -> Result<DialogTurnResult> {
        let dialogs = self.dialogs;
        let dialog = dialogs.find(id)?;
        tracing::debug!(
            conversation = %self.turn.key(),
            dialog = id,
            depth = self.state.depth() + 1,
            "Beginning dialog"
        );
        self.state.push(DialogInstance::new(id));
        dialog.begin(self).await
    }

    /// Continue the dialog on top of the stack, if any.
    pub async fn continue_dialog(&mut self) -> Result<DialogTurnResult> {
        let Some(id) = self.state.active().map(|i| i.id.clone()) else {
            return Ok(DialogTurnResult::Empty);
        };
        let dialogs = self.dialogs;
        let dialog = dialogs.find(&id)?;
        tracing::debug!(conversation = %self.turn.key(), dialog = %id, "Continuing dialog");
        dialog.continue_dialog(self).await
    }

    /// Pop the active dialog and resume its parent with `result`.
    pub async fn end_dialog(&mut self, result: DialogResult) -> Result<DialogTurnResult> {
        let ended = self.state.pop().ok_or(DialogError::NoActiveDialog)?;
        tracing::debug!(conversation = %self.turn.key(), dialog = %ended.id, "Dialog ended");

        let Some(parent_id) = self.state.active().map(|i| i.id.clone()) else {
            return Ok(DialogTurnResult::Complete(result));
        };
        let dialogs = self.dialogs;
        let parent = dialogs.find(&parent_id)?;
        parent.resume(self, result).await
    }
}
