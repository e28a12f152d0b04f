//! Waterfall dialog: a fixed sequence of steps, one per resumption.

use async_trait::async_trait;

use crate::error::{DialogError, Result};

use super::dialog::{Dialog, DialogContext, DialogResult, DialogTurnResult};

/// A single waterfall step. `result` is the value returned by the previous
/// step's child dialog, or `Empty` for the first step.
#[async_trait]
pub trait WaterfallStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        dc: &mut DialogContext<'_>,
        result: DialogResult,
    ) -> Result<DialogTurnResult>;
}

/// Dialog that runs its steps strictly in order. The pending step index is
/// kept in the dialog instance so the sequence survives across turns.
pub struct WaterfallDialog {
    id: String,
    steps: Vec<Box<dyn WaterfallStep>>,
}

impl WaterfallDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, step: impl WaterfallStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    async fn run_step(
        &self,
        dc: &mut DialogContext<'_>,
        index: usize,
        result: DialogResult,
    ) -> Result<DialogTurnResult> {
        let Some(step) = self.steps.get(index) else {
            // Ran off the end: the waterfall is done.
            return dc.end_dialog(result).await;
        };

        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        if instance.id != self.id {
            return Err(DialogError::InvalidState {
                id: self.id.clone(),
                reason: format!("expected to be on top of the stack, found {}", instance.id),
            }
            .into());
        }
        instance.step_index = index;

        tracing::debug!(
            conversation = %dc.turn().key(),
            dialog = %self.id,
            step = step.name(),
            index,
            "Running waterfall step"
        );
        step.run(dc, result).await
    }

    fn current_index(&self, dc: &DialogContext<'_>) -> Result<usize> {
        dc.active_dialog()
            .map(|i| i.step_index)
            .ok_or_else(|| DialogError::NoActiveDialog.into())
    }
}

#[async_trait]
impl Dialog for WaterfallDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        self.run_step(dc, 0, DialogResult::Empty).await
    }

    async fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> Result<DialogTurnResult> {
        let next = self.current_index(dc)? + 1;
        self.run_step(dc, next, DialogResult::Empty).await
    }

    async fn resume(
        &self,
        dc: &mut DialogContext<'_>,
        result: DialogResult,
    ) -> Result<DialogTurnResult> {
        let next = self.current_index(dc)? + 1;
        self.run_step(dc, next, result).await
    }
}
