//! Persisted dialog stack.

use serde::{Deserialize, Serialize};

/// One entry on the dialog stack: which dialog, which step, and its locals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogInstance {
    /// Registered dialog id.
    pub id: String,
    /// Index of the pending waterfall step. Unused by single-step dialogs.
    #[serde(default)]
    pub step_index: usize,
    /// Working values owned by the dialog (e.g. prompt expiry).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub state: serde_json::Map<String, serde_json::Value>,
}

impl DialogInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_index: 0,
            state: serde_json::Map::new(),
        }
    }
}

/// Dialog stack for a single conversation. The last entry is the active dialog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    #[serde(default)]
    pub stack: Vec<DialogInstance>,
}

impl DialogState {
    pub fn push(&mut self, instance: DialogInstance) {
        self.stack.push(instance);
    }

    pub fn pop(&mut self) -> Option<DialogInstance> {
        self.stack.pop()
    }

    /// Top of stack.
    pub fn active(&self) -> Option<&DialogInstance> {
        self.stack.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut DialogInstance> {
        self.stack.last_mut()
    }

    /// Whether a dialog with `id` is anywhere on the stack.
    pub fn contains(&self, id: &str) -> bool {
        self.stack.iter().any(|i| i.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
