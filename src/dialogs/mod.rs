//! Dialog stack: resumable multi-turn conversation flows.
//!
//! A conversation's `DialogState` is an explicit stack of `{id, step_index,
//! state}` records persisted between turns. `begin` pushes, `end` pops, and
//! `continue` dispatches to the dialog registered under the top entry's id.

pub mod auth;
pub mod dialog;
pub mod oauth_prompt;
pub mod state;
pub mod waterfall;

pub use auth::{AuthDialog, AuthPhase, AUTH_DIALOG_ID, LOGIN_PROMPT_ID};
pub use dialog::{Dialog, DialogContext, DialogResult, DialogSet, DialogTurnResult};
pub use oauth_prompt::OAuthPrompt;
pub use state::{DialogInstance, DialogState};
pub use waterfall::{WaterfallDialog, WaterfallStep};
