//! Signin Bot: echo bot with an OAuth sign-in dialog.

pub mod activity;
pub mod bot;
pub mod channels;
pub mod config;
pub mod dialogs;
pub mod error;
pub mod identity;
pub mod state;
pub mod store;
