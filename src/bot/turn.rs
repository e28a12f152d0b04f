//! Per-turn context: the inbound activity plus where replies go.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::activity::{Activity, ConversationKey, OutgoingActivity};
use crate::channels::ActivitySink;
use crate::error::ChannelError;
use crate::identity::IdentityProvider;

/// Everything a turn needs to read its input and send output.
///
/// Built fresh for each inbound activity and dropped when the turn ends.
pub struct TurnContext {
    activity: Activity,
    key: ConversationKey,
    sink: Arc<dyn ActivitySink>,
    identity: Arc<dyn IdentityProvider>,
    responded: AtomicBool,
}

impl TurnContext {
    pub fn new(
        activity: Activity,
        sink: Arc<dyn ActivitySink>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let key = activity.conversation_key();
        Self {
            activity,
            key,
            sink,
            identity,
            responded: AtomicBool::new(false),
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Send an activity back to the conversation.
    pub async fn send(&self, activity: OutgoingActivity) -> Result<(), ChannelError> {
        self.sink.send(&self.key, activity).await?;
        self.responded.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.send(OutgoingActivity::message(text)).await
    }

    /// Whether anything was sent during this turn.
    pub fn responded(&self) -> bool {
        self.responded.load(Ordering::Relaxed)
    }
}
