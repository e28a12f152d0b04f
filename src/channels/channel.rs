//! Channel and sink traits.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::Mutex;

use crate::activity::{Activity, ConversationKey, OutgoingActivity};
use crate::error::ChannelError;

/// Stream of inbound activities from a channel.
pub type ActivityStream = Pin<Box<dyn Stream<Item = Activity> + Send>>;

/// Destination for outbound activities of a turn.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Deliver one activity to the conversation. Order of calls is preserved.
    async fn send(
        &self,
        key: &ConversationKey,
        activity: OutgoingActivity,
    ) -> Result<(), ChannelError>;
}

/// A transport that produces activities and accepts replies.
#[async_trait]
pub trait Channel: ActivitySink {
    /// Channel name (e.g. "cli").
    fn name(&self) -> &str;

    /// Start receiving. May only be called once.
    async fn start(&self) -> Result<ActivityStream, ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Sink that collects outbound activities in memory.
///
/// Used by the HTTP webhook to return a turn's replies in the response body,
/// and by tests to observe what a turn sent.
#[derive(Default)]
pub struct BufferedSink {
    sent: Mutex<Vec<OutgoingActivity>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything sent so far.
    pub async fn take(&self) -> Vec<OutgoingActivity> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl ActivitySink for BufferedSink {
    async fn send(
        &self,
        _key: &ConversationKey,
        activity: OutgoingActivity,
    ) -> Result<(), ChannelError> {
        self.sent.lock().await.push(activity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffered_sink_preserves_order_and_drains() {
        let sink = BufferedSink::new();
        let key = ConversationKey::new("test", "c", "u");
        sink.send(&key, OutgoingActivity::message("one")).await.unwrap();
        sink.send(&key, OutgoingActivity::message("two")).await.unwrap();

        let sent = sink.take().await;
        let texts: Vec<_> = sent.iter().filter_map(|a| a.as_text()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(sink.take().await.is_empty());
    }
}
