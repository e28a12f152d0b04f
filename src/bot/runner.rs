//! Bot runner: drives channels and serializes turns per conversation.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::activity::Activity;
use crate::channels::{ActivitySink, Channel};
use crate::error::Result;

use super::Bot;

/// Runs turns against a shared `Bot`.
///
/// Turns for the same conversation run one at a time in arrival order.
/// Turns for different conversations may interleave.
pub struct BotRunner {
    bot: Bot,
    gates: Gates,
}

/// One turn gate per conversation. The map lock is never held across an await.
type Gates = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// A turn's claim on its conversation gate.
///
/// Dropping it removes the gate once nobody else is queued on it, including
/// when the turn future is cancelled mid-flight.
struct GateGuard<'a> {
    gates: &'a Gates,
    key: String,
    gate: Arc<Mutex<()>>,
}

impl<'a> GateGuard<'a> {
    fn acquire(gates: &'a Gates, key: String) -> Self {
        let mut map = gates.lock().unwrap_or_else(|e| e.into_inner());
        let gate = Arc::clone(map.entry(key.clone()).or_default());
        Self { gates, key, gate }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.gate) == 2 {
            map.remove(&self.key);
        }
    }
}

impl BotRunner {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            gates: Gates::default(),
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Run one turn, waiting for any in-flight turn of the same conversation.
    pub async fn process(&self, activity: Activity, sink: Arc<dyn ActivitySink>) -> Result<()> {
        let claim = GateGuard::acquire(&self.gates, activity.conversation_key().storage_key());
        let _turn = claim.gate.lock().await;
        self.bot.handle_turn(activity, sink).await
    }

    /// Consume a channel's activity stream until it ends.
    ///
    /// Turn errors are logged and do not stop the loop.
    pub async fn run<C: Channel + 'static>(&self, channel: Arc<C>) -> Result<()> {
        let mut stream = channel.start().await?;
        tracing::info!(channel = channel.name(), "Channel started");

        while let Some(activity) = stream.next().await {
            let conversation = activity.conversation_key();
            let sink: Arc<dyn ActivitySink> = channel.clone();
            if let Err(e) = self.process(activity, sink).await {
                tracing::error!(conversation = %conversation, error = %e, "Turn failed");
            }
        }

        tracing::info!(channel = channel.name(), "Channel closed");
        channel.shutdown().await?;
        Ok(())
    }

    #[cfg(test)]
    async fn gate_count(&self) -> usize {
        self.gates.lock().unwrap().len()
    }
}
