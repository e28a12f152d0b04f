//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Each line becomes a message activity. Two commands let you simulate
//! channel traffic by hand:
//!
//! ```text
//! /event tokens/response {"token": "abc"}
//! /invoke signin/verifyState {"state": "123456"}
//! ```

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::activity::{Activity, ChannelAccount, ConversationKey, OutgoingActivity};
use crate::channels::{ActivitySink, ActivityStream, Channel};
use crate::error::ChannelError;

const CHANNEL_ID: &str = "cli";
const USER_ID: &str = "local-user";
const BOT_ID: &str = "signin-bot";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    conversation_id: String,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            conversation_id: format!("cli-{}", Uuid::new_v4()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Turn one input line into an activity. `None` for blank lines.
    pub fn parse_line(&self, line: &str) -> Result<Option<Activity>, ChannelError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (kind, rest) = match line.split_once(' ') {
            Some((kind, rest)) => (kind, rest.trim()),
            None => (line, ""),
        };

        match kind {
            "/event" | "/invoke" => {
                let (name, raw_value) = match rest.split_once(' ') {
                    Some((name, value)) => (name, Some(value.trim())),
                    None => (rest, None),
                };
                if name.is_empty() {
                    return Err(ChannelError::InvalidActivity(format!(
                        "usage: {kind} <name> [json]"
                    )));
                }
                let value = raw_value
                    .map(|raw| {
                        serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                            ChannelError::InvalidActivity(format!("invalid JSON value: {e}"))
                        })
                    })
                    .transpose()?;

                let activity = if kind == "/event" {
                    Activity::event(CHANNEL_ID, &self.conversation_id, USER_ID, name, value)
                } else {
                    Activity::invoke(CHANNEL_ID, &self.conversation_id, USER_ID, name, value)
                };
                Ok(Some(activity))
            }
            _ => Ok(Some(Activity::message(
                CHANNEL_ID,
                &self.conversation_id,
                USER_ID,
                line,
            ))),
        }
    }

    fn greeting(&self) -> Activity {
        Activity::conversation_update(
            CHANNEL_ID,
            &self.conversation_id,
            USER_ID,
            vec![ChannelAccount::new(USER_ID), ChannelAccount::new(BOT_ID)],
        )
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivitySink for CliChannel {
    async fn send(
        &self,
        _key: &ConversationKey,
        activity: OutgoingActivity,
    ) -> Result<(), ChannelError> {
        match activity {
            OutgoingActivity::Message { text } => println!("\n{text}\n"),
            OutgoingActivity::SignInCard {
                title,
                text,
                sign_in_link,
                ..
            } => {
                println!("\n[{title}] {text}\n  {sign_in_link}\n");
            }
            OutgoingActivity::InvokeResponse { status } => {
                eprintln!("(invoke response: {status})");
            }
        }
        eprint!("> ");
        Ok(())
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_ID
    }

    async fn start(&self) -> Result<ActivityStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        if tx.send(self.greeting()).is_err() {
            return Err(ChannelError::StartupFailed {
                name: CHANNEL_ID.into(),
                reason: "activity channel closed".into(),
            });
        }

        let parser = CliChannel {
            conversation_id: self.conversation_id.clone(),
        };
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parser.parse_line(&line) {
                        Ok(Some(activity)) => {
                            if tx.send(activity).is_err() {
                                break;
                            }
                        }
                        Ok(None) => eprint!("> "),
                        Err(e) => {
                            eprintln!("{e}");
                            eprint!("> ");
                        }
                    },
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|activity| (activity, rx))
        });

        Ok(Box::pin(stream))
    }
}
