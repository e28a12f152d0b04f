//! Activity model: what channels send in and what the bot sends back.
//!
//! Inbound activities use the Bot Framework-style camelCase JSON shape so a
//! webhook can deserialize them directly.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Event name carrying a token response from the channel.
pub const TOKEN_RESPONSE_EVENT: &str = "tokens/response";

/// Invoke name sent by channels (e.g. Teams) when sign-in completes without a magic code.
pub const VERIFY_STATE_INVOKE: &str = "signin/verifyState";

/// Type of an inbound activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    Message,
    Event,
    Invoke,
    ConversationUpdate,
    Typing,
    EndOfConversation,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Message => "message",
            Self::Event => "event",
            Self::Invoke => "invoke",
            Self::ConversationUpdate => "conversationUpdate",
            Self::Typing => "typing",
            Self::EndOfConversation => "endOfConversation",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A user or bot account on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Conversation reference as sent by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

/// Identity of a conversation: channel + conversation + user.
///
/// Used as the state store key and as the identity-provider user scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel_id: String,
    pub conversation_id: String,
    pub user_id: String,
}

impl ConversationKey {
    pub fn new(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Storage key form.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.channel_id, self.conversation_id, self.user_id
        )
    }
}

/// An inbound activity. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub id: Option<String>,
    pub channel_id: String,
    pub from: ChannelAccount,
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Event or invoke name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Activity {
    fn base(
        activity_type: ActivityType,
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Self {
        Self {
            activity_type,
            id: Some(Uuid::new_v4().to_string()),
            channel_id: channel_id.to_string(),
            from: ChannelAccount::new(user_id),
            conversation: ConversationAccount {
                id: conversation_id.to_string(),
            },
            text: None,
            name: None,
            value: None,
            members_added: Vec::new(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a message activity.
    pub fn message(channel_id: &str, conversation_id: &str, user_id: &str, text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::base(ActivityType::Message, channel_id, conversation_id, user_id)
        }
    }

    /// Create a named event activity.
    pub fn event(
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
        name: &str,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: Some(name.to_string()),
            value,
            ..Self::base(ActivityType::Event, channel_id, conversation_id, user_id)
        }
    }

    /// Create a named invoke activity.
    pub fn invoke(
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
        name: &str,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: Some(name.to_string()),
            value,
            ..Self::base(ActivityType::Invoke, channel_id, conversation_id, user_id)
        }
    }

    /// Create a conversation update announcing the given members.
    pub fn conversation_update(
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
        members_added: Vec<ChannelAccount>,
    ) -> Self {
        Self {
            members_added,
            ..Self::base(
                ActivityType::ConversationUpdate,
                channel_id,
                conversation_id,
                user_id,
            )
        }
    }

    /// Conversation identity of this activity.
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.channel_id, &self.conversation.id, &self.from.id)
    }

    /// Message text, or empty if none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Event/invoke name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// An outbound activity, constructed fresh for each response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingActivity {
    /// Plain text message.
    Message { text: String },
    /// Interactive OAuth sign-in card.
    #[serde(rename_all = "camelCase")]
    SignInCard {
        connection_name: String,
        title: String,
        text: String,
        sign_in_link: String,
    },
    /// Status reply for an invoke activity.
    InvokeResponse { status: u16 },
}

impl OutgoingActivity {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Text content, if this is a plain message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Message { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_sign_in_card(&self) -> bool {
        matches!(self, Self::SignInCard { .. })
    }
}

/// Credential returned by the identity provider on successful sign-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub connection_name: String,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl TokenResponse {
    pub fn new(connection_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            token: SecretString::from(token.into()),
            expiration: None,
            channel_id: None,
        }
    }

    /// Whether the response actually carries a token.
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().is_empty()
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(SecretString::from(raw.unwrap_or_default()))
}

/// Whether `text` looks like a six-digit sign-in magic code.
pub fn is_magic_code(text: &str) -> bool {
    text.len() == 6 && text.bytes().all(|b| b.is_ascii_digit())
}
