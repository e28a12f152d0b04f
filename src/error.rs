//! Error types for the sign-in bot.

/// Top-level error type for a turn.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Conversation state store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send activity on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid activity: {0}")]
    InvalidActivity(String),
}

/// Identity provider errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Token service request failed: {0}")]
    RequestFailed(String),

    #[error("Token service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid response from token service: {0}")]
    InvalidResponse(String),
}

/// Dialog stack errors.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Dialog {id} is not registered")]
    NotFound { id: String },

    #[error("Dialog {id} is already registered")]
    Duplicate { id: String },

    #[error("No active dialog")]
    NoActiveDialog,

    #[error("Dialog {id} has invalid state: {reason}")]
    InvalidState { id: String, reason: String },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
