//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default OAuth connection name (the identity provider registration).
pub const DEFAULT_CONNECTION_NAME: &str = "AzureAD";

/// Default sign-in window: 5 minutes.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings for the interactive OAuth sign-in prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthPromptSettings {
    /// Identity provider connection the prompt signs into.
    pub connection_name: String,
    /// Card title.
    pub title: String,
    /// Card text.
    pub text: String,
    /// How long the user has to complete sign-in.
    pub timeout: Duration,
}

impl OAuthPromptSettings {
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            title: "Sign in".to_string(),
            text: "Please sign in".to_string(),
            timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// OAuth prompt settings (connection name, card text, timeout).
    pub prompt: OAuthPromptSettings,
    /// Echo the cached token back to the user. Demo only; never enable in production.
    pub reveal_token: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prompt: OAuthPromptSettings::new(DEFAULT_CONNECTION_NAME),
            reveal_token: false,
        }
    }
}

impl BotConfig {
    /// Connection name shortcut.
    pub fn connection_name(&self) -> &str {
        &self.prompt.connection_name
    }

    /// Validate the configuration. Called by the bot builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.connection_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "connection_name".into(),
                hint: "Set SIGNIN_BOT_CONNECTION_NAME to the OAuth connection name".into(),
            });
        }
        if self.prompt.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "prompt.timeout".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Load from `SIGNIN_BOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let connection_name = std::env::var("SIGNIN_BOT_CONNECTION_NAME")
            .unwrap_or_else(|_| DEFAULT_CONNECTION_NAME.to_string());

        let timeout = match std::env::var("SIGNIN_BOT_PROMPT_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SIGNIN_BOT_PROMPT_TIMEOUT_SECS".into(),
                    message: format!("expected seconds, got {raw:?}"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_PROMPT_TIMEOUT,
        };

        let reveal_token = std::env::var("SIGNIN_BOT_REVEAL_TOKEN")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let config = Self {
            prompt: OAuthPromptSettings::new(connection_name).with_timeout(timeout),
            reveal_token,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Runtime configuration for the binary: storage, HTTP, token service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// libSQL database path, or `:memory:`.
    pub db_path: String,
    /// Port for the `/api/messages` webhook.
    pub http_port: u16,
    /// Token service base URL. When unset, the in-memory dev provider is used.
    pub token_service_url: Option<String>,
    /// Bearer credential for the token service.
    pub token_service_key: Option<SecretString>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("SIGNIN_BOT_DB_PATH")
            .unwrap_or_else(|_| "./data/signin-bot.db".to_string());

        let http_port: u16 = std::env::var("SIGNIN_BOT_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3978);

        let token_service_url = std::env::var("SIGNIN_BOT_TOKEN_SERVICE_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let token_service_key = std::env::var("SIGNIN_BOT_TOKEN_SERVICE_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        Self {
            db_path,
            http_port,
            token_service_url,
            token_service_key,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_settings() {
        let config = BotConfig::default();
        assert_eq!(config.connection_name(), "AzureAD");
        assert_eq!(config.prompt.title, "Sign in");
        assert_eq!(config.prompt.text, "Please sign in");
        assert_eq!(config.prompt.timeout, Duration::from_secs(300));
        assert!(!config.reveal_token);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_connection_name_fails_validation() {
        let config = BotConfig {
            prompt: OAuthPromptSettings::new("  "),
            ..BotConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let config = BotConfig {
            prompt: OAuthPromptSettings::new("github").with_timeout(Duration::ZERO),
            ..BotConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn flags() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
