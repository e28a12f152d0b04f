//! Turn dispatcher: routes each inbound activity and persists state.
//!
//! Every turn follows the same shape: build a `TurnContext`, run the branch
//! for the activity type, then save conversation state once. A failed branch
//! propagates its error without saving, so the turn leaves no trace.

pub mod runner;
pub mod turn;

pub use runner::BotRunner;
pub use turn::TurnContext;

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::activity::{Activity, ActivityType, is_magic_code};
use crate::channels::ActivitySink;
use crate::config::BotConfig;
use crate::dialogs::{AUTH_DIALOG_ID, AuthDialog, DialogSet};
use crate::error::{ConfigError, Result};
use crate::identity::IdentityProvider;
use crate::state::ConversationStateHandle;
use crate::store::ConversationStore;

/// Acknowledgment sent when members join a conversation.
pub const ACKNOWLEDGMENT_TEXT: &str = "ConversationUpdate";
/// How to start signing in.
pub const SIGN_IN_HINT: &str = "Type \"Sign in\" to log in.";
/// Message text (lowercased) that starts the auth dialog.
pub const SIGN_IN_COMMAND: &str = "sign in";
/// Reply when a token exists but revealing it is disabled.
pub const ALREADY_SIGNED_IN_TEXT: &str = "You are already signed in.";

pub struct Bot {
    config: BotConfig,
    dialogs: DialogSet,
    store: Arc<dyn ConversationStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Process one inbound activity end to end.
    pub async fn handle_turn(&self, activity: Activity, sink: Arc<dyn ActivitySink>) -> Result<()> {
        let activity_type = activity.activity_type;
        let turn = TurnContext::new(activity, sink, Arc::clone(&self.identity));
        let mut state = ConversationStateHandle::new(Arc::clone(&self.store), turn.key().clone());

        debug!(
            conversation = %turn.key(),
            activity_type = %activity_type,
            "Turn started"
        );

        match activity_type {
            ActivityType::Message => self.handle_message(&turn, &mut state).await?,
            ActivityType::Event | ActivityType::Invoke => {
                let dialog_state = state.dialog_state().await?;
                self.dialogs
                    .create_context(&turn, dialog_state)
                    .continue_dialog()
                    .await?;
            }
            ActivityType::ConversationUpdate => {
                if !turn.activity().members_added.is_empty() {
                    turn.send_text(ACKNOWLEDGMENT_TEXT).await?;
                    turn.send_text(SIGN_IN_HINT).await?;
                }
            }
            other => {
                debug!(conversation = %turn.key(), activity_type = %other, "Ignoring activity");
            }
        }

        state.save_changes().await?;
        debug!(
            conversation = %turn.key(),
            responded = turn.responded(),
            "Turn complete"
        );
        Ok(())
    }

    async fn handle_message(
        &self,
        turn: &TurnContext,
        state: &mut ConversationStateHandle,
    ) -> Result<()> {
        let dialog_state = state.dialog_state().await?;
        let mut dc = self.dialogs.create_context(turn, dialog_state);

        let token = turn
            .identity()
            .get_cached_token(turn.key(), self.config.connection_name())
            .await?
            .filter(|t| t.has_token());

        let text = turn.activity().text();

        if text.to_lowercase() == SIGN_IN_COMMAND {
            if AuthDialog::phase(&dc).is_some() {
                debug!(conversation = %turn.key(), "Sign-in already in progress");
                dc.continue_dialog().await?;
            } else {
                info!(conversation = %turn.key(), "Starting sign-in");
                dc.begin_dialog(AUTH_DIALOG_ID).await?;
            }
            return Ok(());
        }

        if dc.active_dialog().is_some() && is_magic_code(text) {
            dc.continue_dialog().await?;
            return Ok(());
        }

        turn.send_text(format!("Echo: {text}")).await?;
        match token {
            None => turn.send_text(SIGN_IN_HINT).await?,
            Some(token) if self.config.reveal_token => {
                turn.send_text(format!("your token:\n{}", token.token.expose_secret()))
                    .await?
            }
            Some(_) => turn.send_text(ALREADY_SIGNED_IN_TEXT).await?,
        }
        Ok(())
    }
}

/// Builder for `Bot`. Store and identity provider are required.
#[derive(Default)]
pub struct BotBuilder {
    config: BotConfig,
    store: Option<Arc<dyn ConversationStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl BotBuilder {
    pub fn config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn build(self) -> Result<Bot> {
        self.config.validate()?;

        let store = self.store.ok_or_else(|| ConfigError::MissingRequired {
            key: "store".into(),
            hint: "Provide a conversation store (MemoryStore or LibSqlStore)".into(),
        })?;
        let identity = self.identity.ok_or_else(|| ConfigError::MissingRequired {
            key: "identity".into(),
            hint: "Provide an identity provider (MemoryIdentityProvider or TokenServiceClient)"
                .into(),
        })?;

        let mut dialogs = DialogSet::new();
        AuthDialog::register(&mut dialogs, self.config.prompt.clone())?;

        Ok(Bot {
            config: self.config,
            dialogs,
            store,
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::activity::{ChannelAccount, ConversationKey, OutgoingActivity, TOKEN_RESPONSE_EVENT};
    use crate::channels::BufferedSink;
    use crate::dialogs::auth::{LOGGED_IN_TEXT, LOGIN_FAILED_TEXT};
    use crate::error::{ChannelError, Error, StoreError};
    use crate::identity::MemoryIdentityProvider;
    use crate::state::ConversationState;
    use crate::store::MemoryStore;

    /// Store wrapper that counts saves.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        saves: AtomicUsize,
    }

    impl CountingStore {
        fn saves(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversationStore for CountingStore {
        async fn load(
            &self,
            key: &ConversationKey,
        ) -> std::result::Result<Option<ConversationState>, StoreError> {
            self.inner.load(key).await
        }

        async fn save(
            &self,
            key: &ConversationKey,
            state: &ConversationState,
        ) -> std::result::Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(key, state).await
        }

        async fn delete(&self, key: &ConversationKey) -> std::result::Result<bool, StoreError> {
            self.inner.delete(key).await
        }
    }

    /// Store whose operations fail. Save attempts are still counted.
    #[derive(Default)]
    struct FailingStore {
        fail_load: bool,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn load(
            &self,
            _key: &ConversationKey,
        ) -> std::result::Result<Option<ConversationState>, StoreError> {
            if self.fail_load {
                return Err(StoreError::Query("load: disk I/O error".into()));
            }
            Ok(None)
        }

        async fn save(
            &self,
            _key: &ConversationKey,
            _state: &ConversationState,
        ) -> std::result::Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Query("save: database is locked".into()))
        }

        async fn delete(&self, _key: &ConversationKey) -> std::result::Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn bot_over(store: Arc<FailingStore>) -> Bot {
        Bot::builder()
            .store(store)
            .identity(Arc::new(MemoryIdentityProvider::new()))
            .build()
            .unwrap()
    }

    struct FailingSink;

    #[async_trait]
    impl ActivitySink for FailingSink {
        async fn send(
            &self,
            _key: &ConversationKey,
            _activity: OutgoingActivity,
        ) -> std::result::Result<(), ChannelError> {
            Err(ChannelError::SendFailed {
                name: "test".into(),
                reason: "transport down".into(),
            })
        }
    }

    struct Fixture {
        bot: Bot,
        store: Arc<CountingStore>,
        identity: Arc<MemoryIdentityProvider>,
        sink: Arc<BufferedSink>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(BotConfig::default())
        }

        fn with_config(config: BotConfig) -> Self {
            let store = Arc::new(CountingStore::default());
            let identity = Arc::new(MemoryIdentityProvider::new());
            let bot = Bot::builder()
                .config(config)
                .store(store.clone())
                .identity(identity.clone())
                .build()
                .unwrap();
            Self {
                bot,
                store,
                identity,
                sink: Arc::new(BufferedSink::new()),
            }
        }

        fn key() -> ConversationKey {
            ConversationKey::new("test", "conv", "user")
        }

        async fn turn(&self, activity: Activity) -> Vec<OutgoingActivity> {
            self.bot
                .handle_turn(activity, self.sink.clone())
                .await
                .unwrap();
            self.sink.take().await
        }

        async fn say(&self, text: &str) -> Vec<OutgoingActivity> {
            self.turn(Activity::message("test", "conv", "user", text))
                .await
        }

        async fn stack_depth(&self) -> usize {
            self.store
                .load(&Self::key())
                .await
                .unwrap()
                .map(|s| s.dialog_state.depth())
                .unwrap_or(0)
        }
    }

    fn texts(sent: &[OutgoingActivity]) -> Vec<&str> {
        sent.iter().filter_map(|a| a.as_text()).collect()
    }

    #[tokio::test]
    async fn conversation_update_sends_two_messages_in_order() {
        let f = Fixture::new();
        let update = Activity::conversation_update(
            "test",
            "conv",
            "user",
            vec![ChannelAccount::new("user")],
        );
        let sent = f.turn(update).await;
        assert_eq!(texts(&sent), vec![ACKNOWLEDGMENT_TEXT, SIGN_IN_HINT]);
        assert_eq!(f.store.saves(), 1);
    }

    #[tokio::test]
    async fn conversation_update_without_members_is_silent() {
        let f = Fixture::new();
        let update = Activity::conversation_update("test", "conv", "user", vec![]);
        assert!(f.turn(update).await.is_empty());
        assert_eq!(f.store.saves(), 1);
    }

    #[tokio::test]
    async fn echo_with_hint_when_signed_out() {
        let f = Fixture::new();
        let sent = f.say("hello").await;
        assert_eq!(texts(&sent), vec!["Echo: hello", SIGN_IN_HINT]);
        assert_eq!(f.store.saves(), 1);
    }

    #[tokio::test]
    async fn echo_without_hint_when_signed_in() {
        let f = Fixture::new();
        f.identity
            .insert_token(&Fixture::key(), "AzureAD", "secret-token")
            .await;
        let sent = f.say("hello").await;
        assert_eq!(texts(&sent), vec!["Echo: hello", ALREADY_SIGNED_IN_TEXT]);
    }

    #[tokio::test]
    async fn token_is_revealed_only_when_enabled() {
        let config = BotConfig {
            reveal_token: true,
            ..BotConfig::default()
        };
        let f = Fixture::with_config(config);
        f.identity
            .insert_token(&Fixture::key(), "AzureAD", "secret-token")
            .await;
        let sent = f.say("hello").await;
        assert_eq!(
            texts(&sent),
            vec!["Echo: hello", "your token:\nsecret-token"]
        );
    }

    #[tokio::test]
    async fn empty_message_echoes_empty_text() {
        let f = Fixture::new();
        let mut activity = Activity::message("test", "conv", "user", "");
        activity.text = None;
        let sent = f.turn(activity).await;
        assert_eq!(texts(&sent), vec!["Echo: ", SIGN_IN_HINT]);
    }

    #[tokio::test]
    async fn sign_in_any_case_sends_one_card() {
        for text in ["sign in", "Sign in", "SIGN IN"] {
            let f = Fixture::new();
            let sent = f.say(text).await;
            assert_eq!(sent.len(), 1, "{text}");
            assert!(sent[0].is_sign_in_card());
            assert_eq!(f.stack_depth().await, 2);
        }
    }

    #[tokio::test]
    async fn sign_in_is_not_trimmed() {
        let f = Fixture::new();
        let sent = f.say(" sign in ").await;
        assert_eq!(texts(&sent), vec!["Echo:  sign in ", SIGN_IN_HINT]);
        assert_eq!(f.stack_depth().await, 0);
    }

    #[tokio::test]
    async fn token_event_completes_sign_in() {
        let f = Fixture::new();
        f.say("sign in").await;

        let event = Activity::event(
            "test",
            "conv",
            "user",
            TOKEN_RESPONSE_EVENT,
            Some(serde_json::json!({"connectionName": "AzureAD", "token": "abc"})),
        );
        let sent = f.turn(event).await;
        assert_eq!(texts(&sent), vec![LOGGED_IN_TEXT]);
        assert_eq!(f.stack_depth().await, 0);
        assert_eq!(f.store.saves(), 2);
    }

    #[tokio::test]
    async fn empty_token_event_reports_failure() {
        let f = Fixture::new();
        f.say("sign in").await;

        let event = Activity::event(
            "test",
            "conv",
            "user",
            TOKEN_RESPONSE_EVENT,
            Some(serde_json::json!({"token": ""})),
        );
        let sent = f.turn(event).await;
        assert_eq!(texts(&sent), vec![LOGIN_FAILED_TEXT]);
        assert_eq!(f.stack_depth().await, 0);
    }

    #[tokio::test]
    async fn magic_code_from_sign_in_link_completes_sign_in() {
        let f = Fixture::new();
        let sent = f.say("sign in").await;
        let link = match &sent[0] {
            OutgoingActivity::SignInCard { sign_in_link, .. } => sign_in_link.clone(),
            other => panic!("expected card, got {other:?}"),
        };
        let code = link.rsplit('=').next().unwrap().to_string();

        let sent = f.say(&code).await;
        assert_eq!(texts(&sent), vec![LOGGED_IN_TEXT]);
        assert_eq!(f.stack_depth().await, 0);

        // The redeemed token is now cached.
        let sent = f.say("hello").await;
        assert_eq!(texts(&sent), vec!["Echo: hello", ALREADY_SIGNED_IN_TEXT]);
    }

    #[tokio::test]
    async fn mistyped_magic_code_keeps_prompt_waiting() {
        let f = Fixture::new();
        let sent = f.say("sign in").await;
        let link = match &sent[0] {
            OutgoingActivity::SignInCard { sign_in_link, .. } => sign_in_link.clone(),
            other => panic!("expected card, got {other:?}"),
        };
        let code = link.rsplit('=').next().unwrap().to_string();
        let stranger = ConversationKey::new("test", "conv", "someone-else");
        let wrong = f.identity.issue_magic_code(&stranger, "AzureAD", "x").await;

        let sent = f.say(&wrong).await;
        assert!(texts(&sent).is_empty(), "{sent:?}");
        assert!(!texts(&sent).contains(&LOGIN_FAILED_TEXT));
        assert_eq!(f.stack_depth().await, 2);

        let sent = f.say(&code).await;
        assert_eq!(texts(&sent), vec![LOGGED_IN_TEXT]);
        assert_eq!(f.stack_depth().await, 0);
    }

    #[tokio::test]
    async fn duplicate_sign_in_keeps_single_dialog() {
        let f = Fixture::new();
        f.say("sign in").await;
        let sent = f.say("Sign In").await;
        assert!(sent.is_empty());
        assert_eq!(f.stack_depth().await, 2);
    }

    #[tokio::test]
    async fn other_messages_echo_while_waiting() {
        let f = Fixture::new();
        f.say("sign in").await;
        let sent = f.say("what now?").await;
        assert_eq!(texts(&sent), vec!["Echo: what now?", SIGN_IN_HINT]);
        assert_eq!(f.stack_depth().await, 2);
    }

    #[tokio::test]
    async fn event_without_dialog_is_a_noop_but_saves() {
        let f = Fixture::new();
        let event = Activity::event("test", "conv", "user", TOKEN_RESPONSE_EVENT, None);
        assert!(f.turn(event).await.is_empty());
        assert_eq!(f.store.saves(), 1);
    }

    #[tokio::test]
    async fn unknown_activity_type_still_saves() {
        let f = Fixture::new();
        let mut activity = Activity::message("test", "conv", "user", "x");
        activity.activity_type = ActivityType::Typing;
        assert!(f.turn(activity).await.is_empty());
        assert_eq!(f.store.saves(), 1);
    }

    #[tokio::test]
    async fn failed_send_skips_save() {
        let f = Fixture::new();
        let err = f
            .bot
            .handle_turn(
                Activity::message("test", "conv", "user", "hello"),
                Arc::new(FailingSink),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::SendFailed { .. })));
        assert_eq!(f.store.saves(), 0);
    }

    #[tokio::test]
    async fn failed_save_is_reported_after_one_attempt() {
        let store = Arc::new(FailingStore::default());
        let bot = bot_over(store.clone());
        let sink = Arc::new(BufferedSink::new());

        let err = bot
            .handle_turn(Activity::message("test", "conv", "user", "hello"), sink.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Query(_))), "{err:?}");
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        // Replies went out before the save failed.
        assert_eq!(texts(&sink.take().await), vec!["Echo: hello", SIGN_IN_HINT]);
    }

    #[tokio::test]
    async fn failed_load_aborts_turn_without_saving() {
        let store = Arc::new(FailingStore {
            fail_load: true,
            ..FailingStore::default()
        });
        let bot = bot_over(store.clone());
        let sink = Arc::new(BufferedSink::new());

        let err = bot
            .handle_turn(Activity::message("test", "conv", "user", "sign in"), sink.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Query(_))), "{err:?}");
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        assert!(sink.take().await.is_empty());
    }

    #[tokio::test]
    async fn unchanged_state_is_saved_byte_identical() {
        let store = Arc::new(MemoryStore::new());
        let bot = Bot::builder()
            .store(store.clone())
            .identity(Arc::new(MemoryIdentityProvider::new()))
            .build()
            .unwrap();
        let sink = Arc::new(BufferedSink::new());

        bot.handle_turn(Activity::message("test", "conv", "user", "sign in"), sink.clone())
            .await
            .unwrap();
        let before = store.raw(&Fixture::key()).await.unwrap();

        bot.handle_turn(Activity::message("test", "conv", "user", "hello"), sink.clone())
            .await
            .unwrap();
        assert_eq!(store.raw(&Fixture::key()).await.unwrap(), before);
    }

    #[test]
    fn builder_requires_store_and_identity() {
        let err = Bot::builder()
            .identity(Arc::new(MemoryIdentityProvider::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingRequired { ref key, .. }) if key == "store"
        ));

        let err = Bot::builder()
            .store(Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingRequired { ref key, .. }) if key == "identity"
        ));
    }

    #[test]
    fn builder_rejects_empty_connection_name() {
        let mut config = BotConfig::default();
        config.prompt.connection_name = String::new();
        let err = Bot::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()))
            .identity(Arc::new(MemoryIdentityProvider::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
