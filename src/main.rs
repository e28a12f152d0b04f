use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use signin_bot::bot::{Bot, BotRunner};
use signin_bot::channels::{CliChannel, http_routes};
use signin_bot::config::{BotConfig, ServerConfig};
use signin_bot::identity::{IdentityProvider, MemoryIdentityProvider, TokenServiceClient};
use signin_bot::store::{ConversationStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let bot_config = BotConfig::from_env().context("invalid bot configuration")?;
    let server_config = ServerConfig::from_env();

    eprintln!("🔐 Signin Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Connection: {}", bot_config.connection_name());
    eprintln!(
        "   Sign-in timeout: {}s",
        bot_config.prompt.timeout.as_secs()
    );
    if bot_config.reveal_token {
        eprintln!("   Warning: token reveal is enabled (demo only)");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ConversationStore> = if server_config.db_path == ":memory:" {
        Arc::new(LibSqlStore::new_memory().await?)
    } else {
        Arc::new(
            LibSqlStore::new_local(Path::new(&server_config.db_path))
                .await
                .with_context(|| {
                    format!("failed to open database at {}", server_config.db_path)
                })?,
        )
    };
    eprintln!("   Database: {}", server_config.db_path);

    // ── Identity ─────────────────────────────────────────────────────────
    let identity: Arc<dyn IdentityProvider> = match &server_config.token_service_url {
        Some(url) => {
            eprintln!("   Token service: {}", url);
            Arc::new(TokenServiceClient::new(
                url.clone(),
                server_config.token_service_key.clone(),
            ))
        }
        None => {
            eprintln!("   Token service: in-memory (type the code from the sign-in link)");
            Arc::new(MemoryIdentityProvider::new())
        }
    };

    let bot = Bot::builder()
        .config(bot_config)
        .store(store)
        .identity(identity)
        .build()?;
    let runner = Arc::new(BotRunner::new(bot));

    // Spawn the webhook server
    let port = server_config.http_port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("failed to bind webhook port {port}"))?;
    let app = http_routes(Arc::clone(&runner));
    tokio::spawn(async move {
        tracing::info!(port, "Webhook server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Webhook server stopped");
        }
    });
    eprintln!("   Webhook: http://0.0.0.0:{}/api/messages", port);
    eprintln!("   Type a message and press Enter. Ctrl-D to exit.\n");

    let cli = Arc::new(CliChannel::new());
    runner.run(cli).await?;

    Ok(())
}
