//! HTTP webhook: `POST /api/messages` runs a turn and returns its replies.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::activity::{Activity, OutgoingActivity};
use crate::bot::BotRunner;
use crate::channels::BufferedSink;

/// Replies produced by one turn.
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub activities: Vec<OutgoingActivity>,
}

/// Build the webhook router.
pub fn http_routes(runner: Arc<BotRunner>) -> Router {
    Router::new()
        .route("/api/messages", post(messages_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(runner)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn messages_handler(
    State(runner): State<Arc<BotRunner>>,
    Json(activity): Json<Activity>,
) -> Response {
    let conversation = activity.conversation_key();
    let sink = Arc::new(BufferedSink::new());

    match runner.process(activity, sink.clone()).await {
        Ok(()) => {
            let activities = sink.take().await;
            Json(TurnResponse { activities }).into_response()
        }
        Err(e) => {
            tracing::error!(conversation = %conversation, error = %e, "Webhook turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
