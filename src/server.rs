//! HTTP surface: push-notification webhook and health check.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::dispatch::{DispatchOutcome, Dispatcher, NotificationEvent};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the router. Only call this once the predictor is loaded: `/health`
/// answers `ok` unconditionally.
pub fn routes(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

async fn health() -> &'static str {
    "ok"
}

/// Request body: either a Pub/Sub push envelope, whose `message.data` is the
/// base64 of a `WebhookPayload`, or that payload posted directly.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookBody {
    Push(PushEnvelope),
    Direct(WebhookPayload),
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
    #[serde(default)]
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: String,
    #[serde(default)]
    message_id: Option<String>,
}

impl WebhookBody {
    fn into_payload(self) -> Result<WebhookPayload, String> {
        match self {
            Self::Direct(payload) => Ok(payload),
            Self::Push(envelope) => {
                debug!(
                    subscription = envelope.subscription.as_deref().unwrap_or("-"),
                    message_id = envelope.message.message_id.as_deref().unwrap_or("-"),
                    "Unwrapping push envelope"
                );
                let raw = STANDARD
                    .decode(envelope.message.data.trim())
                    .map_err(|e| format!("message.data is not base64: {e}"))?;
                serde_json::from_slice(&raw).map_err(|e| format!("message.data: {e}"))
            }
        }
    }
}

/// Notification body. Gmail sends `historyId` as a number; other relays send
/// a string, so both are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    email_address: String,
    history_id: Checkpoint,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Checkpoint {
    Text(String),
    Number(u64),
}

impl Checkpoint {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    Json(body): Json<WebhookBody>,
) -> impl IntoResponse {
    let payload = match body.into_payload() {
        Ok(payload) => payload,
        Err(reason) => {
            warn!(reason = %reason, "Rejected push envelope");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "error": "invalid_payload", "message": reason })),
            );
        }
    };
    let event = NotificationEvent {
        account: payload.email_address,
        checkpoint: payload.history_id.into_string(),
    };
    if event.checkpoint.is_empty() {
        warn!(account = %event.account, "Webhook payload with empty checkpoint");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": "invalid_payload" })),
        );
    }

    let report = state.dispatcher.dispatch(&event).await;
    let dispatch_id = report.id().to_string();
    match report.outcome {
        DispatchOutcome::NoOp => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "result": "no_op",
                "dispatch_id": dispatch_id,
            })),
        ),
        DispatchOutcome::Labeled {
            item_id,
            label,
            applied,
        } => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "result": "labeled",
                "dispatch_id": dispatch_id,
                "item_id": item_id,
                "label": label,
                "applied": applied,
            })),
        ),
        DispatchOutcome::Failed(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "error": failure.kind(),
                "message": failure.to_string(),
                "dispatch_id": dispatch_id,
            })),
        ),
    }
}
