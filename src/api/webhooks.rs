use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::payments::types::ProviderName;
use crate::services::webhook_processor::WebhookProcessorError;

/// POST /webhooks/{provider}
///
/// The body is taken as raw bytes: signatures are computed over exactly what
/// the gateway sent.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(provider = %provider, bytes = body.len(), "Received webhook");

    let signature = ProviderName::from_str(&provider)
        .ok()
        .and_then(|p| headers.get(p.signature_header()))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match state
        .webhooks
        .process_webhook(&provider, signature.as_deref(), &body)
        .await
    {
        Ok(ack) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "applied": ack.applied })),
        ),
        Err(WebhookProcessorError::InvalidSignature) => {
            warn!(provider = %provider, "Invalid webhook signature");
            rejected(StatusCode::UNAUTHORIZED)
        }
        Err(WebhookProcessorError::Storage(e)) => {
            error!(provider = %provider, error = %e, "Webhook storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error" })),
            )
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "Webhook rejected");
            rejected(StatusCode::BAD_REQUEST)
        }
    }
}

fn rejected(status: StatusCode) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "status": "rejected" })))
}
