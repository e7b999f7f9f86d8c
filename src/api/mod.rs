//! HTTP surface: payment initiation, status query, provider webhooks and
//! merchant provider-config management.

pub mod merchants;
pub mod payments;
pub mod webhooks;

use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::payment_orchestrator::PaymentOrchestrator;
use crate::services::provider_config::ProviderConfigService;
use crate::services::webhook_processor::WebhookProcessor;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub provider_configs: Arc<ProviderConfigService>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/payments", post(payments::create_payment))
        .route("/api/payments/{id}", get(payments::get_payment))
        .route("/webhooks/{provider}", post(webhooks::handle_webhook))
        .route(
            "/api/merchants/{merchant_id}/providers/{provider}",
            put(merchants::upsert_provider_config),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}
