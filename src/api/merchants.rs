use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use std::str::FromStr;
use uuid::Uuid;

use crate::api::AppState;
use crate::database::models::MerchantProviderConfig;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::ProviderName;
use crate::services::provider_config::UpsertProviderConfig;

/// PUT /api/merchants/{merchant_id}/providers/{provider}
///
/// Secrets are encrypted before they reach the store and are never echoed.
pub async fn upsert_provider_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((merchant_id, provider)): Path<(Uuid, String)>,
    payload: Result<Json<UpsertProviderConfig>, JsonRejection>,
) -> Result<Json<MerchantProviderConfig>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let tag = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let provider = ProviderName::from_str(&provider).map_err(|_| {
        tag(AppError::new(AppErrorKind::Validation(
            ValidationError::UnsupportedProvider { provider },
        )))
    })?;
    let Json(request) =
        payload.map_err(|e| tag(AppError::validation("body", e.body_text())))?;

    let saved = state
        .provider_configs
        .upsert(merchant_id, provider, request)
        .await
        .map_err(|e| tag(e.into()))?;

    Ok(Json(saved))
}
