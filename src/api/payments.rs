use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::database::models::PaymentAttempt;
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::{PaymentStatus, ProviderName};
use crate::services::payment_orchestrator::{PaymentOutcome, ProcessPaymentRequest};

#[derive(Debug, Serialize)]
pub struct PaymentSummary {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub provider: Option<ProviderName>,
    pub redirect_url: Option<String>,
    pub country: Option<String>,
    pub attempts: usize,
    pub replayed: bool,
}

impl From<&PaymentOutcome> for PaymentSummary {
    fn from(outcome: &PaymentOutcome) -> Self {
        Self {
            payment_id: outcome.payment.id,
            status: outcome.payment.status,
            provider: outcome.payment.provider,
            redirect_url: outcome.redirect_url.clone(),
            country: outcome.payment.country.clone(),
            attempts: outcome.attempts.len(),
            replayed: outcome.replayed,
        }
    }
}

/// Status view of one payment. Gateway error text stays in storage and logs;
/// attempts only expose a coarse outcome.
#[derive(Debug, Serialize)]
pub struct PaymentDetails {
    pub payment_id: Uuid,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: Option<ProviderName>,
    pub country: Option<String>,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub attempt_id: Uuid,
    pub provider: ProviderName,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<&'static str>,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentAttempt> for AttemptSummary {
    fn from(attempt: &PaymentAttempt) -> Self {
        let failure_reason = match attempt.status {
            PaymentStatus::Failed => Some("declined_by_provider"),
            _ if attempt.error_message.is_some() => Some("provider_error"),
            _ => None,
        };
        Self {
            attempt_id: attempt.id,
            provider: attempt.provider,
            status: attempt.status,
            provider_reference: attempt.provider_reference.clone(),
            failure_reason,
            created_at: attempt.created_at,
        }
    }
}

impl From<&PaymentOutcome> for PaymentDetails {
    fn from(outcome: &PaymentOutcome) -> Self {
        let payment = &outcome.payment;
        Self {
            payment_id: payment.id,
            merchant_id: payment.merchant_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: payment.status,
            provider: payment.provider,
            country: payment.country.clone(),
            redirect_url: outcome.redirect_url.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            attempts: outcome.attempts.iter().map(AttemptSummary::from).collect(),
        }
    }
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProcessPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentSummary>), AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let tag = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let Json(request) =
        payload.map_err(|e| tag(AppError::validation("body", e.body_text())))?;

    let outcome = state
        .orchestrator
        .process_payment(request)
        .await
        .map_err(|e| tag(e.into()))?;

    info!(
        payment_id = %outcome.payment.id,
        status = %outcome.payment.status,
        replayed = outcome.replayed,
        "payment request handled"
    );

    let code = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((code, Json(PaymentSummary::from(&outcome))))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentDetails>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let tag = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };
    let not_found = || {
        tag(AppError::new(AppErrorKind::Domain(
            DomainError::PaymentNotFound {
                payment_id: payment_id.clone(),
            },
        )))
    };

    let id = Uuid::parse_str(&payment_id).map_err(|_| not_found())?;
    state
        .orchestrator
        .get_payment(id)
        .await
        .map_err(|e| tag(e.into()))?
        .map(|outcome| Json(PaymentDetails::from(&outcome)))
        .ok_or_else(not_found)
}
