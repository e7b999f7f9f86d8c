//! Payment Orchestrator Service
//!
//! Owns a logical payment from creation to its terminal state: enforces
//! idempotency, asks the routing engine for an ordered provider list and
//! cascades through it until one provider succeeds or hands back a redirect.

use crate::crypto::CredentialCipher;
use crate::database::error::DatabaseError;
use crate::database::models::{AttemptResult, NewPayment, Payment, PaymentAttempt};
use crate::database::store::PaymentStore;
use crate::logging::mask_email;
use crate::payments::factory::ProviderResolver;
use crate::payments::types::{InitializeRequest, InitializeResponse, PaymentStatus};
use crate::services::bin_lookup::normalize_bin;
use crate::services::provider_config::decrypt_credentials;
use crate::services::routing::DecisionEngine;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on a single provider `initialize` call.
    pub provider_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPaymentRequest {
    pub merchant_id: Uuid,
    /// Smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub card_bin: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub attempts: Vec<PaymentAttempt>,
    pub redirect_url: Option<String>,
    /// True when an earlier request with the same idempotency key already
    /// created this payment.
    pub replayed: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Merchant not found: {0}")]
    MerchantNotFound(Uuid),

    #[error("All providers exhausted for payment {payment_id}")]
    AllProvidersExhausted {
        payment_id: Uuid,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

fn invalid(field: &str, message: &str) -> OrchestratorError {
    OrchestratorError::Validation {
        message: message.to_string(),
        field: Some(field.to_string()),
    }
}

/// Shape checks that run before any state is created.
fn validate(request: &ProcessPaymentRequest) -> OrchestratorResult<(String, Option<String>)> {
    if request.amount <= 0 {
        return Err(invalid("amount", "amount must be a positive integer"));
    }

    let currency = request.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid("currency", "currency must be a 3-letter ISO code"));
    }

    let email = request.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(invalid("email", "email is not valid")),
    }

    let key = request.idempotency_key.trim();
    if key.is_empty() || key.len() > 255 {
        return Err(invalid(
            "idempotency_key",
            "idempotency_key must be 1-255 characters",
        ));
    }

    let card_bin = match request.card_bin.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(
            normalize_bin(raw)
                .ok_or_else(|| invalid("card_bin", "card_bin must be at least 6 digits"))?,
        ),
        _ => None,
    };

    Ok((currency, card_bin))
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    store: Arc<dyn PaymentStore>,
    resolver: Arc<dyn ProviderResolver>,
    cipher: Arc<CredentialCipher>,
    router: Arc<DecisionEngine>,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        resolver: Arc<dyn ProviderResolver>,
        cipher: Arc<CredentialCipher>,
        router: Arc<DecisionEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            cipher,
            router,
            config,
        }
    }

    pub async fn process_payment(
        &self,
        request: ProcessPaymentRequest,
    ) -> OrchestratorResult<PaymentOutcome> {
        let (currency, card_bin) = validate(&request)?;
        let idempotency_key = request.idempotency_key.trim().to_string();

        if let Some(existing) = self
            .store
            .find_payment_by_idempotency_key(request.merchant_id, &idempotency_key)
            .await?
        {
            info!(
                payment_id = %existing.id,
                merchant_id = %request.merchant_id,
                "idempotent replay"
            );
            return self.outcome(existing, true).await;
        }

        if self.store.find_merchant(request.merchant_id).await?.is_none() {
            return Err(OrchestratorError::MerchantNotFound(request.merchant_id));
        }

        let configs = self.store.list_enabled_configs(request.merchant_id).await?;
        let route = self
            .router
            .decide(request.amount, &currency, card_bin.as_deref(), &configs)
            .await;

        let payment = match self
            .store
            .insert_payment(NewPayment {
                merchant_id: request.merchant_id,
                amount: request.amount,
                currency,
                email: request.email.trim().to_string(),
                idempotency_key: idempotency_key.clone(),
                card_bin,
                country: route.country.clone(),
            })
            .await
        {
            Ok(payment) => payment,
            Err(e) if e.is_unique_violation() => {
                // Lost the race against a concurrent request with the same key.
                let existing = self
                    .store
                    .find_payment_by_idempotency_key(request.merchant_id, &idempotency_key)
                    .await?
                    .ok_or_else(|| DatabaseError::not_found("payment", &idempotency_key))?;
                info!(payment_id = %existing.id, "concurrent duplicate resolved to existing payment");
                return self.outcome(existing, true).await;
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            payment_id = %payment.id,
            merchant_id = %payment.merchant_id,
            amount = payment.amount,
            currency = %payment.currency,
            email = %mask_email(&payment.email),
            route_len = route.providers.len(),
            "payment created"
        );

        let metadata = Self::attempt_metadata(&payment, request.metadata);
        let mut errors = Vec::new();

        for provider in route.providers {
            let attempt = self.store.create_attempt(payment.id, provider).await?;
            let response = match self
                .initialize_attempt(&payment, &attempt, metadata.clone())
                .await
            {
                Ok(response) => response,
                Err(message) => InitializeResponse::failed(message),
            };

            let recorded = self
                .store
                .record_attempt_result(
                    attempt.id,
                    AttemptResult {
                        status: response.status,
                        provider_reference: response.provider_reference.clone(),
                        redirect_url: response.redirect_url.clone(),
                        error_message: response.failure_reason.clone(),
                    },
                )
                .await;
            if let Err(e) = &recorded {
                // The attempt stays non-terminal; the sweeper settles it later.
                error!(
                    payment_id = %payment.id,
                    attempt_id = %attempt.id,
                    provider = %provider,
                    error = %e,
                    "failed to record attempt result"
                );
            }

            if response.stops_cascade() {
                self.store
                    .transition_payment(payment.id, response.status, Some(provider))
                    .await?;
                info!(
                    payment_id = %payment.id,
                    attempt_id = %attempt.id,
                    provider = %provider,
                    status = %response.status,
                    "cascade stopped"
                );
                return self.reload(payment.id).await;
            }

            let mut reason = response
                .failure_reason
                .unwrap_or_else(|| "no redirect or success returned".to_string());
            if recorded.is_err() {
                reason.push_str(" (attempt result could not be recorded)");
            }
            warn!(
                payment_id = %payment.id,
                attempt_id = %attempt.id,
                provider = %provider,
                status = %response.status,
                reason = %reason,
                "attempt did not complete, cascading"
            );
            errors.push(format!("{}: {}", provider, reason));

            // A webhook may have settled an earlier attempt while this one ran.
            let current = self
                .store
                .get_payment(payment.id)
                .await?
                .ok_or_else(|| DatabaseError::not_found("payment", payment.id))?;
            if current.status.is_terminal() || current.provider.is_some() {
                info!(
                    payment_id = %payment.id,
                    status = %current.status,
                    provider = ?current.provider,
                    "payment resolved outside the cascade, stopping"
                );
                if current.status == PaymentStatus::Failed {
                    return Err(OrchestratorError::AllProvidersExhausted {
                        payment_id: payment.id,
                        errors,
                    });
                }
                return self.outcome(current, false).await;
            }
        }

        let transition = self
            .store
            .transition_payment(payment.id, PaymentStatus::Failed, None)
            .await?;

        if !transition.applied() {
            // A webhook resolved the payment while the cascade was running.
            let outcome = self.reload(payment.id).await?;
            if outcome.payment.status != PaymentStatus::Failed {
                return Ok(outcome);
            }
        }

        warn!(
            payment_id = %payment.id,
            attempts = errors.len(),
            "all providers exhausted"
        );
        Err(OrchestratorError::AllProvidersExhausted {
            payment_id: payment.id,
            errors,
        })
    }

    /// Payment plus its attempts, for the status query.
    pub async fn get_payment(&self, payment_id: Uuid) -> OrchestratorResult<Option<PaymentOutcome>> {
        match self.store.get_payment(payment_id).await? {
            Some(payment) => Ok(Some(self.outcome(payment, false).await?)),
            None => Ok(None),
        }
    }

    /// Runs one provider call for an attempt. Every failure becomes an attempt-level
    /// message; nothing here aborts the cascade.
    async fn initialize_attempt(
        &self,
        payment: &Payment,
        attempt: &PaymentAttempt,
        metadata: JsonValue,
    ) -> Result<InitializeResponse, String> {
        let provider = attempt.provider;
        let config = match self.store.find_config(payment.merchant_id, provider).await {
            Ok(Some(config)) => config,
            Ok(None) => return Err("provider configuration missing".to_string()),
            Err(e) => {
                error!(attempt_id = %attempt.id, provider = %provider, error = %e, "config lookup failed");
                return Err("provider configuration unavailable".to_string());
            }
        };

        let adapter = decrypt_credentials(&self.cipher, &config)
            .map_err(Into::into)
            .and_then(|credentials| self.resolver.resolve(provider, credentials))
            .map_err(|e| {
                error!(
                    attempt_id = %attempt.id,
                    provider = %provider,
                    error = %e,
                    "provider could not be resolved"
                );
                e.to_string()
            })?;

        let request = InitializeRequest {
            amount: payment.amount,
            currency: payment.currency.clone(),
            email: payment.email.clone(),
            reference: attempt.id.to_string(),
            metadata: Some(metadata),
        };

        match tokio::time::timeout(self.config.provider_timeout, adapter.initialize(request)).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "provider call timed out after {}s",
                self.config.provider_timeout.as_secs()
            )),
        }
    }

    fn attempt_metadata(payment: &Payment, supplied: Option<JsonValue>) -> JsonValue {
        let mut metadata = match supplied {
            Some(JsonValue::Object(map)) => JsonValue::Object(map),
            _ => json!({}),
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("payment_id".to_string(), json!(payment.id.to_string()));
        }
        metadata
    }

    async fn reload(&self, payment_id: Uuid) -> OrchestratorResult<PaymentOutcome> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("payment", payment_id))?;
        self.outcome(payment, false).await
    }

    async fn outcome(&self, payment: Payment, replayed: bool) -> OrchestratorResult<PaymentOutcome> {
        let attempts = self.store.list_attempts(payment.id).await?;
        let redirect_url = attempts
            .iter()
            .rev()
            .filter(|a| Some(a.provider) == payment.provider)
            .find_map(|a| a.redirect_url.clone());
        Ok(PaymentOutcome {
            payment,
            attempts,
            redirect_url,
            replayed,
        })
    }
}
