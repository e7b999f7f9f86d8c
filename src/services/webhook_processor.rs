use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crypto::CredentialCipher;
use crate::database::error::DatabaseError;
use crate::database::store::PaymentStore;
use crate::payments::error::PaymentError;
use crate::payments::factory::ProviderResolver;
use crate::payments::types::{PaymentStatus, ProviderName};
use crate::payments::webhook::WebhookPayload;
use crate::services::provider_config::decrypt_credentials;

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Attempt not found: {0}")]
    AttemptNotFound(String),
    #[error("Provider configuration missing")]
    ConfigMissing,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub attempt_id: Uuid,
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    /// False for replays and for deliveries that lost to an earlier writer.
    pub applied: bool,
}

pub struct WebhookProcessor {
    store: Arc<dyn PaymentStore>,
    resolver: Arc<dyn ProviderResolver>,
    cipher: Arc<CredentialCipher>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        resolver: Arc<dyn ProviderResolver>,
        cipher: Arc<CredentialCipher>,
    ) -> Self {
        Self {
            store,
            resolver,
            cipher,
        }
    }

    pub async fn process_webhook(
        &self,
        provider_name: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, WebhookProcessorError> {
        let provider = ProviderName::from_str(provider_name)
            .map_err(|_| WebhookProcessorError::UnknownProvider(provider_name.to_string()))?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookProcessorError::InvalidSignature)?;

        // Correlate before authenticating: the secret to verify with belongs
        // to the merchant that owns the attempt.
        let payload = WebhookPayload::parse(provider, body).map_err(classify)?;
        let reference = payload
            .attempt_reference()
            .ok_or_else(|| {
                WebhookProcessorError::MalformedPayload("missing attempt reference".to_string())
            })?
            .to_string();
        let attempt_id = Uuid::parse_str(&reference)
            .map_err(|_| WebhookProcessorError::AttemptNotFound(reference.clone()))?;

        let found = self
            .store
            .find_attempt(attempt_id)
            .await?
            .filter(|found| found.attempt.provider == provider)
            .ok_or_else(|| WebhookProcessorError::AttemptNotFound(reference.clone()))?;

        let config = self
            .store
            .find_config(found.payment.merchant_id, provider)
            .await?
            .ok_or(WebhookProcessorError::ConfigMissing)?;

        let credentials = decrypt_credentials(&self.cipher, &config).map_err(|e| {
            error!(provider = %provider, error = %e, "webhook secret could not be decrypted");
            WebhookProcessorError::ConfigMissing
        })?;
        let secret = credentials.webhook_signing_secret().to_string();
        let adapter = self.resolver.resolve(provider, credentials).map_err(classify)?;

        let outcome = adapter
            .handle_webhook(body, signature, &secret)
            .map_err(|e| {
                warn!(provider = %provider, attempt_id = %attempt_id, "webhook verification failed");
                classify(e)
            })?;

        if outcome.status == PaymentStatus::Pending {
            info!(
                provider = %provider,
                attempt_id = %attempt_id,
                "webhook carries no status change"
            );
            return Ok(WebhookAck {
                attempt_id,
                payment_id: found.payment.id,
                status: found.attempt.status,
                applied: false,
            });
        }

        let update = self
            .store
            .apply_status(attempt_id, found.payment.id, outcome.status, Some(provider))
            .await
            .map_err(|e| {
                error!(attempt_id = %attempt_id, error = %e, "webhook status update failed");
                e
            })?;

        if update.attempt.applied()
            && !update.payment.applied()
            && outcome.status == PaymentStatus::Succeeded
        {
            warn!(
                payment_id = %found.payment.id,
                attempt_id = %attempt_id,
                provider = %provider,
                "success reported for a payment that was already resolved"
            );
        }

        info!(
            provider = %provider,
            payment_id = %found.payment.id,
            attempt_id = %attempt_id,
            status = %outcome.status,
            applied = update.attempt.applied(),
            "webhook processed"
        );

        Ok(WebhookAck {
            attempt_id,
            payment_id: found.payment.id,
            status: outcome.status,
            applied: update.attempt.applied(),
        })
    }
}

fn classify(err: PaymentError) -> WebhookProcessorError {
    match err {
        PaymentError::InvalidSignature { .. } => WebhookProcessorError::InvalidSignature,
        PaymentError::MalformedPayload { message } => {
            WebhookProcessorError::MalformedPayload(message)
        }
        PaymentError::UnsupportedProvider { provider } => {
            WebhookProcessorError::UnknownProvider(provider)
        }
        _ => WebhookProcessorError::ConfigMissing,
    }
}
