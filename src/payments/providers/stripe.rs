use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    InitializeRequest, InitializeResponse, PaymentStatus, ProviderName, VerifyResponse,
    WebhookOutcome,
};
use crate::payments::utils::{
    build_http_client, hmac_sha256_hex, secure_eq, PaymentHttpClient, RequestBody,
};
use crate::payments::webhook::WebhookPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            max_retries: 1,
            webhook_tolerance_secs: 300,
        }
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        Self::with_client(config, client)
    }

    /// Binds credentials to a connection pool owned by the caller.
    pub fn with_client(config: StripeConfig, client: Client) -> PaymentResult<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::ConfigMissing {
                message: "stripe secret key is empty".to_string(),
            });
        }
        let http = PaymentHttpClient::with_client(
            client,
            "STRIPE",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        );
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn form_fields(request: &InitializeRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("payment_method_types[]".to_string(), "card".to_string()),
            ("receipt_email".to_string(), request.email.clone()),
        ];
        if let Some(JsonValue::Object(metadata)) = &request.metadata {
            for (key, value) in metadata {
                if key == "internal_reference" {
                    continue;
                }
                let value = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                fields.push((format!("metadata[{}]", key), value));
            }
        }
        fields.push((
            "metadata[internal_reference]".to_string(),
            request.reference.clone(),
        ));
        fields
    }

    /// Checks a `t=<unix>,v1=<hex>` header against HMAC-SHA256 of `"{t}.{body}"`.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &str,
        secret: &str,
        now: i64,
    ) -> PaymentResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse().ok(),
                Some(("v1", v)) => candidates.push(v.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature {
            reason: "missing timestamp".to_string(),
        })?;
        if candidates.is_empty() {
            return Err(PaymentError::InvalidSignature {
                reason: "missing v1 signature".to_string(),
            });
        }
        if (now - timestamp).abs() > self.config.webhook_tolerance_secs {
            return Err(PaymentError::InvalidSignature {
                reason: "timestamp outside tolerance".to_string(),
            });
        }

        let mut signed = Vec::with_capacity(payload.len() + 16);
        signed.extend_from_slice(timestamp.to_string().as_bytes());
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let expected =
            hmac_sha256_hex(&signed, secret).ok_or_else(|| PaymentError::InvalidSignature {
                reason: "unusable secret".to_string(),
            })?;

        if candidates
            .iter()
            .any(|c| secure_eq(expected.as_bytes(), c.as_bytes()))
        {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature {
                reason: "signature mismatch".to_string(),
            })
        }
    }
}

pub fn map_intent_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Succeeded,
        "processing" => PaymentStatus::Processing,
        "requires_payment_method" | "canceled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

pub fn map_event_status(event_type: &str, intent_status: Option<&str>) -> PaymentStatus {
    match event_type {
        "payment_intent.succeeded" => PaymentStatus::Succeeded,
        "payment_intent.payment_failed" | "payment_intent.canceled" => PaymentStatus::Failed,
        "payment_intent.processing" => PaymentStatus::Processing,
        _ => intent_status
            .map(map_intent_status)
            .unwrap_or(PaymentStatus::Pending),
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        let fields = Self::form_fields(&request);
        let result: PaymentResult<StripePaymentIntent> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/payment_intents"),
                Some(&self.config.secret_key),
                Some(RequestBody::Form(&fields)),
                &[("Idempotency-Key", request.reference.as_str())],
            )
            .await;

        let intent = match result {
            Ok(intent) => intent,
            Err(e) => {
                warn!(reference = %request.reference, error = %e, "stripe initialization failed");
                return Ok(InitializeResponse::failed(e.to_string()));
            }
        };

        let status = map_intent_status(&intent.status);
        info!(
            reference = %request.reference,
            provider_reference = %intent.id,
            status = %status,
            "stripe payment intent created"
        );
        Ok(InitializeResponse {
            provider_reference: Some(intent.id),
            status,
            redirect_url: intent
                .next_action
                .and_then(|a| a.redirect_to_url)
                .and_then(|r| r.url),
            failure_reason: intent.last_payment_error.and_then(|e| e.message),
        })
    }

    async fn verify(&self, provider_reference: &str) -> PaymentResult<VerifyResponse> {
        let intent: StripePaymentIntent = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/payment_intents/{}", provider_reference)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;

        Ok(VerifyResponse {
            status: map_intent_status(&intent.status),
            provider_reference: intent.id,
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        shared_secret: &str,
    ) -> PaymentResult<WebhookOutcome> {
        self.verify_signature(
            payload,
            signature,
            shared_secret,
            chrono::Utc::now().timestamp(),
        )?;
        WebhookPayload::parse(ProviderName::Stripe, payload)?.into_outcome()
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    next_action: Option<StripeNextAction>,
    last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Deserialize)]
struct StripeNextAction {
    redirect_to_url: Option<StripeRedirect>,
}

#[derive(Debug, Deserialize)]
struct StripeRedirect {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentError {
    message: Option<String>,
}
