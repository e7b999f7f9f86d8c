use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    InitializeRequest, InitializeResponse, PaymentStatus, ProviderName, VerifyResponse,
    WebhookOutcome,
};
use crate::payments::utils::{
    build_http_client, verify_hmac_sha512_hex, PaymentHttpClient, RequestBody,
};
use crate::payments::webhook::WebhookPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

pub struct PaystackProvider {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        Self::with_client(config, client)
    }

    /// Binds credentials to a connection pool owned by the caller.
    pub fn with_client(config: PaystackConfig, client: Client) -> PaymentResult<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::ConfigMissing {
                message: "paystack secret key is empty".to_string(),
            });
        }
        let http = PaymentHttpClient::with_client(
            client,
            "PAYSTACK",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        );
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "success" => PaymentStatus::Succeeded,
        "failed" | "reversed" | "abandoned" => PaymentStatus::Failed,
        "processing" | "ongoing" | "queued" => PaymentStatus::Processing,
        _ => PaymentStatus::Pending,
    }
}

/// Charge events decide outright; anything else falls back to `data.status`.
pub fn map_event_status(event: &str, data_status: Option<&str>) -> PaymentStatus {
    match event {
        "charge.success" => PaymentStatus::Succeeded,
        "charge.failed" => PaymentStatus::Failed,
        _ => data_status.map(map_status).unwrap_or(PaymentStatus::Pending),
    }
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Paystack
    }

    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        let payload = serde_json::json!({
            "email": request.email,
            "amount": request.amount,
            "currency": request.currency,
            "reference": request.reference,
            "metadata": request.metadata,
        });

        let result: PaymentResult<PaystackEnvelope<PaystackInitializeData>> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(RequestBody::Json(&payload)),
                &[],
            )
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(reference = %request.reference, error = %e, "paystack initialization failed");
                return Ok(InitializeResponse::failed(e.to_string()));
            }
        };
        let data = match raw.data {
            Some(data) if raw.status => data,
            _ => {
                warn!(reference = %request.reference, message = %raw.message, "paystack rejected initialization");
                return Ok(InitializeResponse::failed(raw.message));
            }
        };

        info!(reference = %data.reference, "paystack transaction initialized");
        Ok(InitializeResponse {
            provider_reference: Some(data.reference),
            status: PaymentStatus::Pending,
            redirect_url: Some(data.authorization_url),
            failure_reason: None,
        })
    }

    async fn verify(&self, provider_reference: &str) -> PaymentResult<VerifyResponse> {
        let raw: PaystackEnvelope<PaystackVerifyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", provider_reference)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;

        let data = match raw.data {
            Some(data) if raw.status => data,
            _ => {
                return Err(PaymentError::ProviderRejected {
                    provider: ProviderName::Paystack.to_string(),
                    message: raw.message,
                    provider_code: None,
                    retryable: false,
                })
            }
        };

        Ok(VerifyResponse {
            status: map_status(&data.status),
            provider_reference: data
                .reference
                .unwrap_or_else(|| provider_reference.to_string()),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        shared_secret: &str,
    ) -> PaymentResult<WebhookOutcome> {
        if !verify_hmac_sha512_hex(payload, shared_secret, signature) {
            return Err(PaymentError::InvalidSignature {
                reason: "paystack hmac mismatch".to_string(),
            });
        }
        WebhookPayload::parse(ProviderName::Paystack, payload)?.into_outcome()
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    status: String,
    #[serde(default)]
    reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::hmac_sha512_hex;

    fn provider() -> PaystackProvider {
        PaystackProvider::new(PaystackConfig {
            secret_key: "sk_test".to_string(),
            timeout_secs: 5,
            ..PaystackConfig::default()
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn status_map_covers_paystack_vocabulary() {
        assert_eq!(map_status("success"), PaymentStatus::Succeeded);
        assert_eq!(map_status("failed"), PaymentStatus::Failed);
        assert_eq!(map_status("reversed"), PaymentStatus::Failed);
        assert_eq!(map_status("abandoned"), PaymentStatus::Failed);
        assert_eq!(map_status("ongoing"), PaymentStatus::Processing);
        assert_eq!(map_status("queued"), PaymentStatus::Processing);
        assert_eq!(map_status("pending"), PaymentStatus::Pending);
        assert_eq!(map_status("brand_new"), PaymentStatus::Pending);
    }

    #[test]
    fn charge_events_are_not_overwritten() {
        assert_eq!(
            map_event_status("charge.success", Some("ongoing")),
            PaymentStatus::Succeeded
        );
        assert_eq!(map_event_status("charge.failed", None), PaymentStatus::Failed);
        assert_eq!(
            map_event_status("transfer.success", Some("reversed")),
            PaymentStatus::Failed
        );
        assert_eq!(map_event_status("subscription.create", None), PaymentStatus::Pending);
    }

    #[test]
    fn webhook_signature_validation_invalid() {
        let payload = br#"{"event":"charge.success","data":{"reference":"att-1"}}"#;
        let err = provider()
            .handle_webhook(payload, "invalid_signature", "sk_test")
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature { .. }));
    }

    #[test]
    fn webhook_signed_with_secret_key_is_accepted() {
        let payload = br#"{"event":"charge.success","data":{"reference":"att-1","status":"success"}}"#;
        let signature = hmac_sha512_hex(payload, "sk_test").unwrap();
        let outcome = provider()
            .handle_webhook(payload, &signature, "sk_test")
            .expect("signature should verify");
        assert_eq!(outcome.attempt_reference, "att-1");
        assert_eq!(outcome.status, PaymentStatus::Succeeded);
    }
}
