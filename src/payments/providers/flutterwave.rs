use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    minor_to_major, InitializeRequest, InitializeResponse, PaymentStatus, ProviderName,
    VerifyResponse, WebhookOutcome,
};
use crate::payments::utils::{
    build_http_client, secure_eq, PaymentHttpClient, RequestBody,
};
use crate::payments::webhook::WebhookPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    pub public_key: Option<String>,
    pub base_url: String,
    pub redirect_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for FlutterwaveConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            public_key: None,
            base_url: "https://api.flutterwave.com/v3".to_string(),
            redirect_url: "http://localhost:8000/payments/callback".to_string(),
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

pub struct FlutterwaveProvider {
    config: FlutterwaveConfig,
    http: PaymentHttpClient,
}

impl FlutterwaveProvider {
    pub fn new(config: FlutterwaveConfig) -> PaymentResult<Self> {
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        Self::with_client(config, client)
    }

    /// Binds credentials to a connection pool owned by the caller.
    pub fn with_client(config: FlutterwaveConfig, client: Client) -> PaymentResult<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::ConfigMissing {
                message: "flutterwave secret key is empty".to_string(),
            });
        }
        let http = PaymentHttpClient::with_client(
            client,
            "FLUTTERWAVE",
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
    match status.to_lowercase().as_str() {
        "successful" | "completed" => PaymentStatus::Succeeded,
        "failed" | "cancelled" => PaymentStatus::Failed,
        "processing" => PaymentStatus::Processing,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Flutterwave
    }

    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        // Flutterwave takes major units.
        let payload = serde_json::json!({
            "tx_ref": request.reference,
            "amount": minor_to_major(request.amount, &request.currency),
            "currency": request.currency,
            "redirect_url": self.config.redirect_url,
            "customer": { "email": request.email },
            "meta": request.metadata,
        });

        let result: PaymentResult<FlutterwaveEnvelope<FlutterwaveLinkData>> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/payments"),
                Some(&self.config.secret_key),
                Some(RequestBody::Json(&payload)),
                &[],
            )
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(reference = %request.reference, error = %e, "flutterwave initialization failed");
                return Ok(InitializeResponse::failed(e.to_string()));
            }
        };
        let link = match raw.data {
            Some(data) if raw.status == "success" => data.link,
            _ => {
                warn!(reference = %request.reference, message = %raw.message, "flutterwave rejected initialization");
                return Ok(InitializeResponse::failed(raw.message));
            }
        };

        info!(reference = %request.reference, "flutterwave payment link created");
        Ok(InitializeResponse {
            provider_reference: Some(request.reference),
            status: PaymentStatus::Pending,
            redirect_url: Some(link),
            failure_reason: None,
        })
    }

    async fn verify(&self, provider_reference: &str) -> PaymentResult<VerifyResponse> {
        let raw: FlutterwaveEnvelope<FlutterwaveTransactionData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!(
                    "/transactions/verify_by_reference?tx_ref={}",
                    provider_reference
                )),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;

        let data = match raw.data {
            Some(data) if raw.status == "success" => data,
            _ => {
                return Err(PaymentError::ProviderRejected {
                    provider: ProviderName::Flutterwave.to_string(),
                    message: raw.message,
                    provider_code: None,
                    retryable: false,
                })
            }
        };

        Ok(VerifyResponse {
            status: map_status(&data.status),
            provider_reference: data
                .tx_ref
                .unwrap_or_else(|| provider_reference.to_string()),
        })
    }

    fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        shared_secret: &str,
    ) -> PaymentResult<WebhookOutcome> {
        if shared_secret.trim().is_empty()
            || !secure_eq(shared_secret.trim().as_bytes(), signature.trim().as_bytes())
        {
            return Err(PaymentError::InvalidSignature {
                reason: "flutterwave verif-hash mismatch".to_string(),
            });
        }
        WebhookPayload::parse(ProviderName::Flutterwave, payload)?.into_outcome()
    }
}

#[derive(Debug, Deserialize)]
struct FlutterwaveEnvelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveLinkData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveTransactionData {
    status: String,
    #[serde(default)]
    tx_ref: Option<String>,
}
