use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{
    FlutterwaveConfig, FlutterwaveProvider, PaystackConfig, PaystackProvider, StripeConfig,
    StripeProvider,
};
use crate::payments::types::ProviderName;
use crate::payments::utils::build_http_client;
use reqwest::Client;
use std::time::Duration;

/// Decrypted credentials for one merchant and one provider.
///
/// Lives only for the duration of a single provider call.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub secret_key: String,
    pub public_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl ProviderCredentials {
    /// Secret the gateway signs webhooks with.
    pub fn webhook_signing_secret(&self) -> &str {
        self.webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.secret_key)
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("secret_key", &"[REDACTED]")
            .field("public_key", &self.public_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Turns a provider tag plus credentials into a live adapter.
pub trait ProviderResolver: Send + Sync {
    fn resolve(
        &self,
        provider: ProviderName,
        credentials: ProviderCredentials,
    ) -> PaymentResult<Box<dyn PaymentProvider>>;
}

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub stripe_base_url: String,
    pub paystack_base_url: String,
    pub flutterwave_base_url: String,
    pub flutterwave_redirect_url: String,
    pub stripe_webhook_tolerance_secs: i64,
}

impl Default for PaymentFactoryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 1,
            stripe_base_url: StripeConfig::default().base_url,
            paystack_base_url: PaystackConfig::default().base_url,
            flutterwave_base_url: FlutterwaveConfig::default().base_url,
            flutterwave_redirect_url: FlutterwaveConfig::default().redirect_url,
            stripe_webhook_tolerance_secs: 300,
        }
    }
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let defaults = Self::default();
        let parse_u64 = |key: &str, default: u64| -> PaymentResult<u64> {
            match std::env::var(key) {
                Ok(v) => v.parse::<u64>().map_err(|_| PaymentError::ValidationError {
                    message: format!("{} must be a non-negative integer", key),
                    field: Some(key.to_string()),
                }),
                Err(_) => Ok(default),
            }
        };

        Ok(Self {
            timeout_secs: parse_u64("PROVIDER_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_retries: parse_u64("PROVIDER_MAX_RETRIES", defaults.max_retries as u64)? as u32,
            stripe_base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or(defaults.stripe_base_url),
            paystack_base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or(defaults.paystack_base_url),
            flutterwave_base_url: std::env::var("FLUTTERWAVE_BASE_URL")
                .unwrap_or(defaults.flutterwave_base_url),
            flutterwave_redirect_url: std::env::var("FLUTTERWAVE_REDIRECT_URL")
                .unwrap_or(defaults.flutterwave_redirect_url),
            stripe_webhook_tolerance_secs: parse_u64(
                "STRIPE_WEBHOOK_TOLERANCE_SECS",
                defaults.stripe_webhook_tolerance_secs as u64,
            )? as i64,
        })
    }
}

/// Registry that builds a fresh adapter per call, bound to the credentials
/// it was given. Every adapter shares the factory's connection pool.
#[derive(Debug, Clone)]
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
    client: Client,
}

impl Default for PaymentProviderFactory {
    fn default() -> Self {
        Self {
            config: PaymentFactoryConfig::default(),
            client: Client::new(),
        }
    }
}

impl PaymentProviderFactory {
    pub fn with_config(config: PaymentFactoryConfig) -> PaymentResult<Self> {
        let client = build_http_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PaymentFactoryConfig {
        &self.config
    }
}

impl ProviderResolver for PaymentProviderFactory {
    fn resolve(
        &self,
        provider: ProviderName,
        credentials: ProviderCredentials,
    ) -> PaymentResult<Box<dyn PaymentProvider>> {
        if credentials.secret_key.trim().is_empty() {
            return Err(PaymentError::ConfigMissing {
                message: format!("{} secret key is not configured", provider),
            });
        }

        match provider {
            ProviderName::Stripe => Ok(Box::new(StripeProvider::with_client(
                StripeConfig {
                    secret_key: credentials.secret_key,
                    base_url: self.config.stripe_base_url.clone(),
                    timeout_secs: self.config.timeout_secs,
                    max_retries: self.config.max_retries,
                    webhook_tolerance_secs: self.config.stripe_webhook_tolerance_secs,
                },
                self.client.clone(),
            )?)),
            ProviderName::Paystack => Ok(Box::new(PaystackProvider::with_client(
                PaystackConfig {
                    secret_key: credentials.secret_key,
                    base_url: self.config.paystack_base_url.clone(),
                    timeout_secs: self.config.timeout_secs,
                    max_retries: self.config.max_retries,
                },
                self.client.clone(),
            )?)),
            ProviderName::Flutterwave => Ok(Box::new(FlutterwaveProvider::with_client(
                FlutterwaveConfig {
                    secret_key: credentials.secret_key,
                    public_key: credentials.public_key,
                    base_url: self.config.flutterwave_base_url.clone(),
                    redirect_url: self.config.flutterwave_redirect_url.clone(),
                    timeout_secs: self.config.timeout_secs,
                    max_retries: self.config.max_retries,
                },
                self.client.clone(),
            )?)),
        }
    }
}
