//! Merchant provider-config management.
//!
//! Secrets enter here in plaintext, leave encrypted, and are only ever
//! decrypted again by [`decrypt_credentials`] for the span of one call.

use crate::crypto::{CredentialCipher, CryptoError};
use crate::database::error::DatabaseError;
use crate::database::models::{FeeStructure, MerchantProviderConfig, NewProviderConfig};
use crate::database::store::PaymentStore;
use crate::payments::factory::ProviderCredentials;
use crate::payments::types::ProviderName;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProviderConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Merchant not found: {0}")]
    MerchantNotFound(Uuid),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpsertProviderConfig {
    pub secret_key: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub fees: FeeStructure,
}

impl std::fmt::Debug for UpsertProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertProviderConfig")
            .field("secret_key", &"[REDACTED]")
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("fees", &self.fees)
            .finish()
    }
}

impl UpsertProviderConfig {
    fn validate(&self) -> Result<(), ProviderConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ProviderConfigError::Validation(
                "secret_key is required".to_string(),
            ));
        }
        let negative = self.fees.percent < Decimal::ZERO
            || self.fees.flat < Decimal::ZERO
            || self.fees.cap.map_or(false, |c| c < Decimal::ZERO);
        if negative {
            return Err(ProviderConfigError::Validation(
                "fees must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decrypts a stored config into call-scoped credentials.
pub fn decrypt_credentials(
    cipher: &CredentialCipher,
    config: &MerchantProviderConfig,
) -> Result<ProviderCredentials, CryptoError> {
    let decrypt_opt = |value: &Option<String>| -> Result<Option<String>, CryptoError> {
        value.as_deref().map(|v| cipher.decrypt(v)).transpose()
    };

    Ok(ProviderCredentials {
        secret_key: cipher.decrypt(&config.encrypted_secret_key)?,
        public_key: decrypt_opt(&config.encrypted_public_key)?,
        webhook_secret: decrypt_opt(&config.encrypted_webhook_secret)?,
    })
}

pub struct ProviderConfigService {
    store: Arc<dyn PaymentStore>,
    cipher: Arc<CredentialCipher>,
}

impl ProviderConfigService {
    pub fn new(store: Arc<dyn PaymentStore>, cipher: Arc<CredentialCipher>) -> Self {
        Self { store, cipher }
    }

    pub async fn upsert(
        &self,
        merchant_id: Uuid,
        provider: ProviderName,
        request: UpsertProviderConfig,
    ) -> Result<MerchantProviderConfig, ProviderConfigError> {
        request.validate()?;

        if self.store.find_merchant(merchant_id).await?.is_none() {
            return Err(ProviderConfigError::MerchantNotFound(merchant_id));
        }

        let encrypt_opt = |value: Option<String>| -> Result<Option<String>, CryptoError> {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| self.cipher.encrypt(v.trim()))
                .transpose()
        };

        let config = self
            .store
            .upsert_config(NewProviderConfig {
                merchant_id,
                provider,
                encrypted_secret_key: self.cipher.encrypt(request.secret_key.trim())?,
                encrypted_public_key: encrypt_opt(request.public_key)?,
                encrypted_webhook_secret: encrypt_opt(request.webhook_secret)?,
                enabled: request.enabled,
                priority: request.priority,
                fees: request.fees,
            })
            .await?;

        info!(
            merchant_id = %merchant_id,
            provider = %provider,
            enabled = config.enabled,
            priority = config.priority,
            "provider config saved"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryPaymentStore;
    use std::str::FromStr;

    fn cipher() -> Arc<CredentialCipher> {
        Arc::new(CredentialCipher::from_hex_key(&"11".repeat(32)).unwrap())
    }

    fn request(secret: &str) -> UpsertProviderConfig {
        UpsertProviderConfig {
            secret_key: secret.to_string(),
            public_key: None,
            webhook_secret: Some("whsec_abc".to_string()),
            enabled: true,
            priority: 5,
            fees: FeeStructure {
                percent: Decimal::from_str("1.5").unwrap(),
                flat: Decimal::ZERO,
                cap: None,
            },
        }
    }

    #[tokio::test]
    async fn stores_only_encrypted_secrets() {
        let store = InMemoryPaymentStore::new();
        let merchant = store.insert_merchant("shop@example.com").await;
        let cipher = cipher();
        let service = ProviderConfigService::new(Arc::new(store.clone()), cipher.clone());

        let saved = service
            .upsert(merchant.id, ProviderName::Stripe, request("sk_test_123"))
            .await
            .unwrap();

        assert_ne!(saved.encrypted_secret_key, "sk_test_123");
        assert!(saved.encrypted_public_key.is_none());
        let creds = decrypt_credentials(&cipher, &saved).unwrap();
        assert_eq!(creds.secret_key, "sk_test_123");
        assert_eq!(creds.webhook_signing_secret(), "whsec_abc");
    }

    #[tokio::test]
    async fn second_upsert_replaces_the_config() {
        let store = InMemoryPaymentStore::new();
        let merchant = store.insert_merchant("shop@example.com").await;
        let service = ProviderConfigService::new(Arc::new(store.clone()), cipher());

        service
            .upsert(merchant.id, ProviderName::Paystack, request("sk_one"))
            .await
            .unwrap();
        let mut second = request("sk_two");
        second.enabled = false;
        service
            .upsert(merchant.id, ProviderName::Paystack, second)
            .await
            .unwrap();

        assert!(store.list_enabled_configs(merchant.id).await.unwrap().is_empty());
        let stored = store
            .find_config(merchant.id, ProviderName::Paystack)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.enabled);
    }

    #[tokio::test]
    async fn unknown_merchant_is_rejected() {
        let store = InMemoryPaymentStore::new();
        let service = ProviderConfigService::new(Arc::new(store), cipher());
        let err = service
            .upsert(Uuid::new_v4(), ProviderName::Stripe, request("sk"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderConfigError::MerchantNotFound(_)));
    }

    #[tokio::test]
    async fn blank_secret_and_negative_fees_are_invalid() {
        let store = InMemoryPaymentStore::new();
        let merchant = store.insert_merchant("shop@example.com").await;
        let service = ProviderConfigService::new(Arc::new(store), cipher());

        let err = service
            .upsert(merchant.id, ProviderName::Stripe, request("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderConfigError::Validation(_)));

        let mut negative = request("sk");
        negative.fees.flat = Decimal::from(-1);
        let err = service
            .upsert(merchant.id, ProviderName::Stripe, negative)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderConfigError::Validation(_)));
    }

    #[test]
    fn tampered_envelope_fails_to_decrypt() {
        let cipher = cipher();
        let config = MerchantProviderConfig {
            id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            provider: ProviderName::Paystack,
            encrypted_secret_key: "00:11:22".to_string(),
            encrypted_public_key: None,
            encrypted_webhook_secret: None,
            enabled: true,
            priority: 0,
            fees: FeeStructure::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(decrypt_credentials(&cipher, &config).is_err());
    }
}
