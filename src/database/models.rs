use crate::payments::types::{PaymentStatus, ProviderName};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-provider fee model: `flat + amount * percent / 100`, capped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeStructure {
    #[serde(default)]
    pub percent: Decimal,
    #[serde(default)]
    pub flat: Decimal,
    #[serde(default)]
    pub cap: Option<Decimal>,
}

impl FeeStructure {
    pub fn cost_for(&self, amount: i64) -> Decimal {
        let cost = self.flat + Decimal::from(amount) * self.percent / Decimal::from(100);
        match self.cap {
            Some(cap) if cost > cap => cap,
            _ => cost,
        }
    }
}

/// Credentials are stored as cipher envelopes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantProviderConfig {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub provider: ProviderName,
    #[serde(skip_serializing)]
    pub encrypted_secret_key: String,
    #[serde(skip_serializing)]
    pub encrypted_public_key: Option<String>,
    #[serde(skip_serializing)]
    pub encrypted_webhook_secret: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub fees: FeeStructure,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProviderConfig {
    pub merchant_id: Uuid,
    pub provider: ProviderName,
    pub encrypted_secret_key: String,
    pub encrypted_public_key: Option<String>,
    pub encrypted_webhook_secret: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub fees: FeeStructure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing)]
    pub email: String,
    pub idempotency_key: String,
    pub status: PaymentStatus,
    pub provider: Option<ProviderName>,
    pub card_bin: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub merchant_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub idempotency_key: String,
    pub card_bin: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Also the reference handed to the provider.
    pub id: Uuid,
    pub payment_id: Uuid,
    pub provider: ProviderName,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttemptWithPayment {
    pub attempt: PaymentAttempt,
    pub payment: Payment,
}

#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub error_message: Option<String>,
}

impl AttemptResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Failed,
            provider_reference: None,
            redirect_url: None,
            error_message: Some(message.into()),
        }
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Zero rows matched: the record had already moved past the allowed
    /// predecessors.
    NoOp,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub attempt: Transition,
    pub payment: Transition,
}
