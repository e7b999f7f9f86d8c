use crate::payments::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderName {
    Stripe,
    Paystack,
    Flutterwave,
}

impl ProviderName {
    pub const ALL: [ProviderName; 3] = [
        ProviderName::Stripe,
        ProviderName::Paystack,
        ProviderName::Flutterwave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Stripe => "STRIPE",
            ProviderName::Paystack => "PAYSTACK",
            ProviderName::Flutterwave => "FLUTTERWAVE",
        }
    }

    /// Header carrying the gateway's webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            ProviderName::Stripe => "stripe-signature",
            ProviderName::Paystack => "x-paystack-signature",
            ProviderName::Flutterwave => "verif-hash",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stripe" => Ok(ProviderName::Stripe),
            "paystack" => Ok(ProviderName::Paystack),
            "flutterwave" | "flw" => Ok(ProviderName::Flutterwave),
            _ => Err(PaymentError::UnsupportedProvider {
                provider: value.to_string(),
            }),
        }
    }
}

/// Shared payment state machine. `Succeeded` and `Failed` are sinks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }

    /// Statuses a record may currently hold for a write of `self` to apply.
    ///
    /// `Pending -> Pending` is admitted so a redirect can record its provider
    /// without changing status; every other self-loop on a terminal state is
    /// excluded, which is what makes replays no-ops.
    pub fn allowed_predecessors(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[PaymentStatus::Pending],
            PaymentStatus::Processing => &[PaymentStatus::Pending, PaymentStatus::Processing],
            PaymentStatus::Succeeded | PaymentStatus::Failed => {
                &[PaymentStatus::Pending, PaymentStatus::Processing]
            }
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        target.allowed_predecessors().contains(self)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PROCESSING" => Ok(PaymentStatus::Processing),
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(PaymentError::ValidationError {
                message: format!("unknown payment status: {}", other),
                field: Some("status".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Smallest currency unit (kobo, cents).
    pub amount: i64,
    pub currency: String,
    pub email: String,
    /// Internal attempt id; never the payment id.
    pub reference: String,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub provider_reference: Option<String>,
    pub status: PaymentStatus,
    pub redirect_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl InitializeResponse {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            provider_reference: None,
            status: PaymentStatus::Failed,
            redirect_url: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// A redirect means the flow continues client-side and the cascade stops.
    pub fn stops_cascade(&self) -> bool {
        match self.status {
            PaymentStatus::Succeeded => true,
            PaymentStatus::Failed => false,
            PaymentStatus::Pending | PaymentStatus::Processing => self.redirect_url.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub provider_reference: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub attempt_reference: String,
    pub status: PaymentStatus,
}

/// Converts an amount in minor units into the decimal major-unit value some
/// gateways expect.
pub fn minor_to_major(amount: i64, currency: &str) -> Decimal {
    const ZERO_DECIMAL: &[&str] = &["JPY", "KRW", "UGX", "RWF", "XAF", "XOF", "VND"];
    let scale = if ZERO_DECIMAL.contains(&currency.to_uppercase().as_str()) {
        0
    } else {
        2
    };
    Decimal::new(amount, scale)
}
