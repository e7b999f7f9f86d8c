//! Per-gateway webhook bodies, decoded at the boundary.
//!
//! Each gateway carries the internal attempt reference at a different path,
//! so extraction lives on the variant rather than behind a generic lookup.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::providers::{flutterwave, paystack, stripe};
use crate::payments::types::{PaymentStatus, ProviderName};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventObject {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeMetadata {
    pub internal_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    pub data: PaystackEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEventData {
    pub reference: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlutterwaveEvent {
    pub event: Option<String>,
    pub data: FlutterwaveEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlutterwaveEventData {
    pub tx_ref: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub enum WebhookPayload {
    Stripe(StripeEvent),
    Paystack(PaystackEvent),
    Flutterwave(FlutterwaveEvent),
}

impl WebhookPayload {
    pub fn parse(provider: ProviderName, body: &[u8]) -> PaymentResult<Self> {
        let malformed = |e: serde_json::Error| PaymentError::MalformedPayload {
            message: format!("{} webhook body: {}", provider, e),
        };
        Ok(match provider {
            ProviderName::Stripe => {
                WebhookPayload::Stripe(serde_json::from_slice(body).map_err(malformed)?)
            }
            ProviderName::Paystack => {
                WebhookPayload::Paystack(serde_json::from_slice(body).map_err(malformed)?)
            }
            ProviderName::Flutterwave => {
                WebhookPayload::Flutterwave(serde_json::from_slice(body).map_err(malformed)?)
            }
        })
    }

    pub fn provider(&self) -> ProviderName {
        match self {
            WebhookPayload::Stripe(_) => ProviderName::Stripe,
            WebhookPayload::Paystack(_) => ProviderName::Paystack,
            WebhookPayload::Flutterwave(_) => ProviderName::Flutterwave,
        }
    }

    /// Internal attempt id the payment was initialized with.
    pub fn attempt_reference(&self) -> Option<&str> {
        let reference = match self {
            WebhookPayload::Stripe(event) => {
                event.data.object.metadata.internal_reference.as_deref()
            }
            WebhookPayload::Paystack(event) => event.data.reference.as_deref(),
            WebhookPayload::Flutterwave(event) => event.data.tx_ref.as_deref(),
        };
        reference.filter(|r| !r.trim().is_empty())
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            WebhookPayload::Stripe(event) => stripe::map_event_status(
                &event.event_type,
                event.data.object.status.as_deref(),
            ),
            WebhookPayload::Paystack(event) => {
                paystack::map_event_status(&event.event, event.data.status.as_deref())
            }
            WebhookPayload::Flutterwave(event) => {
                flutterwave::map_status(event.data.status.as_deref().unwrap_or_default())
            }
        }
    }

    pub fn into_outcome(self) -> PaymentResult<crate::payments::types::WebhookOutcome> {
        let status = self.status();
        let attempt_reference = self
            .attempt_reference()
            .map(str::to_string)
            .ok_or_else(|| PaymentError::MalformedPayload {
                message: format!("{} webhook carries no attempt reference", self.provider()),
            })?;
        Ok(crate::payments::types::WebhookOutcome {
            attempt_reference,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_reference_comes_from_intent_metadata() {
        let body = br#"{
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_123", "status": "succeeded",
                "metadata": {"internal_reference": "att-1"}}}
        }"#;
        let payload = WebhookPayload::parse(ProviderName::Stripe, body).unwrap();
        assert_eq!(payload.attempt_reference(), Some("att-1"));
        assert_eq!(payload.status(), PaymentStatus::Succeeded);
    }

    #[test]
    fn paystack_reference_comes_from_data_reference() {
        let body = br#"{"event": "charge.success", "data": {"reference": "att-2", "status": "success"}}"#;
        let payload = WebhookPayload::parse(ProviderName::Paystack, body).unwrap();
        assert_eq!(payload.attempt_reference(), Some("att-2"));
        assert_eq!(payload.status(), PaymentStatus::Succeeded);
    }

    #[test]
    fn flutterwave_reference_comes_from_tx_ref() {
        let body = br#"{"event": "charge.completed", "data": {"tx_ref": "att-3", "status": "successful", "id": 991}}"#;
        let payload = WebhookPayload::parse(ProviderName::Flutterwave, body).unwrap();
        assert_eq!(payload.attempt_reference(), Some("att-3"));
        assert_eq!(payload.status(), PaymentStatus::Succeeded);
    }

    #[test]
    fn blank_or_missing_reference_is_none() {
        let body = br#"{"event": "charge.success", "data": {"reference": "  "}}"#;
        let payload = WebhookPayload::parse(ProviderName::Paystack, body).unwrap();
        assert_eq!(payload.attempt_reference(), None);
        assert!(matches!(
            payload.into_outcome(),
            Err(PaymentError::MalformedPayload { .. })
        ));

        let body = br#"{"type": "payment_intent.created", "data": {"object": {"id": "pi_1"}}}"#;
        let payload = WebhookPayload::parse(ProviderName::Stripe, body).unwrap();
        assert_eq!(payload.attempt_reference(), None);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = WebhookPayload::parse(ProviderName::Flutterwave, b"not json").unwrap_err();
        assert!(matches!(err, PaymentError::MalformedPayload { .. }));
    }

    #[test]
    fn unknown_flutterwave_status_stays_pending() {
        let body = br#"{"data": {"tx_ref": "att-4", "status": "mystery"}}"#;
        let payload = WebhookPayload::parse(ProviderName::Flutterwave, body).unwrap();
        assert_eq!(payload.status(), PaymentStatus::Pending);
    }
}
