use crate::payments::error::PaymentResult;
use crate::payments::types::{
    InitializeRequest, InitializeResponse, ProviderName, VerifyResponse, WebhookOutcome,
};
use async_trait::async_trait;

/// Common capability set every gateway adapter normalizes onto.
///
/// An adapter instance is scoped to one merchant's credentials and is built
/// fresh per call by the registry.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Gateway rejections and transport failures come back as a FAILED
    /// response; only configuration problems are returned as `Err`.
    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse>;

    async fn verify(&self, provider_reference: &str) -> PaymentResult<VerifyResponse>;

    /// Authenticates the raw body with the gateway's own scheme and only then
    /// extracts the attempt reference and normalized status.
    fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        shared_secret: &str,
    ) -> PaymentResult<WebhookOutcome>;
}
