use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Provider configuration missing: {message}")]
    ConfigMissing { message: String },

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Provider call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Provider rejected request: provider={provider}, message={message}")]
    ProviderRejected {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    #[error("Invalid webhook signature")]
    InvalidSignature { reason: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Credential error: {message}")]
    Crypto { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NetworkError { .. } => true,
            PaymentError::Timeout { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::ProviderRejected { retryable, .. } => *retryable,
            PaymentError::ValidationError { .. }
            | PaymentError::ConfigMissing { .. }
            | PaymentError::UnsupportedProvider { .. }
            | PaymentError::InvalidSignature { .. }
            | PaymentError::MalformedPayload { .. }
            | PaymentError::Crypto { .. } => false,
        }
    }

    /// Errors that indicate a deployment or merchant-setup problem rather
    /// than gateway instability.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PaymentError::ConfigMissing { .. }
                | PaymentError::UnsupportedProvider { .. }
                | PaymentError::Crypto { .. }
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::ConfigMissing { .. } | PaymentError::Crypto { .. } => {
                "Payment provider is not configured".to_string()
            }
            PaymentError::UnsupportedProvider { provider } => {
                format!("Unsupported provider: {}", provider)
            }
            PaymentError::NetworkError { .. } | PaymentError::Timeout { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::RateLimitError { .. } => {
                "Too many requests to payment provider. Please retry shortly".to_string()
            }
            PaymentError::ProviderRejected { .. } => {
                "Payment was declined by the provider".to_string()
            }
            PaymentError::InvalidSignature { .. } | PaymentError::MalformedPayload { .. } => {
                "Webhook rejected".to_string()
            }
        }
    }
}
