//! Unified error handling for the HTTP surface
//!
//! Service-level errors are folded into [`AppError`], which carries the HTTP
//! status mapping, a machine-readable code and a message that never exposes
//! provider-internal detail.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::services::payment_orchestrator::OrchestratorError;
use crate::services::provider_config::ProviderConfigError;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    #[serde(rename = "MERCHANT_NOT_FOUND")]
    MerchantNotFound,
    #[serde(rename = "PAYMENT_DECLINED")]
    PaymentDeclined,
    #[serde(rename = "DUPLICATE_RESOURCE")]
    DuplicateResource,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business outcomes the caller can act on
#[derive(Debug, Clone)]
pub enum DomainError {
    PaymentNotFound { payment_id: String },
    NotFound { entity: String, id: String },
    MerchantNotFound { merchant_id: Uuid },
    /// Every routed provider failed; the payment is terminal FAILED.
    PaymentDeclined { payment_id: Uuid, attempts: usize },
    Conflict { resource: String },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    UnsupportedProvider { provider: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::NotFound { .. } => 404,
                DomainError::MerchantNotFound { .. } => 404,
                DomainError::PaymentDeclined { .. } => 402,
                DomainError::Conflict { .. } => 409,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::NotFound { .. } => ErrorCode::ResourceNotFound,
                DomainError::MerchantNotFound { .. } => ErrorCode::MerchantNotFound,
                DomainError::PaymentDeclined { .. } => ErrorCode::PaymentDeclined,
                DomainError::Conflict { .. } => ErrorCode::DuplicateResource,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { payment_id } => {
                    format!("Payment '{}' not found", payment_id)
                }
                DomainError::NotFound { entity, .. } => format!("{} not found", entity),
                DomainError::MerchantNotFound { merchant_id } => {
                    format!("Merchant '{}' not found", merchant_id)
                }
                DomainError::PaymentDeclined { payment_id, .. } => {
                    format!("Payment '{}' was declined by all providers", payment_id)
                }
                DomainError::Conflict { resource } => format!("{} already exists", resource),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid '{}': {}", field, reason)
                }
                ValidationError::UnsupportedProvider { provider } => {
                    format!("Unsupported provider '{}'", provider)
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. }) => {
                *is_retryable
            }
            _ => false,
        }
    }

    /// Extra structured detail for the response body, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Validation(ValidationError::InvalidField { field, .. }) => {
                Some(serde_json::json!({ "field": field }))
            }
            AppErrorKind::Domain(DomainError::PaymentDeclined {
                payment_id,
                attempts,
            }) => Some(serde_json::json!({
                "payment_id": payment_id,
                "attempts": attempts,
            })),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = match err.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                AppErrorKind::Domain(DomainError::NotFound { entity, id })
            }
            DatabaseErrorKind::UniqueViolation { constraint } => {
                AppErrorKind::Domain(DomainError::Conflict {
                    resource: constraint.unwrap_or_else(|| "resource".to_string()),
                })
            }
            DatabaseErrorKind::Connection { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: true,
                })
            }
            DatabaseErrorKind::Query { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: false,
                })
            }
        };
        AppError::new(kind)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation { message, field } => AppError::validation(
                field.unwrap_or_else(|| "request".to_string()),
                message,
            ),
            OrchestratorError::MerchantNotFound(merchant_id) => {
                AppError::new(AppErrorKind::Domain(DomainError::MerchantNotFound {
                    merchant_id,
                }))
            }
            OrchestratorError::AllProvidersExhausted { payment_id, errors } => {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentDeclined {
                    payment_id,
                    attempts: errors.len(),
                }))
            }
            OrchestratorError::Storage(e) => e.into(),
        }
    }
}

impl From<ProviderConfigError> for AppError {
    fn from(err: ProviderConfigError) -> Self {
        match err {
            ProviderConfigError::Validation(reason) => AppError::validation("config", reason),
            ProviderConfigError::MerchantNotFound(merchant_id) => {
                AppError::new(AppErrorKind::Domain(DomainError::MerchantNotFound {
                    merchant_id,
                }))
            }
            ProviderConfigError::Crypto(e) => AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Configuration {
                    message: e.to_string(),
                },
            )),
            ProviderConfigError::Storage(e) => e.into(),
        }
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
