pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;
pub mod webhook;

pub use error::{PaymentError, PaymentResult};
pub use factory::{PaymentFactoryConfig, PaymentProviderFactory, ProviderCredentials, ProviderResolver};
pub use provider::PaymentProvider;
pub use types::{
    InitializeRequest, InitializeResponse, PaymentStatus, ProviderName, VerifyResponse,
    WebhookOutcome,
};
pub use webhook::WebhookPayload;
