//! Services module for routing, orchestration and webhook handling

pub mod bin_lookup;
pub mod payment_orchestrator;
pub mod provider_config;
pub mod routing;
pub mod webhook_processor;

pub use bin_lookup::{BinInfo, BinListClient, BinLookup};
pub use payment_orchestrator::{
    OrchestratorConfig, OrchestratorError, OrchestratorResult, PaymentOrchestrator,
    PaymentOutcome, ProcessPaymentRequest,
};
pub use provider_config::{ProviderConfigError, ProviderConfigService, UpsertProviderConfig};
pub use routing::{DecisionEngine, RouteDecision};
pub use webhook_processor::{WebhookAck, WebhookProcessor, WebhookProcessorError};
