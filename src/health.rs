//! Health check module
//! Reports reachability of the payment store

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::error;

use crate::database::store::PaymentStore;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PaymentStore>,
    check_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self {
            store,
            check_timeout: Duration::from_secs(5),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let start = Instant::now();

        let store = match timeout(self.check_timeout, self.store.health_check()).await {
            Ok(Ok(())) => ComponentHealth::up(Some(start.elapsed().as_millis())),
            Ok(Err(e)) => {
                error!(error = %e, "Store health check failed");
                ComponentHealth::down(Some("unreachable".to_string()))
            }
            Err(_) => {
                error!("Store health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };

        if store.status == ComponentState::Down {
            health_status.status = HealthState::Unhealthy;
        }
        health_status.checks.insert("store".to_string(), store);
        health_status
    }
}
