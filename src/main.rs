use paycascade_backend::api::{self, AppState};
use paycascade_backend::config::{AppConfig, StoreBackend};
use paycascade_backend::crypto::CredentialCipher;
use paycascade_backend::database::{
    init_pool_from_config, InMemoryPaymentStore, PaymentStore, PgPaymentStore,
};
use paycascade_backend::health::HealthChecker;
use paycascade_backend::logging::init_tracing;
use paycascade_backend::payments::factory::{PaymentProviderFactory, ProviderResolver};
use paycascade_backend::services::bin_lookup::{BinListClient, BinLookup};
use paycascade_backend::services::payment_orchestrator::{
    OrchestratorConfig, PaymentOrchestrator,
};
use paycascade_backend::services::provider_config::ProviderConfigService;
use paycascade_backend::services::routing::DecisionEngine;
use paycascade_backend::services::webhook_processor::WebhookProcessor;
use paycascade_backend::workers::reconciliation::ReconciliationSweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let pool = init_pool_from_config(&config.database).await?;
            let store = PgPaymentStore::new(pool);
            store.run_migrations().await?;
            info!("Postgres payment store ready");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory payment store; state is lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        store = ?config.database.backend,
        "Starting payment orchestration service"
    );

    let cipher = Arc::new(CredentialCipher::from_hex_key(
        &config.security.encryption_key,
    )?);
    let store = build_store(&config).await?;

    let resolver: Arc<dyn ProviderResolver> =
        Arc::new(PaymentProviderFactory::with_config(config.providers.clone())?);

    let bin_timeout = Duration::from_secs(config.bin_lookup.timeout_secs);
    let bin_lookup: Arc<dyn BinLookup> =
        Arc::new(BinListClient::new(config.bin_lookup.url.clone(), bin_timeout)?);
    let router = Arc::new(DecisionEngine::new(bin_lookup, bin_timeout));

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        store.clone(),
        resolver.clone(),
        cipher.clone(),
        router,
        OrchestratorConfig {
            provider_timeout: Duration::from_secs(config.providers.timeout_secs),
        },
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        store.clone(),
        resolver.clone(),
        cipher.clone(),
    ));
    let provider_configs = Arc::new(ProviderConfigService::new(store.clone(), cipher.clone()));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper_handle = if config.reconciliation.enabled {
        let sweeper = ReconciliationSweeper::new(
            store.clone(),
            resolver,
            cipher,
            config.reconciliation.clone(),
        );
        Some(tokio::spawn(sweeper.run(worker_shutdown_rx)))
    } else {
        info!("Reconciliation sweeper disabled (RECON_ENABLED=false)");
        None
    };

    let app = api::router(AppState {
        orchestrator,
        webhooks,
        provider_configs,
        health: HealthChecker::new(store),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            error!("Timed out waiting for reconciliation sweeper shutdown");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
