use crate::config::ReconciliationConfig;
use crate::crypto::CredentialCipher;
use crate::database::error::DatabaseError;
use crate::database::models::{Payment, PaymentAttempt};
use crate::database::store::PaymentStore;
use crate::payments::factory::ProviderResolver;
use crate::payments::types::PaymentStatus;
use crate::services::provider_config::decrypt_credentials;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Per-payment failures. These never abort a sweep; they are logged and
/// counted in the [`SweepReport`].
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("provider configuration missing for payment {0}")]
    ConfigMissing(Uuid),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("reconciliation timed out after {0}s")]
    Timeout(u64),
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Initialization never produced a provider reference; failed locally.
    Abandoned,
    /// Provider truth differed and was written.
    Updated(PaymentStatus),
    /// Nothing to write, or another writer got there first.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub abandoned: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, result: &Result<ReconcileOutcome, ReconciliationError>) {
        match result {
            Ok(ReconcileOutcome::Abandoned) => self.abandoned += 1,
            Ok(ReconcileOutcome::Updated(_)) => self.updated += 1,
            Ok(ReconcileOutcome::Unchanged) => self.unchanged += 1,
            Err(_) => self.errors += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

pub struct ReconciliationSweeper {
    store: Arc<dyn PaymentStore>,
    resolver: Arc<dyn ProviderResolver>,
    cipher: Arc<CredentialCipher>,
    config: ReconciliationConfig,
}

impl ReconciliationSweeper {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        resolver: Arc<dyn ProviderResolver>,
        cipher: Arc<CredentialCipher>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            cipher,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.interval_secs);
        info!(
            interval_secs = self.config.interval_secs,
            stale_after_secs = self.config.stale_after_secs,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "reconciliation sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("reconciliation sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "reconciliation sweep failed");
                    }
                }
            }
        }

        info!("reconciliation sweeper stopped");
    }

    /// One pass over stale non-terminal payments.
    pub async fn sweep(&self) -> Result<SweepReport, DatabaseError> {
        let older_than =
            Utc::now() - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let stale = self
            .store
            .find_stale_pending(older_than, self.config.batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };
        if stale.is_empty() {
            return Ok(report);
        }

        // Each future owns its payment; borrowed closure arguments make `run` non-Send.
        let results: Vec<(Uuid, Result<ReconcileOutcome, ReconciliationError>)> =
            stream::iter(stale)
                .map(|payment| async move { self.reconcile_bounded(payment).await })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        for (payment_id, result) in &results {
            if let Err(e) = result {
                warn!(payment_id = %payment_id, error = %e, "payment reconciliation failed");
            }
            report.record(result);
        }

        info!(
            scanned = report.scanned,
            abandoned = report.abandoned,
            updated = report.updated,
            unchanged = report.unchanged,
            errors = report.errors,
            "reconciliation sweep complete"
        );
        Ok(report)
    }

    async fn reconcile_bounded(
        &self,
        payment: Payment,
    ) -> (Uuid, Result<ReconcileOutcome, ReconciliationError>) {
        let timeout_secs = self.config.per_payment_timeout_secs;
        let result = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.reconcile_payment(&payment),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconciliationError::Timeout(timeout_secs)),
        };
        (payment.id, result)
    }

    pub async fn reconcile_payment(
        &self,
        payment: &Payment,
    ) -> Result<ReconcileOutcome, ReconciliationError> {
        let attempt = match self.store.latest_attempt(payment.id).await? {
            Some(attempt) => attempt,
            None => {
                let t = self
                    .store
                    .transition_payment(payment.id, PaymentStatus::Failed, None)
                    .await?;
                info!(payment_id = %payment.id, "stale payment without attempts failed");
                return Ok(if t.applied() {
                    ReconcileOutcome::Abandoned
                } else {
                    ReconcileOutcome::Unchanged
                });
            }
        };

        if attempt.status.is_terminal() {
            return self.align_with_attempt(payment, &attempt).await;
        }

        let reference = match attempt
            .provider_reference
            .as_deref()
            .filter(|r| !r.is_empty())
        {
            Some(reference) => reference.to_string(),
            None => {
                let update = self
                    .store
                    .apply_status(attempt.id, payment.id, PaymentStatus::Failed, None)
                    .await?;
                info!(
                    payment_id = %payment.id,
                    attempt_id = %attempt.id,
                    "abandoned attempt without provider reference failed"
                );
                return Ok(if update.payment.applied() {
                    ReconcileOutcome::Abandoned
                } else {
                    ReconcileOutcome::Unchanged
                });
            }
        };

        let config = self
            .store
            .find_config(payment.merchant_id, attempt.provider)
            .await?
            .ok_or(ReconciliationError::ConfigMissing(payment.id))?;
        let credentials = decrypt_credentials(&self.cipher, &config)
            .map_err(|e| ReconciliationError::Provider(e.to_string()))?;
        let adapter = self
            .resolver
            .resolve(attempt.provider, credentials)
            .map_err(|e| ReconciliationError::Provider(e.to_string()))?;

        let verified = adapter
            .verify(&reference)
            .await
            .map_err(|e| ReconciliationError::Provider(e.to_string()))?;

        if verified.status == attempt.status || verified.status == PaymentStatus::Pending {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let update = self
            .store
            .apply_status(
                attempt.id,
                payment.id,
                verified.status,
                Some(attempt.provider),
            )
            .await?;

        info!(
            payment_id = %payment.id,
            attempt_id = %attempt.id,
            provider = %attempt.provider,
            status = %verified.status,
            applied = update.attempt.applied(),
            "payment reconciled against provider"
        );

        Ok(if update.attempt.applied() {
            ReconcileOutcome::Updated(verified.status)
        } else {
            ReconcileOutcome::Unchanged
        })
    }

    /// Latest attempt already terminal but the payment is not: an earlier
    /// writer stopped between the two writes.
    async fn align_with_attempt(
        &self,
        payment: &Payment,
        attempt: &PaymentAttempt,
    ) -> Result<ReconcileOutcome, ReconciliationError> {
        let provider = (attempt.status == PaymentStatus::Succeeded).then_some(attempt.provider);
        let t = self
            .store
            .transition_payment(payment.id, attempt.status, provider)
            .await?;
        Ok(if t.applied() {
            ReconcileOutcome::Updated(attempt.status)
        } else {
            ReconcileOutcome::Unchanged
        })
    }
}
