use crate::database::error::DatabaseError;
use crate::database::models::{
    AttemptResult, AttemptWithPayment, FeeStructure, Merchant, MerchantProviderConfig,
    NewPayment, NewProviderConfig, Payment, PaymentAttempt, StatusUpdate, Transition,
};
use crate::database::store::{PaymentStore, StoreResult};
use crate::payments::types::{PaymentStatus, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, merchant_id, amount, currency, email, idempotency_key, status, \
     provider, card_bin, country, created_at, updated_at";
const ATTEMPT_COLUMNS: &str = "id, payment_id, provider, status, provider_reference, \
     redirect_url, error_message, created_at, updated_at";
const CONFIG_COLUMNS: &str = "id, merchant_id, provider, encrypted_secret_key, \
     encrypted_public_key, encrypted_webhook_secret, enabled, priority, fee_percent, fee_flat, \
     fee_cap, created_at, updated_at";

#[derive(Debug, FromRow)]
struct MerchantRow {
    id: Uuid,
    email: String,
    password_hash: String,
    webhook_secret: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ConfigRow {
    id: Uuid,
    merchant_id: Uuid,
    provider: String,
    encrypted_secret_key: String,
    encrypted_public_key: Option<String>,
    encrypted_webhook_secret: Option<String>,
    enabled: bool,
    priority: i32,
    fee_percent: Decimal,
    fee_flat: Decimal,
    fee_cap: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    merchant_id: Uuid,
    amount: i64,
    currency: String,
    email: String,
    idempotency_key: String,
    status: String,
    provider: Option<String>,
    card_bin: Option<String>,
    country: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    payment_id: Uuid,
    provider: String,
    status: String,
    provider_reference: Option<String>,
    redirect_url: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_provider(value: &str) -> StoreResult<ProviderName> {
    ProviderName::from_str(value).map_err(|e| DatabaseError::query(e.to_string()))
}

fn parse_status(value: &str) -> StoreResult<PaymentStatus> {
    PaymentStatus::from_str(value).map_err(|e| DatabaseError::query(e.to_string()))
}

fn predecessors(to: PaymentStatus) -> Vec<String> {
    to.allowed_predecessors()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

impl From<MerchantRow> for Merchant {
    fn from(row: MerchantRow) -> Self {
        Merchant {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            webhook_secret: row.webhook_secret,
            created_at: row.created_at,
        }
    }
}

impl TryFrom<ConfigRow> for MerchantProviderConfig {
    type Error = DatabaseError;

    fn try_from(row: ConfigRow) -> Result<Self, Self::Error> {
        Ok(MerchantProviderConfig {
            id: row.id,
            merchant_id: row.merchant_id,
            provider: parse_provider(&row.provider)?,
            encrypted_secret_key: row.encrypted_secret_key,
            encrypted_public_key: row.encrypted_public_key,
            encrypted_webhook_secret: row.encrypted_webhook_secret,
            enabled: row.enabled,
            priority: row.priority,
            fees: FeeStructure {
                percent: row.fee_percent,
                flat: row.fee_flat,
                cap: row.fee_cap,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            merchant_id: row.merchant_id,
            amount: row.amount,
            currency: row.currency,
            email: row.email,
            idempotency_key: row.idempotency_key,
            status: parse_status(&row.status)?,
            provider: row.provider.as_deref().map(parse_provider).transpose()?,
            card_bin: row.card_bin,
            country: row.country,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<AttemptRow> for PaymentAttempt {
    type Error = DatabaseError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: row.id,
            payment_id: row.payment_id,
            provider: parse_provider(&row.provider)?,
            status: parse_status(&row.status)?,
            provider_reference: row.provider_reference,
            redirect_url: row.redirect_url,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed store. Conditional writes use `status = ANY($n)` and
/// the idempotency guard is the `(merchant_id, idempotency_key)` unique index.
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::raw_sql(include_str!(
            "../../migrations/20260101000000_payment_orchestration.sql"
        ))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_merchant(&self, merchant_id: Uuid) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query_as::<_, MerchantRow>(
            "SELECT id, email, password_hash, webhook_secret, created_at
             FROM merchants WHERE id = $1",
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(Merchant::from))
    }

    async fn list_enabled_configs(
        &self,
        merchant_id: Uuid,
    ) -> StoreResult<Vec<MerchantProviderConfig>> {
        let rows = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {} FROM merchant_provider_configs
             WHERE merchant_id = $1 AND enabled = true
             ORDER BY priority DESC, provider ASC",
            CONFIG_COLUMNS
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter().map(MerchantProviderConfig::try_from).collect()
    }

    async fn find_config(
        &self,
        merchant_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<Option<MerchantProviderConfig>> {
        let row = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {} FROM merchant_provider_configs WHERE merchant_id = $1 AND provider = $2",
            CONFIG_COLUMNS
        ))
        .bind(merchant_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(MerchantProviderConfig::try_from).transpose()
    }

    async fn upsert_config(&self, config: NewProviderConfig) -> StoreResult<MerchantProviderConfig> {
        let row = sqlx::query_as::<_, ConfigRow>(&format!(
            "INSERT INTO merchant_provider_configs
                (id, merchant_id, provider, encrypted_secret_key, encrypted_public_key,
                 encrypted_webhook_secret, enabled, priority, fee_percent, fee_flat, fee_cap)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (merchant_id, provider) DO UPDATE SET
                encrypted_secret_key = EXCLUDED.encrypted_secret_key,
                encrypted_public_key = EXCLUDED.encrypted_public_key,
                encrypted_webhook_secret = EXCLUDED.encrypted_webhook_secret,
                enabled = EXCLUDED.enabled,
                priority = EXCLUDED.priority,
                fee_percent = EXCLUDED.fee_percent,
                fee_flat = EXCLUDED.fee_flat,
                fee_cap = EXCLUDED.fee_cap,
                updated_at = now()
             RETURNING {}",
            CONFIG_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(config.merchant_id)
        .bind(config.provider.as_str())
        .bind(&config.encrypted_secret_key)
        .bind(&config.encrypted_public_key)
        .bind(&config.encrypted_webhook_secret)
        .bind(config.enabled)
        .bind(config.priority)
        .bind(config.fees.percent)
        .bind(config.fees.flat)
        .bind(config.fees.cap)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        MerchantProviderConfig::try_from(row)
    }

    async fn find_payment_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE merchant_id = $1 AND idempotency_key = $2",
            PAYMENT_COLUMNS
        ))
        .bind(merchant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments
                (id, merchant_id, amount, currency, email, idempotency_key, status, card_bin, country)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(payment.merchant_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.email)
        .bind(&payment.idempotency_key)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&payment.card_bin)
        .bind(&payment.country)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Payment::try_from(row)
    }

    async fn get_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_attempts(&self, payment_id: Uuid) -> StoreResult<Vec<PaymentAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM payment_attempts WHERE payment_id = $1 ORDER BY created_at ASC, id ASC",
            ATTEMPT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter().map(PaymentAttempt::try_from).collect()
    }

    async fn create_attempt(
        &self,
        payment_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<PaymentAttempt> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "INSERT INTO payment_attempts (id, payment_id, provider, status)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            ATTEMPT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(payment_id)
        .bind(provider.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        PaymentAttempt::try_from(row)
    }

    async fn record_attempt_result(
        &self,
        attempt_id: Uuid,
        result: AttemptResult,
    ) -> StoreResult<Transition> {
        let outcome = sqlx::query(
            "UPDATE payment_attempts SET
                status = $2,
                provider_reference = COALESCE($3, provider_reference),
                redirect_url = COALESCE($4, redirect_url),
                error_message = COALESCE($5, error_message),
                updated_at = clock_timestamp()
             WHERE id = $1 AND status = ANY($6)",
        )
        .bind(attempt_id)
        .bind(result.status.as_str())
        .bind(&result.provider_reference)
        .bind(&result.redirect_url)
        .bind(&result.error_message)
        .bind(predecessors(result.status))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(if outcome.rows_affected() == 0 {
            Transition::NoOp
        } else {
            Transition::Applied
        })
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> StoreResult<Option<AttemptWithPayment>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM payment_attempts WHERE id = $1",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let attempt = match row {
            Some(row) => PaymentAttempt::try_from(row)?,
            None => return Ok(None),
        };
        let payment = self
            .get_payment(attempt.payment_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("payment", attempt.payment_id))?;
        Ok(Some(AttemptWithPayment { attempt, payment }))
    }

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<Transition> {
        let outcome = sqlx::query(
            "UPDATE payments SET
                status = $2,
                provider = COALESCE($3, provider),
                updated_at = clock_timestamp()
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(payment_id)
        .bind(to.as_str())
        .bind(provider.map(|p| p.as_str()))
        .bind(predecessors(to))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(if outcome.rows_affected() == 0 {
            Transition::NoOp
        } else {
            Transition::Applied
        })
    }

    async fn apply_status(
        &self,
        attempt_id: Uuid,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<StatusUpdate> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Payment row first, then attempt: the lock order every writer uses.
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        if locked.is_none() {
            return Err(DatabaseError::not_found("payment", payment_id));
        }
        let owner: Option<(Uuid,)> =
            sqlx::query_as("SELECT payment_id FROM payment_attempts WHERE id = $1 FOR UPDATE")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        match owner {
            Some((owner,)) if owner == payment_id => {}
            Some(_) => return Err(DatabaseError::query("attempt does not belong to payment")),
            None => return Err(DatabaseError::not_found("payment_attempt", attempt_id)),
        }

        let allowed = predecessors(to);
        let attempt = sqlx::query(
            "UPDATE payment_attempts SET status = $2, updated_at = clock_timestamp()
             WHERE id = $1 AND status = ANY($3)",
        )
        .bind(attempt_id)
        .bind(to.as_str())
        .bind(&allowed)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if attempt.rows_affected() == 0 {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(StatusUpdate {
                attempt: Transition::NoOp,
                payment: Transition::NoOp,
            });
        }

        let payment = sqlx::query(
            "UPDATE payments SET
                status = $2,
                provider = COALESCE($3, provider),
                updated_at = clock_timestamp()
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(payment_id)
        .bind(to.as_str())
        .bind(provider.map(|p| p.as_str()))
        .bind(&allowed)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(StatusUpdate {
            attempt: Transition::Applied,
            payment: if payment.rows_affected() == 0 {
                Transition::NoOp
            } else {
                Transition::Applied
            },
        })
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments
             WHERE status IN ('PENDING', 'PROCESSING') AND updated_at < $1
             ORDER BY updated_at ASC
             LIMIT $2",
            PAYMENT_COLUMNS
        ))
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn latest_attempt(&self, payment_id: Uuid) -> StoreResult<Option<PaymentAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM payment_attempts WHERE payment_id = $1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            ATTEMPT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "database health check failed");
                DatabaseError::from_sqlx(e)
            })?;
        Ok(())
    }
}
