use crate::database::error::DatabaseError;
use crate::database::models::{
    AttemptResult, AttemptWithPayment, Merchant, MerchantProviderConfig, NewPayment,
    NewProviderConfig, Payment, PaymentAttempt, StatusUpdate, Transition,
};
use crate::payments::types::{PaymentStatus, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, DatabaseError>;

/// Storage handle shared by the orchestrator, webhook handler and sweeper.
///
/// Every status write is conditional on the record's current status being an
/// allowed predecessor of the target; a write matching nothing reports
/// [`Transition::NoOp`] instead of failing.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_merchant(&self, merchant_id: Uuid) -> StoreResult<Option<Merchant>>;

    /// Enabled configs ordered by priority descending, then provider.
    async fn list_enabled_configs(
        &self,
        merchant_id: Uuid,
    ) -> StoreResult<Vec<MerchantProviderConfig>>;

    async fn find_config(
        &self,
        merchant_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<Option<MerchantProviderConfig>>;

    async fn upsert_config(&self, config: NewProviderConfig) -> StoreResult<MerchantProviderConfig>;

    async fn find_payment_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<Payment>>;

    /// Inserts a PENDING payment. A duplicate `(merchant_id, idempotency_key)`
    /// yields a unique-violation error.
    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment>;

    async fn get_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>>;

    async fn list_attempts(&self, payment_id: Uuid) -> StoreResult<Vec<PaymentAttempt>>;

    async fn create_attempt(
        &self,
        payment_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<PaymentAttempt>;

    async fn record_attempt_result(
        &self,
        attempt_id: Uuid,
        result: AttemptResult,
    ) -> StoreResult<Transition>;

    async fn find_attempt(&self, attempt_id: Uuid) -> StoreResult<Option<AttemptWithPayment>>;

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<Transition>;

    /// Moves an attempt and its payment together in one unit of work. The
    /// payment is only touched when the attempt write applied.
    async fn apply_status(
        &self,
        attempt_id: Uuid,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<StatusUpdate>;

    /// Non-terminal payments last updated before `older_than`, oldest first.
    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Payment>>;

    async fn latest_attempt(&self, payment_id: Uuid) -> StoreResult<Option<PaymentAttempt>>;

    async fn health_check(&self) -> StoreResult<()>;
}
