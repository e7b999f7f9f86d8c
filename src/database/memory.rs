use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{
    AttemptResult, AttemptWithPayment, Merchant, MerchantProviderConfig, NewPayment,
    NewProviderConfig, Payment, PaymentAttempt, StatusUpdate, Transition,
};
use crate::database::store::{PaymentStore, StoreResult};
use crate::payments::types::{PaymentStatus, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    merchants: HashMap<Uuid, Merchant>,
    configs: HashMap<(Uuid, ProviderName), MerchantProviderConfig>,
    payments: HashMap<Uuid, Payment>,
    idempotency: HashMap<(Uuid, String), Uuid>,
    attempts: HashMap<Uuid, PaymentAttempt>,
    attempts_by_payment: HashMap<Uuid, Vec<Uuid>>,
}

impl MemoryState {
    fn transition_payment(
        &mut self,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<Transition> {
        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| DatabaseError::not_found("payment", payment_id))?;
        if !payment.status.can_transition_to(to) {
            return Ok(Transition::NoOp);
        }
        payment.status = to;
        if provider.is_some() {
            payment.provider = provider;
        }
        payment.updated_at = Utc::now();
        Ok(Transition::Applied)
    }
}

/// Process-local store. All state sits behind one lock, so each trait call
/// is atomic with respect to the others.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_merchant(&self, email: &str) -> Merchant {
        let merchant = Merchant {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            webhook_secret: None,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .merchants
            .insert(merchant.id, merchant.clone());
        merchant
    }

    /// Moves a payment's `updated_at` back in time.
    pub async fn backdate_payment(&self, payment_id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(payment) = self.state.write().await.payments.get_mut(&payment_id) {
            payment.updated_at = updated_at;
        }
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    pub async fn attempt_count(&self) -> usize {
        self.state.read().await.attempts.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_merchant(&self, merchant_id: Uuid) -> StoreResult<Option<Merchant>> {
        Ok(self.state.read().await.merchants.get(&merchant_id).cloned())
    }

    async fn list_enabled_configs(
        &self,
        merchant_id: Uuid,
    ) -> StoreResult<Vec<MerchantProviderConfig>> {
        let state = self.state.read().await;
        let mut configs: Vec<_> = state
            .configs
            .values()
            .filter(|c| c.merchant_id == merchant_id && c.enabled)
            .cloned()
            .collect();
        configs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.provider.as_str().cmp(b.provider.as_str()))
        });
        Ok(configs)
    }

    async fn find_config(
        &self,
        merchant_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<Option<MerchantProviderConfig>> {
        Ok(self
            .state
            .read()
            .await
            .configs
            .get(&(merchant_id, provider))
            .cloned())
    }

    async fn upsert_config(&self, config: NewProviderConfig) -> StoreResult<MerchantProviderConfig> {
        let mut state = self.state.write().await;
        if !state.merchants.contains_key(&config.merchant_id) {
            return Err(DatabaseError::not_found("merchant", config.merchant_id));
        }
        let now = Utc::now();
        let key = (config.merchant_id, config.provider);
        let (id, created_at) = state
            .configs
            .get(&key)
            .map(|existing| (existing.id, existing.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let stored = MerchantProviderConfig {
            id,
            merchant_id: config.merchant_id,
            provider: config.provider,
            encrypted_secret_key: config.encrypted_secret_key,
            encrypted_public_key: config.encrypted_public_key,
            encrypted_webhook_secret: config.encrypted_webhook_secret,
            enabled: config.enabled,
            priority: config.priority,
            fees: config.fees,
            created_at,
            updated_at: now,
        };
        state.configs.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find_payment_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .idempotency
            .get(&(merchant_id, idempotency_key.to_string()))
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment> {
        let mut state = self.state.write().await;
        let key = (payment.merchant_id, payment.idempotency_key.clone());
        if state.idempotency.contains_key(&key) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some("payments_merchant_idempotency_key".to_string()),
            }));
        }

        let now = Utc::now();
        let stored = Payment {
            id: Uuid::new_v4(),
            merchant_id: payment.merchant_id,
            amount: payment.amount,
            currency: payment.currency,
            email: payment.email,
            idempotency_key: payment.idempotency_key,
            status: PaymentStatus::Pending,
            provider: None,
            card_bin: payment.card_bin,
            country: payment.country,
            created_at: now,
            updated_at: now,
        };
        state.idempotency.insert(key, stored.id);
        state.payments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn list_attempts(&self, payment_id: Uuid) -> StoreResult<Vec<PaymentAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts_by_payment
            .get(&payment_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.attempts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_attempt(
        &self,
        payment_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<PaymentAttempt> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&payment_id) {
            return Err(DatabaseError::not_found("payment", payment_id));
        }
        let now = Utc::now();
        let attempt = PaymentAttempt {
            id: Uuid::new_v4(),
            payment_id,
            provider,
            status: PaymentStatus::Pending,
            provider_reference: None,
            redirect_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.attempts.insert(attempt.id, attempt.clone());
        state
            .attempts_by_payment
            .entry(payment_id)
            .or_default()
            .push(attempt.id);
        Ok(attempt)
    }

    async fn record_attempt_result(
        &self,
        attempt_id: Uuid,
        result: AttemptResult,
    ) -> StoreResult<Transition> {
        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| DatabaseError::not_found("payment_attempt", attempt_id))?;
        if !attempt.status.can_transition_to(result.status) {
            return Ok(Transition::NoOp);
        }
        attempt.status = result.status;
        if result.provider_reference.is_some() {
            attempt.provider_reference = result.provider_reference;
        }
        if result.redirect_url.is_some() {
            attempt.redirect_url = result.redirect_url;
        }
        if result.error_message.is_some() {
            attempt.error_message = result.error_message;
        }
        attempt.updated_at = Utc::now();
        Ok(Transition::Applied)
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> StoreResult<Option<AttemptWithPayment>> {
        let state = self.state.read().await;
        Ok(state.attempts.get(&attempt_id).and_then(|attempt| {
            state
                .payments
                .get(&attempt.payment_id)
                .map(|payment| AttemptWithPayment {
                    attempt: attempt.clone(),
                    payment: payment.clone(),
                })
        }))
    }

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<Transition> {
        self.state
            .write()
            .await
            .transition_payment(payment_id, to, provider)
    }

    async fn apply_status(
        &self,
        attempt_id: Uuid,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<StatusUpdate> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&payment_id) {
            return Err(DatabaseError::not_found("payment", payment_id));
        }
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| DatabaseError::not_found("payment_attempt", attempt_id))?;
        if attempt.payment_id != payment_id {
            return Err(DatabaseError::query("attempt does not belong to payment"));
        }
        if !attempt.status.can_transition_to(to) {
            return Ok(StatusUpdate {
                attempt: Transition::NoOp,
                payment: Transition::NoOp,
            });
        }
        attempt.status = to;
        attempt.updated_at = Utc::now();

        let payment = state.transition_payment(payment_id, to, provider)?;
        Ok(StatusUpdate {
            attempt: Transition::Applied,
            payment,
        })
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Payment>> {
        let state = self.state.read().await;
        let mut stale: Vec<_> = state
            .payments
            .values()
            .filter(|p| !p.status.is_terminal() && p.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn latest_attempt(&self, payment_id: Uuid) -> StoreResult<Option<PaymentAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts_by_payment
            .get(&payment_id)
            .and_then(|ids| ids.last())
            .and_then(|id| state.attempts.get(id))
            .cloned())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
