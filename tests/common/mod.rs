#![allow(dead_code)]

use async_trait::async_trait;
use paycascade_backend::config::ReconciliationConfig;
use paycascade_backend::crypto::CredentialCipher;
use paycascade_backend::database::memory::InMemoryPaymentStore;
use chrono::{DateTime, Utc};
use paycascade_backend::database::error::DatabaseError;
use paycascade_backend::database::models::{
    AttemptResult, AttemptWithPayment, FeeStructure, Merchant, MerchantProviderConfig, NewPayment,
    NewProviderConfig, Payment, PaymentAttempt, StatusUpdate, Transition,
};
use paycascade_backend::database::store::{PaymentStore, StoreResult};
use paycascade_backend::payments::{
    InitializeRequest, InitializeResponse, PaymentError, PaymentProvider, PaymentProviderFactory,
    PaymentResult, PaymentStatus, ProviderCredentials, ProviderName, ProviderResolver,
    VerifyResponse, WebhookOutcome,
};
use paycascade_backend::services::{
    BinInfo, BinLookup, DecisionEngine, OrchestratorConfig, PaymentOrchestrator,
    ProcessPaymentRequest, ProviderConfigService, UpsertProviderConfig, WebhookProcessor,
};
use paycascade_backend::workers::ReconciliationSweeper;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

pub const TEST_KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// What a scripted gateway answers to `initialize`.
#[derive(Debug, Clone)]
pub enum InitScript {
    Succeed,
    Redirect(String),
    Decline(String),
    Error,
    Hang,
    /// The gateway settles the attempt through its webhook while the
    /// initialize call itself times out.
    SettledElsewhere(PaymentStatus),
}

/// What a scripted gateway answers to `verify`.
#[derive(Debug, Clone)]
pub enum VerifyScript {
    Status(PaymentStatus),
    Error,
}

#[derive(Default)]
struct ScriptState {
    init: HashMap<ProviderName, InitScript>,
    verify: HashMap<ProviderName, VerifyScript>,
    init_calls: HashMap<ProviderName, usize>,
    verify_calls: HashMap<ProviderName, usize>,
    webhook_store: Option<Arc<dyn PaymentStore>>,
}

/// Resolver handing out in-process gateways that follow per-provider scripts
/// and count how often they were called.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_initialize(&self, provider: ProviderName, script: InitScript) -> &Self {
        self.state.lock().unwrap().init.insert(provider, script);
        self
    }

    /// Store that `InitScript::SettledElsewhere` writes through.
    pub fn settle_through(&self, store: Arc<dyn PaymentStore>) -> &Self {
        self.state.lock().unwrap().webhook_store = Some(store);
        self
    }

    pub fn on_verify(&self, provider: ProviderName, script: VerifyScript) -> &Self {
        self.state.lock().unwrap().verify.insert(provider, script);
        self
    }

    pub fn init_calls(&self, provider: ProviderName) -> usize {
        self.state
            .lock()
            .unwrap()
            .init_calls
            .get(&provider)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_init_calls(&self) -> usize {
        self.state.lock().unwrap().init_calls.values().sum()
    }

    pub fn total_verify_calls(&self) -> usize {
        self.state.lock().unwrap().verify_calls.values().sum()
    }
}

impl ProviderResolver for ScriptedFactory {
    fn resolve(
        &self,
        provider: ProviderName,
        _credentials: ProviderCredentials,
    ) -> PaymentResult<Box<dyn PaymentProvider>> {
        Ok(Box::new(ScriptedProvider {
            name: provider,
            state: self.state.clone(),
        }))
    }
}

struct ScriptedProvider {
    name: ProviderName,
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> ProviderName {
        self.name
    }

    async fn initialize(&self, request: InitializeRequest) -> PaymentResult<InitializeResponse> {
        let (script, webhook_store) = {
            let mut state = self.state.lock().unwrap();
            *state.init_calls.entry(self.name).or_insert(0) += 1;
            let script = state
                .init
                .get(&self.name)
                .cloned()
                .unwrap_or(InitScript::Decline("no script".to_string()));
            (script, state.webhook_store.clone())
        };

        match script {
            InitScript::Succeed => Ok(InitializeResponse {
                provider_reference: Some(format!("{}_{}", self.name.as_str(), request.reference)),
                status: PaymentStatus::Succeeded,
                redirect_url: None,
                failure_reason: None,
            }),
            InitScript::Redirect(url) => Ok(InitializeResponse {
                provider_reference: Some(format!("{}_{}", self.name.as_str(), request.reference)),
                status: PaymentStatus::Pending,
                redirect_url: Some(url),
                failure_reason: None,
            }),
            InitScript::Decline(reason) => Ok(InitializeResponse::failed(reason)),
            InitScript::Error => Err(PaymentError::ConfigMissing {
                message: format!("{} credentials rejected", self.name),
            }),
            InitScript::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            InitScript::SettledElsewhere(status) => {
                let store = webhook_store.expect("settle_through was not configured");
                let attempt_id = Uuid::parse_str(&request.reference).unwrap();
                let found = store.find_attempt(attempt_id).await.unwrap().unwrap();
                store
                    .apply_status(attempt_id, found.payment.id, status, Some(self.name))
                    .await
                    .unwrap();
                Err(PaymentError::Timeout { timeout_secs: 30 })
            }
        }
    }

    async fn verify(&self, provider_reference: &str) -> PaymentResult<VerifyResponse> {
        let script = {
            let mut state = self.state.lock().unwrap();
            *state.verify_calls.entry(self.name).or_insert(0) += 1;
            state.verify.get(&self.name).cloned()
        };

        match script {
            Some(VerifyScript::Status(status)) => Ok(VerifyResponse {
                provider_reference: provider_reference.to_string(),
                status,
            }),
            Some(VerifyScript::Error) | None => Err(PaymentError::NetworkError {
                message: "connection reset".to_string(),
            }),
        }
    }

    fn handle_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
        _shared_secret: &str,
    ) -> PaymentResult<WebhookOutcome> {
        Err(PaymentError::InvalidSignature {
            reason: "scripted providers do not take webhooks".to_string(),
        })
    }
}

/// BIN lookup that answers with a fixed country, or never answers.
pub struct StubBinLookup {
    country: Option<String>,
    hang: bool,
}

impl StubBinLookup {
    pub fn country(country: &str) -> Self {
        Self {
            country: Some(country.to_string()),
            hang: false,
        }
    }

    pub fn unknown() -> Self {
        Self {
            country: None,
            hang: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            country: Some("NG".to_string()),
            hang: true,
        }
    }
}

#[async_trait]
impl BinLookup for StubBinLookup {
    async fn lookup(&self, _bin: &str) -> Option<BinInfo> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.country.as_ref().map(|c| BinInfo {
            country: Some(c.clone()),
            bank: None,
            card_type: None,
        })
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Store that delegates to the in-memory one, with injectable trouble:
/// idempotency lookups that rendezvous so concurrent callers both miss, and
/// a one-shot failure when recording an attempt result.
#[derive(Clone)]
pub struct FlakyStore {
    inner: InMemoryPaymentStore,
    lookup_barrier: Option<Arc<Barrier>>,
    barrier_parties: usize,
    lookups: Arc<AtomicUsize>,
    fail_next_record: Arc<AtomicBool>,
    record_failures: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryPaymentStore) -> Self {
        Self {
            inner,
            lookup_barrier: None,
            barrier_parties: 0,
            lookups: Arc::new(AtomicUsize::new(0)),
            fail_next_record: Arc::new(AtomicBool::new(false)),
            record_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The first `parties` idempotency lookups wait for each other before
    /// reading, so all of them see no existing payment.
    pub fn racing_lookups(mut self, parties: usize) -> Self {
        self.lookup_barrier = Some(Arc::new(Barrier::new(parties)));
        self.barrier_parties = parties;
        self
    }

    pub fn fail_next_attempt_record(self) -> Self {
        self.fail_next_record.store(true, Ordering::SeqCst);
        self
    }

    pub fn record_failures(&self) -> usize {
        self.record_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn find_merchant(&self, merchant_id: Uuid) -> StoreResult<Option<Merchant>> {
        self.inner.find_merchant(merchant_id).await
    }

    async fn list_enabled_configs(
        &self,
        merchant_id: Uuid,
    ) -> StoreResult<Vec<MerchantProviderConfig>> {
        self.inner.list_enabled_configs(merchant_id).await
    }

    async fn find_config(
        &self,
        merchant_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<Option<MerchantProviderConfig>> {
        self.inner.find_config(merchant_id, provider).await
    }

    async fn upsert_config(&self, config: NewProviderConfig) -> StoreResult<MerchantProviderConfig> {
        self.inner.upsert_config(config).await
    }

    async fn find_payment_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<Payment>> {
        if let Some(barrier) = &self.lookup_barrier {
            if self.lookups.fetch_add(1, Ordering::SeqCst) < self.barrier_parties {
                barrier.wait().await;
            }
        }
        self.inner
            .find_payment_by_idempotency_key(merchant_id, idempotency_key)
            .await
    }

    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment> {
        self.inner.insert_payment(payment).await
    }

    async fn get_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        self.inner.get_payment(payment_id).await
    }

    async fn list_attempts(&self, payment_id: Uuid) -> StoreResult<Vec<PaymentAttempt>> {
        self.inner.list_attempts(payment_id).await
    }

    async fn create_attempt(
        &self,
        payment_id: Uuid,
        provider: ProviderName,
    ) -> StoreResult<PaymentAttempt> {
        self.inner.create_attempt(payment_id, provider).await
    }

    async fn record_attempt_result(
        &self,
        attempt_id: Uuid,
        result: AttemptResult,
    ) -> StoreResult<Transition> {
        if self.fail_next_record.swap(false, Ordering::SeqCst) {
            self.record_failures.fetch_add(1, Ordering::SeqCst);
            return Err(DatabaseError::query("connection reset while writing attempt"));
        }
        self.inner.record_attempt_result(attempt_id, result).await
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> StoreResult<Option<AttemptWithPayment>> {
        self.inner.find_attempt(attempt_id).await
    }

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<Transition> {
        self.inner.transition_payment(payment_id, to, provider).await
    }

    async fn apply_status(
        &self,
        attempt_id: Uuid,
        payment_id: Uuid,
        to: PaymentStatus,
        provider: Option<ProviderName>,
    ) -> StoreResult<StatusUpdate> {
        self.inner
            .apply_status(attempt_id, payment_id, to, provider)
            .await
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Payment>> {
        self.inner.find_stale_pending(older_than, limit).await
    }

    async fn latest_attempt(&self, payment_id: Uuid) -> StoreResult<Option<PaymentAttempt>> {
        self.inner.latest_attempt(payment_id).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }
}

/// In-memory store, one merchant, scripted gateways.
pub struct Harness {
    pub store: InMemoryPaymentStore,
    pub cipher: Arc<CredentialCipher>,
    pub factory: ScriptedFactory,
    pub merchant: Merchant,
}

impl Harness {
    pub async fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let merchant = store.insert_merchant("shop@example.com").await;
        Self {
            store,
            cipher: Arc::new(CredentialCipher::from_hex_key(TEST_KEY_HEX).unwrap()),
            factory: ScriptedFactory::new(),
            merchant,
        }
    }

    pub fn store_handle(&self) -> Arc<dyn PaymentStore> {
        Arc::new(self.store.clone())
    }

    pub fn config_service(&self) -> ProviderConfigService {
        ProviderConfigService::new(self.store_handle(), self.cipher.clone())
    }

    /// Enables a provider for the merchant with a percent-only fee.
    pub async fn enable(&self, provider: ProviderName, percent: &str) {
        self.enable_with_secrets(provider, percent, "sk_test_secret", None)
            .await;
    }

    pub async fn enable_with_secrets(
        &self,
        provider: ProviderName,
        percent: &str,
        secret_key: &str,
        webhook_secret: Option<&str>,
    ) {
        self.config_service()
            .upsert(
                self.merchant.id,
                provider,
                UpsertProviderConfig {
                    secret_key: secret_key.to_string(),
                    public_key: None,
                    webhook_secret: webhook_secret.map(str::to_string),
                    enabled: true,
                    priority: 0,
                    fees: FeeStructure {
                        percent: dec(percent),
                        flat: Decimal::ZERO,
                        cap: None,
                    },
                },
            )
            .await
            .unwrap();
    }

    pub fn orchestrator(&self, bin_lookup: StubBinLookup) -> PaymentOrchestrator {
        self.orchestrator_with(bin_lookup, OrchestratorConfig::default())
    }

    pub fn orchestrator_with(
        &self,
        bin_lookup: StubBinLookup,
        config: OrchestratorConfig,
    ) -> PaymentOrchestrator {
        self.orchestrator_on(self.store_handle(), bin_lookup, config)
    }

    /// Orchestrator over another view of the same data, e.g. a [`FlakyStore`].
    pub fn orchestrator_on(
        &self,
        store: Arc<dyn PaymentStore>,
        bin_lookup: StubBinLookup,
        config: OrchestratorConfig,
    ) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            store,
            Arc::new(self.factory.clone()),
            self.cipher.clone(),
            Arc::new(DecisionEngine::new(
                Arc::new(bin_lookup),
                Duration::from_millis(200),
            )),
            config,
        )
    }

    /// Webhook processing with the real gateway adapters, so signatures are
    /// checked the way each gateway signs them.
    pub fn webhook_processor(&self) -> WebhookProcessor {
        WebhookProcessor::new(
            self.store_handle(),
            Arc::new(PaymentProviderFactory::default()),
            self.cipher.clone(),
        )
    }

    pub fn sweeper(&self) -> ReconciliationSweeper {
        self.sweeper_with(ReconciliationConfig {
            stale_after_secs: 900,
            per_payment_timeout_secs: 1,
            ..ReconciliationConfig::default()
        })
    }

    pub fn sweeper_with(&self, config: ReconciliationConfig) -> ReconciliationSweeper {
        ReconciliationSweeper::new(
            self.store_handle(),
            Arc::new(self.factory.clone()),
            self.cipher.clone(),
            config,
        )
    }

    pub fn flaky_store(&self) -> FlakyStore {
        FlakyStore::new(self.store.clone())
    }

    pub fn request(&self, idempotency_key: &str) -> ProcessPaymentRequest {
        ProcessPaymentRequest {
            merchant_id: self.merchant.id,
            amount: 500_000,
            currency: "NGN".to_string(),
            email: "buyer@example.com".to_string(),
            idempotency_key: idempotency_key.to_string(),
            card_bin: None,
            metadata: None,
        }
    }

    /// A PENDING payment with one attempt at `provider`. The attempt carries
    /// a provider reference only when `reference` is set.
    pub async fn pending_payment(
        &self,
        provider: ProviderName,
        reference: Option<&str>,
    ) -> (Payment, PaymentAttempt) {
        let payment = self
            .store
            .insert_payment(NewPayment {
                merchant_id: self.merchant.id,
                amount: 250_000,
                currency: "NGN".to_string(),
                email: "buyer@example.com".to_string(),
                idempotency_key: Uuid::new_v4().to_string(),
                card_bin: None,
                country: None,
            })
            .await
            .unwrap();
        let attempt = self.store.create_attempt(payment.id, provider).await.unwrap();
        if let Some(reference) = reference {
            self.store
                .record_attempt_result(
                    attempt.id,
                    AttemptResult {
                        status: PaymentStatus::Pending,
                        provider_reference: Some(reference.to_string()),
                        redirect_url: Some("https://checkout.example.com/pay".to_string()),
                        error_message: None,
                    },
                )
                .await
                .unwrap();
        }
        (payment, attempt)
    }

    pub async fn payment(&self, payment_id: Uuid) -> Payment {
        self.store.get_payment(payment_id).await.unwrap().unwrap()
    }

    pub async fn attempts(&self, payment_id: Uuid) -> Vec<PaymentAttempt> {
        self.store.list_attempts(payment_id).await.unwrap()
    }

    pub async fn make_stale(&self, payment_id: Uuid) {
        self.store
            .backdate_payment(payment_id, chrono::Utc::now() - chrono::Duration::minutes(20))
            .await;
    }
}
