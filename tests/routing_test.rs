mod common;

use common::{Harness, StubBinLookup};
use paycascade_backend::database::store::PaymentStore;
use paycascade_backend::payments::ProviderName;
use paycascade_backend::services::DecisionEngine;
use std::sync::Arc;
use std::time::Duration;

fn engine(lookup: StubBinLookup) -> DecisionEngine {
    DecisionEngine::new(Arc::new(lookup), Duration::from_millis(100))
}

async fn ng_merchant() -> Harness {
    let harness = Harness::new().await;
    harness.enable(ProviderName::Stripe, "2.9").await;
    harness.enable(ProviderName::Paystack, "3.5").await;
    harness.enable(ProviderName::Flutterwave, "3.8").await;
    harness
}

#[tokio::test]
async fn recognized_country_puts_local_providers_first() {
    let harness = ng_merchant().await;
    let configs = harness
        .store
        .list_enabled_configs(harness.merchant.id)
        .await
        .unwrap();

    let decision = engine(StubBinLookup::country("NG"))
        .decide(100_000, "NGN", Some("539983"), &configs)
        .await;

    assert_eq!(decision.country.as_deref(), Some("NG"));
    assert_eq!(
        decision.providers,
        vec![
            ProviderName::Paystack,
            ProviderName::Flutterwave,
            ProviderName::Stripe
        ]
    );
}

#[tokio::test]
async fn unknown_or_missing_country_orders_by_cost() {
    let harness = ng_merchant().await;
    let configs = harness
        .store
        .list_enabled_configs(harness.merchant.id)
        .await
        .unwrap();
    let by_cost = vec![
        ProviderName::Stripe,
        ProviderName::Paystack,
        ProviderName::Flutterwave,
    ];

    for (lookup, bin) in [
        (StubBinLookup::unknown(), Some("539983")),
        (StubBinLookup::hanging(), Some("539983")),
        (StubBinLookup::country("NG"), None),
    ] {
        let decision = engine(lookup).decide(100_000, "NGN", bin, &configs).await;
        assert_eq!(decision.country, None);
        assert_eq!(decision.providers, by_cost);
    }
}

#[tokio::test]
async fn same_inputs_give_the_same_route() {
    let harness = ng_merchant().await;
    let configs = harness
        .store
        .list_enabled_configs(harness.merchant.id)
        .await
        .unwrap();
    let engine = engine(StubBinLookup::country("US"));

    let first = engine.decide(7_500, "USD", Some("411111"), &configs).await;
    for _ in 0..5 {
        let again = engine.decide(7_500, "USD", Some("411111"), &configs).await;
        assert_eq!(again.providers, first.providers);
    }
    assert_eq!(first.providers[0], ProviderName::Stripe);
}
