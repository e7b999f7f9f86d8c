//! Routing decision engine.
//!
//! Least-cost routing with a locality override: providers preferred in the
//! card's issuing country always come first, cost only orders providers
//! within the same locality class.

use crate::database::models::MerchantProviderConfig;
use crate::payments::types::ProviderName;
use crate::services::bin_lookup::BinLookup;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub providers: Vec<ProviderName>,
    /// `None` when no card signal was supplied or the lookup came back empty.
    pub country: Option<String>,
}

/// Providers with the best local success rates per issuing country.
pub fn local_providers(country: &str) -> &'static [ProviderName] {
    match country {
        "NG" | "GH" | "ZA" => &[ProviderName::Paystack, ProviderName::Flutterwave],
        "KE" => &[ProviderName::Flutterwave],
        "US" | "GB" => &[ProviderName::Stripe],
        _ => &[],
    }
}

/// Orders `configs` into a fallback sequence. Deterministic for a given
/// input order and country.
pub fn decide_route(
    amount: i64,
    country: Option<&str>,
    configs: &[MerchantProviderConfig],
) -> Vec<ProviderName> {
    let local = country.map(local_providers).unwrap_or(&[]);

    let mut ranked: Vec<(bool, Decimal, i32, ProviderName)> = configs
        .iter()
        .map(|c| {
            (
                local.contains(&c.provider),
                c.fees.cost_for(amount),
                c.priority,
                c.provider,
            )
        })
        .collect();

    // Stable sort keeps input order for full ties.
    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| Reverse(a.2).cmp(&Reverse(b.2)))
    });

    let mut route = Vec::with_capacity(ranked.len());
    for (_, _, _, provider) in ranked {
        if !route.contains(&provider) {
            route.push(provider);
        }
    }
    route
}

pub struct DecisionEngine {
    bin_lookup: Arc<dyn BinLookup>,
    lookup_timeout: Duration,
}

impl DecisionEngine {
    pub fn new(bin_lookup: Arc<dyn BinLookup>, lookup_timeout: Duration) -> Self {
        Self {
            bin_lookup,
            lookup_timeout,
        }
    }

    /// Resolves the issuing country, degrading to `None` on any lookup
    /// failure or timeout.
    pub async fn resolve_country(&self, card_bin: Option<&str>) -> Option<String> {
        let bin = card_bin?;
        match tokio::time::timeout(self.lookup_timeout, self.bin_lookup.lookup(bin)).await {
            Ok(info) => info.and_then(|i| i.country).filter(|c| !c.is_empty()),
            Err(_) => {
                debug!("bin lookup timed out");
                None
            }
        }
    }

    pub async fn decide(
        &self,
        amount: i64,
        currency: &str,
        card_bin: Option<&str>,
        configs: &[MerchantProviderConfig],
    ) -> RouteDecision {
        let country = self.resolve_country(card_bin).await;
        let providers = decide_route(amount, country.as_deref(), configs);
        info!(
            amount,
            currency,
            country = country.as_deref().unwrap_or("UNKNOWN"),
            route = ?providers,
            "route decided"
        );
        RouteDecision { providers, country }
    }
}
