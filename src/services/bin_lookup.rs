//! Card-origin lookup collaborator.
//!
//! Lookups never fail the caller: transport errors, timeouts and missing
//! fields all collapse to `None`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinInfo {
    /// ISO 3166-1 alpha-2.
    pub country: Option<String>,
    pub bank: Option<String>,
    pub card_type: Option<String>,
}

#[async_trait]
pub trait BinLookup: Send + Sync {
    async fn lookup(&self, bin: &str) -> Option<BinInfo>;
}

/// Keeps at most the first six digits of a card BIN.
pub fn normalize_bin(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(digits[..6].to_string())
}

#[derive(Clone)]
pub struct BinListClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinListClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BinListResponse {
    #[serde(rename = "type")]
    card_type: Option<String>,
    country: Option<BinListCountry>,
    bank: Option<BinListBank>,
}

#[derive(Debug, Deserialize)]
struct BinListCountry {
    alpha2: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BinListBank {
    name: Option<String>,
}

#[async_trait]
impl BinLookup for BinListClient {
    async fn lookup(&self, bin: &str) -> Option<BinInfo> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), bin);
        let response = match self
            .client
            .get(&url)
            .header("Accept-Version", "3")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = %resp.status(), "bin lookup returned no data");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "bin lookup failed");
                return None;
            }
        };

        match response.json::<BinListResponse>().await {
            Ok(body) => Some(BinInfo {
                country: body
                    .country
                    .and_then(|c| c.alpha2)
                    .map(|c| c.to_uppercase()),
                bank: body.bank.and_then(|b| b.name),
                card_type: body.card_type,
            }),
            Err(e) => {
                warn!(error = %e, "bin lookup returned malformed body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_first_six_digits() {
        assert_eq!(normalize_bin("5399 8312 34"), Some("539983".to_string()));
        assert_eq!(normalize_bin("424242"), Some("424242".to_string()));
        assert_eq!(normalize_bin("4242"), None);
        assert_eq!(normalize_bin("42x242"), None);
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_none() {
        let client =
            BinListClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert_eq!(client.lookup("539983").await, None);
    }
}
