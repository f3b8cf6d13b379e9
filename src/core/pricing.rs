//! Best-effort USD prices for token mints.
//!
//! Queries a Jupiter-style price endpoint (`GET <endpoint>?ids=a,b,c`).
//! Lookups never fail the caller: errors become warnings and the affected
//! mints simply have no price.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::http::build_client;
use super::pubkey::Pubkey;
use super::resolver::{FetchWarning, Partial};
use crate::error::{AssetError, Result};

/// Default price endpoint.
pub const DEFAULT_PRICE_ENDPOINT: &str = "https://price.jup.ag/v4/price";
/// Stage name on warnings from failed price lookups.
pub const PRICE_STAGE: &str = "prices";
/// Mints per price request.
pub const PRICE_BATCH_SIZE: usize = 100;
const PRICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: Value,
}

impl PriceEntry {
    /// Prices arrive as numbers or numeric strings depending on the endpoint version.
    fn usd(&self) -> Option<f64> {
        match &self.price {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Price of one mint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenPrice {
    pub mint: Pubkey,
    pub usd: f64,
}

/// Caching price client.
#[derive(Debug)]
pub struct PriceService {
    client: Client,
    endpoint: String,
    // `None` records a mint the endpoint does not price, so it is not asked again.
    cache: Mutex<HashMap<Pubkey, Option<f64>>>,
}

impl PriceService {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(PRICE_TIMEOUT)?,
            endpoint: endpoint.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Cached price of `mint`, if one was fetched.
    pub async fn cached(&self, mint: &Pubkey) -> Option<f64> {
        self.cache.lock().await.get(mint).copied().flatten()
    }

    /// Fetch prices for `mints`, serving repeats from the cache.
    pub async fn fetch_prices(&self, mints: &[Pubkey]) -> Partial<TokenPrice> {
        let mut partial = Partial::default();
        let mut missing: Vec<Pubkey> = Vec::new();
        {
            let cache = self.cache.lock().await;
            for mint in mints {
                match cache.get(mint) {
                    Some(Some(usd)) => partial.items.push(TokenPrice { mint: *mint, usd: *usd }),
                    Some(None) => {}
                    None if !missing.contains(mint) => missing.push(*mint),
                    None => {}
                }
            }
        }

        for (chunk_index, chunk) in missing.chunks(PRICE_BATCH_SIZE).enumerate() {
            match self.fetch_chunk(chunk).await {
                Ok(prices) => {
                    let mut cache = self.cache.lock().await;
                    for mint in chunk {
                        let usd = prices.get(mint).copied();
                        cache.insert(*mint, usd);
                        if let Some(usd) = usd {
                            partial.items.push(TokenPrice { mint: *mint, usd });
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(chunk = chunk_index + 1, mints = chunk.len(), error = %e, "Price lookup failed");
                    partial.warnings.push(FetchWarning {
                        stage: PRICE_STAGE.to_string(),
                        chunk_index,
                        addresses: chunk.to_vec(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            requested = mints.len(),
            priced = partial.items.len(),
            "Token prices resolved"
        );
        partial
    }

    async fn fetch_chunk(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, f64>> {
        let ids = mints.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}ids={ids}", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssetError::Timeout(PRICE_TIMEOUT.as_secs())
                } else {
                    AssetError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::HttpStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: PriceResponse = response
            .json()
            .await
            .map_err(|e| AssetError::ParseResponse(e.to_string()))?;

        Ok(body
            .data
            .into_iter()
            .filter_map(|(mint, entry)| Some((mint.parse().ok()?, entry?.usd()?)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_entry_accepts_strings_and_numbers() {
        let entry: PriceEntry = serde_json::from_str(r#"{"price": "1.25"}"#).unwrap();
        assert_eq!(entry.usd(), Some(1.25));
        let entry: PriceEntry = serde_json::from_str(r#"{"price": 3}"#).unwrap();
        assert_eq!(entry.usd(), Some(3.0));
        let entry: PriceEntry = serde_json::from_str(r#"{"price": null}"#).unwrap();
        assert_eq!(entry.usd(), None);
    }

    #[test]
    fn null_entries_are_tolerated() {
        let body: PriceResponse = serde_json::from_str(r#"{"data": {"abc": null}}"#).unwrap();
        assert!(body.data["abc"].is_none());
    }
}
