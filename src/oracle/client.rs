//! Price oracle abstraction - enables mocking for tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;

use crate::config::OracleConfig;
use crate::errors::{Error, SettlementError, SettlementResult};

use super::types::Quote;

/// Source of fiat-per-native-asset quotes.
///
/// Implementations perform exactly one outbound read per call and never
/// retry or fall back to a cached rate.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_quote(&self) -> SettlementResult<Quote>;
}

// ============================================================================
// CoinGecko Implementation
// ============================================================================

/// Quotes from the CoinGecko simple-price endpoint
pub struct CoinGeckoOracle {
    client: Client,
    base_url: String,
    asset_id: String,
    vs_currency: String,
}

impl CoinGeckoOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            asset_id: config.asset_id.clone(),
            vs_currency: config.vs_currency.clone(),
        })
    }

    fn price_url(&self) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, self.asset_id, self.vs_currency
        )
    }

    /// Pull `payload[asset_id][vs_currency]` out of a simple-price response.
    /// Rates are decoded straight into [`Decimal`] from the JSON number text.
    pub(crate) fn parse_rate(
        payload: &HashMap<String, HashMap<String, Decimal>>,
        asset_id: &str,
        vs_currency: &str,
    ) -> SettlementResult<Decimal> {
        let raw = payload
            .get(asset_id)
            .and_then(|prices| prices.get(vs_currency))
            .ok_or_else(|| {
                SettlementError::QuoteUnavailable(format!(
                    "response has no {}/{} price",
                    asset_id, vs_currency
                ))
            })?;

        if *raw <= Decimal::ZERO {
            return Err(SettlementError::QuoteUnavailable(format!(
                "non-positive rate {}",
                raw
            )));
        }
        Ok(*raw)
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn get_quote(&self) -> SettlementResult<Quote> {
        let url = self.price_url();
        debug!("Fetching quote from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SettlementError::QuoteUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SettlementError::QuoteUnavailable(format!(
                "quote service returned {}",
                response.status()
            )));
        }

        let payload: HashMap<String, HashMap<String, Decimal>> = response
            .json()
            .await
            .map_err(|e| SettlementError::QuoteUnavailable(format!("malformed payload: {}", e)))?;

        let rate = Self::parse_rate(&payload, &self.asset_id, &self.vs_currency)?;
        debug!("Quote: 1 {} = {} {}", self.asset_id, rate, self.vs_currency);

        Ok(Quote::new(rate))
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock oracle for exercising settlement without network access.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Mock oracle returning a settable rate, or failing when none is set
    #[derive(Clone)]
    pub struct MockOracle {
        pub rate: Arc<Mutex<Option<Decimal>>>,
        calls: Arc<AtomicUsize>,
    }

    impl MockOracle {
        pub fn new(rate: Decimal) -> Self {
            Self {
                rate: Arc::new(Mutex::new(Some(rate))),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Oracle whose every call fails with `QuoteUnavailable`
        pub fn unavailable() -> Self {
            Self {
                rate: Arc::new(Mutex::new(None)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn set_rate(&self, rate: Option<Decimal>) {
            *self.rate.lock() = rate;
        }

        /// Number of `get_quote` calls so far
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceOracle for MockOracle {
        async fn get_quote(&self) -> SettlementResult<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rate = *self.rate.lock();
            rate.map(Quote::new)
                .ok_or_else(|| SettlementError::QuoteUnavailable("mock oracle offline".into()))
        }
    }
}
