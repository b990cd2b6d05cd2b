//! Fiat-per-native-asset price quotes
//!
//! - [`PriceOracle`] - one-shot quote source, no retry, no caching
//! - [`CoinGeckoOracle`] - HTTP implementation against the simple-price API
//! - [`mock::MockOracle`] - settable rate for tests

mod client;
mod types;

pub use client::{mock, CoinGeckoOracle, PriceOracle};
pub use types::Quote;
