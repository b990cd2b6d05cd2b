use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fiat-per-native-asset exchange rate, valid only at the instant it is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Fiat units for one whole native unit (e.g. USD per ETH)
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Quote stamped with the current time
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            fetched_at: Utc::now(),
        }
    }

    /// Age of the quote relative to now
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }
}
