//! Registry data types as seen from this side of the ledger

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger-assigned strategy identifier
pub type StrategyId = u64;

/// A strategy as stored on the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    /// Account that registered the strategy
    pub provider: Address,
    /// Opaque off-chain content reference
    pub uid: String,
    /// Fee in smallest native units
    pub subscription_fee: U256,
    /// Billing cadence, e.g. "monthly"
    pub subscription_period: String,
    pub roi: u64,
    pub profitability: u64,
    pub risk: u64,
    pub active: bool,
}

/// Parameters for registering a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStrategy {
    pub uid: String,
    /// Fee in smallest native units
    pub subscription_fee: U256,
    pub subscription_period: String,
    pub roi: u64,
    pub profitability: u64,
    pub risk: u64,
}

/// Kind of registry write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    CreateStrategy,
    Subscribe {
        strategy_id: StrategyId,
        value: U256,
    },
    Unsubscribe {
        strategy_id: StrategyId,
    },
}

/// A write the ledger accepted for inclusion but has not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub tx_hash: TxHash,
    pub kind: WriteKind,
    pub from: Address,
    pub submitted_at: DateTime<Utc>,
}

impl PendingWrite {
    pub fn new(tx_hash: TxHash, kind: WriteKind, from: Address) -> Self {
        Self {
            tx_hash,
            kind,
            from,
            submitted_at: Utc::now(),
        }
    }
}

/// Proof of durable inclusion of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
}
