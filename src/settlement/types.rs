//! Settlement state and results

use std::fmt;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{Receipt, StrategyId};
use crate::oracle::Quote;

/// Which membership change an operation settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Subscribe,
    Unsubscribe,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Subscribe => f.write_str("subscribe"),
            OperationKind::Unsubscribe => f.write_str("unsubscribe"),
        }
    }
}

/// Phase of one settlement operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementPhase {
    Idle,
    /// Fetching a fresh quote
    Quoting,
    /// Converting the fiat fee into native units
    Converting,
    /// Handing the write to the ledger
    Submitting,
    /// Accepted by the ledger, waiting for durable inclusion
    Confirming,
    Settled,
    Failed,
}

impl SettlementPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementPhase::Settled | SettlementPhase::Failed)
    }

    /// The write may already be on its way to the ledger
    pub fn is_past_submission(&self) -> bool {
        matches!(
            self,
            SettlementPhase::Submitting | SettlementPhase::Confirming
        )
    }
}

/// An in-flight write for one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Correlates log lines of one attempt
    pub id: Uuid,
    pub strategy_id: StrategyId,
    pub kind: OperationKind,
    pub account: Address,
    pub phase: SettlementPhase,
    pub started_at: DateTime<Utc>,
}

impl PendingOperation {
    pub(crate) fn new(strategy_id: StrategyId, kind: OperationKind, account: Address) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_id,
            kind,
            account,
            phase: SettlementPhase::Idle,
            started_at: Utc::now(),
        }
    }
}

/// A confirmed membership change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub operation_id: Uuid,
    pub strategy_id: StrategyId,
    pub kind: OperationKind,
    pub account: Address,
    /// Quote the payment was priced at (subscribe only)
    pub quote: Option<Quote>,
    /// Payment attached, in smallest native units (subscribe only)
    pub native_amount: Option<U256>,
    pub receipt: Receipt,
}
