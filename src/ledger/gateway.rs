//! Registry abstraction - enables mocking for tests

use std::collections::BTreeSet;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use log::warn;

use crate::errors::{SettlementError, SettlementResult};
use crate::session::Session;

use super::types::{NewStrategy, PendingWrite, Receipt, Strategy, StrategyId};

/// Typed façade over the strategy registry contract.
///
/// Writes come in two halves: `submit_*` returns once the ledger has accepted
/// the transaction for inclusion, and [`confirm`](LedgerGateway::confirm)
/// resolves only once that inclusion is durable. Callers that do not need to
/// observe the split use the one-shot provided methods.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// All strategies, in ledger order
    async fn list_strategies(&self) -> SettlementResult<Vec<Strategy>>;

    /// Strategy ids `account` is subscribed to
    async fn get_membership(&self, account: Address) -> SettlementResult<BTreeSet<StrategyId>>;

    async fn submit_create_strategy(
        &self,
        session: &Session,
        strategy: &NewStrategy,
    ) -> SettlementResult<PendingWrite>;

    /// Submit a subscription attaching `value` as payment
    async fn submit_subscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
        value: U256,
    ) -> SettlementResult<PendingWrite>;

    async fn submit_unsubscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
    ) -> SettlementResult<PendingWrite>;

    /// Wait for durable inclusion of a submitted write.
    ///
    /// Has no deadline of its own; a write that reverted on inclusion is
    /// reported as `WriteRejected`.
    async fn confirm(&self, pending: &PendingWrite) -> SettlementResult<Receipt>;

    /// [`confirm`](LedgerGateway::confirm) bounded by `deadline`
    async fn await_confirmation(
        &self,
        pending: &PendingWrite,
        deadline: Duration,
    ) -> SettlementResult<Receipt> {
        match tokio::time::timeout(deadline, self.confirm(pending)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "No confirmation for {} within {:?}",
                    pending.tx_hash, deadline
                );
                Err(SettlementError::WriteTimedOut {
                    tx_hash: pending.tx_hash,
                })
            }
        }
    }

    async fn create_strategy(
        &self,
        session: &Session,
        strategy: &NewStrategy,
        deadline: Duration,
    ) -> SettlementResult<Receipt> {
        let pending = self.submit_create_strategy(session, strategy).await?;
        self.await_confirmation(&pending, deadline).await
    }

    async fn subscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
        value: U256,
        deadline: Duration,
    ) -> SettlementResult<Receipt> {
        let pending = self.submit_subscribe(session, strategy_id, value).await?;
        self.await_confirmation(&pending, deadline).await
    }

    async fn unsubscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
        deadline: Duration,
    ) -> SettlementResult<Receipt> {
        let pending = self.submit_unsubscribe(session, strategy_id).await?;
        self.await_confirmation(&pending, deadline).await
    }
}
