//! Subscription settlement orchestration
//!
//! Drives one subscribe or unsubscribe through quote, conversion, submission
//! and confirmation, keeps at most one operation in flight per strategy, and
//! owns the local membership view.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::config::SettlementConfig;
use crate::errors::{SettlementError, SettlementResult};
use crate::fee::FeeConverter;
use crate::ledger::{LedgerGateway, NewStrategy, Receipt, StrategyId};
use crate::oracle::{PriceOracle, Quote};
use crate::session::Session;

use super::listener::{NoOpListener, SettlementListener};
use super::membership::MembershipView;
use super::types::{OperationKind, PendingOperation, Settlement, SettlementPhase};

/// Settles membership changes against the registry.
///
/// Holds no session: every write takes the caller's session explicitly.
pub struct SettlementCore<O, L, N = NoOpListener> {
    oracle: O,
    ledger: L,
    listener: N,
    converter: FeeConverter,
    confirmation_timeout: Duration,
    view: RwLock<MembershipView>,
    pending: Mutex<HashMap<StrategyId, PendingOperation>>,
}

/// Slot in the pending table, released on drop.
///
/// An operation dropped after submission leaves its write in flight, so the
/// view can no longer be trusted.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<StrategyId, PendingOperation>>,
    view: &'a RwLock<MembershipView>,
    operation: PendingOperation,
    finished: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.operation.strategy_id);

        if !self.finished && self.operation.phase.is_past_submission() {
            warn!(
                "[{}] {} of strategy {} abandoned while {:?}; membership needs refresh",
                self.operation.id,
                self.operation.kind,
                self.operation.strategy_id,
                self.operation.phase
            );
            self.view.write().mark_stale();
        }
    }
}

impl<O, L> SettlementCore<O, L, NoOpListener>
where
    O: PriceOracle,
    L: LedgerGateway,
{
    pub fn new(oracle: O, ledger: L, config: &SettlementConfig) -> Self {
        Self {
            oracle,
            ledger,
            listener: NoOpListener,
            converter: FeeConverter::new(config.native_decimals),
            confirmation_timeout: config.confirmation_timeout(),
            view: RwLock::new(MembershipView::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<O, L, N> SettlementCore<O, L, N>
where
    O: PriceOracle,
    L: LedgerGateway,
    N: SettlementListener,
{
    /// Replace the listener notified of phase transitions
    pub fn with_listener<M: SettlementListener>(self, listener: M) -> SettlementCore<O, L, M> {
        SettlementCore {
            oracle: self.oracle,
            ledger: self.ledger,
            listener,
            converter: self.converter,
            confirmation_timeout: self.confirmation_timeout,
            view: self.view,
            pending: self.pending,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn listener(&self) -> &N {
        &self.listener
    }

    pub fn converter(&self) -> &FeeConverter {
        &self.converter
    }

    /// Subscribe the session's account to `strategy_id`, paying `fiat_fee`
    /// converted at a freshly fetched quote.
    pub async fn subscribe(
        &self,
        session: Option<&Session>,
        strategy_id: StrategyId,
        fiat_fee: Decimal,
    ) -> SettlementResult<Settlement> {
        let session = session.ok_or(SettlementError::NoSession)?;
        let mut guard = self.begin(strategy_id, OperationKind::Subscribe, session.account())?;

        let result = self
            .run_subscribe(&mut guard, session, strategy_id, fiat_fee)
            .await;
        self.finish(&mut guard, result)
    }

    /// Remove the session's account from `strategy_id`. No payment is
    /// attached, so no quote is fetched.
    pub async fn unsubscribe(
        &self,
        session: Option<&Session>,
        strategy_id: StrategyId,
    ) -> SettlementResult<Settlement> {
        let session = session.ok_or(SettlementError::NoSession)?;
        let mut guard = self.begin(strategy_id, OperationKind::Unsubscribe, session.account())?;

        let result = self.run_unsubscribe(&mut guard, session, strategy_id).await;
        self.finish(&mut guard, result)
    }

    async fn run_subscribe(
        &self,
        guard: &mut PendingGuard<'_>,
        session: &Session,
        strategy_id: StrategyId,
        fiat_fee: Decimal,
    ) -> SettlementResult<Settlement> {
        self.transition(guard, SettlementPhase::Quoting);
        let quote = self.oracle.get_quote().await?;

        self.transition(guard, SettlementPhase::Converting);
        let amount = self.converter.to_native(fiat_fee, &quote)?;
        debug!(
            "[{}] {} fee at rate {} is {} native units",
            guard.operation.id, fiat_fee, quote.rate, amount
        );

        self.transition(guard, SettlementPhase::Submitting);
        let pending = self
            .ledger
            .submit_subscribe(session, strategy_id, amount)
            .await?;

        self.transition(guard, SettlementPhase::Confirming);
        let receipt = self
            .ledger
            .await_confirmation(&pending, self.confirmation_timeout)
            .await?;

        Ok(Settlement {
            operation_id: guard.operation.id,
            strategy_id,
            kind: OperationKind::Subscribe,
            account: session.account(),
            quote: Some(quote),
            native_amount: Some(amount),
            receipt,
        })
    }

    async fn run_unsubscribe(
        &self,
        guard: &mut PendingGuard<'_>,
        session: &Session,
        strategy_id: StrategyId,
    ) -> SettlementResult<Settlement> {
        self.transition(guard, SettlementPhase::Submitting);
        let pending = self.ledger.submit_unsubscribe(session, strategy_id).await?;

        self.transition(guard, SettlementPhase::Confirming);
        let receipt = self
            .ledger
            .await_confirmation(&pending, self.confirmation_timeout)
            .await?;

        Ok(Settlement {
            operation_id: guard.operation.id,
            strategy_id,
            kind: OperationKind::Unsubscribe,
            account: session.account(),
            quote: None,
            native_amount: None,
            receipt,
        })
    }

    /// Claim the pending slot for `strategy_id`
    fn begin(
        &self,
        strategy_id: StrategyId,
        kind: OperationKind,
        account: Address,
    ) -> SettlementResult<PendingGuard<'_>> {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(&strategy_id) {
            debug!(
                "Refusing {} of strategy {}: {} already in flight",
                kind, strategy_id, existing.kind
            );
            return Err(SettlementError::OperationInProgress {
                strategy_id,
                kind: existing.kind,
            });
        }

        let operation = PendingOperation::new(strategy_id, kind, account);
        pending.insert(strategy_id, operation.clone());

        Ok(PendingGuard {
            pending: &self.pending,
            view: &self.view,
            operation,
            finished: false,
        })
    }

    fn transition(&self, guard: &mut PendingGuard<'_>, to: SettlementPhase) {
        let from = guard.operation.phase;
        guard.operation.phase = to;
        if let Some(entry) = self.pending.lock().get_mut(&guard.operation.strategy_id) {
            entry.phase = to;
        }

        debug!(
            "[{}] {} strategy {}: {:?} -> {:?}",
            guard.operation.id, guard.operation.kind, guard.operation.strategy_id, from, to
        );
        self.listener.on_transition(&guard.operation, from, to);
    }

    fn finish(
        &self,
        guard: &mut PendingGuard<'_>,
        result: SettlementResult<Settlement>,
    ) -> SettlementResult<Settlement> {
        guard.finished = true;

        match result {
            Ok(settlement) => {
                let patched = self.view.write().apply_confirmed(
                    settlement.account,
                    settlement.kind,
                    settlement.strategy_id,
                );
                if !patched {
                    warn!(
                        "[{}] settled for {} which the membership view does not describe; marked stale",
                        settlement.operation_id, settlement.account
                    );
                }
                self.transition(guard, SettlementPhase::Settled);
                info!(
                    "[{}] {} of strategy {} settled in block {} ({})",
                    settlement.operation_id,
                    settlement.kind,
                    settlement.strategy_id,
                    settlement.receipt.block_number,
                    settlement.receipt.tx_hash
                );
                Ok(settlement)
            }
            Err(e) => {
                if e.is_ambiguous() {
                    warn!(
                        "[{}] outcome unknown, membership needs refresh: {}",
                        guard.operation.id, e
                    );
                    self.view.write().mark_stale();
                }
                self.transition(guard, SettlementPhase::Failed);
                info!(
                    "[{}] {} of strategy {} failed: {}",
                    guard.operation.id, guard.operation.kind, guard.operation.strategy_id, e
                );
                Err(e)
            }
        }
    }

    /// Whether the local view has `strategy_id`. Never touches the ledger.
    pub fn is_subscribed(&self, strategy_id: StrategyId) -> bool {
        self.view.read().contains(strategy_id)
    }

    /// Snapshot of the local view
    pub fn membership(&self) -> MembershipView {
        self.view.read().clone()
    }

    /// The view may disagree with the ledger and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.view.read().is_stale()
    }

    pub fn membership_owner(&self) -> Option<Address> {
        self.view.read().owner()
    }

    pub fn pending_operation(&self, strategy_id: StrategyId) -> Option<PendingOperation> {
        self.pending.lock().get(&strategy_id).cloned()
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.pending.lock().values().cloned().collect()
    }

    /// Replace the local view with the ledger's membership of `account`
    pub async fn refresh_membership(
        &self,
        account: Address,
    ) -> SettlementResult<BTreeSet<StrategyId>> {
        let members = self.ledger.get_membership(account).await?;
        debug!("Membership of {}: {:?}", account, members);
        self.view.write().replace(account, members.clone());
        Ok(members)
    }

    /// Follow a wallet switch: reload for the new account, or forget the
    /// view when disconnected.
    pub async fn on_session_changed(
        &self,
        session: Option<&Session>,
    ) -> SettlementResult<()> {
        match session {
            Some(session) => {
                info!("Session changed to {}", session.account());
                self.refresh_membership(session.account()).await?;
            }
            None => {
                info!("Session disconnected");
                self.view.write().clear();
            }
        }
        Ok(())
    }

    /// Publish a new strategy as the session's account
    pub async fn create_strategy(
        &self,
        session: Option<&Session>,
        strategy: NewStrategy,
    ) -> SettlementResult<Receipt> {
        let session = session.ok_or(SettlementError::NoSession)?;
        info!(
            "Creating strategy {} for {}",
            strategy.uid,
            session.account()
        );

        let receipt = self
            .ledger
            .create_strategy(session, &strategy, self.confirmation_timeout)
            .await?;
        info!(
            "Strategy {} created in block {}",
            strategy.uid, receipt.block_number
        );
        Ok(receipt)
    }

    /// Native amount `fiat_fee` would cost right now, without writing
    pub async fn preview_fee(&self, fiat_fee: Decimal) -> SettlementResult<(Quote, U256)> {
        let quote = self.oracle.get_quote().await?;
        let amount = self.converter.to_native(fiat_fee, &quote)?;
        Ok((quote, amount))
    }
}
