//! In-memory registry for testing settlement without a chain.
//!
//! Enforces the registry's refusal policy at submission time, the way a node
//! refuses a transaction whose gas estimation reverts, and applies a write's
//! effect only when its confirmation is handed out.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::errors::{RejectReason, SettlementError, SettlementResult};
use crate::session::Session;

use super::gateway::LedgerGateway;
use super::types::{NewStrategy, PendingWrite, Receipt, Strategy, StrategyId, WriteKind};

/// How `confirm` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Confirm as soon as asked
    Immediate,
    /// Never confirm (the write stays in the mempool)
    Never,
    /// Confirm once [`MockLedger::release`] is called, one write per release
    Gated,
    /// Include the write but revert it
    Revert,
}

/// Mock registry
#[derive(Clone)]
pub struct MockLedger {
    pub strategies: Arc<Mutex<Vec<Strategy>>>,
    pub subscriptions: Arc<Mutex<HashMap<Address, BTreeSet<StrategyId>>>>,
    /// Every write accepted for inclusion, in submission order
    pub submitted: Arc<Mutex<Vec<PendingWrite>>>,
    drafts: Arc<Mutex<HashMap<TxHash, (Address, NewStrategy)>>>,
    landed: Arc<Mutex<HashSet<TxHash>>>,
    confirm_mode: Arc<Mutex<ConfirmMode>>,
    gate: Arc<Notify>,
    reject_next: Arc<Mutex<Option<RejectReason>>>,
    lose_next_ack: Arc<Mutex<bool>>,
    fail_reads: Arc<Mutex<bool>>,
    next_tx: Arc<AtomicU64>,
    block_number: Arc<AtomicU64>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            strategies: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            drafts: Arc::new(Mutex::new(HashMap::new())),
            landed: Arc::new(Mutex::new(HashSet::new())),
            confirm_mode: Arc::new(Mutex::new(ConfirmMode::Immediate)),
            gate: Arc::new(Notify::new()),
            reject_next: Arc::new(Mutex::new(None)),
            lose_next_ack: Arc::new(Mutex::new(false)),
            fail_reads: Arc::new(Mutex::new(false)),
            next_tx: Arc::new(AtomicU64::new(1)),
            block_number: Arc::new(AtomicU64::new(100)),
        }
    }

    /// Register an active strategy with the given fee; returns its id
    pub fn add_strategy(&self, subscription_fee: U256) -> StrategyId {
        let mut strategies = self.strategies.lock();
        let id = strategies.len() as StrategyId + 1;
        strategies.push(Strategy {
            id,
            provider: Address::repeat_byte(0xAA),
            uid: format!("uid-{}", id),
            subscription_fee,
            subscription_period: "monthly".into(),
            roi: 0,
            profitability: 0,
            risk: 0,
            active: true,
        });
        id
    }

    pub fn set_active(&self, strategy_id: StrategyId, active: bool) {
        if let Some(s) = self
            .strategies
            .lock()
            .iter_mut()
            .find(|s| s.id == strategy_id)
        {
            s.active = active;
        }
    }

    /// Seed chain-side membership directly
    pub fn seed_subscription(&self, account: Address, strategy_id: StrategyId) {
        self.subscriptions
            .lock()
            .entry(account)
            .or_default()
            .insert(strategy_id);
    }

    pub fn members_of(&self, account: Address) -> BTreeSet<StrategyId> {
        self.subscriptions
            .lock()
            .get(&account)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_confirm_mode(&self, mode: ConfirmMode) {
        *self.confirm_mode.lock() = mode;
    }

    /// Let one gated confirmation through
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Refuse the next submission with `reason`
    pub fn reject_next(&self, reason: RejectReason) {
        *self.reject_next.lock() = Some(reason);
    }

    /// Accept the next submission but fail its acknowledgement, as when the
    /// connection drops after the transaction was broadcast
    pub fn lose_next_ack(&self) {
        *self.lose_next_ack.lock() = true;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().len()
    }

    /// Apply every accepted-but-unconfirmed write, as if the chain caught up
    pub fn land_unconfirmed(&self) {
        let writes: Vec<PendingWrite> = self.submitted.lock().clone();
        for write in writes {
            self.land(&write);
        }
    }

    fn land(&self, write: &PendingWrite) {
        if !self.landed.lock().insert(write.tx_hash) {
            return;
        }

        match write.kind {
            WriteKind::Subscribe { strategy_id, .. } => {
                self.seed_subscription(write.from, strategy_id);
            }
            WriteKind::Unsubscribe { strategy_id } => {
                if let Some(set) = self.subscriptions.lock().get_mut(&write.from) {
                    set.remove(&strategy_id);
                }
            }
            WriteKind::CreateStrategy => {
                if let Some((provider, draft)) = self.drafts.lock().remove(&write.tx_hash) {
                    let mut strategies = self.strategies.lock();
                    let id = strategies.len() as StrategyId + 1;
                    strategies.push(Strategy {
                        id,
                        provider,
                        uid: draft.uid,
                        subscription_fee: draft.subscription_fee,
                        subscription_period: draft.subscription_period,
                        roi: draft.roi,
                        profitability: draft.profitability,
                        risk: draft.risk,
                        active: true,
                    });
                }
            }
        }
    }

    fn accept(&self, kind: WriteKind, from: Address) -> SettlementResult<PendingWrite> {
        if let Some(reason) = self.reject_next.lock().take() {
            return Err(SettlementError::WriteRejected(reason));
        }

        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let pending = PendingWrite::new(TxHash::left_padding_from(&n.to_be_bytes()), kind, from);
        self.submitted.lock().push(pending.clone());

        if std::mem::take(&mut *self.lose_next_ack.lock()) {
            return Err(SettlementError::SubmissionUnknown(format!(
                "connection lost after broadcasting {}",
                pending.tx_hash
            )));
        }
        Ok(pending)
    }

    fn check_subscribable(&self, account: Address, strategy_id: StrategyId, value: U256) -> SettlementResult<()> {
        let fee = {
            let strategies = self.strategies.lock();
            let strategy = strategies
                .iter()
                .find(|s| s.id == strategy_id)
                .ok_or_else(|| RejectReason::Refused(format!("strategy {} does not exist", strategy_id)))?;
            if !strategy.active {
                return Err(RejectReason::Refused(format!("strategy {} is not active", strategy_id)).into());
            }
            strategy.subscription_fee
        };

        if self.members_of(account).contains(&strategy_id) {
            return Err(RejectReason::AlreadySubscribed.into());
        }
        if value < fee {
            return Err(RejectReason::InsufficientPayment.into());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn list_strategies(&self) -> SettlementResult<Vec<Strategy>> {
        if *self.fail_reads.lock() {
            return Err(SettlementError::ReadFailed("mock ledger offline".into()));
        }
        Ok(self.strategies.lock().clone())
    }

    async fn get_membership(&self, account: Address) -> SettlementResult<BTreeSet<StrategyId>> {
        if *self.fail_reads.lock() {
            return Err(SettlementError::ReadFailed("mock ledger offline".into()));
        }
        Ok(self.members_of(account))
    }

    async fn submit_create_strategy(
        &self,
        session: &Session,
        strategy: &NewStrategy,
    ) -> SettlementResult<PendingWrite> {
        let pending = self.accept(WriteKind::CreateStrategy, session.account())?;
        self.drafts
            .lock()
            .insert(pending.tx_hash, (session.account(), strategy.clone()));
        Ok(pending)
    }

    async fn submit_subscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
        value: U256,
    ) -> SettlementResult<PendingWrite> {
        self.check_subscribable(session.account(), strategy_id, value)?;
        self.accept(WriteKind::Subscribe { strategy_id, value }, session.account())
    }

    async fn submit_unsubscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
    ) -> SettlementResult<PendingWrite> {
        if !self.members_of(session.account()).contains(&strategy_id) {
            return Err(RejectReason::NotSubscribed.into());
        }
        self.accept(WriteKind::Unsubscribe { strategy_id }, session.account())
    }

    async fn confirm(&self, pending: &PendingWrite) -> SettlementResult<Receipt> {
        let mode = *self.confirm_mode.lock();
        match mode {
            ConfirmMode::Immediate => {}
            ConfirmMode::Never => std::future::pending::<()>().await,
            ConfirmMode::Gated => self.gate.notified().await,
            ConfirmMode::Revert => {
                return Err(RejectReason::Refused(format!(
                    "transaction {} reverted",
                    pending.tx_hash
                ))
                .into());
            }
        }

        self.land(pending);
        Ok(Receipt {
            tx_hash: pending.tx_hash,
            block_number: self.block_number.fetch_add(1, Ordering::SeqCst),
            gas_used: 21_000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn session() -> Session {
        Session::from_private_key(KEY, None).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_lands_on_confirm() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(100u64));
        let session = session();

        let pending = ledger
            .submit_subscribe(&session, id, U256::from(100u64))
            .await
            .unwrap();
        assert!(ledger.members_of(session.account()).is_empty());

        ledger.confirm(&pending).await.unwrap();
        assert!(ledger.members_of(session.account()).contains(&id));
    }

    #[tokio::test]
    async fn test_refusals() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(100u64));
        let session = session();

        let err = ledger
            .submit_subscribe(&session, id, U256::from(99u64))
            .await
            .unwrap_err();
        assert_eq!(err, SettlementError::from(RejectReason::InsufficientPayment));

        let err = ledger.submit_unsubscribe(&session, id).await.unwrap_err();
        assert_eq!(err, SettlementError::from(RejectReason::NotSubscribed));

        ledger.seed_subscription(session.account(), id);
        let err = ledger
            .submit_subscribe(&session, id, U256::from(100u64))
            .await
            .unwrap_err();
        assert_eq!(err, SettlementError::from(RejectReason::AlreadySubscribed));

        let err = ledger
            .submit_subscribe(&session, 42, U256::from(100u64))
            .await
            .unwrap_err();
        assert!(matches!(err.reject_reason(), Some(RejectReason::Refused(_))));

        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_one_shot_times_out_when_never_confirmed() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(1u64));
        ledger.set_confirm_mode(ConfirmMode::Never);
        let session = session();

        let err = ledger
            .subscribe(&session, id, U256::from(1u64), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_ambiguous());

        // the write can still land later
        ledger.land_unconfirmed();
        assert!(ledger.members_of(session.account()).contains(&id));
    }

    #[tokio::test]
    async fn test_create_strategy_appends_in_ledger_order() {
        let ledger = MockLedger::new();
        ledger.add_strategy(U256::from(1u64));
        let session = session();

        let draft = NewStrategy {
            uid: "123".into(),
            subscription_fee: U256::from(5u64),
            subscription_period: "monthly".into(),
            roi: 30,
            profitability: 78,
            risk: 7,
        };
        let receipt = ledger
            .create_strategy(&session, &draft, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.gas_used, 21_000);

        let strategies = ledger.list_strategies().await.unwrap();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[1].id, 2);
        assert_eq!(strategies[1].provider, session.account());
        assert_eq!(strategies[1].uid, "123");
    }

    #[tokio::test]
    async fn test_inactive_strategy_and_forced_rejection() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(1u64));
        let session = session();

        ledger.set_active(id, false);
        let err = ledger
            .submit_subscribe(&session, id, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err.reject_reason(), Some(RejectReason::Refused(_))));

        ledger.set_active(id, true);
        ledger.reject_next(RejectReason::Refused("paused".into()));
        let err = ledger
            .submit_subscribe(&session, id, U256::from(1u64))
            .await
            .unwrap_err();
        assert_eq!(err, SettlementError::from(RejectReason::Refused("paused".into())));

        assert!(ledger
            .submit_subscribe(&session, id, U256::from(1u64))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reverted_write_does_not_land() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(1u64));
        ledger.set_confirm_mode(ConfirmMode::Revert);
        let session = session();

        let pending = ledger
            .submit_subscribe(&session, id, U256::from(1u64))
            .await
            .unwrap();
        let err = ledger.confirm(&pending).await.unwrap_err();

        assert!(matches!(err.reject_reason(), Some(RejectReason::Refused(_))));
        assert!(!err.is_ambiguous());
        assert!(ledger.members_of(session.account()).is_empty());
    }

    #[tokio::test]
    async fn test_lost_ack_is_ambiguous_but_recorded() {
        let ledger = MockLedger::new();
        let id = ledger.add_strategy(U256::from(1u64));
        ledger.lose_next_ack();
        let session = session();

        let err = ledger
            .submit_subscribe(&session, id, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SubmissionUnknown(_)));
        assert!(err.is_ambiguous());
        assert_eq!(ledger.submission_count(), 1);

        ledger.land_unconfirmed();
        assert!(ledger.members_of(session.account()).contains(&id));
    }

    #[tokio::test]
    async fn test_read_failures() {
        let ledger = MockLedger::new();
        ledger.set_fail_reads(true);
        assert!(matches!(
            ledger.list_strategies().await,
            Err(SettlementError::ReadFailed(_))
        ));
        assert!(matches!(
            ledger.get_membership(Address::ZERO).await,
            Err(SettlementError::ReadFailed(_))
        ));
    }
}
