//! Local view of the connected account's subscriptions

use std::collections::BTreeSet;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use crate::ledger::StrategyId;

use super::types::OperationKind;

/// Cached membership for one account.
///
/// Only ever replaced wholesale from the ledger, or patched by a write whose
/// confirmation was observed. Anything else marks it stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipView {
    owner: Option<Address>,
    members: BTreeSet<StrategyId>,
    stale: bool,
    refreshed_at: Option<DateTime<Utc>>,
}

impl MembershipView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account the view currently describes
    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    pub fn members(&self) -> &BTreeSet<StrategyId> {
        &self.members
    }

    pub fn contains(&self, strategy_id: StrategyId) -> bool {
        self.members.contains(&strategy_id)
    }

    /// The view may have diverged from the ledger
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Replace everything with the ledger's set for `owner`
    pub fn replace(&mut self, owner: Address, members: BTreeSet<StrategyId>) {
        self.owner = Some(owner);
        self.members = members;
        self.stale = false;
        self.refreshed_at = Some(Utc::now());
    }

    /// Forget the current account
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Apply a confirmed write by `account`.
    ///
    /// A view that was never loaded is claimed by `account` and patched, but
    /// stays stale since the rest of its membership is unknown. Returns false,
    /// and marks the view stale, when it belongs to a different account.
    pub fn apply_confirmed(
        &mut self,
        account: Address,
        kind: OperationKind,
        strategy_id: StrategyId,
    ) -> bool {
        match self.owner {
            Some(owner) if owner == account => {}
            Some(_) => {
                self.stale = true;
                return false;
            }
            None => {
                self.owner = Some(account);
                self.stale = true;
            }
        }

        match kind {
            OperationKind::Subscribe => self.members.insert(strategy_id),
            OperationKind::Unsubscribe => self.members.remove(&strategy_id),
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::repeat_byte(0x01)
    }

    fn bob() -> Address {
        Address::repeat_byte(0x02)
    }

    #[test]
    fn test_replace_clears_stale() {
        let mut view = MembershipView::new();
        view.mark_stale();
        view.replace(alice(), BTreeSet::from([1, 3]));

        assert!(!view.is_stale());
        assert_eq!(view.owner(), Some(alice()));
        assert!(view.contains(1));
        assert!(!view.contains(2));
        assert!(view.refreshed_at().is_some());
    }

    #[test]
    fn test_apply_confirmed_for_owner() {
        let mut view = MembershipView::new();
        view.replace(alice(), BTreeSet::new());

        assert!(view.apply_confirmed(alice(), OperationKind::Subscribe, 7));
        assert!(view.contains(7));
        assert!(view.apply_confirmed(alice(), OperationKind::Unsubscribe, 7));
        assert!(!view.contains(7));
        assert!(!view.is_stale());
    }

    #[test]
    fn test_apply_confirmed_for_other_account_marks_stale() {
        let mut view = MembershipView::new();
        view.replace(alice(), BTreeSet::from([1]));

        assert!(!view.apply_confirmed(bob(), OperationKind::Subscribe, 2));
        assert_eq!(view.members(), &BTreeSet::from([1]));
        assert!(view.is_stale());
    }

    #[test]
    fn test_unloaded_view_is_claimed_and_stays_stale() {
        let mut view = MembershipView::new();

        assert!(view.apply_confirmed(alice(), OperationKind::Subscribe, 2));
        assert_eq!(view.owner(), Some(alice()));
        assert!(view.contains(2));
        assert!(view.is_stale());

        view.replace(alice(), BTreeSet::from([2, 5]));
        assert!(!view.is_stale());
    }

    #[test]
    fn test_clear() {
        let mut view = MembershipView::new();
        view.replace(alice(), BTreeSet::from([1]));
        view.clear();
        assert_eq!(view, MembershipView::default());
    }
}
