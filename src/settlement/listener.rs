//! SettlementListener trait definition
//!
//! Defines how external components follow the progress of settlements.

use crate::ledger::StrategyId;

use super::types::{PendingOperation, SettlementPhase};

/// Receives every phase transition of every settlement operation.
///
/// Invoked synchronously from the settling task, after the core's own state
/// has been updated; implementations must not block.
pub trait SettlementListener: Send + Sync {
    /// `operation.phase` already equals `to`
    fn on_transition(&self, operation: &PendingOperation, from: SettlementPhase, to: SettlementPhase);
}

/// A no-op listener for when progress isn't observed
#[derive(Debug, Default)]
pub struct NoOpListener;

impl SettlementListener for NoOpListener {
    fn on_transition(&self, _operation: &PendingOperation, _from: SettlementPhase, _to: SettlementPhase) {
        // No-op
    }
}

/// Listener that keeps every transition, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingListener {
    transitions: parking_lot::Mutex<Vec<(PendingOperation, SettlementPhase, SettlementPhase)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phases entered by operations on `strategy_id`, in order
    pub fn phases_for(&self, strategy_id: StrategyId) -> Vec<SettlementPhase> {
        self.transitions
            .lock()
            .iter()
            .filter(|(op, _, _)| op.strategy_id == strategy_id)
            .map(|(_, _, to)| *to)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.lock().is_empty()
    }
}

impl SettlementListener for RecordingListener {
    fn on_transition(&self, operation: &PendingOperation, from: SettlementPhase, to: SettlementPhase) {
        self.transitions.lock().push((operation.clone(), from, to));
    }
}
