//! Strategy registry access
//!
//! - [`LedgerGateway`] - typed façade with split submit/confirm writes
//! - [`EvmLedgerGateway`] - contract bindings over JSON-RPC
//! - [`mock::MockLedger`] - in-memory registry for tests

mod evm;
mod gateway;
pub mod mock;
mod types;

pub use evm::EvmLedgerGateway;
pub use gateway::LedgerGateway;
pub use types::{NewStrategy, PendingWrite, Receipt, Strategy, StrategyId, WriteKind};
