//! Settlement of subscription changes
//!
//! - [`SettlementCore`] - orchestrates quote, conversion, submission and confirmation
//! - [`MembershipView`] - local cache of the connected account's subscriptions
//! - [`SettlementListener`] - observer of phase transitions

mod engine;
mod listener;
mod membership;
mod types;

pub use engine::SettlementCore;
pub use listener::{NoOpListener, RecordingListener, SettlementListener};
pub use membership::MembershipView;
pub use types::{OperationKind, PendingOperation, Settlement, SettlementPhase};
