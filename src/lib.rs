#![deny(unreachable_pub)]
pub mod config;
pub mod fee;
pub mod ledger;
pub mod network;
pub mod oracle;
pub mod runner;
pub mod session;
pub mod settlement;
mod consts;
mod errors;

pub use consts::{COINGECKO_API_URL, DEFAULT_REGISTRY_ADDRESS, NATIVE_DECIMALS};
pub use errors::{Error, RejectReason, Result, SettlementError, SettlementResult};
pub use fee::FeeConverter;
pub use ledger::{EvmLedgerGateway, LedgerGateway, NewStrategy, Receipt, Strategy, StrategyId};
pub use network::Network;
pub use oracle::{CoinGeckoOracle, PriceOracle, Quote};
pub use runner::SubscriptionRunner;
pub use session::Session;
pub use settlement::{
    MembershipView, OperationKind, PendingOperation, Settlement, SettlementCore,
    SettlementListener, SettlementPhase,
};
