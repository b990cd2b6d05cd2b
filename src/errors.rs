//! Error types for settlement and for the runner around it

use alloy::primitives::TxHash;
use thiserror::Error;

use crate::ledger::StrategyId;
use crate::settlement::OperationKind;

/// Why the ledger refused a write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("account is already subscribed to this strategy")]
    AlreadySubscribed,

    #[error("account is not subscribed to this strategy")]
    NotSubscribed,

    #[error("attached payment is below the strategy fee")]
    InsufficientPayment,

    #[error("{0}")]
    Refused(String),
}

/// Terminal failures of a settlement operation or of a ledger call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("no account connected")]
    NoSession,

    #[error("price quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("invalid fee: {0}")]
    InvalidFee(String),

    #[error("write rejected by ledger: {0}")]
    WriteRejected(RejectReason),

    #[error(
        "transaction {tx_hash} was submitted but not confirmed in time; \
         refresh membership before assuming an outcome"
    )]
    WriteTimedOut { tx_hash: TxHash },

    #[error(
        "submission outcome unknown ({0}); \
         refresh membership before assuming an outcome"
    )]
    SubmissionUnknown(String),

    #[error("ledger read failed: {0}")]
    ReadFailed(String),

    #[error("a {kind} operation for strategy {strategy_id} is already in progress")]
    OperationInProgress {
        strategy_id: StrategyId,
        kind: OperationKind,
    },
}

impl SettlementError {
    /// The write may or may not have landed; only a membership refresh can tell
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            SettlementError::WriteTimedOut { .. } | SettlementError::SubmissionUnknown(_)
        )
    }

    /// Rejection cause, if the ledger refused the write
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            SettlementError::WriteRejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<RejectReason> for SettlementError {
    fn from(reason: RejectReason) -> Self {
        SettlementError::WriteRejected(reason)
    }
}

/// Result type for settlement and ledger operations
pub type SettlementResult<T> = std::result::Result<T, SettlementError>;

/// Errors surfaced while wiring the SDK together
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid wallet private key: {0}")]
    Wallet(String),

    #[error("invalid address '{value}': {reason}")]
    Address { value: String, reason: String },

    #[error("invalid url '{value}': {reason}")]
    Url { value: String, reason: String },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

pub type Result<T> = std::result::Result<T, Error>;
