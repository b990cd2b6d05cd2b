//! Registry gateway backed by an EVM JSON-RPC endpoint

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use alloy::contract::Error as ContractError;
use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Url;

use crate::config::Settings;
use crate::errors::{Error, RejectReason, SettlementError, SettlementResult};
use crate::session::Session;

use super::gateway::LedgerGateway;
use super::types::{NewStrategy, PendingWrite, Receipt, Strategy, StrategyId, WriteKind};

// Registry interface (the subset this SDK calls)
sol! {
    #[sol(rpc)]
    contract ITradingAlgoRegistry {
        struct StrategyRecord {
            uint256 id;
            address provider;
            uint256 subscriptionFee;
            string subscriptionPeriod;
            string strategyUid;
            uint256 roi;
            uint256 profitability;
            uint256 risk;
            bool active;
        }

        function createStrategy(
            string strategyUid,
            uint256 subscriptionFee,
            string subscriptionPeriod,
            uint256 roi,
            uint256 profitability,
            uint256 risk
        ) external;
        function getAllStrategies() external view returns (StrategyRecord[] memory);
        function subscribeStrategy(uint256 strategyId) external payable;
        function unsubscribeStrategy(uint256 strategyId) external;
        function getUserSubscriptions(address user) external view returns (uint256[] memory);
    }
}

/// Gateway talking to the deployed registry contract
pub struct EvmLedgerGateway {
    rpc_url: Url,
    contract: Address,
    poll_interval: Duration,
    confirmations: u64,
}

impl EvmLedgerGateway {
    pub fn new(
        rpc_url: &str,
        contract: &str,
        poll_interval: Duration,
        confirmations: u64,
    ) -> Result<Self, Error> {
        let rpc_url = Url::parse(rpc_url).map_err(|e| Error::Url {
            value: rpc_url.to_string(),
            reason: e.to_string(),
        })?;
        let contract = Address::from_str(contract).map_err(|e| Error::Address {
            value: contract.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            rpc_url,
            contract,
            poll_interval,
            confirmations: confirmations.max(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        Self::new(
            settings.network.rpc_url(),
            &settings.network.contract_address,
            settings.settlement.receipt_poll_interval(),
            settings.settlement.confirmations,
        )
    }

    pub fn contract_address(&self) -> Address {
        self.contract
    }

    fn submitted(&self, tx_hash: TxHash, kind: WriteKind, from: Address) -> PendingWrite {
        info!("Submitted {:?} as {} from {}", kind, tx_hash, from);
        PendingWrite::new(tx_hash, kind, from)
    }
}

/// Map a submission failure onto the ledger's refusal taxonomy
pub(crate) fn classify_rejection(message: &str) -> RejectReason {
    let lower = message.to_lowercase();

    if lower.contains("already subscribed") {
        RejectReason::AlreadySubscribed
    } else if lower.contains("not subscribed") {
        RejectReason::NotSubscribed
    } else if lower.contains("insufficient funds") {
        // wallet balance, not the attached payment
        RejectReason::Refused(message.to_string())
    } else if lower.contains("insufficient")
        || lower.contains("incorrect fee")
        || lower.contains("incorrect payment")
    {
        RejectReason::InsufficientPayment
    } else {
        RejectReason::Refused(message.to_string())
    }
}

/// Map a `send()` failure. A transport failure may hide a broadcast that
/// went through; anything the node answered is a definite refusal.
fn submission_failed(err: ContractError) -> SettlementError {
    match &err {
        ContractError::TransportError(rpc) if rpc.is_transport_error() => {
            warn!("Submission outcome unknown: {}", err);
            SettlementError::SubmissionUnknown(err.to_string())
        }
        _ => SettlementError::WriteRejected(classify_rejection(&err.to_string())),
    }
}

fn read_failed(err: impl std::fmt::Display) -> SettlementError {
    SettlementError::ReadFailed(err.to_string())
}

fn narrow(field: &str, value: U256) -> SettlementResult<u64> {
    u64::try_from(value)
        .map_err(|_| SettlementError::ReadFailed(format!("{} {} out of range", field, value)))
}

impl TryFrom<ITradingAlgoRegistry::StrategyRecord> for Strategy {
    type Error = SettlementError;

    fn try_from(raw: ITradingAlgoRegistry::StrategyRecord) -> SettlementResult<Self> {
        Ok(Strategy {
            id: narrow("id", raw.id)?,
            provider: raw.provider,
            uid: raw.strategyUid,
            subscription_fee: raw.subscriptionFee,
            subscription_period: raw.subscriptionPeriod,
            roi: narrow("roi", raw.roi)?,
            profitability: narrow("profitability", raw.profitability)?,
            risk: narrow("risk", raw.risk)?,
            active: raw.active,
        })
    }
}

#[async_trait]
impl LedgerGateway for EvmLedgerGateway {
    async fn list_strategies(&self) -> SettlementResult<Vec<Strategy>> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let registry = ITradingAlgoRegistry::new(self.contract, &provider);

        let records = registry
            .getAllStrategies()
            .call()
            .await
            .map_err(read_failed)?;

        records.into_iter().map(Strategy::try_from).collect()
    }

    async fn get_membership(&self, account: Address) -> SettlementResult<BTreeSet<StrategyId>> {
        debug!("Fetching subscriptions for {}", account);
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let registry = ITradingAlgoRegistry::new(self.contract, &provider);

        let ids = registry
            .getUserSubscriptions(account)
            .call()
            .await
            .map_err(read_failed)?;

        ids.into_iter().map(|id| narrow("strategy id", id)).collect()
    }

    async fn submit_create_strategy(
        &self,
        session: &Session,
        strategy: &NewStrategy,
    ) -> SettlementResult<PendingWrite> {
        let provider = ProviderBuilder::new()
            .wallet(session.wallet())
            .connect_http(self.rpc_url.clone());
        let registry = ITradingAlgoRegistry::new(self.contract, &provider);

        let pending = registry
            .createStrategy(
                strategy.uid.clone(),
                strategy.subscription_fee,
                strategy.subscription_period.clone(),
                U256::from(strategy.roi),
                U256::from(strategy.profitability),
                U256::from(strategy.risk),
            )
            .send()
            .await
            .map_err(submission_failed)?;

        Ok(self.submitted(*pending.tx_hash(), WriteKind::CreateStrategy, session.account()))
    }

    async fn submit_subscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
        value: U256,
    ) -> SettlementResult<PendingWrite> {
        let provider = ProviderBuilder::new()
            .wallet(session.wallet())
            .connect_http(self.rpc_url.clone());
        let registry = ITradingAlgoRegistry::new(self.contract, &provider);

        let pending = registry
            .subscribeStrategy(U256::from(strategy_id))
            .value(value)
            .send()
            .await
            .map_err(submission_failed)?;

        Ok(self.submitted(
            *pending.tx_hash(),
            WriteKind::Subscribe { strategy_id, value },
            session.account(),
        ))
    }

    async fn submit_unsubscribe(
        &self,
        session: &Session,
        strategy_id: StrategyId,
    ) -> SettlementResult<PendingWrite> {
        let provider = ProviderBuilder::new()
            .wallet(session.wallet())
            .connect_http(self.rpc_url.clone());
        let registry = ITradingAlgoRegistry::new(self.contract, &provider);

        let pending = registry
            .unsubscribeStrategy(U256::from(strategy_id))
            .send()
            .await
            .map_err(submission_failed)?;

        Ok(self.submitted(
            *pending.tx_hash(),
            WriteKind::Unsubscribe { strategy_id },
            session.account(),
        ))
    }

    async fn confirm(&self, pending: &PendingWrite) -> SettlementResult<Receipt> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());

        loop {
            match provider.get_transaction_receipt(pending.tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(SettlementError::WriteRejected(RejectReason::Refused(
                            format!("transaction {} reverted", pending.tx_hash),
                        )));
                    }

                    let included_at = receipt.block_number().unwrap_or_default();
                    match provider.get_block_number().await {
                        Ok(head) if head + 1 >= included_at + self.confirmations => {
                            info!("Confirmed {} in block {}", pending.tx_hash, included_at);
                            return Ok(Receipt {
                                tx_hash: pending.tx_hash,
                                block_number: included_at,
                                gas_used: receipt.gas_used(),
                            });
                        }
                        Ok(head) => debug!(
                            "{} included at {}, head {}, waiting for {} confirmations",
                            pending.tx_hash, included_at, head, self.confirmations
                        ),
                        Err(e) => warn!("Block number poll failed: {}", e),
                    }
                }
                Ok(None) => debug!("{} not yet included", pending.tx_hash),
                Err(e) => warn!("Receipt poll for {} failed: {}", pending.tx_hash, e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DEFAULT_REGISTRY_ADDRESS;
    use alloy::transports::TransportErrorKind;

    #[test]
    fn test_classify_rejection() {
        assert_eq!(
            classify_rejection("server returned an error response: execution reverted: Already subscribed"),
            RejectReason::AlreadySubscribed
        );
        assert_eq!(
            classify_rejection("execution reverted: Not subscribed to this strategy"),
            RejectReason::NotSubscribed
        );
        assert_eq!(
            classify_rejection("execution reverted: Insufficient subscription fee"),
            RejectReason::InsufficientPayment
        );
        assert_eq!(
            classify_rejection("execution reverted: Incorrect fee"),
            RejectReason::InsufficientPayment
        );
        assert!(matches!(
            classify_rejection("insufficient funds for gas * price + value"),
            RejectReason::Refused(_)
        ));
        assert!(matches!(
            classify_rejection("execution reverted: Strategy not active"),
            RejectReason::Refused(_)
        ));
    }

    #[test]
    fn test_submission_failures() {
        let lost = submission_failed(ContractError::TransportError(
            TransportErrorKind::custom_str("connection reset by peer"),
        ));
        assert!(matches!(lost, SettlementError::SubmissionUnknown(_)));
        assert!(lost.is_ambiguous());

        let refused = submission_failed(ContractError::UnknownFunction("subscribeStrategy".into()));
        assert!(matches!(
            refused.reject_reason(),
            Some(RejectReason::Refused(_))
        ));
    }

    #[test]
    fn test_record_conversion() {
        let record = ITradingAlgoRegistry::StrategyRecord {
            id: U256::from(3u64),
            provider: Address::repeat_byte(0x11),
            subscriptionFee: U256::from(10_000_000_000_000_000u64),
            subscriptionPeriod: "monthly".into(),
            strategyUid: "123".into(),
            roi: U256::from(30u64),
            profitability: U256::from(78u64),
            risk: U256::from(7u64),
            active: true,
        };

        let strategy = Strategy::try_from(record).unwrap();
        assert_eq!(strategy.id, 3);
        assert_eq!(strategy.uid, "123");
        assert_eq!(strategy.subscription_period, "monthly");
        assert_eq!(strategy.roi, 30);
        assert!(strategy.active);
    }

    #[test]
    fn test_record_conversion_out_of_range() {
        let record = ITradingAlgoRegistry::StrategyRecord {
            id: U256::MAX,
            provider: Address::ZERO,
            subscriptionFee: U256::ZERO,
            subscriptionPeriod: String::new(),
            strategyUid: String::new(),
            roi: U256::ZERO,
            profitability: U256::ZERO,
            risk: U256::ZERO,
            active: false,
        };
        assert!(matches!(
            Strategy::try_from(record),
            Err(SettlementError::ReadFailed(_))
        ));
    }

    #[test]
    fn test_new_validates_inputs() {
        let poll = Duration::from_millis(100);
        assert!(EvmLedgerGateway::new("http://localhost:8545", DEFAULT_REGISTRY_ADDRESS, poll, 1).is_ok());
        assert!(matches!(
            EvmLedgerGateway::new("not a url", DEFAULT_REGISTRY_ADDRESS, poll, 1),
            Err(Error::Url { .. })
        ));
        assert!(matches!(
            EvmLedgerGateway::new("http://localhost:8545", "0x1234", poll, 1),
            Err(Error::Address { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_rpc_is_read_failed() {
        let gateway = EvmLedgerGateway::new(
            "http://127.0.0.1:9",
            DEFAULT_REGISTRY_ADDRESS,
            Duration::from_millis(10),
            1,
        )
        .unwrap();

        assert!(matches!(
            gateway.list_strategies().await,
            Err(SettlementError::ReadFailed(_))
        ));
        assert!(matches!(
            gateway.get_membership(Address::ZERO).await,
            Err(SettlementError::ReadFailed(_))
        ));
    }
}
