use std::collections::BTreeSet;
use std::path::Path;

use alloy::primitives::{Address, U256};
use log::{info, warn};
use rust_decimal::Decimal;

use crate::config::{ConfigError, Settings};
use crate::errors::{Result, SettlementError};
use crate::ledger::{EvmLedgerGateway, LedgerGateway, NewStrategy, Receipt, Strategy, StrategyId};
use crate::oracle::{CoinGeckoOracle, Quote};
use crate::session::Session;
use crate::settlement::{Settlement, SettlementCore};

/// Runner wiring the settlement core to the live quote service and registry
pub struct SubscriptionRunner {
    settings: Settings,
    core: SettlementCore<CoinGeckoOracle, EvmLedgerGateway>,
    session: Option<Session>,
}

impl SubscriptionRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let path = path.to_str().ok_or_else(|| {
            ConfigError::Message(format!("config path {} is not valid UTF-8", path.display()))
        })?;
        Self::from_settings(Settings::new(path)?)
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        // 1. Setup Logging
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &settings.log.level);
        }
        env_logger::try_init().ok();

        // 2. Setup Network & Clients
        let network = settings.network.network;
        info!(
            "Using {} (chain {}) via {}",
            network,
            network.chain_id(),
            settings.network.rpc_url()
        );

        let oracle = CoinGeckoOracle::new(&settings.oracle)?;
        let ledger = EvmLedgerGateway::from_settings(&settings)?;
        info!("Registry contract at {}", ledger.contract_address());

        // 3. Optional wallet
        let session = match settings.network.wallet_private_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                let session = Session::from_private_key(key, Some(network.chain_id()))?;
                info!("Connected account {}", session.account());
                Some(session)
            }
            _ => {
                warn!("No wallet configured; writes will fail with no session");
                None
            }
        };

        let core = SettlementCore::new(oracle, ledger, &settings.settlement);
        Ok(Self {
            settings,
            core,
            session,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn core(&self) -> &SettlementCore<CoinGeckoOracle, EvmLedgerGateway> {
        &self.core
    }

    /// Connected account, if a wallet is configured
    pub fn account(&self) -> Option<Address> {
        self.session.as_ref().map(Session::account)
    }

    /// Current quote and what `fiat_fee` costs at it
    pub async fn quote(&self, fiat_fee: Decimal) -> Result<(Quote, U256)> {
        Ok(self.core.preview_fee(fiat_fee).await?)
    }

    pub async fn list_strategies(&self) -> Result<Vec<Strategy>> {
        Ok(self.core.ledger().list_strategies().await?)
    }

    /// Subscriptions of `account`, or of the connected account when `None`
    pub async fn subscriptions(&self, account: Option<Address>) -> Result<BTreeSet<StrategyId>> {
        let account = account
            .or_else(|| self.account())
            .ok_or(SettlementError::NoSession)?;
        Ok(self.core.refresh_membership(account).await?)
    }

    pub async fn subscribe(&self, strategy_id: StrategyId, fiat_fee: Decimal) -> Result<Settlement> {
        self.sync_view().await?;
        Ok(self
            .core
            .subscribe(self.session.as_ref(), strategy_id, fiat_fee)
            .await?)
    }

    pub async fn unsubscribe(&self, strategy_id: StrategyId) -> Result<Settlement> {
        self.sync_view().await?;
        Ok(self
            .core
            .unsubscribe(self.session.as_ref(), strategy_id)
            .await?)
    }

    pub async fn create_strategy(&self, strategy: NewStrategy) -> Result<Receipt> {
        Ok(self
            .core
            .create_strategy(self.session.as_ref(), strategy)
            .await?)
    }

    /// Load the connected account's membership before the first write
    async fn sync_view(&self) -> Result<()> {
        let session = self.session.as_ref().ok_or(SettlementError::NoSession)?;
        if self.core.membership_owner() != Some(session.account()) || self.core.needs_refresh() {
            self.core.on_session_changed(Some(session)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use rust_decimal_macros::dec;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn settings(extra: &str) -> Settings {
        Settings::from_toml(&format!(
            r#"
            [network]
            network = "base-sepolia"
            {}
            "#,
            extra
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_only_runner_has_no_session() {
        let runner = SubscriptionRunner::from_settings(settings("")).unwrap();
        assert!(runner.account().is_none());

        let err = runner.subscribe(1, dec!(19)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Settlement(SettlementError::NoSession)
        ));
        let err = runner.subscriptions(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Settlement(SettlementError::NoSession)
        ));
    }

    #[test]
    fn test_wallet_from_settings() {
        let runner =
            SubscriptionRunner::from_settings(settings(&format!("wallet_private_key = \"{}\"", KEY)))
                .unwrap();
        let expected = Session::from_private_key(KEY, None).unwrap().account();
        assert_eq!(runner.account(), Some(expected));
    }

    #[test]
    fn test_bad_contract_address() {
        let result = SubscriptionRunner::from_settings(settings("contract_address = \"0x1234\""));
        assert!(matches!(result, Err(Error::Address { .. })));
    }

    #[test]
    fn test_missing_config_file() {
        let result = SubscriptionRunner::new("does/not/exist.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
