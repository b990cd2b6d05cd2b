use std::time::Duration;

use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::consts::{
    COINGECKO_API_URL, DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT_SECS,
    DEFAULT_QUOTE_ASSET_ID, DEFAULT_QUOTE_CURRENCY, DEFAULT_QUOTE_TIMEOUT_SECS,
    DEFAULT_RECEIPT_POLL_INTERVAL_MS, DEFAULT_REGISTRY_ADDRESS, NATIVE_DECIMALS,
};
use crate::network::Network;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Chain, registry contract and wallet
    pub network: NetworkConfig,
    /// Price quote service
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Confirmation and precision policy
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Chain name: "base", "base-sepolia", "sepolia" or "holesky"
    pub network: Network,
    /// RPC endpoint override; the network's public endpoint otherwise
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Registry contract address
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    /// Wallet private key (hex string). Without it the runner is read-only.
    /// Prefer APP_NETWORK__WALLET_PRIVATE_KEY over writing it to the file.
    #[serde(default)]
    pub wallet_private_key: Option<String>,
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }
}

fn default_contract_address() -> String {
    DEFAULT_REGISTRY_ADDRESS.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_url")]
    pub base_url: String,
    /// CoinGecko id of the native asset
    #[serde(default = "default_asset_id")]
    pub asset_id: String,
    /// Fiat currency fees are priced in
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            asset_id: default_asset_id(),
            vs_currency: default_vs_currency(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

fn default_oracle_url() -> String {
    COINGECKO_API_URL.to_string()
}

fn default_asset_id() -> String {
    DEFAULT_QUOTE_ASSET_ID.to_string()
}

fn default_vs_currency() -> String {
    DEFAULT_QUOTE_CURRENCY.to_string()
}

fn default_oracle_timeout() -> u64 {
    DEFAULT_QUOTE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Deadline for observing confirmation of a submitted write
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls
    #[serde(default = "default_poll_interval")]
    pub receipt_poll_interval_ms: u64,
    /// Blocks (including the inclusion block) before a write counts as confirmed
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Decimals of the native asset's smallest unit
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
}

impl SettlementConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout(),
            receipt_poll_interval_ms: default_poll_interval(),
            confirmations: default_confirmations(),
            native_decimals: default_native_decimals(),
        }
    }
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}

fn default_confirmations() -> u64 {
    DEFAULT_CONFIRMATIONS
}

fn default_native_decimals() -> u32 {
    NATIVE_DECIMALS
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment overrides the file, e.g. APP_NETWORK__WALLET_PRIVATE_KEY=...
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse settings from an in-memory TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_use_defaults() {
        let settings = Settings::from_toml(
            r#"
            [network]
            network = "holesky"
            "#,
        )
        .unwrap();

        assert_eq!(settings.network.network, Network::Holesky);
        assert_eq!(settings.network.contract_address, DEFAULT_REGISTRY_ADDRESS);
        assert_eq!(settings.network.rpc_url(), Network::Holesky.default_rpc_url());
        assert!(settings.network.wallet_private_key.is_none());
        assert_eq!(settings.oracle.asset_id, "ethereum");
        assert_eq!(settings.oracle.vs_currency, "usd");
        assert_eq!(settings.settlement.native_decimals, 18);
        assert_eq!(
            settings.settlement.confirmation_timeout(),
            Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
        );
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_toml(
            r#"
            [network]
            network = "base-sepolia"
            rpc_url = "http://localhost:8545"

            [oracle]
            vs_currency = "eur"
            timeout_secs = 3

            [settlement]
            confirmation_timeout_secs = 30
            confirmations = 3

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.network.rpc_url(), "http://localhost:8545");
        assert_eq!(settings.oracle.vs_currency, "eur");
        assert_eq!(settings.oracle.timeout_secs, 3);
        assert_eq!(settings.settlement.confirmations, 3);
        assert_eq!(settings.settlement.receipt_poll_interval_ms, 1_000);
        assert_eq!(settings.log.level, "debug");
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let result = Settings::from_toml(
            r#"
            [network]
            network = "polygon"
            "#,
        );
        assert!(result.is_err());
    }
}
