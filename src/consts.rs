/// Registry contract the public deployment listens on.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "0xF8EDE4500F5cDcFd4FB6F584Ea5DcA63D72De79f";

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
pub(crate) const DEFAULT_QUOTE_ASSET_ID: &str = "ethereum";
pub(crate) const DEFAULT_QUOTE_CURRENCY: &str = "usd";
pub(crate) const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 10;

/// Decimals of the chain's native asset (wei per ether).
pub const NATIVE_DECIMALS: u32 = 18;

pub(crate) const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub(crate) const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_CONFIRMATIONS: u64 = 1;
