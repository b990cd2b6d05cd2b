//! Strategy subscription CLI
//!
//! Quotes fees, lists registry strategies and settles subscriptions against
//! the configured network.
//!
//! ## Setup
//!
//! 1. Copy `config.example.toml` to `config.toml` and pick a network.
//! 2. Put the wallet key in `.env` rather than the file:
//!    ```
//!    APP_NETWORK__WALLET_PRIVATE_KEY=0xYourPrivateKeyHere
//!    ```
//! 3. Run:
//!    ```bash
//!    cargo run --bin strategy-cli -- subscribe 1 --fee 19
//!    ```

use std::path::PathBuf;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use strategy_subscriptions::{FeeConverter, NewStrategy, StrategyId, SubscriptionRunner};

/// Subscribe to trading strategies, paying fiat-denominated fees in the native asset
#[derive(Parser, Debug)]
#[command(name = "strategy-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what a fiat fee costs at the current rate
    Quote {
        /// Fee in fiat units
        fee: Decimal,
    },
    /// List every strategy on the registry
    Strategies {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show subscriptions of an account (the configured wallet by default)
    Subscriptions {
        #[arg(long)]
        account: Option<Address>,
    },
    /// Subscribe to a strategy
    Subscribe {
        strategy_id: StrategyId,
        /// Fee in fiat units
        #[arg(long)]
        fee: Decimal,
    },
    /// Unsubscribe from a strategy
    Unsubscribe { strategy_id: StrategyId },
    /// Publish a new strategy
    Create {
        /// Off-chain content reference
        #[arg(long)]
        uid: String,
        /// Subscription fee in whole native units, e.g. 0.01
        #[arg(long)]
        fee: Decimal,
        #[arg(long, default_value = "monthly")]
        period: String,
        #[arg(long, default_value_t = 0)]
        roi: u64,
        #[arg(long, default_value_t = 0)]
        profitability: u64,
        #[arg(long, default_value_t = 0)]
        risk: u64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if !cli.config.exists() {
        eprintln!(
            "Config file '{}' not found. Please create one.",
            cli.config.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let runner = SubscriptionRunner::new(&cli.config)?;
    let converter = FeeConverter::new(runner.settings().settlement.native_decimals);
    let currency = runner.settings().oracle.vs_currency.to_uppercase();

    match cli.command {
        Command::Quote { fee } => {
            let (quote, amount) = runner.quote(fee).await?;
            println!("rate:   {} {}", quote.rate, currency);
            println!("fee:    {} {}", fee, currency);
            println!(
                "native: {} ({} smallest units)",
                display_native(&converter, amount),
                amount
            );
        }
        Command::Strategies { json } => {
            let strategies = runner.list_strategies().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&strategies)?);
            } else {
                println!(
                    "{:>4}  {:<44}  {:>14}  {:<10}  {:>4}  {:>4}  {:>4}  {}",
                    "ID", "PROVIDER", "FEE", "PERIOD", "ROI", "PROF", "RISK", "ACTIVE"
                );
                for s in strategies {
                    println!(
                        "{:>4}  {:<44}  {:>14}  {:<10}  {:>4}  {:>4}  {:>4}  {}",
                        s.id,
                        s.provider,
                        display_native(&converter, s.subscription_fee),
                        s.subscription_period,
                        s.roi,
                        s.profitability,
                        s.risk,
                        s.active
                    );
                }
            }
        }
        Command::Subscriptions { account } => {
            let ids = runner.subscriptions(account).await?;
            if ids.is_empty() {
                println!("No subscriptions");
            }
            for id in ids {
                println!("{}", id);
            }
        }
        Command::Subscribe { strategy_id, fee } => {
            let settlement = runner.subscribe(strategy_id, fee).await?;
            println!(
                "Subscribed to {} paying {} in block {} ({})",
                settlement.strategy_id,
                settlement
                    .native_amount
                    .map(|a| display_native(&converter, a))
                    .unwrap_or_default(),
                settlement.receipt.block_number,
                settlement.receipt.tx_hash
            );
        }
        Command::Unsubscribe { strategy_id } => {
            let settlement = runner.unsubscribe(strategy_id).await?;
            println!(
                "Unsubscribed from {} in block {} ({})",
                settlement.strategy_id, settlement.receipt.block_number, settlement.receipt.tx_hash
            );
        }
        Command::Create {
            uid,
            fee,
            period,
            roi,
            profitability,
            risk,
        } => {
            let strategy = NewStrategy {
                uid,
                subscription_fee: converter.parse_native(fee)?,
                subscription_period: period,
                roi,
                profitability,
                risk,
            };
            let receipt = runner.create_strategy(strategy).await?;
            println!(
                "Strategy created in block {} ({})",
                receipt.block_number, receipt.tx_hash
            );
        }
    }

    Ok(())
}

fn display_native(converter: &FeeConverter, amount: alloy::primitives::U256) -> String {
    converter
        .format_native(amount)
        .map(|d| d.to_string())
        .unwrap_or_else(|| amount.to_string())
}
