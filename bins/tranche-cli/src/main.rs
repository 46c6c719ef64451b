//! tranche-cli: Operator interface for a persistent Tranche ledger.
//!
//! Opens the RocksDB ledger under the configured data directory, runs one
//! operation, and exits. Amounts are decimal token strings ("12.5").

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use tranche_core::clock::{ManualClock, SystemClock};
use tranche_core::math::{format_amount, parse_amount};
use tranche_core::traits::Clock;
use tranche_core::types::{AccountId, Amount, Timestamp};
use tranche_ledger::{Ledger, LedgerConfig, RocksStore};

/// Tranche interest ledger command-line interface.
#[derive(Parser)]
#[command(name = "tranche-cli")]
#[command(version, about = "Interest-bearing ledger over fixed-maturity deposits.")]
struct Cli {
    /// Config file (TOML). TRANCHE_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for ledger storage
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Account the operation is performed as (default: configured operator)
    #[arg(long, global = true)]
    caller: Option<String>,

    /// Use this Unix timestamp instead of the wall clock
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Configure the ledger with the configured rate and batch limit.
    Configure,
    /// Credit new balance to an account.
    Mint {
        account: String,
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
    },
    /// Debit balance out of existence.
    Burn {
        account: String,
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
    },
    /// Register principal maturing at END (Unix seconds).
    AddDeposit {
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
        end: Timestamp,
    },
    /// Remove principal from the bucket maturing at END.
    RemoveDeposit {
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
        end: Timestamp,
    },
    /// Advance the interest index.
    Accrue {
        /// Repeat until no matured bucket is left behind.
        #[arg(long)]
        until_caught_up: bool,
    },
    /// Move balance from the caller to another account.
    Transfer {
        to: String,
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
    },
    /// Allow SPENDER to move up to AMOUNT out of the caller's balance.
    Approve {
        spender: String,
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
    },
    /// Move FROM's balance to TO, spending the caller's allowance.
    TransferFrom {
        from: String,
        to: String,
        #[arg(value_parser = parse_token_amount)]
        amount: Amount,
    },
    /// Change the per-call batch limit.
    SetBatchLimit { limit: u32 },
    /// Show an account's balance as of now.
    Balance { account: String },
    /// Show ledger state as JSON.
    Info,
    /// List live maturity buckets as JSON.
    Maturities,
}

fn parse_token_amount(text: &str) -> Result<Amount, String> {
    parse_amount(text).ok_or_else(|| format!("invalid amount: {text:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LedgerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    init_logging(&config.log_level, &cli.log_format);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {:?}", config.data_dir))?;
    info!(data_dir = ?config.data_dir, "opening ledger");

    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let store = RocksStore::open(config.db_path()).context("opening ledger storage")?;
    let mut ledger = Ledger::open(store, clock, Arc::new(config.role_table()), config.options())?;
    let caller = AccountId::new(cli.caller.clone().unwrap_or_else(|| config.operator.clone()));

    run(&mut ledger, &config, &caller, cli.command)
}

fn run(
    ledger: &mut Ledger<RocksStore>,
    config: &LedgerConfig,
    caller: &AccountId,
    command: Command,
) -> Result<()> {
    match command {
        Command::Configure => {
            let rate = config.annual_interest_rate()?;
            ledger.configure(caller, rate, config.batch_limit)?;
            println!(
                "configured: rate {} batch limit {}",
                format_amount(rate),
                config.batch_limit
            );
        }
        Command::Mint { account, amount } => {
            ledger.mint(caller, &account.into(), amount)?;
        }
        Command::Burn { account, amount } => {
            ledger.burn(caller, &account.into(), amount)?;
        }
        Command::AddDeposit { amount, end } => {
            ledger.add_deposit(amount, end)?;
        }
        Command::RemoveDeposit { amount, end } => {
            ledger.remove_deposit(amount, end)?;
        }
        Command::Accrue { until_caught_up } => loop {
            let report = ledger.accrue_interest()?;
            println!("{}", serde_json::to_string(&report)?);
            if !until_caught_up || report.caught_up {
                break;
            }
            if report.processed == 0 {
                bail!("accrual made no progress");
            }
        },
        Command::Transfer { to, amount } => {
            ledger.transfer(caller, &to.into(), amount)?;
        }
        Command::Approve { spender, amount } => {
            ledger.approve(caller, &spender.into(), amount)?;
        }
        Command::TransferFrom { from, to, amount } => {
            ledger.transfer_from(caller, &from.into(), &to.into(), amount)?;
        }
        Command::SetBatchLimit { limit } => {
            ledger.set_batch_limit(caller, limit)?;
        }
        Command::Balance { account } => {
            let balance = ledger.balance_of(&account.into())?;
            println!("{} {}", format_amount(balance), ledger.symbol());
        }
        Command::Info => {
            let info = json!({
                "name": ledger.name(),
                "symbol": ledger.symbol(),
                "decimals": ledger.decimals(),
                "configured": ledger.is_configured(),
                "annual_interest_rate": ledger.annual_interest_rate().map(format_amount),
                "batch_limit": ledger.batch_limit(),
                "total_supply": format_amount(ledger.total_supply()),
                "total_active_value": format_amount(ledger.total_active_value()),
                "exp_index": format_amount(ledger.exp_index()),
                "accrual_timestamp": ledger.accrual_timestamp(),
                "first_maturity": ledger.first_maturity(),
                "last_maturity": ledger.last_maturity(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Maturities => {
            let rows: Vec<_> = ledger
                .maturities()
                .into_iter()
                .map(|(id, bucket)| {
                    json!({
                        "id": id,
                        "amount": format_amount(bucket.amount),
                        "end_timestamp": bucket.end_timestamp,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tranche_core::constants::SCALE;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn amounts_parse_as_tokens() {
        assert_eq!(parse_token_amount("1.5"), Ok(3 * SCALE / 2));
        assert!(parse_token_amount("abc").is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tranche-cli", "add-deposit", "100", "1700000000", "--now", "1600000000",
        ])
        .unwrap();
        assert_eq!(cli.now, Some(1_600_000_000));
        assert!(matches!(
            cli.command,
            Command::AddDeposit { amount, end: 1_700_000_000 } if amount == 100 * SCALE
        ));
    }
}
