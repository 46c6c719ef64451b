//! Ledger configuration.
//!
//! Provides [`LedgerConfig`] with defaults for the data directory, token
//! metadata, and accrual parameters. A config file (TOML) and `TRANCHE_*`
//! environment variables are layered over the defaults by [`LedgerConfig::load`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tranche_core::access::RoleTable;
use tranche_core::constants::{
    DECIMALS, DEFAULT_BATCH_LIMIT, DEFAULT_MIN_ACCRUAL_PERIOD, DEFAULT_TOKEN_NAME,
    DEFAULT_TOKEN_SYMBOL,
};
use tranche_core::math::parse_amount;
use tranche_core::types::{Amount, Timestamp};

use crate::ledger::LedgerOptions;

/// Environment variable prefix, e.g. `TRANCHE_BATCH_LIMIT=50`.
pub const ENV_PREFIX: &str = "TRANCHE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)] Load(#[from] config::ConfigError),
    #[error("invalid annual interest rate: {0:?}")] InvalidRate(String),
    #[error("batch_limit must be greater than zero")] ZeroBatchLimit,
}

/// Configuration for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Annual interest rate as a decimal fraction, e.g. `"0.07"`.
    pub annual_interest_rate: String,
    /// Matured buckets retired per accrual call.
    pub batch_limit: u32,
    /// Partial accrual periods shorter than this (seconds) are skipped.
    pub min_accrual_period: Timestamp,
    /// Account granted every role by [`role_table`](Self::role_table).
    pub operator: String,
    /// Log level filter string (e.g. "info", "debug", "tranche_ledger=trace").
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tranche");

        Self {
            data_dir,
            name: DEFAULT_TOKEN_NAME.to_string(),
            symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            decimals: DECIMALS,
            annual_interest_rate: "0.07".to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            min_accrual_period: DEFAULT_MIN_ACCRUAL_PERIOD,
            operator: "operator".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Defaults, overlaid with `file` (if given and present) and then with
    /// `TRANCHE_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check the fields that have no safe fallback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.annual_interest_rate()?;
        if self.batch_limit == 0 {
            return Err(ConfigError::ZeroBatchLimit);
        }
        Ok(())
    }

    /// The configured rate in base units (`SCALE` = 100%).
    pub fn annual_interest_rate(&self) -> Result<Amount, ConfigError> {
        parse_amount(&self.annual_interest_rate)
            .ok_or_else(|| ConfigError::InvalidRate(self.annual_interest_rate.clone()))
    }

    /// Path to the RocksDB ledger data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledgerdata")
    }

    /// Token metadata and accrual threshold for [`Ledger::open`](crate::Ledger::open).
    pub fn options(&self) -> LedgerOptions {
        LedgerOptions {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            min_accrual_period: self.min_accrual_period,
        }
    }

    /// Role table granting every role to the operator account.
    pub fn role_table(&self) -> RoleTable {
        RoleTable::with_operator(self.operator.as_str())
    }
}
