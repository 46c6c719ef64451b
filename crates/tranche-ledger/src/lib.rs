//! # tranche-ledger: Balance settlement, the ledger, and persistence.
//!
//! Composes the schedule and the index engine into the collaborator-facing
//! ledger:
//! - [`ledger::Ledger`]: mint, burn, deposits, transfers, accrual
//! - [`settlement`]: settle/credit/debit of a single account
//! - [`storage::RocksStore`]: persistent ledger state backed by RocksDB
//! - [`config::LedgerConfig`]: ledger configuration

pub mod config;
pub mod ledger;
pub mod settlement;
pub mod storage;

pub use config::{ConfigError, LedgerConfig};
pub use ledger::{Ledger, LedgerOptions};
pub use storage::RocksStore;
