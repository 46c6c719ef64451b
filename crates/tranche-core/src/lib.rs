//! # tranche-core
//! Foundation types, traits, and the maturity schedule for the Tranche
//! interest ledger.

pub mod access;
pub mod clock;
pub mod constants;
pub mod error;
pub mod math;
pub mod schedule;
pub mod store;
pub mod traits;
pub mod types;
