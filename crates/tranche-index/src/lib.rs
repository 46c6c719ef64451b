//! # tranche-index: Compounding interest index engine.
//!
//! All calculations use integer arithmetic with 256-bit intermediates.
//!
//! The engine walks the maturity schedule from its head:
//! - **Per-maturity steps**: each matured bucket accrues interest up to its
//!   own end date, then leaves the active value.
//! - **Bounded work**: at most `batch_limit` buckets are retired per call;
//!   the head cursor plus the accrual timestamp is the full resume state.
//! - **Projection**: the same walk without a limit and without committing
//!   gives read-only balances for "now".

pub mod engine;

pub use engine::{AccrualEngine, AccrualPlan};
