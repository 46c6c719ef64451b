//! Error types for the Tranche ledger.
use thiserror::Error;

use crate::types::{Amount, BucketId, Role, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("amount must be positive")] NonPositiveAmount,
    #[error("end date must be positive")] NonPositiveEndDate,
    #[error("schedule entry not found: end {0}")] EntryNotFound(Timestamp),
    #[error("unknown bucket: {0}")] UnknownBucket(BucketId),
    #[error("value overflow")] ValueOverflow,
    #[error("corrupt schedule: {0}")] Corrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccrualError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("division by zero")] DivisionByZero,
    #[error("schedule cursor points at missing bucket {0}")] MissingBucket(BucketId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger not configured")] NotConfigured,
    #[error("already configured")] AlreadyConfigured,
    #[error("not authorized: {caller} lacks {role}")] NotAuthorized { caller: String, role: Role },
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: Amount, need: Amount },
    #[error("insufficient allowance: have {have}, need {need}")] InsufficientAllowance { have: Amount, need: Amount },
    #[error("must be greater than zero")] ZeroBatchLimit,
    #[error("value overflow")] ValueOverflow,
    #[error("accrual backlog pending since {0}: accrue interest until caught up")] AccrualBacklog(Timestamp),
    #[error("active value {active} would exceed total supply {supply}")] ActiveExceedsSupply { active: Amount, supply: Amount },
    #[error("ledger state lost after a failed commit: reopen from the store")] Poisoned,
}

#[derive(Error, Debug)]
pub enum TrancheError {
    #[error(transparent)] Schedule(#[from] ScheduleError),
    #[error(transparent)] Accrual(#[from] AccrualError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error("storage: {0}")] Storage(String),
}
