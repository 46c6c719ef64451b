//! Core ledger types: identifiers, schedule buckets, accounts, index state.
//!
//! All monetary values are in base units (1 token = 10^18 units) and use
//! `u128`. Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    DEFAULT_ANNUAL_INTEREST_RATE, DEFAULT_BATCH_LIMIT, DEFAULT_MIN_ACCRUAL_PERIOD, NULL_BUCKET,
    SCALE,
};

/// A fixed-point amount in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Sequential bucket identifier. `0` is the null sentinel.
pub type BucketId = u64;

/// Identifier of a ledger account (holder, spender, or caller).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as raw bytes, used as a storage key.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Privileged capabilities checked by the ledger before mutation.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub enum Role {
    /// Configures the ledger and tunes the batch limit.
    Admin,
    /// Credits new balances.
    Minter,
    /// Debits balances out of existence.
    Burner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Minter => f.write_str("minter"),
            Self::Burner => f.write_str("burner"),
        }
    }
}

/// One deposit tranche in the maturity schedule.
///
/// Buckets are never unlinked. A bucket that matured or was fully removed
/// keeps its links so the schedule can be walked as history.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct MaturityBucket {
    /// Principal still active in this bucket.
    pub amount: Amount,
    /// Maturity instant. Unique among live buckets.
    pub end_timestamp: Timestamp,
    /// Previous bucket id, or [`NULL_BUCKET`] at the front.
    pub prev: BucketId,
    /// Next bucket id, or [`NULL_BUCKET`] at the tail.
    pub next: BucketId,
}

/// Per-account balance as of its last settlement.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Account {
    /// Balance as of `index_snapshot`.
    pub balance: Amount,
    /// Interest index at the last settlement. Zero for never-credited accounts.
    pub index_snapshot: Amount,
}

impl Account {
    /// Whether the account holds nothing and has never been settled.
    pub fn is_empty(&self) -> bool {
        self.balance == 0 && self.index_snapshot == 0
    }
}

/// The resumable accrual state shared by the index engine and the ledger.
///
/// Together with the schedule head cursor this is the full resume state of
/// the accrual loop.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct IndexState {
    /// Cumulative compounding multiplier, [`SCALE`] = 1.0.
    pub exp_index: Amount,
    /// Instant through which `exp_index` has been advanced.
    pub accrual_timestamp: Timestamp,
    /// Sum of bucket amounts not yet retired by the engine.
    pub total_active_value: Amount,
    /// Sum of all stored account balances.
    pub total_supply: Amount,
}

impl IndexState {
    /// Genesis state at `now`: index 1.0, nothing active, nothing issued.
    pub fn genesis(now: Timestamp) -> Self {
        Self {
            exp_index: SCALE,
            accrual_timestamp: now,
            total_active_value: 0,
            total_supply: 0,
        }
    }
}

impl Default for IndexState {
    fn default() -> Self {
        Self::genesis(0)
    }
}

/// Immutable-after-configuration ledger parameters (batch limit aside).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct LedgerParams {
    /// Annual interest rate scaled by [`SCALE`].
    pub annual_interest_rate: Amount,
    /// Maximum matured buckets processed per accrual call. Always > 0.
    pub batch_limit: u32,
    /// Partial periods shorter than this many seconds are not accrued.
    pub min_accrual_period: Timestamp,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            annual_interest_rate: DEFAULT_ANNUAL_INTEREST_RATE,
            batch_limit: DEFAULT_BATCH_LIMIT,
            min_accrual_period: DEFAULT_MIN_ACCRUAL_PERIOD,
        }
    }
}

/// The ledger singleton as persisted.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LedgerMeta {
    /// `None` until `configure` succeeds.
    pub params: Option<LedgerParams>,
    /// Committed accrual state.
    pub index: IndexState,
    /// Schedule cursor: first bucket not yet retired.
    pub head: BucketId,
    /// Last bucket in the schedule.
    pub tail: BucketId,
}

impl LedgerMeta {
    /// Whether the ledger has been configured.
    pub fn is_configured(&self) -> bool {
        self.params.is_some()
    }
}

/// Outcome of one accrual call, reported to periodic drivers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccrualReport {
    /// Matured buckets retired by this call.
    pub processed: u32,
    /// `false` if matured buckets remain for a later call.
    pub caught_up: bool,
    /// Index after the call.
    pub exp_index: Amount,
    /// Accrual timestamp after the call.
    pub accrual_timestamp: Timestamp,
}

/// Returns `true` for the null bucket id.
pub fn is_null(id: BucketId) -> bool {
    id == NULL_BUCKET
}
