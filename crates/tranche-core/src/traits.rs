//! Trait interfaces for the Tranche ledger.
//!
//! These traits define the seams between the ledger and its collaborators:
//! - [`Clock`]: source of the current instant (wall clock, test clock)
//! - [`Authority`]: role checks supplied by the governance layer
//! - [`IndexCalculator`]: per-period index growth (tranche-index implements)
//!
//! The persistence seam, [`LedgerStore`](crate::store::LedgerStore), lives
//! next to its in-memory implementation in [`crate::store`].

use crate::error::AccrualError;
use crate::types::{AccountId, Amount, IndexState, Role, Timestamp};

/// Source of "now" for ledger operations.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// Answers whether a caller may exercise a privileged role.
///
/// The ledger never decides policy; it only asks.
pub trait Authority: Send + Sync {
    /// Whether `caller` currently holds `role`.
    fn is_permitted(&self, caller: &AccountId, role: Role) -> bool;
}

/// Growth of the interest index over one period at a fixed active value.
pub trait IndexCalculator: Send + Sync {
    /// Index increment for `period` seconds at the given state's active
    /// value, total supply, and index.
    ///
    /// Returns 0 when nothing can accrue (no supply, no active value,
    /// empty period).
    fn index_delta(&self, state: &IndexState, period: Timestamp) -> Result<Amount, AccrualError>;

    /// Index after growing for `period` seconds.
    ///
    /// Default implementation: `exp_index + index_delta(...)`.
    fn grown_index(&self, state: &IndexState, period: Timestamp) -> Result<Amount, AccrualError> {
        let delta = self.index_delta(state, period)?;
        state
            .exp_index
            .checked_add(delta)
            .ok_or(AccrualError::ArithmeticOverflow)
    }
}
