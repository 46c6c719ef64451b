//! Shared test helpers for scenario and invariant tests.

use std::sync::Arc;

use primitive_types::U256;

use tranche_core::access::RoleTable;
use tranche_core::clock::ManualClock;
use tranche_core::constants::{DEFAULT_ANNUAL_INTEREST_RATE, PER_YEAR_SCALED};
use tranche_core::store::MemoryStore;
use tranche_core::types::{AccountId, Amount, Timestamp};
use tranche_ledger::Ledger;

/// Seconds per day.
pub const DAY: Timestamp = 86_400;

/// Arbitrary genesis instant used by every scenario.
pub const T0: Timestamp = 1_600_000_000;

/// Account holding every role.
pub fn operator() -> AccountId {
    AccountId::new("operator")
}

/// A configured in-memory ledger and the clock it reads.
pub struct TestLedger {
    pub ledger: Ledger<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestLedger {
    /// Ledger configured at [`T0`] with the default 7% rate.
    pub fn new(batch_limit: u32) -> Self {
        Self::with_rate(DEFAULT_ANNUAL_INTEREST_RATE, batch_limit)
    }

    pub fn with_rate(annual_interest_rate: Amount, batch_limit: u32) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let roles = Arc::new(RoleTable::with_operator(operator()));
        let mut ledger = Ledger::in_memory(clock.clone(), roles);
        ledger
            .configure(&operator(), annual_interest_rate, batch_limit)
            .unwrap();
        Self { ledger, clock }
    }

    /// Mint `amount` to `holder` and register it as principal maturing at
    /// `end`, the way the bond layer issues a tranche.
    pub fn issue(&mut self, holder: &str, amount: Amount, end: Timestamp) {
        self.ledger
            .mint(&operator(), &AccountId::new(holder), amount)
            .unwrap();
        self.ledger.add_deposit(amount, end).unwrap();
    }

    /// Call `accrue_interest` until no matured bucket is left behind.
    /// Returns the number of calls made.
    pub fn catch_up(&mut self) -> u32 {
        let mut calls = 1;
        while !self.ledger.accrue_interest().unwrap().caught_up {
            calls += 1;
        }
        calls
    }

    pub fn balance(&self, holder: &str) -> Amount {
        self.ledger.balance_of(&AccountId::new(holder)).unwrap()
    }

    pub fn stored(&self, holder: &str) -> Amount {
        self.ledger.account(&AccountId::new(holder)).balance
    }

    pub fn now(&self) -> Timestamp {
        T0 + self.elapsed()
    }

    pub fn elapsed(&self) -> Timestamp {
        use tranche_core::traits::Clock;
        self.clock.now() - T0
    }

    pub fn advance_days(&self, days: Timestamp) {
        self.clock.advance(days * DAY);
    }
}

/// Ledger-wide inputs of [`reference_balance`].
#[derive(Clone, Debug)]
pub struct ReferenceState {
    pub annual_interest_rate: Amount,
    pub exp_index: Amount,
    pub accrual_timestamp: Timestamp,
    pub total_supply: Amount,
    pub total_active_value: Amount,
    /// `(end, amount)` of every unretired bucket, in end order.
    pub maturities: Vec<(Timestamp, Amount)>,
}

/// One compounding step, computed independently of the engine.
fn grow(rate: Amount, active: Amount, period: Timestamp, index: Amount, supply: Amount) -> Amount {
    if supply == 0 || period < 60 {
        return index;
    }
    let product = U256::from(rate) * U256::from(active) * U256::from(period) * U256::from(index);
    let delta = product / U256::from(PER_YEAR_SCALED) / U256::from(supply);
    index + delta.as_u128()
}

/// Replay the index up to `now` and scale a holder's balance by it.
///
/// Returns `(balance, exp_index)`.
pub fn reference_balance(
    user_balance: Amount,
    user_index: Amount,
    now: Timestamp,
    state: &ReferenceState,
) -> (Amount, Amount) {
    let mut index = state.exp_index;
    let mut at = state.accrual_timestamp;
    let mut active = state.total_active_value;

    for &(end, amount) in &state.maturities {
        if end > now || end <= at {
            break;
        }
        index = grow(state.annual_interest_rate, active, end - at, index, state.total_supply);
        at = end;
        active -= amount;
    }
    index = grow(state.annual_interest_rate, active, now - at, index, state.total_supply);

    if user_balance == 0 || user_index == 0 {
        return (user_balance, index);
    }
    let balance = U256::from(user_balance) * U256::from(index) / U256::from(user_index);
    (balance.as_u128(), index)
}

/// `|a - b| / b <= tolerance_ppm / 1e6`.
pub fn within_ppm(a: Amount, b: Amount, tolerance_ppm: u128) -> bool {
    let diff = a.abs_diff(b);
    diff * 1_000_000 <= b * tolerance_ppm
}
