//! Ledger constants. All monetary values are 18-decimal fixed point
//! (1 token = [`SCALE`] base units).

use crate::types::{Amount, BucketId, Timestamp};

/// Fixed-point unit: `1.0` in amounts, rates, and the interest index.
pub const SCALE: Amount = 1_000_000_000_000_000_000;

/// Number of decimals implied by [`SCALE`].
pub const DECIMALS: u8 = 18;

/// Seconds in a (non-leap) year. Annual rates are spread over this period.
pub const SECONDS_PER_YEAR: Timestamp = 31_536_000;

/// Denominator of one index step: `SECONDS_PER_YEAR * SCALE`.
///
/// The annual rate is scaled by [`SCALE`], so dividing the
/// `rate * active * period * index` product by this value leaves the result
/// in index units before the final division by total supply.
pub const PER_YEAR_SCALED: Amount = SECONDS_PER_YEAR as Amount * SCALE;

/// Default annual interest rate: 7%.
pub const DEFAULT_ANNUAL_INTEREST_RATE: Amount = 70_000_000_000_000_000;

/// Default number of matured buckets processed per accrual call.
pub const DEFAULT_BATCH_LIMIT: u32 = 100;

/// Default minimum accrual period in seconds.
///
/// Shorter partial periods are skipped so frequent calls don't add
/// rounding noise to the index.
pub const DEFAULT_MIN_ACCRUAL_PERIOD: Timestamp = 60;

/// Null bucket id. Marks "no node" in schedule links and cursors.
pub const NULL_BUCKET: BucketId = 0;

/// Default token name and symbol.
pub const DEFAULT_TOKEN_NAME: &str = "EURxb";
pub const DEFAULT_TOKEN_SYMBOL: &str = "EURxb";
