//! Accrual engine implementing the [`IndexCalculator`] trait.
//!
//! Advances the compounding interest index across the maturity schedule.
//! Each matured bucket contributes interest only up to its own end date, so
//! a late call reconstructs the same index as a call made at every maturity.
//!
//! Work is split into a pure [`plan`](AccrualEngine::plan) that never touches
//! the ledger and a [`commit`](AccrualEngine::commit) that applies it. The
//! ledger computes a plan, validates everything else, and only then commits,
//! which keeps every operation all-or-nothing.

use primitive_types::U256;
use tracing::{debug, warn};

use tranche_core::constants::PER_YEAR_SCALED;
use tranche_core::error::{AccrualError, ScheduleError, TrancheError};
use tranche_core::math::to_amount;
use tranche_core::schedule::Schedule;
use tranche_core::traits::IndexCalculator;
use tranche_core::types::{is_null, Amount, BucketId, IndexState, LedgerParams, Timestamp};

/// Outcome of planning one accrual call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccrualPlan {
    /// Index state after the call.
    pub index: IndexState,
    /// Schedule head after the call.
    pub head: BucketId,
    /// Matured buckets retired by the call.
    pub processed: u32,
    /// `false` if a due bucket was left for a later call.
    pub caught_up: bool,
}

impl AccrualPlan {
    /// Whether committing the plan would change anything.
    pub fn is_noop(&self, state: &IndexState, schedule: &Schedule) -> bool {
        self.index == *state && self.head == schedule.head()
    }
}

/// The production index calculator.
///
/// Implements [`IndexCalculator`] with:
/// - a 256-bit `rate * active * period * index` product
/// - multiplication before division, two floor divisions
/// - zero growth when nothing is active or nothing is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualEngine {
    annual_interest_rate: Amount,
    min_accrual_period: Timestamp,
}

impl AccrualEngine {
    /// Create an engine for the given ledger parameters.
    pub fn new(params: &LedgerParams) -> Self {
        Self {
            annual_interest_rate: params.annual_interest_rate,
            min_accrual_period: params.min_accrual_period,
        }
    }

    /// Annual rate this engine accrues at, scaled by `SCALE`.
    pub fn annual_interest_rate(&self) -> Amount {
        self.annual_interest_rate
    }

    /// Plan an accrual up to `now`, retiring at most `limit` matured buckets.
    ///
    /// Pure: neither `state` nor `schedule` is modified.
    pub fn plan(
        &self,
        state: &IndexState,
        schedule: &Schedule,
        now: Timestamp,
        limit: u32,
    ) -> Result<AccrualPlan, AccrualError> {
        let mut next = *state;
        let mut head = schedule.head();
        let mut processed = 0u32;

        if now <= next.accrual_timestamp {
            return Ok(AccrualPlan {
                index: next,
                head,
                processed,
                caught_up: due_end(schedule, head, now)?.is_none(),
            });
        }

        while let Some(end) = due_end(schedule, head, now)? {
            if processed >= limit {
                break;
            }
            let bucket = *schedule
                .bucket(head)
                .ok_or(AccrualError::MissingBucket(head))?;

            // A bucket added for an instant the index already passed is
            // retired without an index step.
            if end > next.accrual_timestamp {
                let period = end - next.accrual_timestamp;
                if period >= self.min_accrual_period {
                    next.exp_index = self.grown_index(&next, period)?;
                }
                next.accrual_timestamp = end;
            }
            next.total_active_value = next.total_active_value.saturating_sub(bucket.amount);
            debug!(
                bucket = head,
                end,
                amount = %bucket.amount,
                exp_index = %next.exp_index,
                "retired matured bucket"
            );

            head = bucket.next;
            processed += 1;
        }

        let caught_up = due_end(schedule, head, now)?.is_none();
        if caught_up && now > next.accrual_timestamp {
            let period = now - next.accrual_timestamp;
            if next.total_supply == 0 {
                next.accrual_timestamp = now;
            } else if period >= self.min_accrual_period {
                next.exp_index = self.grown_index(&next, period)?;
                next.accrual_timestamp = now;
            }
        }

        Ok(AccrualPlan {
            index: next,
            head,
            processed,
            caught_up,
        })
    }

    /// Index state as of `now` with no batch limit, for read-only views.
    pub fn project(
        &self,
        state: &IndexState,
        schedule: &Schedule,
        now: Timestamp,
    ) -> Result<IndexState, AccrualError> {
        Ok(self.plan(state, schedule, now, u32::MAX)?.index)
    }

    /// Apply a plan produced against the same `state` and `schedule`.
    pub fn commit(
        plan: &AccrualPlan,
        state: &mut IndexState,
        schedule: &mut Schedule,
    ) -> Result<(), ScheduleError> {
        schedule.advance_head(plan.head)?;
        *state = plan.index;
        Ok(())
    }

    /// Plan and commit in one step.
    pub fn advance(
        &self,
        state: &mut IndexState,
        schedule: &mut Schedule,
        now: Timestamp,
        limit: u32,
    ) -> Result<AccrualPlan, TrancheError> {
        let plan = self.plan(state, schedule, now, limit)?;
        if !plan.caught_up {
            warn!(
                processed = plan.processed,
                accrual_timestamp = plan.index.accrual_timestamp,
                "batch limit reached with matured buckets remaining"
            );
        }
        Self::commit(&plan, state, schedule)?;
        Ok(plan)
    }
}

impl Default for AccrualEngine {
    fn default() -> Self {
        Self::new(&LedgerParams::default())
    }
}

impl IndexCalculator for AccrualEngine {
    fn index_delta(&self, state: &IndexState, period: Timestamp) -> Result<Amount, AccrualError> {
        if state.total_supply == 0 || state.total_active_value == 0 || period == 0 {
            return Ok(0);
        }

        let numerator = U256::from(self.annual_interest_rate)
            .checked_mul(U256::from(state.total_active_value))
            .and_then(|v| v.checked_mul(U256::from(period)))
            .and_then(|v| v.checked_mul(U256::from(state.exp_index)))
            .ok_or(AccrualError::ArithmeticOverflow)?;

        let delta = numerator / U256::from(PER_YEAR_SCALED) / U256::from(state.total_supply);
        to_amount(delta)
    }
}

/// End date of `head` if it exists and has matured by `now`.
fn due_end(
    schedule: &Schedule,
    head: BucketId,
    now: Timestamp,
) -> Result<Option<Timestamp>, AccrualError> {
    if is_null(head) {
        return Ok(None);
    }
    let bucket = schedule
        .bucket(head)
        .ok_or(AccrualError::MissingBucket(head))?;
    Ok((bucket.end_timestamp <= now).then_some(bucket.end_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tranche_core::constants::{NULL_BUCKET, SCALE, SECONDS_PER_YEAR};

    const DAY: Timestamp = 86_400;
    const T0: Timestamp = 1_600_000_000;

    fn engine() -> AccrualEngine {
        AccrualEngine::default()
    }

    fn state(supply: Amount, active: Amount) -> IndexState {
        IndexState {
            total_supply: supply,
            total_active_value: active,
            ..IndexState::genesis(T0)
        }
    }

    /// 150 + 150 maturing on days 364 and 365.
    fn two_bucket_schedule() -> Schedule {
        let mut schedule = Schedule::new();
        schedule.insert(150 * SCALE, T0 + 364 * DAY).unwrap();
        schedule.insert(150 * SCALE, T0 + 365 * DAY).unwrap();
        schedule
    }

    // --- index_delta ---

    #[test]
    fn one_year_fully_active_grows_by_rate() {
        let s = state(SCALE, SCALE);
        let delta = engine().index_delta(&s, SECONDS_PER_YEAR).unwrap();
        assert_eq!(delta, 70_000_000_000_000_000);
    }

    #[test]
    fn one_day_matches_reference_value() {
        let s = state(300 * SCALE, 300 * SCALE);
        assert_eq!(engine().index_delta(&s, DAY).unwrap(), 191_780_821_917_808);
    }

    #[test]
    fn half_active_accrues_half() {
        let full = engine().index_delta(&state(100 * SCALE, 100 * SCALE), 30 * DAY).unwrap();
        let half = engine().index_delta(&state(100 * SCALE, 50 * SCALE), 30 * DAY).unwrap();
        assert_eq!(half, full / 2);
    }

    #[test]
    fn nothing_accrues_without_supply_active_or_time() {
        let e = engine();
        assert_eq!(e.index_delta(&state(0, 0), DAY).unwrap(), 0);
        assert_eq!(e.index_delta(&state(SCALE, 0), DAY).unwrap(), 0);
        assert_eq!(e.index_delta(&state(SCALE, SCALE), 0).unwrap(), 0);
    }

    #[test]
    fn overflowing_product_is_reported() {
        let s = IndexState {
            exp_index: u128::MAX,
            ..state(1, u128::MAX)
        };
        let e = AccrualEngine::new(&LedgerParams {
            annual_interest_rate: u128::MAX,
            ..LedgerParams::default()
        });
        assert_eq!(
            e.index_delta(&s, Timestamp::MAX),
            Err(AccrualError::ArithmeticOverflow)
        );
    }

    // --- plan ---

    #[test]
    fn plan_is_noop_when_time_has_not_moved() {
        let schedule = two_bucket_schedule();
        let s = state(300 * SCALE, 300 * SCALE);
        let plan = engine().plan(&s, &schedule, T0, 100).unwrap();
        assert!(plan.is_noop(&s, &schedule));
        assert!(plan.caught_up);
        let plan = engine().plan(&s, &schedule, T0 - 5, 100).unwrap();
        assert_eq!(plan.index, s);
    }

    #[test]
    fn partial_period_before_any_maturity() {
        let schedule = two_bucket_schedule();
        let s = state(300 * SCALE, 300 * SCALE);
        let plan = engine().plan(&s, &schedule, T0 + DAY, 100).unwrap();
        assert_eq!(plan.processed, 0);
        assert_eq!(plan.head, 1);
        assert_eq!(plan.index.exp_index, SCALE + 191_780_821_917_808);
        assert_eq!(plan.index.accrual_timestamp, T0 + DAY);
        assert_eq!(plan.index.total_active_value, 300 * SCALE);
    }

    #[test]
    fn short_partial_period_is_skipped() {
        let schedule = two_bucket_schedule();
        let s = state(300 * SCALE, 300 * SCALE);
        let plan = engine().plan(&s, &schedule, T0 + 59, 100).unwrap();
        assert_eq!(plan.index, s);

        let plan = engine().plan(&s, &schedule, T0 + 60, 100).unwrap();
        assert!(plan.index.exp_index > SCALE);
        assert_eq!(plan.index.accrual_timestamp, T0 + 60);
    }

    #[test]
    fn maturities_split_the_period() {
        let schedule = two_bucket_schedule();
        let s = state(300 * SCALE, 300 * SCALE);
        let e = engine();
        let now = T0 + 400 * DAY;
        let plan = e.plan(&s, &schedule, now, 100).unwrap();
        assert_eq!(plan.processed, 2);
        assert_eq!(plan.head, NULL_BUCKET);
        assert!(plan.caught_up);
        assert_eq!(plan.index.total_active_value, 0);
        assert_eq!(plan.index.accrual_timestamp, now);

        // Replay by hand: 364 days at 300, 1 day at 150, then nothing active.
        let mut manual = s;
        manual.exp_index = e.grown_index(&manual, 364 * DAY).unwrap();
        manual.total_active_value = 150 * SCALE;
        manual.exp_index = e.grown_index(&manual, DAY).unwrap();
        assert_eq!(plan.index.exp_index, manual.exp_index);
    }

    #[test]
    fn late_call_equals_step_by_step_calls() {
        let mut schedule = Schedule::new();
        for day in [10, 20, 30, 40] {
            schedule.insert(25 * SCALE, T0 + day * DAY).unwrap();
        }
        let e = engine();
        let start = state(100 * SCALE, 100 * SCALE);

        let mut one_shot = start;
        let mut one_schedule = schedule.clone();
        e.advance(&mut one_shot, &mut one_schedule, T0 + 50 * DAY, 100).unwrap();

        let mut stepped = start;
        let mut stepped_schedule = schedule;
        for day in [10, 20, 30, 40, 50] {
            e.advance(&mut stepped, &mut stepped_schedule, T0 + day * DAY, 100).unwrap();
        }
        assert_eq!(one_shot, stepped);
        assert_eq!(one_schedule.head(), stepped_schedule.head());
    }

    #[test]
    fn batch_limit_stops_at_last_processed_maturity() {
        let mut schedule = Schedule::new();
        for day in 1..=5 {
            schedule.insert(SCALE, T0 + day * DAY).unwrap();
        }
        let s = state(5 * SCALE, 5 * SCALE);
        let plan = engine().plan(&s, &schedule, T0 + 10 * DAY, 2).unwrap();
        assert_eq!(plan.processed, 2);
        assert!(!plan.caught_up);
        assert_eq!(plan.head, 3);
        assert_eq!(plan.index.accrual_timestamp, T0 + 2 * DAY);
        assert_eq!(plan.index.total_active_value, 3 * SCALE);
    }

    #[test]
    fn limit_equal_to_backlog_still_applies_final_period() {
        let mut schedule = Schedule::new();
        schedule.insert(SCALE, T0 + DAY).unwrap();
        schedule.insert(SCALE, T0 + 2 * DAY).unwrap();
        let s = state(4 * SCALE, 4 * SCALE);
        let plan = engine().plan(&s, &schedule, T0 + 3 * DAY, 2).unwrap();
        assert!(plan.caught_up);
        assert_eq!(plan.index.accrual_timestamp, T0 + 3 * DAY);
    }

    #[test]
    fn stale_head_is_retired_without_index_step() {
        let mut schedule = Schedule::new();
        schedule.insert(SCALE, T0 - DAY).unwrap();
        let s = state(2 * SCALE, SCALE);
        let plan = engine().plan(&s, &schedule, T0 + 30, 100).unwrap();
        assert_eq!(plan.processed, 1);
        assert_eq!(plan.head, NULL_BUCKET);
        assert_eq!(plan.index.total_active_value, 0);
        assert_eq!(plan.index.exp_index, SCALE);
        // The 30 s tail is below the minimum period.
        assert_eq!(plan.index.accrual_timestamp, T0);
    }

    #[test]
    fn zero_supply_moves_clock_and_cursor_only() {
        let mut schedule = Schedule::new();
        schedule.insert(SCALE, T0 + DAY).unwrap();
        let s = state(0, SCALE);
        let plan = engine().plan(&s, &schedule, T0 + 2 * DAY + 10, 100).unwrap();
        assert_eq!(plan.index.exp_index, SCALE);
        assert_eq!(plan.index.accrual_timestamp, T0 + 2 * DAY + 10);
        assert_eq!(plan.head, NULL_BUCKET);
        assert_eq!(plan.index.total_active_value, 0);
    }

    #[test]
    fn missing_head_is_an_error() {
        let schedule = Schedule::new();
        assert_eq!(due_end(&schedule, 3, T0), Err(AccrualError::MissingBucket(3)));
        assert_eq!(due_end(&schedule, NULL_BUCKET, T0), Ok(None));
    }

    #[test]
    fn project_ignores_the_batch_limit() {
        let mut schedule = Schedule::new();
        for day in 1..=300 {
            schedule.insert(SCALE, T0 + day * DAY).unwrap();
        }
        let s = state(300 * SCALE, 300 * SCALE);
        let projected = engine().project(&s, &schedule, T0 + 301 * DAY).unwrap();
        assert_eq!(projected.total_active_value, 0);
        assert_eq!(projected.accrual_timestamp, T0 + 301 * DAY);
        assert_eq!(schedule.head(), 1);
    }

    // --- commit / advance ---

    #[test]
    fn advance_commits_plan() {
        let mut schedule = two_bucket_schedule();
        let mut s = state(300 * SCALE, 300 * SCALE);
        let plan = engine()
            .advance(&mut s, &mut schedule, T0 + 364 * DAY + 5, 100)
            .unwrap();
        assert_eq!(plan.processed, 1);
        assert_eq!(schedule.head(), 2);
        assert_eq!(s, plan.index);
        assert_eq!(s.total_active_value, 150 * SCALE);
        // 5 s tail skipped: the clock stays at the maturity.
        assert_eq!(s.accrual_timestamp, T0 + 364 * DAY);
    }

    #[test]
    fn commit_rejects_foreign_plan() {
        let mut schedule = Schedule::new();
        let mut s = state(0, 0);
        let plan = AccrualPlan {
            index: s,
            head: 9,
            processed: 1,
            caught_up: true,
        };
        assert!(AccrualEngine::commit(&plan, &mut s, &mut schedule).is_err());
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn index_and_clock_never_decrease(
            ends in proptest::collection::vec(1u64..(400 * DAY), 1..30),
            steps in proptest::collection::vec(0u64..(40 * DAY), 1..20),
            limit in 1u32..8,
        ) {
            let mut schedule = Schedule::new();
            let mut s = state(0, 0);
            for end in &ends {
                schedule.insert(10 * SCALE, T0 + end).unwrap();
                s.total_active_value += 10 * SCALE;
                s.total_supply += 10 * SCALE;
            }
            let e = engine();
            let mut now = T0;
            for step in steps {
                now += step;
                let before = s;
                e.advance(&mut s, &mut schedule, now, limit).unwrap();
                prop_assert!(s.exp_index >= before.exp_index);
                prop_assert!(s.accrual_timestamp >= before.accrual_timestamp);
                prop_assert!(s.accrual_timestamp <= now);
                prop_assert!(s.total_active_value <= before.total_active_value);
            }
        }

        #[test]
        fn caught_up_active_value_matches_schedule(
            ends in proptest::collection::vec(1u64..(200 * DAY), 1..30),
            elapsed in 0u64..(250 * DAY),
        ) {
            let mut schedule = Schedule::new();
            let mut s = state(0, 0);
            for end in &ends {
                schedule.insert(3 * SCALE, T0 + end).unwrap();
                s.total_active_value += 3 * SCALE;
                s.total_supply += 3 * SCALE;
            }
            let plan = engine().advance(&mut s, &mut schedule, T0 + elapsed, u32::MAX).unwrap();
            prop_assert!(plan.caught_up);
            prop_assert_eq!(
                s.total_active_value,
                schedule.active_after(s.accrual_timestamp)
            );
        }

        #[test]
        fn processed_never_exceeds_limit(
            count in 1u64..60,
            limit in 1u32..20,
        ) {
            let mut schedule = Schedule::new();
            for i in 1..=count {
                schedule.insert(SCALE, T0 + i * 100).unwrap();
            }
            let s = state(count as Amount * SCALE, count as Amount * SCALE);
            let plan = engine().plan(&s, &schedule, T0 + (count + 1) * 100, limit).unwrap();
            prop_assert!(plan.processed <= limit);
            prop_assert_eq!(plan.caught_up, count <= limit as u64);
        }
    }
}
