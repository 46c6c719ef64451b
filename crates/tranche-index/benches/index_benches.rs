//! Criterion benchmarks for tranche-index critical operations.
//!
//! Covers: a single index step, a bounded accrual over a large backlog, and
//! an unbounded read-only projection.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::{Rng, SeedableRng};

use tranche_core::constants::SCALE;
use tranche_core::schedule::Schedule;
use tranche_core::traits::IndexCalculator;
use tranche_core::types::{IndexState, Timestamp};
use tranche_index::AccrualEngine;

const T0: Timestamp = 1_600_000_000;
const DAY: Timestamp = 86_400;

/// `n` buckets of random size maturing at random days within two years.
fn random_backlog(n: usize) -> (Schedule, IndexState) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut schedule = Schedule::new();
    let mut state = IndexState::genesis(T0);
    for _ in 0..n {
        let amount = rng.gen_range(1..1_000u128) * SCALE;
        let end = T0 + rng.gen_range(1..730u64) * DAY;
        schedule.insert(amount, end).expect("insert failed");
        state.total_active_value += amount;
        state.total_supply += amount;
    }
    (schedule, state)
}

fn bench_index_delta(c: &mut Criterion) {
    let engine = AccrualEngine::default();
    let state = IndexState {
        total_supply: 1_000_000 * SCALE,
        total_active_value: 800_000 * SCALE,
        ..IndexState::genesis(T0)
    };

    c.bench_function("index_delta_one_day", |b| {
        b.iter(|| engine.index_delta(black_box(&state), black_box(DAY)))
    });
}

fn bench_bounded_advance(c: &mut Criterion) {
    let engine = AccrualEngine::default();
    let (schedule, state) = random_backlog(1_000);

    c.bench_function("advance_backlog_1000_limit_100", |b| {
        b.iter_batched(
            || (schedule.clone(), state),
            |(mut schedule, mut state)| {
                engine.advance(&mut state, &mut schedule, T0 + 800 * DAY, black_box(100))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_projection(c: &mut Criterion) {
    let engine = AccrualEngine::default();
    let (schedule, state) = random_backlog(1_000);

    c.bench_function("project_backlog_1000", |b| {
        b.iter(|| engine.project(black_box(&state), &schedule, T0 + 800 * DAY))
    });
}

criterion_group!(
    benches,
    bench_index_delta,
    bench_bounded_advance,
    bench_projection,
);
criterion_main!(benches);
