//! RocksDB storage tests: round-trips, atomic batches, and a ledger that
//! survives a restart.

use std::sync::Arc;

use tranche_core::access::RoleTable;
use tranche_core::clock::ManualClock;
use tranche_core::constants::{DEFAULT_ANNUAL_INTEREST_RATE, SCALE};
use tranche_core::store::{LedgerStore, StateDelta};
use tranche_core::types::{
    Account, AccountId, IndexState, LedgerMeta, LedgerParams, MaturityBucket, Timestamp,
};
use tranche_ledger::{Ledger, LedgerOptions, RocksStore};

const T0: Timestamp = 1_600_000_000;
const DAY: Timestamp = 86_400;

fn bucket(amount: u128, end: Timestamp, prev: u64, next: u64) -> MaturityBucket {
    MaturityBucket {
        amount,
        end_timestamp: end,
        prev,
        next,
    }
}

#[test]
fn fresh_store_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path().join("ledgerdata")).unwrap();
    assert!(store.is_empty().unwrap());
    assert!(store.load().unwrap().is_none());
}

#[test]
fn commit_roundtrip_preserves_u128() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path().join("ledgerdata")).unwrap();

    let meta = LedgerMeta {
        params: Some(LedgerParams::default()),
        index: IndexState {
            exp_index: u128::MAX - 1,
            accrual_timestamp: T0,
            total_active_value: 3 * SCALE + 7,
            total_supply: u128::MAX / 5,
        },
        head: 1,
        tail: 300,
    };
    let mut delta = StateDelta::meta_only(meta);
    // Ids above 255 check key ordering across bytes.
    for id in [300u64, 1, 256] {
        delta.buckets.push((id, bucket(id as u128 * SCALE, T0 + id, 0, 0)));
    }
    delta.accounts.push((
        AccountId::new("alice"),
        Account {
            balance: u128::MAX / 7,
            index_snapshot: SCALE + 1,
        },
    ));
    delta
        .allowances
        .push(((AccountId::new("alice"), AccountId::new("bob")), 42));
    store.commit(&delta).unwrap();

    let snap = store.load().unwrap().unwrap();
    assert_eq!(snap.meta, meta);
    let ids: Vec<u64> = snap.buckets.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 256, 300]);
    assert_eq!(snap.buckets[2].1.amount, 300 * SCALE);
    assert_eq!(snap.accounts, delta.accounts);
    assert_eq!(snap.allowances, delta.allowances);
}

#[test]
fn reopen_reads_committed_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledgerdata");
    {
        let mut store = RocksStore::open(&path).unwrap();
        let mut delta = StateDelta::meta_only(LedgerMeta::default());
        delta.accounts.push((AccountId::new("carol"), Account::default()));
        store.commit(&delta).unwrap();
        store.flush().unwrap();
    }
    let store = RocksStore::open(&path).unwrap();
    let snap = store.load().unwrap().unwrap();
    assert_eq!(snap.accounts.len(), 1);
    store.compact().unwrap();
}

#[test]
fn ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledgerdata");
    let clock = Arc::new(ManualClock::new(T0));
    let roles = Arc::new(RoleTable::with_operator("ops"));
    let ops = AccountId::new("ops");
    let alice = AccountId::new("alice");

    let (index, balance) = {
        let store = RocksStore::open(&path).unwrap();
        let mut ledger =
            Ledger::open(store, clock.clone(), roles.clone(), LedgerOptions::default()).unwrap();
        ledger.configure(&ops, DEFAULT_ANNUAL_INTEREST_RATE, 100).unwrap();
        ledger.mint(&ops, &alice, 100 * SCALE).unwrap();
        ledger.add_deposit(100 * SCALE, T0 + 30 * DAY).unwrap();
        ledger.mint(&ops, &alice, 50 * SCALE).unwrap();
        ledger.add_deposit(50 * SCALE, T0 + 60 * DAY).unwrap();
        clock.set(T0 + 45 * DAY);
        ledger.accrue_interest().unwrap();
        (ledger.index_state(), ledger.balance_of(&alice).unwrap())
    };

    let store = RocksStore::open(&path).unwrap();
    let ledger = Ledger::open(store, clock, roles, LedgerOptions::default()).unwrap();
    assert!(ledger.is_configured());
    assert_eq!(ledger.index_state(), index);
    assert_eq!(ledger.balance_of(&alice).unwrap(), balance);
    assert_eq!(ledger.first_maturity(), Some(T0 + 60 * DAY));
    assert_eq!(ledger.maturity_info(1).unwrap().amount, 100 * SCALE);
    assert_eq!(ledger.total_active_value(), 50 * SCALE);
}
