//! Ledger persistence interface and in-memory implementation.
//!
//! Provides the [`LedgerStore`] trait the ledger writes through after each
//! mutating operation. [`MemoryStore`] is suitable for testing; the
//! persistent store uses RocksDB (tranche-ledger).
//!
//! A commit carries a [`StateDelta`]: the ledger singleton plus every
//! bucket, account, and allowance touched by one operation. Stores must
//! apply a delta all-or-nothing.

use std::collections::BTreeMap;

use crate::error::TrancheError;
use crate::types::{Account, AccountId, Amount, BucketId, LedgerMeta, MaturityBucket};

/// `(owner, spender)` key of an allowance.
pub type AllowanceKey = (AccountId, AccountId);

/// Everything a store holds, as loaded at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: LedgerMeta,
    pub buckets: Vec<(BucketId, MaturityBucket)>,
    pub accounts: Vec<(AccountId, Account)>,
    pub allowances: Vec<(AllowanceKey, Amount)>,
}

/// The writes produced by one ledger operation.
///
/// Entries are upserts. A zero allowance is written as a zero, not removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub meta: LedgerMeta,
    pub buckets: Vec<(BucketId, MaturityBucket)>,
    pub accounts: Vec<(AccountId, Account)>,
    pub allowances: Vec<(AllowanceKey, Amount)>,
}

impl StateDelta {
    /// A delta that only rewrites the singleton.
    pub fn meta_only(meta: LedgerMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    /// Number of keyed records besides the singleton.
    pub fn record_count(&self) -> usize {
        self.buckets.len() + self.accounts.len() + self.allowances.len()
    }
}

/// Durable home of the ledger state.
pub trait LedgerStore: Send + Sync {
    /// Read the full state. `Ok(None)` if nothing was ever committed.
    fn load(&self) -> Result<Option<LedgerSnapshot>, TrancheError>;

    /// Apply one operation's writes atomically.
    ///
    /// # Errors
    ///
    /// [`TrancheError::Storage`] if the write could not be made durable; in
    /// that case none of the delta is visible to a later [`load`](Self::load).
    fn commit(&mut self, delta: &StateDelta) -> Result<(), TrancheError>;
}

/// In-memory [`LedgerStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    meta: Option<LedgerMeta>,
    buckets: BTreeMap<BucketId, MaturityBucket>,
    accounts: BTreeMap<AccountId, Account>,
    allowances: BTreeMap<AllowanceKey, Amount>,
    commits: usize,
    fail_commits: bool,
    fail_loads: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail (or succeed again).
    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Make every following load fail (or succeed again).
    pub fn set_fail_loads(&mut self, fail: bool) {
        self.fail_loads = fail;
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, TrancheError> {
        if self.fail_loads {
            return Err(TrancheError::Storage("memory store: load refused".into()));
        }
        let Some(meta) = self.meta else {
            return Ok(None);
        };
        Ok(Some(LedgerSnapshot {
            meta,
            buckets: self.buckets.iter().map(|(id, b)| (*id, *b)).collect(),
            accounts: self
                .accounts
                .iter()
                .map(|(id, a)| (id.clone(), *a))
                .collect(),
            allowances: self
                .allowances
                .iter()
                .map(|(key, v)| (key.clone(), *v))
                .collect(),
        }))
    }

    fn commit(&mut self, delta: &StateDelta) -> Result<(), TrancheError> {
        if self.fail_commits {
            return Err(TrancheError::Storage("memory store: commit refused".into()));
        }
        self.meta = Some(delta.meta);
        for (id, bucket) in &delta.buckets {
            self.buckets.insert(*id, *bucket);
        }
        for (id, account) in &delta.accounts {
            self.accounts.insert(id.clone(), *account);
        }
        for (key, value) in &delta.allowances {
            self.allowances.insert(key.clone(), *value);
        }
        self.commits += 1;
        Ok(())
    }
}
