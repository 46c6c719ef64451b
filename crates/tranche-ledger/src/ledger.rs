//! The collaborator-facing interest ledger.
//!
//! [`Ledger`] owns the committed state (singleton, schedule, accounts,
//! allowances) and a [`LedgerStore`] it writes through after every mutating
//! operation. Each operation:
//!
//! 1. checks configuration, authorization, and arguments,
//! 2. plans the index accrual up to `now` and computes every new value,
//! 3. applies the result and commits one [`StateDelta`].
//!
//! Failures in steps 1 and 2 leave the ledger untouched. A failure in step 3
//! (a rejected store write) reloads the last committed state from the store;
//! if that reload fails too, the ledger refuses further work.
//!
//! Operations that change the total supply or the active value take effect
//! at `now`. While matured buckets beyond the batch limit are still pending
//! they fail with [`LedgerError::AccrualBacklog`] until
//! [`Ledger::accrue_interest`] has caught up.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use tranche_core::constants::{
    DECIMALS, DEFAULT_MIN_ACCRUAL_PERIOD, DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_SYMBOL, NULL_BUCKET,
};
use tranche_core::error::{LedgerError, ScheduleError, TrancheError};
use tranche_core::schedule::Schedule;
use tranche_core::store::{AllowanceKey, LedgerSnapshot, LedgerStore, MemoryStore, StateDelta};
use tranche_core::traits::{Authority, Clock};
use tranche_core::types::{
    Account, AccountId, AccrualReport, Amount, BucketId, IndexState, LedgerMeta, LedgerParams,
    MaturityBucket, Role, Timestamp,
};
use tranche_index::{AccrualEngine, AccrualPlan};

use crate::settlement::{self, Settled};

/// Token metadata and the accrual threshold fixed at configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Copied into the ledger parameters by [`Ledger::configure`].
    pub min_accrual_period: Timestamp,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_TOKEN_NAME.to_string(),
            symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            decimals: DECIMALS,
            min_accrual_period: DEFAULT_MIN_ACCRUAL_PERIOD,
        }
    }
}

/// In-memory committed state plus the keys touched since the last commit.
#[derive(Debug, Default)]
struct LedgerState {
    meta: LedgerMeta,
    schedule: Schedule,
    accounts: HashMap<AccountId, Account>,
    allowances: HashMap<AllowanceKey, Amount>,
    dirty_accounts: BTreeSet<AccountId>,
    dirty_allowances: BTreeSet<AllowanceKey>,
}

impl LedgerState {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, TrancheError> {
        let schedule =
            Schedule::from_parts(snapshot.buckets, snapshot.meta.head, snapshot.meta.tail)?;
        Ok(Self {
            meta: snapshot.meta,
            schedule,
            accounts: snapshot.accounts.into_iter().collect(),
            allowances: snapshot.allowances.into_iter().collect(),
            dirty_accounts: BTreeSet::new(),
            dirty_allowances: BTreeSet::new(),
        })
    }

    fn load(store: &impl LedgerStore) -> Result<Self, TrancheError> {
        match store.load()? {
            Some(snapshot) => Self::from_snapshot(snapshot),
            None => Ok(Self::default()),
        }
    }

    fn account(&self, id: &AccountId) -> Account {
        self.accounts.get(id).copied().unwrap_or_default()
    }

    fn set_account(&mut self, id: &AccountId, account: Account) {
        self.accounts.insert(id.clone(), account);
        self.dirty_accounts.insert(id.clone());
    }

    fn allowance(&self, key: &AllowanceKey) -> Amount {
        self.allowances.get(key).copied().unwrap_or(0)
    }

    fn set_allowance(&mut self, key: AllowanceKey, amount: Amount) {
        self.dirty_allowances.insert(key.clone());
        self.allowances.insert(key, amount);
    }

    /// Move the schedule head and install `index` as the committed state.
    fn apply(&mut self, plan: &AccrualPlan, index: IndexState) -> Result<(), TrancheError> {
        AccrualEngine::commit(plan, &mut self.meta.index, &mut self.schedule)?;
        self.meta.index = index;
        Ok(())
    }

    fn take_delta(&mut self) -> StateDelta {
        self.meta.head = self.schedule.head();
        self.meta.tail = self.schedule.tail();
        StateDelta {
            meta: self.meta,
            buckets: self.schedule.take_dirty(),
            accounts: std::mem::take(&mut self.dirty_accounts)
                .into_iter()
                .map(|id| {
                    let account = self.account(&id);
                    (id, account)
                })
                .collect(),
            allowances: std::mem::take(&mut self.dirty_allowances)
                .into_iter()
                .map(|key| {
                    let amount = self.allowance(&key);
                    (key, amount)
                })
                .collect(),
        }
    }
}

/// Settled values of both sides of a transfer.
struct TransferOutcome {
    from: Settled,
    to: Settled,
}

/// The interest-bearing ledger over a maturity schedule.
pub struct Ledger<S: LedgerStore> {
    store: S,
    clock: Arc<dyn Clock>,
    authority: Arc<dyn Authority>,
    options: LedgerOptions,
    state: LedgerState,
    poisoned: bool,
}

impl Ledger<MemoryStore> {
    /// A fresh ledger backed by a [`MemoryStore`].
    pub fn in_memory(clock: Arc<dyn Clock>, authority: Arc<dyn Authority>) -> Self {
        Self {
            store: MemoryStore::new(),
            clock,
            authority,
            options: LedgerOptions::default(),
            state: LedgerState::default(),
            poisoned: false,
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Open a ledger over `store`, loading whatever it holds.
    pub fn open(
        store: S,
        clock: Arc<dyn Clock>,
        authority: Arc<dyn Authority>,
        options: LedgerOptions,
    ) -> Result<Self, TrancheError> {
        let state = LedgerState::load(&store)?;
        if state.meta.is_configured() {
            info!(
                buckets = state.schedule.len(),
                accounts = state.accounts.len(),
                exp_index = %state.meta.index.exp_index,
                "opened configured ledger"
            );
        }
        Ok(Self {
            store,
            clock,
            authority,
            options,
            state,
            poisoned: false,
        })
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a failed commit could not be rolled back. A poisoned ledger
    /// rejects every operation; reopen it from the store.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Mutable access to the backing store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // --- Token metadata ---

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn symbol(&self) -> &str {
        &self.options.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.options.decimals
    }

    // --- Committed ledger fields ---

    /// Whether [`configure`](Self::configure) has succeeded.
    pub fn is_configured(&self) -> bool {
        self.state.meta.is_configured()
    }

    /// Parameters set at configuration.
    pub fn params(&self) -> Option<LedgerParams> {
        self.state.meta.params
    }

    pub fn annual_interest_rate(&self) -> Option<Amount> {
        self.params().map(|p| p.annual_interest_rate)
    }

    pub fn batch_limit(&self) -> Option<u32> {
        self.params().map(|p| p.batch_limit)
    }

    /// The committed index state.
    pub fn index_state(&self) -> IndexState {
        self.state.meta.index
    }

    pub fn total_supply(&self) -> Amount {
        self.state.meta.index.total_supply
    }

    pub fn total_active_value(&self) -> Amount {
        self.state.meta.index.total_active_value
    }

    pub fn exp_index(&self) -> Amount {
        self.state.meta.index.exp_index
    }

    pub fn accrual_timestamp(&self) -> Timestamp {
        self.state.meta.index.accrual_timestamp
    }

    // --- Schedule views ---

    /// End date of the first bucket not yet retired.
    pub fn first_maturity(&self) -> Option<Timestamp> {
        self.state.schedule.first_maturity()
    }

    /// End date of the last live bucket.
    pub fn last_maturity(&self) -> Option<Timestamp> {
        self.state.schedule.last_maturity()
    }

    /// Id of the first live bucket, or `0` when nothing is live.
    pub fn first_maturity_id(&self) -> BucketId {
        self.state.schedule.head()
    }

    /// Id of the last live bucket, or `0` when nothing is live.
    pub fn last_maturity_id(&self) -> BucketId {
        if self.state.schedule.has_live() {
            self.state.schedule.tail()
        } else {
            NULL_BUCKET
        }
    }

    /// A bucket by id, retired buckets included.
    pub fn maturity_info(&self, id: BucketId) -> Result<MaturityBucket, TrancheError> {
        Ok(*self.state.schedule.get(id)?)
    }

    /// Live buckets from head to tail.
    pub fn maturities(&self) -> Vec<(BucketId, MaturityBucket)> {
        self.state
            .schedule
            .live()
            .map(|(id, bucket)| (id, *bucket))
            .collect()
    }

    // --- Accounts ---

    /// Stored account record as of its last settlement.
    pub fn account(&self, id: &AccountId) -> Account {
        self.state.account(id)
    }

    /// Balance of `id` as of now, including interest not yet settled.
    ///
    /// Read-only: the projection walks the whole overdue backlog without a
    /// batch limit and commits nothing.
    pub fn balance_of(&self, id: &AccountId) -> Result<Amount, TrancheError> {
        self.check_poisoned()?;
        let account = self.state.account(id);
        let Some(params) = self.params() else {
            return Ok(account.balance);
        };
        let engine = AccrualEngine::new(&params);
        let now = self.clock.now();
        let projected = engine.project(&self.state.meta.index, &self.state.schedule, now)?;
        Ok(settlement::projected_balance(&account, projected.exp_index)?)
    }

    /// Remaining amount `spender` may move out of `owner`.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.state.allowance(&(owner.clone(), spender.clone()))
    }

    // --- Administration ---

    /// Set the interest rate and batch limit and start the index at 1.0 now.
    pub fn configure(
        &mut self,
        caller: &AccountId,
        annual_interest_rate: Amount,
        batch_limit: u32,
    ) -> Result<(), TrancheError> {
        self.check_poisoned()?;
        self.require_role(caller, Role::Admin)?;
        if self.is_configured() {
            return Err(LedgerError::AlreadyConfigured.into());
        }
        if batch_limit == 0 {
            return Err(LedgerError::ZeroBatchLimit.into());
        }

        let now = self.clock.now();
        let params = LedgerParams {
            annual_interest_rate,
            batch_limit,
            min_accrual_period: self.options.min_accrual_period,
        };
        info!(
            caller = %caller,
            annual_interest_rate = %annual_interest_rate,
            batch_limit,
            now,
            "configuring ledger"
        );
        self.transact("configure", |state| {
            state.meta.params = Some(params);
            state.meta.index = IndexState::genesis(now);
            Ok(())
        })
    }

    /// Change the number of matured buckets one accrual call may retire.
    pub fn set_batch_limit(&mut self, caller: &AccountId, batch_limit: u32) -> Result<(), TrancheError> {
        let mut params = self.require_params()?;
        self.require_role(caller, Role::Admin)?;
        if batch_limit == 0 {
            return Err(LedgerError::ZeroBatchLimit.into());
        }
        params.batch_limit = batch_limit;
        info!(caller = %caller, batch_limit, "batch limit changed");
        self.transact("set_batch_limit", |state| {
            state.meta.params = Some(params);
            Ok(())
        })
    }

    // --- Supply ---

    /// Credit `amount` to `account`.
    pub fn mint(&mut self, caller: &AccountId, account: &AccountId, amount: Amount) -> Result<(), TrancheError> {
        self.require_params()?;
        self.require_role(caller, Role::Minter)?;

        let plan = self.plan_to_now()?;
        let settled = settlement::credit(&self.state.account(account), amount, plan.index.exp_index)?;
        let mut index = plan.index;
        index.total_supply = grow_supply(index.total_supply, settled.interest, amount)?;

        info!(account = %account, amount = %amount, "mint");
        self.transact("mint", |state| {
            state.apply(&plan, index)?;
            state.set_account(account, settled.account);
            Ok(())
        })
    }

    /// Debit `amount` from `account`.
    pub fn burn(&mut self, caller: &AccountId, account: &AccountId, amount: Amount) -> Result<(), TrancheError> {
        self.require_params()?;
        self.require_role(caller, Role::Burner)?;

        let plan = self.plan_to_now()?;
        let settled = settlement::debit(&self.state.account(account), amount, plan.index.exp_index)?;
        let mut index = plan.index;
        index.total_supply = grow_supply(index.total_supply, settled.interest, 0)?
            .checked_sub(amount)
            .ok_or(LedgerError::ValueOverflow)?;

        info!(account = %account, amount = %amount, "burn");
        self.transact("burn", |state| {
            state.apply(&plan, index)?;
            state.set_account(account, settled.account);
            Ok(())
        })
    }

    // --- Schedule ---

    /// Add `amount` of principal maturing at `end_timestamp`.
    ///
    /// The active value may not exceed the total supply, so principal is
    /// minted before it is registered here.
    pub fn add_deposit(&mut self, amount: Amount, end_timestamp: Timestamp) -> Result<(), TrancheError> {
        self.require_params()?;
        check_deposit_args(amount, end_timestamp)?;

        let plan = self.plan_to_now()?;
        let mut index = plan.index;
        let active = index
            .total_active_value
            .checked_add(amount)
            .ok_or(LedgerError::ValueOverflow)?;
        if active > index.total_supply {
            return Err(LedgerError::ActiveExceedsSupply {
                active,
                supply: index.total_supply,
            }
            .into());
        }
        index.total_active_value = active;

        self.transact("add_deposit", |state| {
            state.apply(&plan, index)?;
            let insertion = state.schedule.insert(amount, end_timestamp)?;
            info!(
                bucket = insertion.id,
                merged = insertion.merged,
                amount = %amount,
                end_timestamp,
                "deposit added"
            );
            Ok(())
        })
    }

    /// Remove up to `amount` from the bucket maturing at `end_timestamp`.
    ///
    /// The removal is clamped to what the bucket holds; the active value
    /// drops by the removed amount only while the bucket has not matured.
    pub fn remove_deposit(&mut self, amount: Amount, end_timestamp: Timestamp) -> Result<(), TrancheError> {
        self.require_params()?;
        check_deposit_args(amount, end_timestamp)?;
        if self.state.schedule.find(end_timestamp).is_none() {
            return Err(ScheduleError::EntryNotFound(end_timestamp).into());
        }

        let plan = self.plan_to_now()?;
        self.transact("remove_deposit", |state| {
            state.apply(&plan, plan.index)?;
            let reduction = state.schedule.reduce(amount, end_timestamp)?;
            if reduction.live {
                let active = &mut state.meta.index.total_active_value;
                *active = active.saturating_sub(reduction.removed);
            }
            info!(
                bucket = reduction.id,
                removed = %reduction.removed,
                live = reduction.live,
                end_timestamp,
                "deposit removed"
            );
            Ok(())
        })
    }

    // --- Accrual ---

    /// Advance the index up to now, retiring at most `batch_limit` matured
    /// buckets. Call again while the report says `caught_up == false`.
    pub fn accrue_interest(&mut self) -> Result<AccrualReport, TrancheError> {
        self.require_params()?;
        let plan = self.plan()?;
        let report = AccrualReport {
            processed: plan.processed,
            caught_up: plan.caught_up,
            exp_index: plan.index.exp_index,
            accrual_timestamp: plan.index.accrual_timestamp,
        };
        if plan.is_noop(&self.state.meta.index, &self.state.schedule) {
            debug!("accrual: nothing to do");
            return Ok(report);
        }

        info!(
            processed = plan.processed,
            caught_up = plan.caught_up,
            exp_index = %plan.index.exp_index,
            "interest accrued"
        );
        self.transact("accrue_interest", |state| state.apply(&plan, plan.index))?;
        Ok(report)
    }

    // --- Transfers ---

    /// Move `amount` from `from` to `to`, settling both sides first.
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TrancheError> {
        self.require_params()?;
        let plan = self.plan_to_now()?;
        let (outcome, index) = self.plan_transfer(&plan, from, to, amount)?;

        debug!(from = %from, to = %to, amount = %amount, "transfer");
        self.transact("transfer", |state| {
            state.apply(&plan, index)?;
            state.set_account(from, outcome.from.account);
            state.set_account(to, outcome.to.account);
            Ok(())
        })
    }

    /// Let `spender` move up to `amount` out of `owner`. Replaces any
    /// previous allowance.
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) -> Result<(), TrancheError> {
        self.require_params()?;
        debug!(owner = %owner, spender = %spender, amount = %amount, "approve");
        let key = (owner.clone(), spender.clone());
        self.transact("approve", |state| {
            state.set_allowance(key, amount);
            Ok(())
        })
    }

    /// Transfer on behalf of `from`, spending `spender`'s allowance.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TrancheError> {
        self.require_params()?;
        let key = (from.clone(), spender.clone());
        let allowed = self.state.allowance(&key);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                have: allowed,
                need: amount,
            }
            .into());
        }

        let plan = self.plan_to_now()?;
        let (outcome, index) = self.plan_transfer(&plan, from, to, amount)?;

        debug!(spender = %spender, from = %from, to = %to, amount = %amount, "transfer_from");
        self.transact("transfer_from", |state| {
            state.apply(&plan, index)?;
            state.set_account(from, outcome.from.account);
            state.set_account(to, outcome.to.account);
            state.set_allowance(key, allowed - amount);
            Ok(())
        })
    }

    // --- Internal helpers ---

    fn check_poisoned(&self) -> Result<(), LedgerError> {
        if self.poisoned {
            return Err(LedgerError::Poisoned);
        }
        Ok(())
    }

    fn require_params(&self) -> Result<LedgerParams, LedgerError> {
        self.check_poisoned()?;
        self.params().ok_or(LedgerError::NotConfigured)
    }

    fn require_role(&self, caller: &AccountId, role: Role) -> Result<(), LedgerError> {
        if self.authority.is_permitted(caller, role) {
            Ok(())
        } else {
            warn!(caller = %caller, %role, "unauthorized call");
            Err(LedgerError::NotAuthorized {
                caller: caller.to_string(),
                role,
            })
        }
    }

    /// Accrual plan up to now under the committed batch limit.
    fn plan(&self) -> Result<AccrualPlan, TrancheError> {
        let params = self.require_params()?;
        let engine = AccrualEngine::new(&params);
        let plan = engine.plan(
            &self.state.meta.index,
            &self.state.schedule,
            self.clock.now(),
            params.batch_limit,
        )?;
        if !plan.caught_up {
            warn!(
                processed = plan.processed,
                accrual_timestamp = plan.index.accrual_timestamp,
                "batch limit reached with matured buckets remaining"
            );
        }
        Ok(plan)
    }

    /// Accrual plan that reaches `now`, for operations that change the total
    /// supply or the active value.
    fn plan_to_now(&self) -> Result<AccrualPlan, TrancheError> {
        let plan = self.plan()?;
        if !plan.caught_up {
            return Err(LedgerError::AccrualBacklog(self.state.meta.index.accrual_timestamp).into());
        }
        Ok(plan)
    }

    /// Settle both sides of a transfer at the planned index.
    ///
    /// A self-transfer debits and credits the same record in sequence.
    fn plan_transfer(
        &self,
        plan: &AccrualPlan,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(TransferOutcome, IndexState), TrancheError> {
        let exp_index = plan.index.exp_index;
        let debited = settlement::debit(&self.state.account(from), amount, exp_index)?;
        let credited = if from == to {
            settlement::credit(&debited.account, amount, exp_index)?
        } else {
            settlement::credit(&self.state.account(to), amount, exp_index)?
        };

        let mut index = plan.index;
        let interest = debited
            .interest
            .checked_add(credited.interest)
            .ok_or(LedgerError::ValueOverflow)?;
        index.total_supply = grow_supply(index.total_supply, interest, 0)?;

        // For a self-transfer the credited record is the final one.
        let from_settled = if from == to { credited } else { debited };
        Ok((
            TransferOutcome {
                from: from_settled,
                to: credited,
            },
            index,
        ))
    }

    /// Run `op` against the in-memory state and commit what it touched.
    ///
    /// On any failure the committed state is reloaded from the store. If the
    /// reload fails as well the ledger is poisoned and the original error is
    /// still the one returned.
    fn transact<T>(
        &mut self,
        name: &str,
        op: impl FnOnce(&mut LedgerState) -> Result<T, TrancheError>,
    ) -> Result<T, TrancheError> {
        let result = op(&mut self.state).and_then(|value| {
            let delta = self.state.take_delta();
            debug!(op = name, records = delta.record_count(), "committing");
            self.store.commit(&delta)?;
            Ok(value)
        });

        if let Err(err) = &result {
            warn!(op = name, error = %err, "operation failed, restoring committed state");
            match LedgerState::load(&self.store) {
                Ok(state) => self.state = state,
                Err(reload) => {
                    error!(
                        op = name,
                        error = %err,
                        reload_error = %reload,
                        "could not restore committed state, ledger poisoned"
                    );
                    self.poisoned = true;
                }
            }
        }
        result
    }
}

/// `supply + interest + minted`, failing on overflow.
fn grow_supply(supply: Amount, interest: Amount, minted: Amount) -> Result<Amount, LedgerError> {
    supply
        .checked_add(interest)
        .and_then(|s| s.checked_add(minted))
        .ok_or(LedgerError::ValueOverflow)
}

fn check_deposit_args(amount: Amount, end_timestamp: Timestamp) -> Result<(), ScheduleError> {
    if amount == 0 {
        return Err(ScheduleError::NonPositiveAmount);
    }
    if end_timestamp == 0 {
        return Err(ScheduleError::NonPositiveEndDate);
    }
    Ok(())
}
