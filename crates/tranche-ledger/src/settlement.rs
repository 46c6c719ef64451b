//! Account settlement against the interest index.
//!
//! An account's real balance is its stored balance scaled by
//! `exp_index / index_snapshot`. Settling writes that scaled value back and
//! moves the snapshot to the current index; every credit and debit settles
//! first so the delta is applied on top of interest earned so far.
//!
//! These functions are pure: they return the new account and the interest
//! realized, and the ledger decides when to store them.

use tracing::debug;

use tranche_core::error::{AccrualError, LedgerError, TrancheError};
use tranche_core::math::rebase;
use tranche_core::types::{Account, Amount};

/// An account after settlement, with the interest that settlement realized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settled {
    pub account: Account,
    /// Growth of the stored balance. Added to total supply by the caller.
    pub interest: Amount,
}

/// Balance of `account` if it were settled at `exp_index`.
pub fn projected_balance(account: &Account, exp_index: Amount) -> Result<Amount, AccrualError> {
    rebase(account.balance, exp_index, account.index_snapshot)
}

/// Realize pending interest and move the snapshot to `exp_index`.
pub fn settle(account: &Account, exp_index: Amount) -> Result<Settled, AccrualError> {
    let balance = projected_balance(account, exp_index)?;
    let interest = balance.saturating_sub(account.balance);
    if interest > 0 {
        debug!(
            from = %account.balance,
            to = %balance,
            exp_index = %exp_index,
            "settled interest"
        );
    }
    Ok(Settled {
        account: Account {
            balance,
            index_snapshot: exp_index,
        },
        interest,
    })
}

/// Settle, then add `amount`.
pub fn credit(account: &Account, amount: Amount, exp_index: Amount) -> Result<Settled, TrancheError> {
    let mut settled = settle(account, exp_index)?;
    settled.account.balance = settled
        .account
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::ValueOverflow)?;
    Ok(settled)
}

/// Settle, then remove `amount`.
///
/// # Errors
///
/// [`LedgerError::InsufficientBalance`] if the settled balance is below `amount`.
pub fn debit(account: &Account, amount: Amount, exp_index: Amount) -> Result<Settled, TrancheError> {
    let mut settled = settle(account, exp_index)?;
    let have = settled.account.balance;
    if have < amount {
        return Err(LedgerError::InsufficientBalance { have, need: amount }.into());
    }
    settled.account.balance = have - amount;
    Ok(settled)
}
