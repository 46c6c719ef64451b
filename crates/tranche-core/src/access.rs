//! Static role grants implementing [`Authority`].
//!
//! The governance layer that decides who holds which role is out of scope;
//! [`RoleTable`] is the minimal stand-in used by tests and the CLI.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::traits::Authority;
use crate::types::{AccountId, Role};

/// A set of `(account, role)` grants behind a read-write lock.
#[derive(Debug, Default)]
pub struct RoleTable {
    grants: RwLock<HashSet<(AccountId, Role)>>,
}

impl RoleTable {
    /// Create an empty table: nobody holds any role.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table granting every role to one operator account.
    pub fn with_operator(operator: impl Into<AccountId>) -> Self {
        let operator = operator.into();
        let table = Self::new();
        for role in [Role::Admin, Role::Minter, Role::Burner] {
            table.grant(operator.clone(), role);
        }
        table
    }

    /// Grant `role` to `account`. Returns `false` if it was already held.
    pub fn grant(&self, account: impl Into<AccountId>, role: Role) -> bool {
        self.grants.write().insert((account.into(), role))
    }

    /// Revoke `role` from `account`. Returns `false` if it was not held.
    pub fn revoke(&self, account: &AccountId, role: Role) -> bool {
        self.grants.write().remove(&(account.clone(), role))
    }

    /// Number of grants in the table.
    pub fn len(&self) -> usize {
        self.grants.read().len()
    }

    /// Whether no role is granted to anyone.
    pub fn is_empty(&self) -> bool {
        self.grants.read().is_empty()
    }
}

impl Authority for RoleTable {
    fn is_permitted(&self, caller: &AccountId, role: Role) -> bool {
        self.grants.read().contains(&(caller.clone(), role))
    }
}
