//! # Allowances
//!
//! Two-tier approval state: `(owner, spender) -> { amount, expires_at }`.
//!
//! Expired entries are not purged eagerly. Readers go through
//! [`AllowanceStore::effective`], which reports an expired allowance as
//! `{ amount: 0, expires_at: None }`, so a stale entry can never be spent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::account::Account;
use crate::clock::Timestamp;

/// A spender's permission to move up to `amount` from an owner's account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl Allowance {
    /// An allowance whose expiry is at or before `now` is spent.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AllowanceStore {
    entries: BTreeMap<(Account, Account), Allowance>,
}

impl AllowanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The allowance as every reader must see it at `now`.
    pub fn effective(&self, owner: &Account, spender: &Account, now: Timestamp) -> Allowance {
        match self.entries.get(&(owner.clone(), spender.clone())) {
            Some(a) if !a.is_expired(now) => *a,
            _ => Allowance::default(),
        }
    }

    /// Replaces the allowance outright. An amount of zero removes the entry.
    pub fn set(
        &mut self,
        owner: &Account,
        spender: &Account,
        amount: u64,
        expires_at: Option<Timestamp>,
    ) {
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, Allowance { amount, expires_at });
        }
    }

    /// Lowers the stored amount by `by`, keeping the expiry.
    ///
    /// Returns the remaining amount, or `None` (leaving the entry untouched)
    /// when the effective allowance is smaller than `by`.
    pub fn consume(
        &mut self,
        owner: &Account,
        spender: &Account,
        by: u64,
        now: Timestamp,
    ) -> Option<u64> {
        let current = self.effective(owner, spender, now);
        let remaining = current.amount.checked_sub(by)?;
        self.set(owner, spender, remaining, current.expires_at);
        Some(remaining)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::Principal;

    fn acct(name: &str) -> Account {
        Account::new(Principal::new(name).unwrap())
    }

    #[test]
    fn approve_replaces_rather_than_adds() {
        let mut store = AllowanceStore::new();
        store.set(&acct("alice"), &acct("bob"), 100, None);
        store.set(&acct("alice"), &acct("bob"), 30, None);
        assert_eq!(store.effective(&acct("alice"), &acct("bob"), 0).amount, 30);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_allowance_reads_as_zero_without_purge() {
        let mut store = AllowanceStore::new();
        store.set(&acct("alice"), &acct("bob"), 100, Some(1_000));

        let live = store.effective(&acct("alice"), &acct("bob"), 999);
        assert_eq!(live, Allowance { amount: 100, expires_at: Some(1_000) });

        let dead = store.effective(&acct("alice"), &acct("bob"), 1_000);
        assert_eq!(dead, Allowance::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn consume_keeps_expiry_and_removes_at_zero() {
        let mut store = AllowanceStore::new();
        store.set(&acct("alice"), &acct("bob"), 50, Some(10_000));

        assert_eq!(store.consume(&acct("alice"), &acct("bob"), 20, 5), Some(30));
        assert_eq!(
            store.effective(&acct("alice"), &acct("bob"), 5).expires_at,
            Some(10_000)
        );

        assert_eq!(store.consume(&acct("alice"), &acct("bob"), 31, 5), None);
        assert_eq!(store.consume(&acct("alice"), &acct("bob"), 30, 5), Some(0));
        assert!(store.is_empty());
    }

    #[test]
    fn allowances_are_directional() {
        let mut store = AllowanceStore::new();
        store.set(&acct("alice"), &acct("bob"), 100, None);
        assert_eq!(store.effective(&acct("bob"), &acct("alice"), 0).amount, 0);
    }
}
