//! # Share Balances
//!
//! [`BalanceStore`] maps [`Account`] to a share amount and keeps
//! `total_supply` in lockstep with the sum of all entries. Zero balances are
//! never stored, so "absent" and "zero" mean the same thing.
//!
//! Every operation validates completely before it mutates anything: a call
//! that returns `Err` has left the store untouched.

use std::collections::BTreeMap;

use thiserror::Error;

use super::account::Account;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance: available {balance}, requested {requested}")]
    InsufficientBalance {
        /// The current balance.
        balance: u64,
        /// The amount that was requested, fee included.
        requested: u64,
    },

    /// A credit, mint, or amount-plus-fee sum would exceed `u64::MAX`.
    #[error("balance overflow: current {current}, credit {credit}")]
    Overflow { current: u64, credit: u64 },
}

// ---------------------------------------------------------------------------
// BalanceStore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct BalanceStore {
    balances: BTreeMap<Account, u64>,
    total_supply: u64,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`; zero when absent.
    pub fn balance_of(&self, account: &Account) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Number of accounts holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// All non-zero balances in account order.
    pub fn iter(&self) -> impl Iterator<Item = (&Account, u64)> {
        self.balances.iter().map(|(a, b)| (a, *b))
    }

    /// Creates `amount` new units in `to`, growing the supply.
    ///
    /// Returns the new balance of `to`.
    pub fn mint(&mut self, to: &Account, amount: u64) -> Result<u64, BalanceError> {
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(BalanceError::Overflow {
                current: self.total_supply,
                credit: amount,
            })?;
        // Every balance is bounded by the supply, so this cannot overflow
        // once the supply check passed.
        let new_balance = self.balance_of(to) + amount;

        self.total_supply = new_supply;
        self.set(to, new_balance);
        Ok(new_balance)
    }

    /// Destroys `amount` units held by `from`, shrinking the supply.
    ///
    /// Returns the remaining balance of `from`.
    pub fn burn(&mut self, from: &Account, amount: u64) -> Result<u64, BalanceError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(BalanceError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }

        let remaining = balance - amount;
        self.total_supply -= amount;
        self.set(from, remaining);
        Ok(remaining)
    }

    /// Moves `amount` from `from` to `to` and burns `fee` from `from`.
    ///
    /// The debit is `amount + fee`; only `fee` leaves the supply.
    pub fn transfer(
        &mut self,
        from: &Account,
        to: &Account,
        amount: u64,
        fee: u64,
    ) -> Result<(), BalanceError> {
        let debit = amount.checked_add(fee).ok_or(BalanceError::Overflow {
            current: amount,
            credit: fee,
        })?;
        let from_balance = self.balance_of(from);
        if from_balance < debit {
            return Err(BalanceError::InsufficientBalance {
                balance: from_balance,
                requested: debit,
            });
        }

        if from == to {
            self.set(from, from_balance - fee);
        } else {
            // `amount` was part of the supply already; the credit cannot
            // push any balance beyond it.
            let to_balance = self.balance_of(to) + amount;
            self.set(from, from_balance - debit);
            self.set(to, to_balance);
        }
        self.total_supply -= fee;
        Ok(())
    }

    fn set(&mut self, account: &Account, amount: u64) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), amount);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::Principal;

    fn acct(name: &str) -> Account {
        Account::new(Principal::new(name).unwrap())
    }

    fn sum(store: &BalanceStore) -> u64 {
        store.iter().map(|(_, b)| b).sum()
    }

    #[test]
    fn mint_creates_entry_and_supply() {
        let mut store = BalanceStore::new();
        assert_eq!(store.mint(&acct("alice"), 1_000).unwrap(), 1_000);
        assert_eq!(store.balance_of(&acct("alice")), 1_000);
        assert_eq!(store.total_supply(), 1_000);
        assert_eq!(store.holder_count(), 1);
    }

    #[test]
    fn mint_overflow_rejected_without_effect() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), u64::MAX).unwrap();
        let err = store.mint(&acct("bob"), 1).unwrap_err();
        assert!(matches!(err, BalanceError::Overflow { .. }));
        assert_eq!(store.balance_of(&acct("bob")), 0);
        assert_eq!(store.total_supply(), u64::MAX);
    }

    #[test]
    fn burn_to_zero_removes_entry() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 500).unwrap();
        assert_eq!(store.burn(&acct("alice"), 500).unwrap(), 0);
        assert_eq!(store.holder_count(), 0);
        assert_eq!(store.total_supply(), 0);
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 100).unwrap();
        assert_eq!(
            store.burn(&acct("alice"), 200),
            Err(BalanceError::InsufficientBalance {
                balance: 100,
                requested: 200
            })
        );
        assert_eq!(store.total_supply(), 100);
    }

    #[test]
    fn transfer_moves_amount_and_burns_fee() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 1_000).unwrap();
        store
            .transfer(&acct("alice"), &acct("bob"), 300, 10)
            .unwrap();

        assert_eq!(store.balance_of(&acct("alice")), 690);
        assert_eq!(store.balance_of(&acct("bob")), 300);
        assert_eq!(store.total_supply(), 990);
        assert_eq!(sum(&store), store.total_supply());
    }

    #[test]
    fn transfer_requires_amount_plus_fee() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 100).unwrap();
        let err = store
            .transfer(&acct("alice"), &acct("bob"), 95, 10)
            .unwrap_err();
        assert_eq!(
            err,
            BalanceError::InsufficientBalance {
                balance: 100,
                requested: 105
            }
        );
        assert_eq!(store.balance_of(&acct("alice")), 100);
        assert_eq!(store.balance_of(&acct("bob")), 0);
    }

    #[test]
    fn self_transfer_only_costs_fee() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 100).unwrap();
        store
            .transfer(&acct("alice"), &acct("alice"), 50, 1)
            .unwrap();
        assert_eq!(store.balance_of(&acct("alice")), 99);
        assert_eq!(store.total_supply(), 99);
    }

    #[test]
    fn amount_plus_fee_overflow_rejected() {
        let mut store = BalanceStore::new();
        store.mint(&acct("alice"), 100).unwrap();
        let err = store
            .transfer(&acct("alice"), &acct("bob"), u64::MAX, 1)
            .unwrap_err();
        assert!(matches!(err, BalanceError::Overflow { .. }));
    }
}
