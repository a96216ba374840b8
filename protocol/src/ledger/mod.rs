//! # Share Ledger
//!
//! The fungible share token of a vault: balances, allowances, and the
//! transfer / approve / transfer_from state machine with its fee burn and
//! replay rules.
//!
//! Every public operation is atomic. It validates, checks every balance and
//! allowance it will touch, and only then mutates; an `Err` return means
//! nothing changed. Every success appends exactly one [`Transaction`].
//!
//! `mint` and `burn` are crate-private: only the vault may create or destroy
//! shares outside of fee collection.

pub mod account;
pub mod allowance;
pub mod balance;
pub mod transaction;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::{Clock, Timestamp};
use crate::config::{LedgerConfig, DECIMALS, MAX_TRANSACTIONS_PER_QUERY};
use crate::validation::{self, DedupKey, ReplayGuard, Request, RequestKind};

pub use account::{Account, AccountError, Principal, Subaccount};
pub use allowance::{Allowance, AllowanceStore};
pub use balance::{BalanceError, BalanceStore};
pub use transaction::{Memo, Operation, Transaction, TransactionLog, TxIndex};
pub use types::*;

/// Caller-supplied metadata carried into the log entry.
struct Envelope {
    memo: Option<Memo>,
    created_at_time: Option<Timestamp>,
    dedup: Option<DedupKey>,
}

impl Envelope {
    fn internal() -> Self {
        Self {
            memo: None,
            created_at_time: None,
            dedup: None,
        }
    }
}

pub struct Ledger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    balances: BalanceStore,
    allowances: AllowanceStore,
    log: TransactionLog,
    replay: ReplayGuard,
    /// Accounts with a redemption in flight; outgoing operations are refused.
    busy: BTreeSet<Account>,
}

impl Ledger {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            balances: BalanceStore::new(),
            allowances: AllowanceStore::new(),
            log: TransactionLog::new(),
            replay: ReplayGuard::new(),
            busy: BTreeSet::new(),
        }
    }

    // -- Reads --------------------------------------------------------------

    pub fn balance_of(&self, account: &Account) -> u64 {
        self.balances.balance_of(account)
    }

    pub fn total_supply(&self) -> u64 {
        self.balances.total_supply()
    }

    /// Current allowance; an expired one reads as `{ 0, None }`.
    pub fn allowance(&self, owner: &Account, spender: &Account) -> Allowance {
        self.allowances.effective(owner, spender, self.clock.now())
    }

    pub fn fee(&self) -> u64 {
        self.config.fee
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn metadata(&self) -> LedgerMetadata {
        LedgerMetadata {
            name: self.config.name.clone(),
            symbol: self.config.symbol.clone(),
            decimals: DECIMALS,
            fee: self.config.fee,
        }
    }

    /// Up to `length` transactions from `start`, capped at
    /// [`MAX_TRANSACTIONS_PER_QUERY`].
    pub fn get_transactions(&self, start: TxIndex, length: u64) -> GetTransactionsResponse {
        let log_length = self.log.len();
        let length = length.min(MAX_TRANSACTIONS_PER_QUERY);
        GetTransactionsResponse {
            log_length,
            first_index: start.min(log_length),
            transactions: self.log.range(start, length).to_vec(),
        }
    }

    pub fn transaction(&self, index: TxIndex) -> Option<&Transaction> {
        self.log.get(index)
    }

    /// Iterates every non-zero balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Account, u64)> {
        self.balances.iter()
    }

    pub fn is_busy(&self, account: &Account) -> bool {
        self.busy.contains(account)
    }

    // -- Public operations --------------------------------------------------

    /// Moves `args.amount` from `(caller, args.from_subaccount)` to `args.to`
    /// and burns the protocol fee from the sender.
    pub fn transfer(
        &mut self,
        caller: &Principal,
        args: TransferArgs,
    ) -> Result<TxIndex, TransferError> {
        let now = self.begin();
        let from = Account {
            owner: caller.clone(),
            subaccount: args.from_subaccount,
        };
        let request = Request {
            kind: RequestKind::Transfer,
            caller: &from,
            fee: args.fee,
            memo: args.memo.as_ref(),
            created_at_time: args.created_at_time,
        };
        validation::validate(&request, &self.replay, &self.config, now)?;
        let dedup = request.dedup_key();
        self.ensure_idle::<TransferError>(&from)?;

        let envelope = Envelope {
            memo: args.memo,
            created_at_time: args.created_at_time,
            dedup,
        };
        self.commit_transfer(from, args.to, args.amount, None, envelope, now)
    }

    /// Sets the allowance of `args.spender` over the caller's account to
    /// exactly `args.amount`, burning the protocol fee from the caller.
    pub fn approve(
        &mut self,
        caller: &Principal,
        args: ApproveArgs,
    ) -> Result<TxIndex, ApproveError> {
        let now = self.begin();
        let from = Account {
            owner: caller.clone(),
            subaccount: args.from_subaccount,
        };
        let request = Request {
            kind: RequestKind::Approve,
            caller: &from,
            fee: args.fee,
            memo: args.memo.as_ref(),
            created_at_time: args.created_at_time,
        };
        validation::validate(&request, &self.replay, &self.config, now)?;
        let dedup = request.dedup_key();

        if args.spender == from {
            return Err(ApproveError::generic(
                ERR_SELF_APPROVAL,
                "an account cannot approve itself",
            ));
        }
        self.ensure_idle::<ApproveError>(&from)?;

        if let Some(at) = args.expires_at {
            if at <= now {
                return Err(ApproveError::Expired { time: now });
            }
        }

        let current = self.allowances.effective(&from, &args.spender, now);
        if let Some(expected) = args.expected_allowance {
            if expected != current.amount {
                return Err(ApproveError::AllowanceChanged {
                    current: current.amount,
                });
            }
        }

        let fee = self.config.fee;
        self.balances.burn(&from, fee).map_err(|e| match e {
            BalanceError::InsufficientBalance { balance, .. } => {
                ApproveError::InsufficientFunds { balance }
            }
            other => ApproveError::generic(ERR_ARITHMETIC, other.to_string()),
        })?;
        self.allowances
            .set(&from, &args.spender, args.amount, args.expires_at);

        let operation = Operation::Approve {
            from,
            spender: args.spender,
            amount: args.amount,
            expected_allowance: args.expected_allowance,
            expires_at: args.expires_at,
            fee,
        };
        let envelope = Envelope {
            memo: args.memo,
            created_at_time: args.created_at_time,
            dedup,
        };
        Ok(self.record(operation, envelope, now))
    }

    /// Moves funds out of `args.from` on the caller's behalf, consuming
    /// `amount + fee` of the caller's allowance.
    ///
    /// When the caller's account is `args.from` itself this is a plain
    /// transfer and allowances are neither consulted nor touched.
    pub fn transfer_from(
        &mut self,
        caller: &Principal,
        args: TransferFromArgs,
    ) -> Result<TxIndex, TransferFromError> {
        let now = self.begin();
        let spender = Account {
            owner: caller.clone(),
            subaccount: args.spender_subaccount,
        };
        let request = Request {
            kind: RequestKind::TransferFrom,
            caller: &spender,
            fee: args.fee,
            memo: args.memo.as_ref(),
            created_at_time: args.created_at_time,
        };
        validation::validate(&request, &self.replay, &self.config, now)?;
        let dedup = request.dedup_key();
        self.ensure_idle::<TransferFromError>(&args.from)?;

        let envelope = Envelope {
            memo: args.memo,
            created_at_time: args.created_at_time,
            dedup,
        };
        if spender == args.from {
            return Ok(self.commit_transfer(args.from, args.to, args.amount, None, envelope, now)?);
        }

        let debit = args
            .amount
            .checked_add(self.config.fee)
            .ok_or_else(|| TransferFromError::generic(ERR_ARITHMETIC, "amount plus fee overflows"))?;
        let available = self.allowances.effective(&args.from, &spender, now).amount;
        if available < debit {
            return Err(TransferFromError::InsufficientAllowance {
                allowance: available,
            });
        }

        // Balance failures surface before the allowance is consumed.
        let index = self.commit_transfer(
            args.from.clone(),
            args.to,
            args.amount,
            Some(spender.clone()),
            envelope,
            now,
        )?;
        self.allowances.consume(&args.from, &spender, debit, now);
        Ok(index)
    }

    // -- Vault primitives ---------------------------------------------------

    /// Creates `amount` shares in `to`. Charges no fee.
    pub(crate) fn mint(&mut self, to: &Account, amount: u64) -> Result<TxIndex, BalanceError> {
        let now = self.clock.now();
        self.balances.mint(to, amount)?;
        let operation = Operation::Mint {
            to: to.clone(),
            amount,
        };
        Ok(self.record(operation, Envelope::internal(), now))
    }

    /// Destroys `amount` shares held by `from`. Charges no fee.
    pub(crate) fn burn(
        &mut self,
        from: &Account,
        amount: u64,
        spender: Option<Account>,
    ) -> Result<TxIndex, BalanceError> {
        let now = self.clock.now();
        self.balances.burn(from, amount)?;
        let operation = Operation::Burn {
            from: from.clone(),
            amount,
            spender,
        };
        Ok(self.record(operation, Envelope::internal(), now))
    }

    /// Marks `account` as having a redemption in flight. Returns `false` if
    /// it already was.
    pub(crate) fn mark_busy(&mut self, account: &Account) -> bool {
        self.busy.insert(account.clone())
    }

    pub(crate) fn clear_busy(&mut self, account: &Account) {
        self.busy.remove(account);
    }

    // -- Internals ----------------------------------------------------------

    /// Reads the clock and forgets dedup entries that can no longer match.
    fn begin(&mut self) -> Timestamp {
        let now = self.clock.now();
        let pruned = self
            .replay
            .prune_before(validation::dedup_cutoff(&self.config, now));
        if pruned > 0 {
            debug!(pruned, remaining = self.replay.len(), "pruned replay cache");
        }
        now
    }

    fn ensure_idle<E: OperationError>(&self, account: &Account) -> Result<(), E> {
        if self.busy.contains(account) {
            warn!(%account, "rejected outgoing operation: redemption in flight");
            return Err(E::generic(
                ERR_ACCOUNT_BUSY,
                format!("account {account} has a redemption in flight"),
            ));
        }
        Ok(())
    }

    fn commit_transfer(
        &mut self,
        from: Account,
        to: Account,
        amount: u64,
        spender: Option<Account>,
        envelope: Envelope,
        now: Timestamp,
    ) -> Result<TxIndex, TransferError> {
        let fee = self.config.fee;
        self.balances
            .transfer(&from, &to, amount, fee)
            .map_err(|e| match e {
                BalanceError::InsufficientBalance { balance, .. } => {
                    TransferError::InsufficientFunds { balance }
                }
                BalanceError::Overflow { .. } => {
                    TransferError::generic(ERR_ARITHMETIC, e.to_string())
                }
            })?;
        let operation = Operation::Transfer {
            from,
            to,
            amount,
            fee,
            spender,
        };
        Ok(self.record(operation, envelope, now))
    }

    fn record(&mut self, operation: Operation, envelope: Envelope, now: Timestamp) -> TxIndex {
        let kind = operation.name();
        let index = self.log.append(Transaction {
            operation,
            timestamp: now,
            memo: envelope.memo,
            created_at_time: envelope.created_at_time,
        });
        if let Some(key) = envelope.dedup {
            self.replay.record(key, index);
        }
        debug!(
            index,
            kind,
            total_supply = self.balances.total_supply(),
            "transaction accepted"
        );
        index
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
