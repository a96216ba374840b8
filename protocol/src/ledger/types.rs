//! Request and response types of the share ledger's public surface.
//!
//! Field and variant names are part of the wire contract that wallets and
//! exchanges integrate against; do not rename them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::{Account, Subaccount};
use super::transaction::{Memo, Transaction, TxIndex};
use crate::clock::Timestamp;
use crate::validation::ValidationError;

// ---------------------------------------------------------------------------
// Generic error codes
// ---------------------------------------------------------------------------

/// Memo exceeds the maximum length.
pub const ERR_MEMO_TOO_LONG: u64 = 1;
/// Approval where the spender is the approving account itself.
pub const ERR_SELF_APPROVAL: u64 = 2;
/// The paying account has a redemption in flight.
pub const ERR_ACCOUNT_BUSY: u64 = 3;
/// An amount computation left the `u64` range.
pub const ERR_ARITHMETIC: u64 = 4;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
    #[serde(default)]
    pub from_subaccount: Option<Subaccount>,
    pub to: Account,
    pub amount: u64,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub memo: Option<Memo>,
    #[serde(default)]
    pub created_at_time: Option<Timestamp>,
}

impl TransferArgs {
    /// Plain transfer with every optional field unset.
    pub fn new(to: Account, amount: u64) -> Self {
        Self {
            from_subaccount: None,
            to,
            amount,
            fee: None,
            memo: None,
            created_at_time: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveArgs {
    #[serde(default)]
    pub from_subaccount: Option<Subaccount>,
    pub spender: Account,
    pub amount: u64,
    /// Optimistic-concurrency guard: the allowance the caller believes is current.
    #[serde(default)]
    pub expected_allowance: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub memo: Option<Memo>,
    #[serde(default)]
    pub created_at_time: Option<Timestamp>,
}

impl ApproveArgs {
    pub fn new(spender: Account, amount: u64) -> Self {
        Self {
            from_subaccount: None,
            spender,
            amount,
            expected_allowance: None,
            expires_at: None,
            fee: None,
            memo: None,
            created_at_time: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFromArgs {
    #[serde(default)]
    pub spender_subaccount: Option<Subaccount>,
    pub from: Account,
    pub to: Account,
    pub amount: u64,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub memo: Option<Memo>,
    #[serde(default)]
    pub created_at_time: Option<Timestamp>,
}

impl TransferFromArgs {
    pub fn new(from: Account, to: Account, amount: u64) -> Self {
        Self {
            spender_subaccount: None,
            from,
            to,
            amount,
            fee: None,
            memo: None,
            created_at_time: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferError {
    #[error("bad fee: expected {expected}")]
    BadFee { expected: u64 },

    #[error("insufficient funds: balance {balance}")]
    InsufficientFunds { balance: u64 },

    #[error("created_at_time is too old")]
    TooOld,

    #[error("created_at_time is in the future (ledger time {time})")]
    CreatedInFuture { time: Timestamp },

    #[error("duplicate of transaction {of}")]
    Duplicate { of: TxIndex },

    #[error("error {code}: {message}")]
    GenericError { code: u64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ApproveError {
    #[error("bad fee: expected {expected}")]
    BadFee { expected: u64 },

    #[error("insufficient funds: balance {balance}")]
    InsufficientFunds { balance: u64 },

    #[error("allowance changed: current {current}")]
    AllowanceChanged { current: u64 },

    #[error("expiry is in the past (ledger time {time})")]
    Expired { time: Timestamp },

    #[error("created_at_time is too old")]
    TooOld,

    #[error("created_at_time is in the future (ledger time {time})")]
    CreatedInFuture { time: Timestamp },

    #[error("duplicate of transaction {of}")]
    Duplicate { of: TxIndex },

    #[error("error {code}: {message}")]
    GenericError { code: u64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferFromError {
    #[error("bad fee: expected {expected}")]
    BadFee { expected: u64 },

    #[error("insufficient funds: balance {balance}")]
    InsufficientFunds { balance: u64 },

    #[error("insufficient allowance: available {allowance}")]
    InsufficientAllowance { allowance: u64 },

    #[error("created_at_time is too old")]
    TooOld,

    #[error("created_at_time is in the future (ledger time {time})")]
    CreatedInFuture { time: Timestamp },

    #[error("duplicate of transaction {of}")]
    Duplicate { of: TxIndex },

    #[error("error {code}: {message}")]
    GenericError { code: u64, message: String },
}

/// Builds the `GenericError` variant shared by every operation error.
pub trait OperationError {
    fn generic(code: u64, message: impl Into<String>) -> Self;
}

/// Each operation error embeds the validation variants under the same names.
macro_rules! from_validation {
    ($($err:ident),+) => {$(
        impl OperationError for $err {
            fn generic(code: u64, message: impl Into<String>) -> Self {
                $err::GenericError {
                    code,
                    message: message.into(),
                }
            }
        }

        impl From<ValidationError> for $err {
            fn from(e: ValidationError) -> Self {
                match e {
                    ValidationError::Duplicate { of } => $err::Duplicate { of },
                    ValidationError::TooOld => $err::TooOld,
                    ValidationError::CreatedInFuture { time } => $err::CreatedInFuture { time },
                    ValidationError::BadFee { expected } => $err::BadFee { expected },
                    ValidationError::MemoTooLong { .. } => $err::GenericError {
                        code: ERR_MEMO_TOO_LONG,
                        message: e.to_string(),
                    },
                }
            }
        }
    )+};
}

from_validation!(TransferError, ApproveError, TransferFromError);

impl From<TransferError> for TransferFromError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::BadFee { expected } => Self::BadFee { expected },
            TransferError::InsufficientFunds { balance } => Self::InsufficientFunds { balance },
            TransferError::TooOld => Self::TooOld,
            TransferError::CreatedInFuture { time } => Self::CreatedInFuture { time },
            TransferError::Duplicate { of } => Self::Duplicate { of },
            TransferError::GenericError { code, message } => Self::GenericError { code, message },
        }
    }
}

// ---------------------------------------------------------------------------
// Read responses
// ---------------------------------------------------------------------------

/// A window onto the transaction log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTransactionsResponse {
    /// Total number of transactions ever accepted.
    pub log_length: u64,
    /// Index of the first entry in `transactions`.
    pub first_index: TxIndex,
    pub transactions: Vec<Transaction>,
}

/// Static description of the share token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub fee: u64,
}
