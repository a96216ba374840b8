//! # Transaction Log
//!
//! Append-only record of every accepted state transition. Indices start at
//! zero, grow by one per accepted operation, and are never reused.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::account::Account;
use crate::clock::Timestamp;

/// Position of a transaction in the log.
pub type TxIndex = u64;

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// Opaque caller-supplied bytes attached to a transaction. Hex on the wire.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Memo(Vec<u8>);

impl Memo {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memo({})", hex::encode(&self.0))
    }
}

impl Serialize for Memo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Memo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Self).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// What a transaction did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Mint {
        to: Account,
        amount: u64,
    },
    Burn {
        from: Account,
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spender: Option<Account>,
    },
    Transfer {
        from: Account,
        to: Account,
        amount: u64,
        fee: u64,
        /// Set when the transfer was made on behalf of `from`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spender: Option<Account>,
    },
    Approve {
        from: Account,
        spender: Account,
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_allowance: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<Timestamp>,
        fee: u64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Mint { .. } => "mint",
            Operation::Burn { .. } => "burn",
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
        }
    }
}

/// One immutable log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub operation: Operation,
    /// Ledger clock value at acceptance.
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Memo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_time: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// TransactionLog
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct TransactionLog {
    entries: Vec<Transaction>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tx` and returns its index.
    pub fn append(&mut self, tx: Transaction) -> TxIndex {
        self.entries.push(tx);
        (self.entries.len() - 1) as TxIndex
    }

    pub fn get(&self, index: TxIndex) -> Option<&Transaction> {
        usize::try_from(index).ok().and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `length` entries starting at `start`; empty past the end.
    pub fn range(&self, start: TxIndex, length: u64) -> &[Transaction] {
        let len = self.entries.len();
        let from = usize::try_from(start).unwrap_or(len).min(len);
        let to = from.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(len);
        &self.entries[from..to]
    }
}
