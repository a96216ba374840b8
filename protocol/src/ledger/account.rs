//! # Accounts
//!
//! An [`Account`] is an owner [`Principal`] plus an optional 32-byte
//! [`Subaccount`]. It is the only key the ledger uses for balances and
//! allowances. Two accounts are equal iff both fields match, so
//! `(alice, None)` and `(alice, Some([0; 32]))` are distinct accounts.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest principal identifier accepted, in bytes.
pub const MAX_PRINCIPAL_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing account identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("principal must not be empty")]
    EmptyPrincipal,

    #[error("principal is {len} bytes, limit is {max}")]
    PrincipalTooLong { len: usize, max: usize },

    #[error("principal contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("subaccount must be 32 hex-encoded bytes: {0}")]
    InvalidSubaccount(String),
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// Textual identity of an account owner.
///
/// Accepts ASCII alphanumerics plus `-` and `_`, which covers both the
/// dashed textual principal format and plain test identifiers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Result<Self, AccountError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AccountError::EmptyPrincipal);
        }
        if id.len() > MAX_PRINCIPAL_LENGTH {
            return Err(AccountError::PrincipalTooLong {
                len: id.len(),
                max: MAX_PRINCIPAL_LENGTH,
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(AccountError::InvalidCharacter(c));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = AccountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Subaccount
// ---------------------------------------------------------------------------

/// 32-byte discriminator that splits one owner into many accounts.
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subaccount([u8; 32]);

impl Subaccount {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Subaccount whose last 8 bytes are `n` in big-endian order.
    pub fn from_index(n: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, AccountError> {
        let bytes = hex::decode(s).map_err(|e| AccountError::InvalidSubaccount(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AccountError::InvalidSubaccount(format!("{} bytes", v.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Subaccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subaccount({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Subaccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Subaccount {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Subaccount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Subaccount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Owner plus optional subaccount; the unit of balance and allowance ownership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account {
    pub owner: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<Subaccount>,
}

impl Account {
    /// The owner's account with no subaccount.
    pub fn new(owner: Principal) -> Self {
        Self {
            owner,
            subaccount: None,
        }
    }

    pub fn with_subaccount(owner: Principal, subaccount: Subaccount) -> Self {
        Self {
            owner,
            subaccount: Some(subaccount),
        }
    }
}

impl From<Principal> for Account {
    fn from(owner: Principal) -> Self {
        Self::new(owner)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subaccount {
            Some(sub) => write!(f, "{}.{}", self.owner, sub),
            None => write!(f, "{}", self.owner),
        }
    }
}
