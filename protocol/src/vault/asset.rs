//! Asset kinds a vault can custody.
//!
//! A closed set: the three native kinds plus any token identified by the
//! principal of its ledger. On the wire an asset is a plain string
//! (`"ICP"`, `"ckBTC"`, `"ckETH"`, `"token:<ledger-id>"`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::account::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown asset kind {0:?}")]
pub struct ParseAssetError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetKind {
    Icp,
    CkBtc,
    CkEth,
    /// Any other fungible token, named by its ledger.
    Token(Principal),
}

impl AssetKind {
    /// The native kinds, in pool order.
    pub const NATIVE: [AssetKind; 3] = [AssetKind::Icp, AssetKind::CkBtc, AssetKind::CkEth];

    pub fn is_native(&self) -> bool {
        !matches!(self, AssetKind::Token(_))
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Icp => f.write_str("ICP"),
            AssetKind::CkBtc => f.write_str("ckBTC"),
            AssetKind::CkEth => f.write_str("ckETH"),
            AssetKind::Token(ledger) => write!(f, "token:{ledger}"),
        }
    }
}

impl FromStr for AssetKind {
    type Err = ParseAssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ICP" => Ok(AssetKind::Icp),
            "ckBTC" => Ok(AssetKind::CkBtc),
            "ckETH" => Ok(AssetKind::CkEth),
            other => other
                .strip_prefix("token:")
                .and_then(|id| Principal::new(id).ok())
                .map(AssetKind::Token)
                .ok_or_else(|| ParseAssetError(other.to_string())),
        }
    }
}

impl TryFrom<String> for AssetKind {
    type Error = ParseAssetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetKind> for String {
    fn from(kind: AssetKind) -> Self {
        kind.to_string()
    }
}
