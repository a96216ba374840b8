//! # External Collaborators
//!
//! The vault never moves assets or derives addresses itself. It calls out
//! through two capability traits:
//!
//! - [`AssetTransfer`] moves one asset kind in and out of vault custody.
//!   An [`AssetRouter`] holds one implementation per supported kind.
//! - [`AddressDeriver`] derives the vault's deposit address on an external
//!   chain.
//!
//! Both are async: every call is a point where the vault's operation can
//! suspend while other calls run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::asset::AssetKind;
use crate::ledger::account::{Account, Principal};

/// Failure reported by, or while waiting on, an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The collaborator processed the call and refused it.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or failed internally.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// No answer within the configured call timeout.
    #[error("call timed out")]
    TimedOut,
}

/// Moves one asset kind between external accounts and vault custody.
#[async_trait]
pub trait AssetTransfer: Send + Sync {
    /// Pulls `amount` from `from` into the vault. Returns once the receipt is
    /// confirmed.
    async fn move_in(&self, from: &Account, vault: &Principal, amount: u64)
        -> Result<(), CollaboratorError>;

    /// Releases `amount` from the vault to `to`. Returns once the release is
    /// confirmed.
    async fn move_out(&self, vault: &Principal, to: &Account, amount: u64)
        -> Result<(), CollaboratorError>;
}

/// Dispatches asset movements to the collaborator registered for each kind.
#[derive(Clone, Default)]
pub struct AssetRouter {
    routes: BTreeMap<AssetKind, Arc<dyn AssetTransfer>>,
}

impl AssetRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transfer` for `kind`, replacing any earlier registration.
    pub fn register(&mut self, kind: AssetKind, transfer: Arc<dyn AssetTransfer>) -> &mut Self {
        self.routes.insert(kind, transfer);
        self
    }

    pub fn with(mut self, kind: AssetKind, transfer: Arc<dyn AssetTransfer>) -> Self {
        self.register(kind, transfer);
        self
    }

    pub fn route(&self, kind: &AssetKind) -> Option<&Arc<dyn AssetTransfer>> {
        self.routes.get(kind)
    }

    pub fn supports(&self, kind: &AssetKind) -> bool {
        self.routes.contains_key(kind)
    }

    pub fn supported(&self) -> impl Iterator<Item = &AssetKind> {
        self.routes.keys()
    }
}

impl fmt::Debug for AssetRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.routes.keys()).finish()
    }
}

/// External chains the vault can hold a deposit address on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Bitcoin,
    Ethereum,
}

impl ChainKind {
    /// Fixed derivation index per chain, so one vault maps to one address
    /// per chain.
    pub fn derivation_index(self) -> u32 {
        match self {
            ChainKind::Bitcoin => 0,
            ChainKind::Ethereum => 1,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Bitcoin => f.write_str("bitcoin"),
            ChainKind::Ethereum => f.write_str("ethereum"),
        }
    }
}

impl std::str::FromStr for ChainKind {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bitcoin" => Ok(ChainKind::Bitcoin),
            "ethereum" => Ok(ChainKind::Ethereum),
            other => Err(CollaboratorError::Rejected(format!("unknown chain {other}"))),
        }
    }
}

/// Derives a vault's address on an external chain.
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    async fn derive_address(
        &self,
        vault: &Principal,
        derivation_index: u32,
        chain: ChainKind,
    ) -> Result<String, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl AssetTransfer for Noop {
        async fn move_in(&self, _: &Account, _: &Principal, _: u64) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn move_out(&self, _: &Principal, _: &Account, _: u64) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    #[test]
    fn router_dispatches_by_kind() {
        let router = AssetRouter::new()
            .with(AssetKind::Icp, Arc::new(Noop))
            .with(AssetKind::CkBtc, Arc::new(Noop));
        assert!(router.supports(&AssetKind::Icp));
        assert!(router.route(&AssetKind::CkEth).is_none());
        assert_eq!(router.supported().count(), 2);
    }

    #[test]
    fn chains_have_distinct_indices() {
        assert_ne!(
            ChainKind::Bitcoin.derivation_index(),
            ChainKind::Ethereum.derivation_index()
        );
        assert_eq!("ethereum".parse::<ChainKind>().unwrap(), ChainKind::Ethereum);
        assert!("solana".parse::<ChainKind>().is_err());
    }
}
