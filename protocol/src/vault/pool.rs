//! # Asset Pool
//!
//! Per-asset custody balances of a vault. An entry is created on the first
//! credit of a new asset kind and is never removed, so an exhausted asset
//! stays listed at zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::asset::AssetKind;
use crate::clock::Timestamp;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Debit larger than what the pool holds of that asset.
    #[error("pool holds {held} {asset}, cannot release {requested}")]
    Insufficient {
        asset: AssetKind,
        held: u64,
        requested: u64,
    },

    #[error("pool balance of {asset} would overflow")]
    Overflow { asset: AssetKind },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One pooled asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub asset: AssetKind,
    pub amount: u64,
    pub last_updated: Timestamp,
}

#[derive(Clone, Debug, Default)]
pub struct Pool {
    entries: BTreeMap<AssetKind, PoolEntry>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount held of `asset`; zero if it was never deposited.
    pub fn amount_of(&self, asset: &AssetKind) -> u64 {
        self.entries.get(asset).map_or(0, |e| e.amount)
    }

    pub fn credit(&mut self, asset: &AssetKind, amount: u64, now: Timestamp) -> Result<u64, PoolError> {
        let held = self.amount_of(asset);
        let new_amount = held
            .checked_add(amount)
            .ok_or_else(|| PoolError::Overflow { asset: asset.clone() })?;
        self.entries.insert(
            asset.clone(),
            PoolEntry {
                asset: asset.clone(),
                amount: new_amount,
                last_updated: now,
            },
        );
        Ok(new_amount)
    }

    pub fn debit(&mut self, asset: &AssetKind, amount: u64, now: Timestamp) -> Result<u64, PoolError> {
        let held = self.amount_of(asset);
        if held < amount {
            return Err(PoolError::Insufficient {
                asset: asset.clone(),
                held,
                requested: amount,
            });
        }
        // `held >= amount > 0` or `amount == 0`; either way the entry exists
        // or the debit is a no-op.
        if let Some(entry) = self.entries.get_mut(asset) {
            entry.amount = held - amount;
            entry.last_updated = now;
        }
        Ok(held - amount)
    }

    /// Every entry, in asset order.
    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.values()
    }

    /// Assets with a non-zero balance, in asset order.
    pub fn held(&self) -> impl Iterator<Item = (&AssetKind, u64)> {
        self.entries
            .values()
            .filter(|e| e.amount > 0)
            .map(|e| (&e.asset, e.amount))
    }

    pub fn snapshot(&self) -> Vec<PoolEntry> {
        self.entries.values().cloned().collect()
    }
}
