//! # Vault Accounting
//!
//! A vault custodies a pool of assets and issues shares against it. Shares
//! live in the vault's [`Ledger`]; assets move through external
//! collaborators.
//!
//! ```text
//! asset.rs         AssetKind: ICP, ckBTC, ckETH, Token(ledger-id)
//! pool.rs          per-asset custody balances
//! fixed_point.rs   exact ratios for share math
//! collaborator.rs  AssetTransfer, AddressDeriver, AssetRouter
//! memory.rs        in-memory collaborators with fault injection
//! ```
//!
//! ## Ordering
//!
//! Deposits and redemptions each suspend on an external call in the middle
//! of a multi-step change. They are serialized per vault by an async
//! operation lock (a second caller queues), and each follows a fixed order:
//!
//! - **deposit**: price as a pre-flight check, `move_in`, then re-price from
//!   the state as it is after the call returns, mint, credit the pool.
//! - **redeem**: plan every per-asset amount and mark the holder busy, call
//!   `move_out` per asset, then debit the pool and burn only the shares the
//!   confirmed releases cover.
//!
//! Ledger reads and plain ledger operations never wait on the operation
//! lock. Reads always see the last committed state.
//!
//! Neither `deposit` nor `redeem` is cancel-safe: drive them to completion.
//! A stuck collaborator is bounded by [`VaultConfig::call_timeout`].

pub mod asset;
pub mod collaborator;
pub mod fixed_point;
pub mod memory;
pub mod pool;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::{Clock, Timestamp};
use crate::config::{LedgerConfig, DECIMALS};
use crate::ledger::{
    Account, Allowance, ApproveArgs, ApproveError, BalanceError, GetTransactionsResponse, Ledger,
    Principal, TransferArgs, TransferError, TransferFromArgs, TransferFromError, TxIndex,
};

pub use asset::{AssetKind, ParseAssetError};
pub use collaborator::{AddressDeriver, AssetRouter, AssetTransfer, ChainKind, CollaboratorError};
pub use fixed_point::{FixedPointError, Proportion};
pub use memory::{InMemoryAddressDeriver, InMemoryAssetLedger, Suspension};
pub use pool::{Pool, PoolEntry, PoolError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("amount must be > 0")]
    ZeroAmount,

    #[error("asset {0} is not supported by this vault")]
    UnsupportedAsset(AssetKind),

    /// The deposit would mint zero shares at the current price.
    #[error("deposit of {amount} is too small to mint a share")]
    DepositTooSmall { amount: u64 },

    #[error("insufficient shares: balance {balance}")]
    InsufficientShares { balance: u64 },

    /// Every per-asset amount of the redemption floors to zero.
    #[error("redeeming {shares} shares would release nothing")]
    NothingToRelease { shares: u64 },

    #[error("account {0} already has a redemption in flight")]
    Busy(Account),

    /// An external collaborator failed; nothing was committed.
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// The books no longer add up. The vault halts when this is detected.
    #[error("corrupted vault state: {reason}")]
    CorruptedState { reason: String },

    #[error("vault is halted: {reason}")]
    Halted { reason: String },

    /// Some releases were confirmed before one failed. The confirmed ones
    /// were committed and `shares_burned` shares were burned to cover them.
    #[error("redemption stopped after {} release(s), {shares_burned} shares burned: {reason}", .released.len())]
    PartialRedemption {
        released: Vec<(AssetKind, u64)>,
        shares_burned: u64,
        reason: CollaboratorError,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] BalanceError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] FixedPointError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub ledger: LedgerConfig,
    /// The vault's own principal: custody account and derivation key.
    pub identity: Principal,
    pub creator: Principal,
    /// Upper bound on each collaborator call. `None` waits forever.
    #[serde(default)]
    pub call_timeout: Option<Duration>,
}

impl VaultConfig {
    pub fn new(identity: Principal, creator: Principal) -> Self {
        Self {
            ledger: LedgerConfig::default(),
            identity,
            creator,
            call_timeout: None,
        }
    }
}

/// Public snapshot consumed by registries and front ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub fee: u64,
    pub total_supply: u64,
    pub total_value_locked: u64,
    pub created_at: Timestamp,
    pub creator: Principal,
}

/// Shares minted for a deposit of `amount` against supply `supply` and
/// value `tvl`: `amount` on an empty vault, `floor(amount * supply / tvl)`
/// otherwise.
///
/// Outstanding supply with zero value behind it is corrupted state, never
/// something to price around.
pub fn shares_for_deposit(amount: u64, supply: u64, tvl: u64) -> Result<u64, VaultError> {
    if supply == 0 {
        return Ok(amount);
    }
    if tvl == 0 {
        return Err(VaultError::CorruptedState {
            reason: format!("total supply {supply} is backed by zero value"),
        });
    }
    let shares = fixed_point::mul_div_floor(amount as u128, supply as u128, tvl as u128)?;
    u64::try_from(shares).map_err(|_| VaultError::Arithmetic(FixedPointError::Overflow))
}

/// Shares burned when a redemption stops early: the fraction of `shares`
/// covered by what was released, rounded up and capped at `shares`.
fn covered_shares(
    shares: u64,
    plan: &[(AssetKind, u64)],
    released: &[(AssetKind, u64)],
) -> Result<u64, FixedPointError> {
    let planned: u128 = plan.iter().map(|(_, a)| *a as u128).sum();
    let done: u128 = released.iter().map(|(_, a)| *a as u128).sum();
    let covered = fixed_point::mul_div_ceil(shares as u128, done, planned)?;
    let covered = u64::try_from(covered).map_err(|_| FixedPointError::Overflow)?;
    Ok(covered.min(shares))
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct VaultState {
    ledger: Ledger,
    pool: Pool,
    total_value_locked: u64,
    halted: Option<String>,
}

impl VaultState {
    fn ensure_running(&self) -> Result<(), VaultError> {
        match &self.halted {
            Some(reason) => Err(VaultError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Records the halt and returns the error that caused it.
    fn halt(&mut self, reason: String) -> VaultError {
        error!(%reason, "vault halted");
        self.halted.get_or_insert_with(|| reason.clone());
        VaultError::CorruptedState { reason }
    }

    fn check_backing(&mut self) -> Result<(), VaultError> {
        let supply = self.ledger.total_supply();
        if supply > 0 && self.total_value_locked == 0 {
            return Err(self.halt(format!("total supply {supply} is backed by zero value")));
        }
        Ok(())
    }

    /// Shares a deposit of `amount` mints right now, after every check the
    /// commit depends on.
    fn price(&mut self, amount: u64) -> Result<u64, VaultError> {
        self.ensure_running()?;
        self.check_backing()?;
        let supply = self.ledger.total_supply();
        let shares = shares_for_deposit(amount, supply, self.total_value_locked)?;
        if shares == 0 {
            return Err(VaultError::DepositTooSmall { amount });
        }
        let overflow = VaultError::Arithmetic(FixedPointError::Overflow);
        supply.checked_add(shares).ok_or_else(|| overflow.clone())?;
        self.total_value_locked.checked_add(amount).ok_or(overflow)?;
        Ok(shares)
    }

    fn commit_deposit(
        &mut self,
        from: &Account,
        asset: &AssetKind,
        amount: u64,
        shares: u64,
        now: Timestamp,
    ) -> Result<u64, VaultError> {
        if let Err(e) = self.ledger.mint(from, shares) {
            return Err(self.halt(format!("mint after confirmed deposit failed: {e}")));
        }
        if let Err(e) = self.pool.credit(asset, amount, now) {
            return Err(self.halt(format!("pool credit after mint failed: {e}")));
        }
        match self.total_value_locked.checked_add(amount) {
            Some(tvl) => self.total_value_locked = tvl,
            None => return Err(self.halt("total value locked overflowed".into())),
        }
        Ok(shares)
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

pub struct Vault {
    identity: Principal,
    creator: Principal,
    created_at: Timestamp,
    clock: Arc<dyn Clock>,
    state: Mutex<VaultState>,
    /// Serializes deposits and redemptions across their suspension points.
    op_lock: tokio::sync::Mutex<()>,
    assets: AssetRouter,
    deriver: Arc<dyn AddressDeriver>,
    addresses: tokio::sync::Mutex<BTreeMap<ChainKind, String>>,
    call_timeout: Option<Duration>,
}

impl Vault {
    pub fn new(
        config: VaultConfig,
        clock: Arc<dyn Clock>,
        assets: AssetRouter,
        deriver: Arc<dyn AddressDeriver>,
    ) -> Self {
        let created_at = clock.now();
        info!(
            vault = %config.identity,
            creator = %config.creator,
            symbol = %config.ledger.symbol,
            assets = ?assets,
            "vault created"
        );
        Self {
            identity: config.identity,
            creator: config.creator,
            created_at,
            state: Mutex::new(VaultState {
                ledger: Ledger::new(config.ledger, clock.clone()),
                pool: Pool::new(),
                total_value_locked: 0,
                halted: None,
            }),
            clock,
            op_lock: tokio::sync::Mutex::new(()),
            assets,
            deriver,
            addresses: tokio::sync::Mutex::new(BTreeMap::new()),
            call_timeout: config.call_timeout,
        }
    }

    pub fn identity(&self) -> &Principal {
        &self.identity
    }

    pub fn creator(&self) -> &Principal {
        &self.creator
    }

    pub fn supported_assets(&self) -> Vec<AssetKind> {
        self.assets.supported().cloned().collect()
    }

    // -- Reads --------------------------------------------------------------

    pub fn get_metadata(&self) -> VaultMetadata {
        let state = self.state.lock();
        let meta = state.ledger.metadata();
        VaultMetadata {
            name: meta.name,
            symbol: meta.symbol,
            decimals: DECIMALS,
            fee: meta.fee,
            total_supply: state.ledger.total_supply(),
            total_value_locked: state.total_value_locked,
            created_at: self.created_at,
            creator: self.creator.clone(),
        }
    }

    pub fn balance_of(&self, account: &Account) -> u64 {
        self.state.lock().ledger.balance_of(account)
    }

    pub fn total_supply(&self) -> u64 {
        self.state.lock().ledger.total_supply()
    }

    pub fn total_value_locked(&self) -> u64 {
        self.state.lock().total_value_locked
    }

    pub fn allowance(&self, owner: &Account, spender: &Account) -> Allowance {
        self.state.lock().ledger.allowance(owner, spender)
    }

    pub fn get_transactions(&self, start: TxIndex, length: u64) -> GetTransactionsResponse {
        self.state.lock().ledger.get_transactions(start, length)
    }

    /// Every pooled asset, zero balances included.
    pub fn pool_balances(&self) -> Vec<PoolEntry> {
        self.state.lock().pool.snapshot()
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.state.lock().halted.clone()
    }

    /// Shares a deposit of `amount` would mint against the committed state.
    pub fn quote_deposit(&self, amount: u64) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.state.lock().price(amount)
    }

    // -- Ledger operations --------------------------------------------------

    pub fn transfer(&self, caller: &Principal, args: TransferArgs) -> Result<TxIndex, TransferError> {
        self.state.lock().ledger.transfer(caller, args)
    }

    pub fn approve(&self, caller: &Principal, args: ApproveArgs) -> Result<TxIndex, ApproveError> {
        self.state.lock().ledger.approve(caller, args)
    }

    pub fn transfer_from(
        &self,
        caller: &Principal,
        args: TransferFromArgs,
    ) -> Result<TxIndex, TransferFromError> {
        self.state.lock().ledger.transfer_from(caller, args)
    }

    // -- Vault operations ---------------------------------------------------

    /// Pulls `amount` of `asset` from `from` into custody and mints shares to
    /// `from`. Returns the number of shares minted.
    pub async fn deposit(
        &self,
        from: &Account,
        asset: AssetKind,
        amount: u64,
    ) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let route = self
            .assets
            .route(&asset)
            .cloned()
            .ok_or_else(|| VaultError::UnsupportedAsset(asset.clone()))?;

        let _op = self.op_lock.lock().await;
        self.state.lock().price(amount)?;

        if let Err(e) = self.call(route.move_in(from, &self.identity, amount)).await {
            warn!(%from, %asset, amount, error = %e, "deposit transfer failed");
            return Err(e.into());
        }

        // The supply may have moved while we were suspended (fee burns), so
        // price again from what is committed now.
        let now = self.clock.now();
        let outcome = {
            let mut state = self.state.lock();
            state
                .price(amount)
                .map(|shares| state.commit_deposit(from, &asset, amount, shares, now))
        };

        match outcome {
            Ok(Ok(shares)) => {
                let (total_supply, tvl) = {
                    let state = self.state.lock();
                    (state.ledger.total_supply(), state.total_value_locked)
                };
                info!(%from, %asset, amount, shares, total_supply, tvl, "deposit committed");
                Ok(shares)
            }
            Ok(Err(e)) => Err(e),
            Err(reason) => {
                warn!(%from, %asset, amount, %reason, "deposit no longer prices, refunding");
                self.refund(&route, from, &asset, amount, reason).await
            }
        }
    }

    /// Returns a received deposit that could not be turned into shares.
    async fn refund(
        &self,
        route: &Arc<dyn AssetTransfer>,
        to: &Account,
        asset: &AssetKind,
        amount: u64,
        reason: VaultError,
    ) -> Result<u64, VaultError> {
        match self.call(route.move_out(&self.identity, to, amount)).await {
            Ok(()) => Err(reason),
            Err(e) => {
                let mut state = self.state.lock();
                Err(state.halt(format!(
                    "holding {amount} {asset} from {to} with no shares issued: refund failed: {e}"
                )))
            }
        }
    }

    /// Burns `shares` of `holder` for a proportional slice of every pooled
    /// asset. Returns the `(asset, amount)` pairs released.
    pub async fn redeem(
        &self,
        holder: &Account,
        shares: u64,
    ) -> Result<Vec<(AssetKind, u64)>, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let _op = self.op_lock.lock().await;

        let plan = {
            let mut state = self.state.lock();
            state.ensure_running()?;
            let balance = state.ledger.balance_of(holder);
            if balance < shares {
                return Err(VaultError::InsufficientShares { balance });
            }
            state.check_backing()?;

            let supply = state.ledger.total_supply();
            let proportion = Proportion::new(shares, supply)?;
            let mut plan = Vec::new();
            for (asset, held) in state.pool.held() {
                let amount = proportion.of_floor(held)?;
                if amount > 0 {
                    plan.push((asset.clone(), amount));
                }
            }
            if plan.is_empty() {
                return Err(VaultError::NothingToRelease { shares });
            }
            if !state.ledger.mark_busy(holder) {
                return Err(VaultError::Busy(holder.clone()));
            }
            plan
        };

        let mut released = Vec::with_capacity(plan.len());
        let mut failure = None;
        for (asset, amount) in &plan {
            let result = match self.assets.route(asset) {
                Some(route) => self.call(route.move_out(&self.identity, holder, *amount)).await,
                None => Err(CollaboratorError::Rejected(format!("no route for {asset}"))),
            };
            match result {
                Ok(()) => released.push((asset.clone(), *amount)),
                Err(e) => {
                    warn!(%holder, %asset, amount, error = %e, "redemption release failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        state.ledger.clear_busy(holder);

        let burned = match &failure {
            None => shares,
            Some(_) => match covered_shares(shares, &plan, &released) {
                Ok(covered) => covered,
                Err(e) => {
                    return Err(state.halt(format!("partial burn could not be computed: {e}")))
                }
            },
        };

        for (asset, amount) in &released {
            if let Err(e) = state.pool.debit(asset, *amount, now) {
                return Err(state.halt(format!("released more than pooled: {e}")));
            }
            match state.total_value_locked.checked_sub(*amount) {
                Some(tvl) => state.total_value_locked = tvl,
                None => return Err(state.halt("total value locked underflowed".into())),
            }
        }
        if burned > 0 {
            if let Err(e) = state.ledger.burn(holder, burned, None) {
                return Err(state.halt(format!("burn after confirmed release failed: {e}")));
            }
        }

        match failure {
            None => {
                info!(
                    %holder,
                    shares,
                    assets = released.len(),
                    total_supply = state.ledger.total_supply(),
                    tvl = state.total_value_locked,
                    "redemption committed"
                );
                Ok(released)
            }
            Some(reason) if released.is_empty() => Err(VaultError::Collaborator(reason)),
            Some(reason) => Err(VaultError::PartialRedemption {
                released,
                shares_burned: burned,
                reason,
            }),
        }
    }

    /// The vault's address on `chain`, derived once and then served from
    /// cache.
    pub async fn generate_chain_address(&self, chain: ChainKind) -> Result<String, VaultError> {
        let mut cache = self.addresses.lock().await;
        if let Some(address) = cache.get(&chain) {
            return Ok(address.clone());
        }
        let address = self
            .call(
                self.deriver
                    .derive_address(&self.identity, chain.derivation_index(), chain),
            )
            .await?;
        info!(vault = %self.identity, %chain, %address, "chain address derived");
        cache.insert(chain, address.clone());
        Ok(address)
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| CollaboratorError::TimedOut)?,
            None => fut.await,
        }
    }

    /// Test hook: wipes the value accounting without touching the supply.
    #[cfg(test)]
    fn corrupt_value_for_test(&self) {
        let mut state = self.state.lock();
        state.total_value_locked = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
