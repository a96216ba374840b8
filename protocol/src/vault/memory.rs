//! In-memory collaborators.
//!
//! [`InMemoryAssetLedger`] stands in for an external asset ledger: it keeps
//! holder balances and vault custody, and lets callers inject failures or
//! park the next call until released. [`InMemoryAddressDeriver`] derives
//! deterministic addresses from a hash of its inputs. The development node
//! runs on these, and the tests use their hooks to force interleavings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::asset::AssetKind;
use super::collaborator::{AddressDeriver, AssetTransfer, ChainKind, CollaboratorError};
use crate::ledger::account::{Account, Principal};

// ---------------------------------------------------------------------------
// Suspension gates
// ---------------------------------------------------------------------------

/// Test-side handle on a parked collaborator call.
pub struct Suspension {
    entered: oneshot::Receiver<()>,
    resume: oneshot::Sender<()>,
}

impl Suspension {
    /// Waits until the collaborator call has started and parked.
    pub async fn wait_entered(&mut self) {
        let _ = (&mut self.entered).await;
    }

    /// Lets the parked call continue. Dropping the handle instead makes the
    /// call fail as `Unavailable`.
    pub fn resume(self) {
        let _ = self.resume.send(());
    }
}

struct Gate {
    entered: oneshot::Sender<()>,
    resume: oneshot::Receiver<()>,
}

impl Gate {
    fn pair() -> (Gate, Suspension) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        (
            Gate {
                entered: entered_tx,
                resume: resume_rx,
            },
            Suspension {
                entered: entered_rx,
                resume: resume_tx,
            },
        )
    }

    async fn park(self) -> Result<(), CollaboratorError> {
        let _ = self.entered.send(());
        self.resume
            .await
            .map_err(|_| CollaboratorError::Unavailable("suspended call abandoned".into()))
    }
}

// ---------------------------------------------------------------------------
// InMemoryAssetLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    holders: BTreeMap<Account, u64>,
    custody: BTreeMap<Principal, u64>,
    fail_move_in: Option<CollaboratorError>,
    fail_move_out: Option<CollaboratorError>,
    gate_move_in: Option<Gate>,
    gate_move_out: Option<Gate>,
}

/// A single asset kind's ledger, held in memory.
pub struct InMemoryAssetLedger {
    asset: AssetKind,
    state: Mutex<LedgerState>,
}

impl InMemoryAssetLedger {
    pub fn new(asset: AssetKind) -> Self {
        Self {
            asset,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn asset(&self) -> &AssetKind {
        &self.asset
    }

    /// Faucet: creates `amount` in `to` out of thin air.
    pub fn credit(&self, to: &Account, amount: u64) -> u64 {
        let mut state = self.state.lock();
        let balance = state.holders.entry(to.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }

    pub fn balance_of(&self, account: &Account) -> u64 {
        self.state.lock().holders.get(account).copied().unwrap_or(0)
    }

    /// What this ledger believes `vault` holds.
    pub fn custody_of(&self, vault: &Principal) -> u64 {
        self.state.lock().custody.get(vault).copied().unwrap_or(0)
    }

    /// The next `move_in` fails with `err` and moves nothing.
    pub fn fail_next_move_in(&self, err: CollaboratorError) {
        self.state.lock().fail_move_in = Some(err);
    }

    /// The next `move_out` fails with `err` and moves nothing.
    pub fn fail_next_move_out(&self, err: CollaboratorError) {
        self.state.lock().fail_move_out = Some(err);
    }

    /// Parks the next `move_in` before it takes effect.
    pub fn suspend_next_move_in(&self) -> Suspension {
        let (gate, handle) = Gate::pair();
        self.state.lock().gate_move_in = Some(gate);
        handle
    }

    /// Parks the next `move_out` before it takes effect.
    pub fn suspend_next_move_out(&self) -> Suspension {
        let (gate, handle) = Gate::pair();
        self.state.lock().gate_move_out = Some(gate);
        handle
    }
}

#[async_trait]
impl AssetTransfer for InMemoryAssetLedger {
    async fn move_in(
        &self,
        from: &Account,
        vault: &Principal,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        let gate = self.state.lock().gate_move_in.take();
        if let Some(gate) = gate {
            gate.park().await?;
        }

        let mut state = self.state.lock();
        if let Some(err) = state.fail_move_in.take() {
            return Err(err);
        }
        let balance = state.holders.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(CollaboratorError::Rejected(format!(
                "{from} holds {balance} {}, needs {amount}",
                self.asset
            )));
        }
        let held = state.custody.get(vault).copied().unwrap_or(0);
        let new_held = held
            .checked_add(amount)
            .ok_or_else(|| CollaboratorError::Rejected("custody overflow".into()))?;

        state.holders.insert(from.clone(), balance - amount);
        state.custody.insert(vault.clone(), new_held);
        debug!(asset = %self.asset, %from, amount, "asset moved into vault");
        Ok(())
    }

    async fn move_out(
        &self,
        vault: &Principal,
        to: &Account,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        let gate = self.state.lock().gate_move_out.take();
        if let Some(gate) = gate {
            gate.park().await?;
        }

        let mut state = self.state.lock();
        if let Some(err) = state.fail_move_out.take() {
            return Err(err);
        }
        let held = state.custody.get(vault).copied().unwrap_or(0);
        if held < amount {
            return Err(CollaboratorError::Rejected(format!(
                "vault holds {held} {}, cannot release {amount}",
                self.asset
            )));
        }
        let balance = state.holders.get(to).copied().unwrap_or(0);
        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| CollaboratorError::Rejected("balance overflow".into()))?;

        state.custody.insert(vault.clone(), held - amount);
        state.holders.insert(to.clone(), new_balance);
        debug!(asset = %self.asset, %to, amount, "asset released from vault");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryAddressDeriver
// ---------------------------------------------------------------------------

/// Derives `bc1q…` / `0x…` strings from a BLAKE3 hash of the inputs.
#[derive(Default)]
pub struct InMemoryAddressDeriver {
    calls: AtomicU64,
    fail_next: Mutex<Option<CollaboratorError>>,
}

impl InMemoryAddressDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of derivations performed, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, err: CollaboratorError) {
        *self.fail_next.lock() = Some(err);
    }
}

#[async_trait]
impl AddressDeriver for InMemoryAddressDeriver {
    async fn derive_address(
        &self,
        vault: &Principal,
        derivation_index: u32,
        chain: ChainKind,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(vault.as_str().as_bytes());
        hasher.update(&derivation_index.to_be_bytes());
        hasher.update(chain.to_string().as_bytes());
        let digest = hasher.finalize().to_hex();

        Ok(match chain {
            ChainKind::Bitcoin => format!("bc1q{}", &digest[..38]),
            ChainKind::Ethereum => format!("0x{}", &digest[..40]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Principal {
        Principal::new("vault").unwrap()
    }

    fn alice() -> Account {
        Account::new(Principal::new("alice").unwrap())
    }

    #[tokio::test]
    async fn move_in_and_out_conserve_units() {
        let ledger = InMemoryAssetLedger::new(AssetKind::Icp);
        ledger.credit(&alice(), 100);

        ledger.move_in(&alice(), &vault(), 60).await.unwrap();
        assert_eq!(ledger.balance_of(&alice()), 40);
        assert_eq!(ledger.custody_of(&vault()), 60);

        ledger.move_out(&vault(), &alice(), 25).await.unwrap();
        assert_eq!(ledger.balance_of(&alice()), 65);
        assert_eq!(ledger.custody_of(&vault()), 35);

        assert!(matches!(
            ledger.move_in(&alice(), &vault(), 1_000).await,
            Err(CollaboratorError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let ledger = InMemoryAssetLedger::new(AssetKind::CkBtc);
        ledger.credit(&alice(), 10);
        ledger.fail_next_move_in(CollaboratorError::Unavailable("down".into()));

        assert!(ledger.move_in(&alice(), &vault(), 5).await.is_err());
        assert_eq!(ledger.balance_of(&alice()), 10);
        ledger.move_in(&alice(), &vault(), 5).await.unwrap();
    }

    #[tokio::test]
    async fn suspended_call_waits_for_resume() {
        let ledger = std::sync::Arc::new(InMemoryAssetLedger::new(AssetKind::Icp));
        ledger.credit(&alice(), 10);
        let mut gate = ledger.suspend_next_move_in();

        let task = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.move_in(&alice(), &vault(), 10).await })
        };
        gate.wait_entered().await;
        assert_eq!(ledger.custody_of(&vault()), 0);

        gate.resume();
        task.await.unwrap().unwrap();
        assert_eq!(ledger.custody_of(&vault()), 10);
    }

    #[tokio::test]
    async fn derived_addresses_are_stable_per_chain() {
        let deriver = InMemoryAddressDeriver::new();
        let btc = deriver.derive_address(&vault(), 0, ChainKind::Bitcoin).await.unwrap();
        let again = deriver.derive_address(&vault(), 0, ChainKind::Bitcoin).await.unwrap();
        let eth = deriver.derive_address(&vault(), 1, ChainKind::Ethereum).await.unwrap();

        assert_eq!(btc, again);
        assert!(btc.starts_with("bc1q") && btc.len() == 42);
        assert!(eth.starts_with("0x") && eth.len() == 42);
        assert_eq!(deriver.calls(), 3);
    }
}
