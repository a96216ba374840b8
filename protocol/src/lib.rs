// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Ledger
//!
//! A vault is a pooled-asset account whose ownership is a fungible share
//! token. Depositors receive shares in proportion to the value they bring;
//! holders redeem shares for a proportional in-kind slice of everything the
//! vault holds, or move them around with transfers and delegated transfers.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants and ledger parameters.
//! - **clock**: The ledger's notion of "now", swappable in tests.
//! - **ledger**: Balances, allowances, the transaction log, and the
//!   transfer / approve / transfer_from state machine.
//! - **validation**: Ordered request rules and the replay guard.
//! - **vault**: Deposit and redeem math over a multi-asset pool, plus the
//!   collaborator interfaces the vault calls out through.
//!
//! ## Invariants
//!
//! 1. `total_supply` equals the sum of all balances after every operation.
//! 2. Nothing ever goes negative; an underflow fails the operation.
//! 3. Supply only changes through mint, burn, and fee collection.
//! 4. Every successful ledger operation appends exactly one transaction.
//! 5. No shares are minted without a confirmed receipt, and none are burned
//!    without a confirmed release.

pub mod clock;
pub mod config;
pub mod ledger;
pub mod validation;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::LedgerConfig;
pub use ledger::{Account, Ledger, Principal, Subaccount};
pub use vault::{AssetKind, Vault, VaultConfig, VaultError};
