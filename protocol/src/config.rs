//! # Protocol Configuration & Constants
//!
//! Every number that shapes the ledger's observable behavior lives here:
//! the share token's precision, the protocol fee, the replay windows and
//! the query limits. Changing any of them changes what integrators see on
//! the wire, so treat them as part of the public contract.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Share Token
// ---------------------------------------------------------------------------

/// Fractional decimals of the share token. Amounts everywhere are integers
/// in the smallest unit, so one whole share is `10^8` units.
pub const DECIMALS: u8 = 8;

/// Fee burned by every transfer, approve, and transfer_from.
pub const DEFAULT_TRANSFER_FEE: u64 = 10_000;

/// Default display name for a freshly created vault.
pub const DEFAULT_NAME: &str = "Vault Share";

/// Default ticker for a freshly created vault.
pub const DEFAULT_SYMBOL: &str = "VLT";

// ---------------------------------------------------------------------------
// Replay Protection
// ---------------------------------------------------------------------------

/// How far in the past a caller-supplied `created_at_time` may lie before
/// the request is rejected as `TooOld`.
pub const TX_WINDOW: Duration = Duration::from_secs(300);

/// How far ahead of the ledger clock a `created_at_time` may lie before the
/// request is rejected as `CreatedInFuture`.
pub const PERMITTED_DRIFT: Duration = Duration::from_secs(60);

/// Maximum memo length in bytes.
pub const MAX_MEMO_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Upper bound on transactions returned by a single range query.
pub const MAX_TRANSACTIONS_PER_QUERY: u64 = 1_000;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime parameters of a share ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Human-readable token name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Protocol fee in smallest units.
    pub fee: u64,
    /// See [`TX_WINDOW`].
    pub tx_window: Duration,
    /// See [`PERMITTED_DRIFT`].
    pub permitted_drift: Duration,
}

impl LedgerConfig {
    /// Creates a config with the given name and symbol and default fee and windows.
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Overrides the protocol fee.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Replay window in clock units (nanoseconds).
    pub fn tx_window_nanos(&self) -> u64 {
        duration_nanos(self.tx_window)
    }

    /// Permitted drift in clock units (nanoseconds).
    pub fn permitted_drift_nanos(&self) -> u64 {
        duration_nanos(self.permitted_drift)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            fee: DEFAULT_TRANSFER_FEE,
            tx_window: TX_WINDOW,
            permitted_drift: PERMITTED_DRIFT,
        }
    }
}

/// Saturating conversion; a window beyond ~584 years is effectively infinite.
fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_protocol_constants() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.fee, DEFAULT_TRANSFER_FEE);
        assert_eq!(cfg.tx_window, TX_WINDOW);
        assert_eq!(cfg.permitted_drift, PERMITTED_DRIFT);
    }

    #[test]
    fn windows_convert_to_nanoseconds() {
        let cfg = LedgerConfig::new("Test", "TST").with_fee(1);
        assert_eq!(cfg.tx_window_nanos(), 300 * 1_000_000_000);
        assert_eq!(cfg.permitted_drift_nanos(), 60 * 1_000_000_000);
        assert_eq!(cfg.fee, 1);
        assert_eq!(cfg.symbol, "TST");
    }
}
