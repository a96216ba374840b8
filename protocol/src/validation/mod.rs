//! # Request Validation
//!
//! Rules shared by every fee-bearing ledger operation. They run in a fixed
//! order and the first failing rule wins:
//!
//! 1. duplicate (same request already accepted inside the window)
//! 2. `created_at_time` older than the replay window
//! 3. `created_at_time` further ahead than the permitted drift
//! 4. caller-supplied fee differs from the protocol fee
//! 5. memo longer than [`MAX_MEMO_LENGTH`]
//!
//! Validation never mutates anything. The ledger records the dedup entry
//! only after the operation itself has succeeded.

pub mod replay;

use thiserror::Error;

use crate::clock::Timestamp;
use crate::config::{LedgerConfig, MAX_MEMO_LENGTH};
use crate::ledger::account::Account;
use crate::ledger::transaction::{Memo, TxIndex};

pub use replay::{DedupKey, ReplayGuard, RequestKind};

/// Why a request was rejected before touching any balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate of transaction {of}")]
    Duplicate { of: TxIndex },

    #[error("created_at_time is older than the replay window")]
    TooOld,

    #[error("created_at_time is ahead of ledger time {time}")]
    CreatedInFuture { time: Timestamp },

    #[error("bad fee: expected {expected}")]
    BadFee { expected: u64 },

    #[error("memo is {len} bytes, limit is {max}")]
    MemoTooLong { len: usize, max: usize },
}

/// The replay-relevant parts of a request.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub kind: RequestKind,
    pub caller: &'a Account,
    pub fee: Option<u64>,
    pub memo: Option<&'a Memo>,
    pub created_at_time: Option<Timestamp>,
}

impl Request<'_> {
    /// The dedup key, present only when the caller supplied a timestamp.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        self.created_at_time.map(|created_at_time| DedupKey {
            created_at_time,
            kind: self.kind,
            caller: self.caller.clone(),
            memo: self.memo.cloned(),
        })
    }
}

/// Applies the ordered rules to `request` as seen at ledger time `now`.
pub fn validate(
    request: &Request<'_>,
    guard: &ReplayGuard,
    config: &LedgerConfig,
    now: Timestamp,
) -> Result<(), ValidationError> {
    if let Some(key) = request.dedup_key() {
        if let Some(of) = guard.lookup(&key) {
            return Err(ValidationError::Duplicate { of });
        }
    }

    if let Some(created) = request.created_at_time {
        if created.saturating_add(config.tx_window_nanos()) < now {
            return Err(ValidationError::TooOld);
        }
        if created > now.saturating_add(config.permitted_drift_nanos()) {
            return Err(ValidationError::CreatedInFuture { time: now });
        }
    }

    if let Some(fee) = request.fee {
        if fee != config.fee {
            return Err(ValidationError::BadFee {
                expected: config.fee,
            });
        }
    }

    if let Some(memo) = request.memo {
        if memo.len() > MAX_MEMO_LENGTH {
            return Err(ValidationError::MemoTooLong {
                len: memo.len(),
                max: MAX_MEMO_LENGTH,
            });
        }
    }

    Ok(())
}

/// Oldest `created_at_time` still worth remembering at `now`.
pub fn dedup_cutoff(config: &LedgerConfig, now: Timestamp) -> Timestamp {
    now.saturating_sub(
        config
            .tx_window_nanos()
            .saturating_add(config.permitted_drift_nanos()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::Principal;

    const SEC: u64 = 1_000_000_000;
    const NOW: Timestamp = 1_000_000 * SEC;

    fn alice() -> Account {
        Account::new(Principal::new("alice").unwrap())
    }

    fn request<'a>(caller: &'a Account, memo: Option<&'a Memo>) -> Request<'a> {
        Request {
            kind: RequestKind::Transfer,
            caller,
            fee: None,
            memo,
            created_at_time: None,
        }
    }

    fn config() -> LedgerConfig {
        LedgerConfig::default().with_fee(10)
    }

    #[test]
    fn bare_request_passes() {
        let caller = alice();
        let guard = ReplayGuard::new();
        assert_eq!(validate(&request(&caller, None), &guard, &config(), NOW), Ok(()));
    }

    #[test]
    fn window_edges() {
        let caller = alice();
        let guard = ReplayGuard::new();
        let mut req = request(&caller, None);

        req.created_at_time = Some(NOW - 300 * SEC);
        assert_eq!(validate(&req, &guard, &config(), NOW), Ok(()));
        req.created_at_time = Some(NOW - 300 * SEC - 1);
        assert_eq!(validate(&req, &guard, &config(), NOW), Err(ValidationError::TooOld));

        req.created_at_time = Some(NOW + 60 * SEC);
        assert_eq!(validate(&req, &guard, &config(), NOW), Ok(()));
        req.created_at_time = Some(NOW + 60 * SEC + 1);
        assert_eq!(
            validate(&req, &guard, &config(), NOW),
            Err(ValidationError::CreatedInFuture { time: NOW })
        );
    }

    #[test]
    fn fee_must_match_when_supplied() {
        let caller = alice();
        let guard = ReplayGuard::new();
        let mut req = request(&caller, None);
        req.fee = Some(10);
        assert_eq!(validate(&req, &guard, &config(), NOW), Ok(()));
        req.fee = Some(0);
        assert_eq!(
            validate(&req, &guard, &config(), NOW),
            Err(ValidationError::BadFee { expected: 10 })
        );
    }

    #[test]
    fn memo_length_is_bounded() {
        let caller = alice();
        let guard = ReplayGuard::new();
        let ok = Memo::new(vec![0u8; MAX_MEMO_LENGTH]);
        let long = Memo::new(vec![0u8; MAX_MEMO_LENGTH + 1]);
        assert_eq!(validate(&request(&caller, Some(&ok)), &guard, &config(), NOW), Ok(()));
        assert!(matches!(
            validate(&request(&caller, Some(&long)), &guard, &config(), NOW),
            Err(ValidationError::MemoTooLong { len: 33, .. })
        ));
    }

    #[test]
    fn first_failing_rule_wins() {
        let caller = alice();
        let memo = Memo::new(b"pay".to_vec());
        let mut guard = ReplayGuard::new();
        let mut req = request(&caller, Some(&memo));
        req.created_at_time = Some(NOW - 400 * SEC);
        req.fee = Some(999);

        // Stale and wrong fee: staleness is checked first.
        assert_eq!(validate(&req, &guard, &config(), NOW), Err(ValidationError::TooOld));

        // A remembered duplicate beats both.
        guard.record(req.dedup_key().unwrap(), 7);
        assert_eq!(
            validate(&req, &guard, &config(), NOW),
            Err(ValidationError::Duplicate { of: 7 })
        );

        // Future-dated and wrong fee: drift is checked before the fee.
        req.created_at_time = Some(NOW + 120 * SEC);
        assert_eq!(
            validate(&req, &guard, &config(), NOW),
            Err(ValidationError::CreatedInFuture { time: NOW })
        );
    }

    #[test]
    fn no_timestamp_means_no_dedup() {
        let caller = alice();
        let req = request(&caller, None);
        assert!(req.dedup_key().is_none());
    }

    #[test]
    fn cutoff_spans_window_and_drift() {
        assert_eq!(dedup_cutoff(&config(), NOW), NOW - 360 * SEC);
        assert_eq!(dedup_cutoff(&config(), 5), 0);
    }
}
