//! Deduplication cache for requests that carry a `created_at_time`.
//!
//! Requests without a `created_at_time` are never deduplicated. Entries are
//! keyed by the request kind, the calling account, the memo and the
//! timestamp, and are evicted oldest-first once they fall out of the replay
//! window (at which point a resubmission fails `TooOld` anyway).

use std::collections::BTreeMap;

use crate::clock::Timestamp;
use crate::ledger::account::Account;
use crate::ledger::transaction::{Memo, TxIndex};

/// The caller-facing operation a request was made through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestKind {
    Transfer,
    Approve,
    TransferFrom,
}

/// Identity of a request for replay purposes.
///
/// Field order matters: the derived `Ord` sorts by `created_at_time` first,
/// which is what eviction relies on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub created_at_time: Timestamp,
    pub kind: RequestKind,
    pub caller: Account,
    pub memo: Option<Memo>,
}

#[derive(Clone, Debug, Default)]
pub struct ReplayGuard {
    seen: BTreeMap<DedupKey, TxIndex>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the transaction that first used `key`, if still remembered.
    pub fn lookup(&self, key: &DedupKey) -> Option<TxIndex> {
        self.seen.get(key).copied()
    }

    pub fn record(&mut self, key: DedupKey, index: TxIndex) {
        self.seen.insert(key, index);
    }

    /// Drops every entry created strictly before `cutoff`. Returns how many.
    pub fn prune_before(&mut self, cutoff: Timestamp) -> usize {
        let mut pruned = 0;
        while let Some(entry) = self.seen.first_entry() {
            if entry.key().created_at_time >= cutoff {
                break;
            }
            entry.remove();
            pruned += 1;
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
