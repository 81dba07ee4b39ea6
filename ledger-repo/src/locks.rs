//! Per-account mutual exclusion for adapters without row-level locks.

use std::sync::Arc;

use dashmap::DashMap;
use ledger_types::AccountId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutex per account id.
///
/// Guards are taken in ascending id order so that two postings touching the
/// same pair of accounts can never wait on each other.
#[derive(Default, Clone)]
pub struct AccountLocks {
    locks: Arc<DashMap<AccountId, Arc<Mutex<()>>>>,
}

/// Guards held for the life of one posting.
///
/// Dropping them releases every account and forgets the mutexes nobody else
/// is holding or waiting on.
pub struct AccountGuards {
    locks: Arc<DashMap<AccountId, Arc<Mutex<()>>>>,
    held: Vec<(AccountId, OwnedMutexGuard<()>)>,
}

impl Drop for AccountGuards {
    fn drop(&mut self) {
        for (id, guard) in self.held.drain(..) {
            drop(guard);
            self.locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Locks every account in `ids`. Duplicates are ignored.
    pub async fn acquire(&self, ids: &[AccountId]) -> AccountGuards {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut held = Vec::with_capacity(sorted.len());
        for id in sorted {
            held.push((id, self.lock_for(id).lock_owned().await));
        }
        AccountGuards {
            locks: self.locks.clone(),
            held,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
