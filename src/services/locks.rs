//! Per-record async locks for balance writers.
//!
//! Every operation that reads a balance, checks it and writes it back holds the
//! locks of all records it writes for the whole window. Locks are taken in
//! sorted order so two transfers in opposite directions cannot deadlock.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{AccountId, WalletId};

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Account(AccountId),
    Wallet(WalletId),
}

#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<Mutex<HashMap<LockKey, Arc<Mutex<()>>>>>,
}

/// Released on drop.
pub struct HeldLocks {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl HeldLocks {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> HeldLocks {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;

            // Drop locks nobody holds or waits on
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            keys.iter()
                .map(|key| locks.entry(*key).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        HeldLocks {
            keys,
            _guards: guards,
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
