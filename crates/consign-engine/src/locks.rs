//! # Aggregate Locks
//!
//! In-process async mutexes keyed by aggregate, held for the duration of one
//! write operation.
//!
//! ```text
//! acquire(["claim:b", "payment:x", "claim:a"])
//!     │
//!     ▼ sort + dedup
//! ["claim:a", "claim:b", "payment:x"]  ──► lock each in order ──► LockSet
//!                                                                   │
//!                                          dropped at end of op ◄───┘
//! ```
//!
//! Keys are always locked in sorted order so two operations touching the same
//! aggregates cannot deadlock. Locks are taken before the database
//! transaction begins.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use consign_core::OwnerId;

/// Entries beyond this count trigger a sweep of unused locks.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Guards for every key of one operation. Released on drop.
#[derive(Debug)]
pub struct LockSet {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry::default()
    }

    /// Locks every key, in sorted order.
    pub async fn acquire<I, S>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            // Clone the Arc out so no map shard stays locked across the await.
            let mutex = self
                .locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }

        LockSet { guards }
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    /// Drops entries nobody holds or waits on.
    pub fn prune(&self) {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        debug!(before, after = self.locks.len(), "Pruned lock registry");
    }
}

pub fn session_key(owner: &OwnerId, session_id: &str) -> String {
    format!("session:{}:{}", owner, session_id)
}

pub fn claim_key(owner: &OwnerId, claim_id: &str) -> String {
    format!("claim:{}:{}", owner, claim_id)
}

pub fn payment_key(owner: &OwnerId, payment_id: &str) -> String {
    format!("payment:{}:{}", owner, payment_id)
}

/// Serializes number allocation for one owner and prefix (`CLM`, `PAY`, `CONS`).
pub fn numbering_key(owner: &OwnerId, prefix: &str) -> String {
    format!("numbers:{}:{}", owner, prefix)
}
