//! Serialization of backend calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Minimum table size before idle per-key locks are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// How backend calls are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// One lock for every backend call across all sessions.
    ///
    /// Safe with clients that are not thread-safe, at the cost of throughput.
    #[default]
    Global,
    /// One lock per backend key; different sessions run in parallel.
    PerKey,
}

/// Per-key locks and the size at which the next prune runs.
#[derive(Debug)]
struct KeyTable {
    locks: HashMap<String, Arc<Mutex<()>>>,
    prune_at: usize,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self {
            locks: HashMap::new(),
            prune_at: PRUNE_THRESHOLD,
        }
    }
}

/// Exclusive lock held around each backend call.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    strategy: LockStrategy,
    global: Arc<Mutex<()>>,
    keyed: StdMutex<KeyTable>,
}

/// Held while a backend call is in flight.
pub struct GuardToken {
    _guard: OwnedMutexGuard<()>,
}

impl ConcurrencyGuard {
    pub fn new(strategy: LockStrategy) -> Self {
        Self {
            strategy,
            global: Arc::new(Mutex::new(())),
            keyed: StdMutex::new(KeyTable::default()),
        }
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// Acquire exclusive access for `key`.
    pub async fn lock(&self, key: &str) -> GuardToken {
        let mutex = match self.strategy {
            LockStrategy::Global => self.global.clone(),
            LockStrategy::PerKey => self.key_mutex(key),
        };
        GuardToken {
            _guard: mutex.lock_owned().await,
        }
    }

    fn key_mutex(&self, key: &str) -> Arc<Mutex<()>> {
        // the table only holds Arcs, so a poisoned lock still has valid data
        let mut table = self.keyed.lock().unwrap_or_else(|e| e.into_inner());
        if table.locks.len() >= table.prune_at {
            table.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            // next scan once the live set has doubled
            let live = table.locks.len();
            table.prune_at = (live * 2).max(PRUNE_THRESHOLD);
        }
        table
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.keyed.lock().unwrap_or_else(|e| e.into_inner()).locks.len()
    }

    #[cfg(test)]
    fn prune_at(&self) -> usize {
        self.keyed.lock().unwrap_or_else(|e| e.into_inner()).prune_at
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(LockStrategy::Global)
    }
}
