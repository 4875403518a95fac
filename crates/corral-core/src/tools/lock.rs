//! Advisory per-key locking for file-touching tools.
//!
//! When a tool declares a `file_param`, the registry serialises calls
//! that target the same key within one registry scope. Distinct keys
//! never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Held for the duration of a locked tool call; released on drop, on any
/// exit path.
pub struct LockGuard {
    _permit: OwnedSemaphorePermit,
}

/// Provides advisory locks keyed by opaque strings (typically file paths).
#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn lock(&self, key: &str) -> LockGuard;
}

/// In-process lock provider: one binary semaphore per key.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn semaphore_for(&self, key: &str) -> Arc<Semaphore> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }
}

#[async_trait]
impl LockProvider for KeyedLocks {
    async fn lock(&self, key: &str) -> LockGuard {
        let semaphore = self.semaphore_for(key);
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("lock semaphore closed");
        LockGuard { _permit: permit }
    }
}
