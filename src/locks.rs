//! Owner-Scoped Locks
//!
//! Cooperative in-process mutual exclusion keyed by owner id. The chain
//! writer serializes appends per owner through `acquire`; the incremental
//! verifier uses the non-blocking `try_acquire` as its advisory lock.
//! Separate registries are used for writing and verification, so a running
//! verification never blocks appends.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, owner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for the owner's lock. Used to serialize appends.
    pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        self.slot(owner_id).await.lock_owned().await
    }

    /// Take the owner's lock only if it is free. Used as the advisory lock
    /// for verification runs; a `None` means another run is in flight.
    pub async fn try_acquire(&self, owner_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.slot(owner_id).await.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_acquire_is_exclusive_per_owner() {
        let locks = OwnerLocks::new();

        let guard = locks.try_acquire("owner-1").await;
        assert!(guard.is_some());
        assert!(locks.try_acquire("owner-1").await.is_none());

        // A different owner is unaffected.
        assert!(locks.try_acquire("owner-2").await.is_some());

        drop(guard);
        assert!(locks.try_acquire("owner-1").await.is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = Arc::new(OwnerLocks::new());

        let guard = locks.acquire("owner-1").await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("owner-1").await })
        };

        drop(guard);
        contender.await.unwrap();
    }
}
