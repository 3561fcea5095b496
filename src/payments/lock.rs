//! Per-transaction mutual exclusion
//!
//! Locks are keyed by the current trade number and never wait: a lock that is already held is
//! reported as `Ok(None)` and the caller rejects the event. A granted lock comes with a
//! [`LockLease`]; release goes through the lease, so a holder whose lock already expired and was
//! taken again can never release the new holder's lock.

use crate::cache::error::CacheResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Proof of a granted lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    id: String,
    owner: String,
}

impl LockLease {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: Uuid::new_v4().to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
pub trait Locker: Send + Sync {
    /// Try to take the lock; `Ok(None)` means another holder has it
    async fn lock(&self, id: &str) -> CacheResult<Option<LockLease>>;

    /// Release the lock if `lease` still owns it
    async fn unlock(&self, lease: &LockLease) -> CacheResult<()>;
}

/// Always grants the lock. Acceptable for single-worker deployments only: concurrent deliveries of
/// the same trade number are no longer serialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLocker;

#[async_trait]
impl Locker for NoopLocker {
    async fn lock(&self, id: &str) -> CacheResult<Option<LockLease>> {
        Ok(Some(LockLease::new(id)))
    }

    async fn unlock(&self, _lease: &LockLease) -> CacheResult<()> {
        Ok(())
    }
}

/// Process-local locks, id -> owner of the current lease
#[derive(Debug, Default)]
pub struct InMemoryLocker {
    held: Mutex<HashMap<String, String>>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_locked(&self, id: &str) -> bool {
        self.held.lock().await.contains_key(id)
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn lock(&self, id: &str) -> CacheResult<Option<LockLease>> {
        let mut held = self.held.lock().await;
        if held.contains_key(id) {
            debug!(id = %id, acquired = false, "in-memory lock attempt");
            return Ok(None);
        }

        let lease = LockLease::new(id);
        held.insert(id.to_string(), lease.owner.clone());
        debug!(id = %id, acquired = true, "in-memory lock attempt");
        Ok(Some(lease))
    }

    async fn unlock(&self, lease: &LockLease) -> CacheResult<()> {
        let mut held = self.held.lock().await;
        if held.get(&lease.id) == Some(&lease.owner) {
            held.remove(&lease.id);
        } else {
            debug!(id = %lease.id, "stale lease; lock left to its current holder");
        }
        Ok(())
    }
}
