//! Redis-backed transaction lock
//!
//! `SET key owner NX PX ttl` takes the lock, with the lease's owner token as value. Release runs
//! a compare-and-delete script, so a lease whose lock expired and was taken again, by this worker
//! or another one, never releases the new holder's lock.

use super::error::CacheResult;
use super::keys::lock::TradeLockKey;
use super::RedisPool;
use crate::payments::lock::{LockLease, Locker};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisLocker {
    pool: RedisPool,
    ttl: Duration,
}

impl RedisLocker {
    pub fn new(pool: RedisPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn lock(&self, id: &str) -> CacheResult<Option<LockLease>> {
        let key = TradeLockKey::new(id).to_string();
        let lease = LockLease::new(id);

        let mut conn = self.pool.get().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(lease.owner())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut *conn)
            .await?;

        let acquired = result.is_some();
        debug!(key = %key, acquired, "redis lock attempt");
        Ok(acquired.then_some(lease))
    }

    async fn unlock(&self, lease: &LockLease) -> CacheResult<()> {
        let key = TradeLockKey::new(lease.id()).to_string();
        let mut conn = self.pool.get().await?;

        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(lease.owner())
            .invoke_async(&mut *conn)
            .await?;

        if released == 0 {
            warn!(key = %key, "lock expired before release");
        }
        Ok(())
    }
}
