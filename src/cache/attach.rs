use super::error::CacheResult;
use super::keys::attach::AttachKey;
use super::RedisPool;
use crate::payments::attach::AttachService;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Attach payloads in Redis, expiring after `ttl` when never cleaned up
pub struct RedisAttachStore {
    pool: RedisPool,
    ttl: Duration,
}

impl RedisAttachStore {
    pub fn new(pool: RedisPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    async fn conn(&self) -> CacheResult<bb8::PooledConnection<'_, bb8_redis::RedisConnectionManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl AttachService for RedisAttachStore {
    async fn create(&self, id: &str, attach: &str) -> CacheResult<()> {
        let key = AttachKey::new(id).to_string();
        let mut conn = self.conn().await?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(attach)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut *conn)
            .await?;

        debug!(key = %key, "attach stored");
        Ok(())
    }

    async fn delete(&self, id: &str) -> CacheResult<()> {
        let key = AttachKey::new(id).to_string();
        let mut conn = self.conn().await?;

        let _: i64 = redis::cmd("DEL").arg(&key).query_async(&mut *conn).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CacheResult<Option<String>> {
        let key = AttachKey::new(id).to_string();
        let mut conn = self.conn().await?;

        let value: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut *conn).await?;
        Ok(value)
    }
}
