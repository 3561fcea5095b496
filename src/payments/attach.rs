//! Attach recovery store
//!
//! Keeps the caller's attach payload keyed by trade number between the moment a client confirms a
//! payment and the moment the ledger has durably created the order carrying it. A retried
//! confirmation that lost its payload (crash, client resend) reads it back from here.

use crate::cache::error::CacheResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait AttachService: Send + Sync {
    async fn create(&self, id: &str, attach: &str) -> CacheResult<()>;

    async fn delete(&self, id: &str) -> CacheResult<()>;

    async fn get(&self, id: &str) -> CacheResult<Option<String>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAttachService;

#[async_trait]
impl AttachService for NoopAttachService {
    async fn create(&self, _id: &str, _attach: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _id: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn get(&self, _id: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAttachStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryAttachStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AttachService for InMemoryAttachStore {
    async fn create(&self, id: &str, attach: &str) -> CacheResult<()> {
        self.entries
            .write()
            .await
            .insert(id.to_string(), attach.to_string());
        Ok(())
    }

    async fn delete(&self, id: &str) -> CacheResult<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.read().await.get(id).cloned())
    }
}
