//! In-memory cache backed by `moka`.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;

use super::LocalCache;
use crate::error::CacheError;

/// Process-local cache. Contents are lost when the process exits.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Value>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().max_capacity(64).build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
