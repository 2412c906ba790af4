//! Local key/value cache.
//!
//! Values are plain JSON. A missing key is a valid state, never an error.
//! Read failures are logged and treated as absence by [`read`].

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CacheError;

/// Cache keys.
pub mod keys {
    /// Session settings.
    pub const SESSION: &str = "session";
    pub const USER: &str = "user";
    pub const COMMUTER: &str = "commuter";
    pub const PLAN: &str = "plan";
    /// One-shot registration code, folded into the next identify call.
    pub const REGISTRATION_CODE: &str = "registration-code";

    /// Keys removed when a session is cleared.
    pub const SESSION_KEYS: [&str; 4] = [COMMUTER, PLAN, SESSION, USER];
}

/// A client-side key/value store.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Read and decode a cached value.
///
/// Returns `None` when the key is absent, the cache cannot be read or the
/// value does not decode as `T`.
pub async fn read<T: DeserializeOwned>(cache: &dyn LocalCache, key: &str) -> Option<T> {
    let value = match cache.get(key).await {
        Ok(value) => value?,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache read failed, treating as absent");
            return None;
        }
    };

    if value.is_null() {
        return None;
    }

    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(key, error = %e, "Cached value is malformed, ignoring");
            None
        }
    }
}

/// Encode and store a value.
///
/// # Errors
///
/// Returns `CacheError` if the value cannot be encoded or stored.
pub async fn write<T: Serialize + Sync>(
    cache: &dyn LocalCache,
    key: &str,
    value: &T,
) -> Result<(), CacheError> {
    cache.set(key, serde_json::to_value(value)?).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use commuter_core::Commuter;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_treats_malformed_and_null_as_absent() {
        let cache = MemoryCache::new();
        cache.set(keys::COMMUTER, json!("not a commuter")).await.unwrap();
        assert!(read::<Commuter>(&cache, keys::COMMUTER).await.is_none());

        cache.set(keys::USER, Value::Null).await.unwrap();
        assert!(read::<Value>(&cache, keys::USER).await.is_none());

        assert!(read::<Value>(&cache, keys::SESSION).await.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let cache = MemoryCache::new();
        let commuter = Commuter {
            given_name: Some("Ada".to_string()),
            ..Commuter::anonymous()
        };
        write(&cache, keys::COMMUTER, &commuter).await.unwrap();

        let cached: Commuter = read(&cache, keys::COMMUTER).await.unwrap();
        assert_eq!(cached, commuter);
    }
}
