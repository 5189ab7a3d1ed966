//! Recommendation cache.
//!
//! [`CacheBackend`] is the raw key-value seam (Redis in production, an
//! in-memory map in tests). [`RecommendationCache`] layers the typed
//! `get`/`set` of recommendation sets on top of it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ServiceError;
use crate::recommendation::RecommendationPayload;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), ServiceError>;

    async fn ping(&self) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RecommendationCache {
    backend: Arc<dyn CacheBackend>,
}

impl RecommendationCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// `Ok(None)` on a miss or an entry that is not a JSON array; `Err` only
    /// when the store is unreachable. Array elements are returned verbatim.
    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<RecommendationPayload>>, ServiceError> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(items) => Ok(Some(items)),
            Err(e) => {
                tracing::warn!(
                    target: "recommender::cache",
                    key = %key,
                    error = %e,
                    "Discarding undecodable cache entry"
                );
                Ok(None)
            }
        }
    }

    pub async fn set(
        &self,
        key: &str,
        items: &[RecommendationPayload],
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        let raw = serde_json::to_string(items)
            .map_err(|e| ServiceError::DependencyDegraded(format!("serialize: {}", e)))?;
        self.backend.set_with_expiry(key, &raw, ttl).await
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.backend.ping().await
    }
}

/// Process-local backend with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, ServiceError> {
        self.entries
            .lock()
            .map_err(|_| ServiceError::DependencyDegraded("memory cache lock poisoned".into()))
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::value::to_raw_value;

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set_with_expiry("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get_keeps_items_verbatim() {
        let backend = Arc::new(MemoryCache::new());
        let cache = RecommendationCache::new(backend.clone());
        let items = vec![
            to_raw_value(&serde_json::json!({"id": 1, "tags": ["a", "b"]})).unwrap(),
            to_raw_value(&serde_json::json!({"id": 2, "image": null})).unwrap(),
        ];
        cache.set("recs", &items, Duration::from_secs(60)).await.unwrap();

        let raw = backend.get("recs").await.unwrap().unwrap();
        assert_eq!(raw, r#"[{"id":1,"tags":["a","b"]},{"id":2,"image":null}]"#);

        let fetched = cache.get("recs").await.unwrap().unwrap();
        let fetched: Vec<&str> = fetched.iter().map(|item| item.get()).collect();
        assert_eq!(fetched, vec![r#"{"id":1,"tags":["a","b"]}"#, r#"{"id":2,"image":null}"#]);
    }

    #[tokio::test]
    async fn test_non_array_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        let cache = RecommendationCache::new(backend.clone());
        for corrupt in ["{not json", r#"{"id":1}"#, "42"] {
            backend
                .set_with_expiry("recs", corrupt, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(cache.get("recs").await.unwrap().is_none(), "{}", corrupt);
        }
    }
}
