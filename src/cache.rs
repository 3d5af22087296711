use std::time::Duration;

use moka::future::Cache;

/// TTL + capacity bounded cache for tool responses, one instance per query
/// category. With caching disabled the wrapper is inert and every lookup
/// misses.
#[derive(Debug, Clone)]
pub struct ResponseCache<T: Clone + Send + Sync + 'static> {
    inner: Option<Cache<String, T>>,
}

impl<T: Clone + Send + Sync + 'static> ResponseCache<T> {
    pub fn new(enabled: bool, max_size: u64, ttl: Duration) -> Self {
        let inner = enabled.then(|| {
            Cache::builder()
                .max_capacity(max_size)
                .time_to_live(ttl)
                .build()
        });
        Self { inner }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    pub async fn insert(&self, key: String, value: T) {
        if let Some(cache) = &self.inner {
            cache.insert(key, value).await;
        }
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_values_before_expiry() {
        let cache = ResponseCache::new(true, 16, Duration::from_secs(60));
        cache.insert("SMITH".to_string(), "response".to_string()).await;
        assert_eq!(cache.get("SMITH").await.as_deref(), Some("response"));
        assert_eq!(cache.get("JONES").await, None);
    }

    #[tokio::test]
    async fn expires_entries_after_ttl() {
        let cache = ResponseCache::new(true, 16, Duration::from_millis(50));
        cache.insert("k".to_string(), 1u32).await;
        assert_eq!(cache.get("k").await, Some(1));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn clear_removes_all_entries() {
        let cache = ResponseCache::new(true, 16, Duration::from_secs(60));
        cache.insert("a".to_string(), 1u32).await;
        cache.insert("b".to_string(), 2u32).await;
        cache.clear();
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn disabled_cache_never_stores() {
        let cache = ResponseCache::new(false, 16, Duration::from_secs(60));
        cache.insert("a".to_string(), 1u32).await;
        assert_eq!(cache.get("a").await, None);
    }
}
