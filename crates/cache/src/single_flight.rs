//! Single-flight TTL cache.
//!
//! On a miss, the first caller for a key runs the generator while every
//! other caller for the same key suspends behind a per-key mutex, then
//! re-checks the cache before generating (double-check). This prevents
//! cache stampedes: at most one expensive generation is ever in flight per
//! key.

use crate::entry::CacheEntry;
use crate::keyed_mutex::KeyedMutex;
use chrono::Duration;
use docent_core::{AppResult, Clock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// TTL key-value cache with single-flight generation.
pub struct SingleFlightCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    mutex: KeyedMutex,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone + Send + Sync> SingleFlightCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            mutex: KeyedMutex::new(),
            ttl,
            clock,
        }
    }

    /// Read a live entry; an expired entry behaves as a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert a value with this cache's TTL.
    pub async fn insert(&self, key: &str, value: T) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry::new(value, now, now + self.ttl),
        );
    }

    /// Return the cached value for `key`, running `generator` at most once
    /// across all concurrent callers on a miss.
    ///
    /// A generator error propagates to its caller and caches nothing, so the
    /// next caller retries.
    pub async fn get_or_create<F, Fut>(&self, key: &str, generator: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(value) = self.get(key).await {
            tracing::debug!(key, "cache hit");
            return Ok(value);
        }

        let _guard = self.mutex.lock(key).await;

        // Double-check: another caller may have filled the entry while we
        // waited for the lock.
        if let Some(value) = self.get(key).await {
            tracing::debug!(key, "cache hit after lock");
            return Ok(value);
        }

        tracing::debug!(key, "cache miss, generating");
        let value = generator().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    /// Drop the entry for `key`.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(key).is_some()
    }

    /// Drop all expired entries and idle lock slots; returns the number of
    /// entries removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        };
        self.mutex.prune().await;
        removed
    }

    /// Number of entries, live or not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<M: Clone + Send + Sync> SingleFlightCache<Vec<M>> {
    /// Append an item to a live list entry and extend its expiry by the
    /// cache TTL (sliding expiration, keeps active conversations warm).
    ///
    /// No-op when the entry is missing or already expired.
    pub async fn append(&self, key: &str, item: M) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.value.push(item);
                entry.expires_at = now + self.ttl;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::{AppError, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn cache_with_clock(ttl_minutes: i64) -> (SingleFlightCache<String>, ManualClock) {
        let clock = ManualClock::default();
        let cache = SingleFlightCache::new(
            Duration::minutes(ttl_minutes),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[tokio::test]
    async fn test_read_before_expiry_hits() {
        let (cache, clock) = cache_with_clock(30);
        cache.insert("k", "v".to_string()).await;

        clock.advance(Duration::minutes(29));
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_read_after_expiry_misses_and_regenerates() {
        let (cache, clock) = cache_with_clock(30);
        cache.insert("k", "old".to_string()).await;

        clock.advance(Duration::minutes(31));
        assert_eq!(cache.get("k").await, None);

        let regenerated = cache
            .get_or_create("k", || async { Ok("new".to_string()) })
            .await
            .unwrap();
        assert_eq!(regenerated, "new");
    }

    #[tokio::test]
    async fn test_single_flight_one_generation_for_concurrent_callers() {
        let clock = ManualClock::default();
        let cache = Arc::new(SingleFlightCache::<String>::new(
            Duration::minutes(30),
            Arc::new(clock),
        ));
        let generations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let generations = Arc::clone(&generations);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create("slow", || async move {
                        generations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(20)).await;
                        Ok("generated".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "generated");
        }
        assert_eq!(generations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generator_error_caches_nothing() {
        let (cache, _clock) = cache_with_clock(30);

        let failed = cache
            .get_or_create("k", || async {
                Err(AppError::Cache("generator broke".to_string()))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty().await);

        // Next caller retries and succeeds
        let value = cache
            .get_or_create("k", || async { Ok("ok".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "ok");
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _clock) = cache_with_clock(30);
        cache.insert("k", "v".to_string()).await;
        assert!(cache.invalidate("k").await);
        assert!(!cache.invalidate("k").await);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired() {
        let (cache, clock) = cache_with_clock(30);
        cache.insert("old", "v".to_string()).await;
        clock.advance(Duration::minutes(20));
        cache.insert("fresh", "v".to_string()).await;
        clock.advance(Duration::minutes(15));

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.get("old").await, None);
        assert!(cache.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_append_extends_expiry() {
        let clock = ManualClock::default();
        let cache = SingleFlightCache::<Vec<u32>>::new(
            Duration::minutes(30),
            Arc::new(clock.clone()),
        );
        cache.insert("conv", vec![1]).await;

        clock.advance(Duration::minutes(20));
        cache.append("conv", 2).await;

        // Past the original 30-minute expiry, but the append slid it forward
        clock.advance(Duration::minutes(15));
        assert_eq!(cache.get("conv").await, Some(vec![1, 2]));

        clock.advance(Duration::minutes(16));
        assert_eq!(cache.get("conv").await, None);
    }

    #[tokio::test]
    async fn test_append_to_expired_entry_is_noop() {
        let clock = ManualClock::default();
        let cache = SingleFlightCache::<Vec<u32>>::new(
            Duration::minutes(30),
            Arc::new(clock.clone()),
        );
        cache.insert("conv", vec![1]).await;
        clock.advance(Duration::minutes(31));

        cache.append("conv", 2).await;
        assert_eq!(cache.get("conv").await, None);
    }
}
