//! Key/value cache store with per-entry TTL and prefix invalidation.
//!
//! The store is a primitive: it knows nothing about campaigns. Key layout and
//! the decision of what to invalidate belong to [`crate::coordinator`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use crate::errors::CacheError;

/// Entries kept by [`MemoryCache::new`].
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` is a miss; expired entries are misses.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Drop every entry whose key starts with `prefix`. Returns how many went.
    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with. Overwriting a key
/// restarts its clock.
struct StoredTtl;

impl Expiry<String, Entry> for StoredTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache bounded by entry count.
///
/// Not shared between processes; each instance of the service keeps its own.
/// Expired and evicted entries are cleaned up by moka's own housekeeping.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(StoredTtl)
            .support_invalidation_closures()
            .build();
        Self { entries }
    }

    /// Live entry count, after pending evictions and invalidations ran.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), Entry { value, ttl })
            .await;
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let matching = self
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .count();

        let prefix = prefix.to_string();
        self.entries
            .invalidate_entries_if(move |k, _| k.starts_with(&prefix))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache.set("campaigns:all", b"[]".to_vec(), TTL).await.unwrap();
        assert_eq!(cache.get("campaigns:all").await.unwrap(), Some(b"[]".to_vec()));
        assert_eq!(cache.get("campaigns:other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("short", b"v".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        cache.set("long", b"v".to_vec(), TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn overwrite_restarts_the_clock() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"old".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        cache.set("k", b"new".to_vec(), TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn prefix_invalidation_leaves_other_keys() {
        let cache = MemoryCache::new();
        for key in ["campaigns:all", "campaigns:owner:0xa", "sessions:1"] {
            cache.set(key, Vec::new(), TTL).await.unwrap();
        }
        assert_eq!(cache.invalidate_prefix("campaigns:").await.unwrap(), 2);
        assert!(cache.get("campaigns:all").await.unwrap().is_none());
        assert!(cache.get("campaigns:owner:0xa").await.unwrap().is_none());
        assert!(cache.get("sessions:1").await.unwrap().is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn entries_set_after_invalidation_survive_it() {
        let cache = MemoryCache::new();
        cache.set("campaigns:all", b"old".to_vec(), TTL).await.unwrap();
        cache.invalidate_prefix("campaigns:").await.unwrap();

        cache.set("campaigns:all", b"new".to_vec(), TTL).await.unwrap();
        assert_eq!(cache.get("campaigns:all").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn entry_count_is_bounded() {
        let cache = MemoryCache::with_capacity(100);
        for n in 0..1_000 {
            cache
                .set(&format!("campaigns:one:1:viewer:u{n}"), vec![0; 8], TTL)
                .await
                .unwrap();
        }
        assert!(cache.len().await <= 100);
    }
}
