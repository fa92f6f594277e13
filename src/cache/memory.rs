//! In-process cache backend.
//!
//! # Design Decisions
//! - `DashMap` gives per-key atomic get/set without a global lock
//! - Expiry is checked on read; expired entries are removed lazily
//! - When full, expired entries are purged first, then the entry closest
//!   to expiry is evicted

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheClient, CacheError};

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    expires_at: Instant,
    value: Vec<u8>,
}

/// A bounded, thread-safe in-memory cache.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn make_room(&self) {
        let now = Instant::now();
        self.inner.retain(|_, entry| entry.expires_at > now);

        if self.inner.len() < self.max_entries {
            return;
        }
        let victim = self
            .inner
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.inner.remove(&key);
            tracing::debug!(key = %key, "Evicted cache entry");
        }
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.inner.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.inner.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, ttl_seconds: u64, value: Vec<u8>) -> Result<(), CacheError> {
        if !self.inner.contains_key(key) && self.inner.len() >= self.max_entries {
            self.make_room();
        }
        let now = Instant::now();
        let ttl = Duration::from_secs(ttl_seconds).min(MAX_TTL);
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(Duration::from_secs(u32::MAX as u64)))
            .unwrap_or(now);
        let entry = Entry { expires_at, value };
        self.inner.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key);
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        self.inner.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new(10);
        cache.set("a", 60, b"1".to_vec()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));

        cache.delete("a").await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = MemoryCache::new(10);
        cache.set("a", 0, b"1".to_vec()).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_largest_ttl_is_clamped() {
        let cache = MemoryCache::new(10);
        cache.set("forever", u64::MAX, b"1".to_vec()).await.unwrap();
        assert_eq!(cache.get("forever").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_bounded_size() {
        let cache = MemoryCache::new(2);
        cache.set("short", 10, b"1".to_vec()).await.unwrap();
        cache.set("long", 1000, b"2".to_vec()).await.unwrap();
        cache.set("new", 500, b"3".to_vec()).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
        assert!(cache.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_flush_all() {
        let cache = MemoryCache::new(10);
        cache.set("a", 60, b"1".to_vec()).await.unwrap();
        cache.set("b", 60, b"2".to_vec()).await.unwrap();
        cache.flush_all().await.unwrap();
        assert!(cache.is_empty());
    }
}
