//! TTL cache for aggregate queries
//!
//! Bounded memoization keyed by query name: entries expire after a TTL,
//! expired entries are swept lazily on every access, and when the cache
//! is full the least-recently-accessed entry is evicted. Mutating store
//! operations delete the affected keys explicitly instead of waiting for
//! the TTL.
//!
//! Two variants with identical semantics: [`TtlCache`] for the blocking
//! mode and [`AsyncTtlCache`] for the async mode. Each instance has its
//! own lock; nothing is shared between them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Public cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub max_entries: usize,
    pub hit_rate: f64,
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
    last_accessed: Instant,
}

struct CacheInner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    max_entries: usize,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T: Clone> CacheInner<T> {
    fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            default_ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn sweep_expired(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }

    fn get(&mut self, key: &str) -> Option<T> {
        let now = Instant::now();
        self.sweep_expired(now);

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: T, ttl: Duration) {
        let now = Instant::now();
        self.sweep_expired(now);

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            self.evict_lru();
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entry_count: self.entries.len(),
            max_entries: self.max_entries,
            hit_rate: if total > 0 {
                self.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Thread-safe TTL cache for the blocking operating mode.
pub struct TtlCache<T> {
    inner: parking_lot::Mutex<CacheInner<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: parking_lot::Mutex::new(CacheInner::new(max_entries, default_ttl)),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.inner.lock().get(key)
    }

    pub fn set(&self, key: &str, value: T) {
        let mut inner = self.inner.lock();
        let ttl = inner.default_ttl;
        inner.set(key, value, ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: T, ttl: Duration) {
        self.inner.lock().set(key, value, ttl);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().delete(key)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}

/// Task-safe TTL cache for the async operating mode.
pub struct AsyncTtlCache<T> {
    inner: tokio::sync::Mutex<CacheInner<T>>,
}

impl<T: Clone> AsyncTtlCache<T> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(CacheInner::new(max_entries, default_ttl)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.inner.lock().await.get(key)
    }

    pub async fn set(&self, key: &str, value: T) {
        let mut inner = self.inner.lock().await;
        let ttl = inner.default_ttl;
        inner.set(key, value, ttl);
    }

    pub async fn set_with_ttl(&self, key: &str, value: T, ttl: Duration) {
        self.inner.lock().await.set(key, value, ttl);
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.lock().await.delete(key)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats()
    }
}
