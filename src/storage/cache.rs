// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session cache: key-value store with per-key expiry.
//!
//! Holds token ids, OTP codes and trial counters. Two implementations:
//!
//! - [`MemoryCache`]: in-process LRU with per-entry deadlines (single node)
//! - [`super::redis_cache::RedisCache`]: shared Redis instance

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("value at {0} is not an integer")]
    NotAnInteger(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Operations the session layer needs from its cache.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Store `value` under `key` for `ttl`. Returns `false` when the write was
    /// not applied.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Atomically read and delete `key`. Of several concurrent callers at
    /// most one receives the value.
    async fn take(&self, key: &str) -> CacheResult<Option<String>>;

    /// Atomically increment an integer value. A missing key counts from 0
    /// and gets no expiry; an existing key keeps its expiry.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[&str]) -> CacheResult<u64>;

    /// Remaining lifetime, `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    async fn ping(&self) -> CacheResult<()>;
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process LRU session cache.
///
/// Once `capacity` is reached the least recently used entry is evicted,
/// which for session keys means an early logout.
pub struct MemoryCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn with_cache<T>(
        &self,
        f: impl FnOnce(&mut LruCache<String, CacheEntry>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let mut cache = self.cache.lock().map_err(|_| CacheError::Poisoned)?;
        f(&mut cache)
    }

    /// Live (unexpired) entry for `key`; drops it if expired.
    fn live<'a>(
        cache: &'a mut LruCache<String, CacheEntry>,
        key: &str,
    ) -> Option<&'a mut CacheEntry> {
        let now = Instant::now();
        if cache.peek(key).is_some_and(|entry| entry.is_expired(now)) {
            cache.pop(key);
            return None;
        }
        cache.get_mut(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        if ttl.is_zero() {
            return Ok(false);
        }
        self.with_cache(|cache| {
            cache.put(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            tracing::debug!(key, ttl_ms = ttl.as_millis() as u64, "cache set");
            Ok(true)
        })
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_cache(|cache| Ok(Self::live(cache, key).map(|entry| entry.value.clone())))
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_cache(|cache| {
            let now = Instant::now();
            Ok(cache
                .pop(key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.value))
        })
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        self.with_cache(|cache| {
            if let Some(entry) = Self::live(cache, key) {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
                let next = current + 1;
                entry.value = next.to_string();
                return Ok(next);
            }
            cache.put(
                key.to_string(),
                CacheEntry {
                    value: "1".to_string(),
                    expires_at: None,
                },
            );
            Ok(1)
        })
    }

    async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
        self.with_cache(|cache| {
            let now = Instant::now();
            let mut removed = 0;
            for key in keys {
                if let Some(entry) = cache.pop(*key) {
                    if !entry.is_expired(now) {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.with_cache(|cache| {
            Ok(Self::live(cache, key)
                .and_then(|entry| entry.expires_at)
                .map(|deadline| deadline.saturating_duration_since(Instant::now())))
        })
    }

    async fn ping(&self) -> CacheResult<()> {
        self.with_cache(|_| Ok(()))
    }
}
