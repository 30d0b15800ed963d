//! In-process cache store.
//!
//! Expired entries are dropped when read, and swept in bulk on write once
//! the map has grown past the sweep mark. The mark doubles with the live
//! entry count so sweeps stay amortized.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;

use crate::cache::{CacheBackend, FlushPattern};

/// Smallest map size that triggers a sweep of expired entries.
const SWEEP_THRESHOLD: usize = 1000;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// A thread-safe TTL cache backed by `DashMap`.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Entry>>,
    ttl: Duration,
    next_sweep: Arc<AtomicUsize>,
}

impl MemoryCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            next_sweep: Arc::new(AtomicUsize::new(SWEEP_THRESHOLD)),
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.expires_at > now);
        let live = self.inner.len();
        self.next_sweep
            .store((live * 2).max(SWEEP_THRESHOLD), Ordering::Relaxed);
        before.saturating_sub(live)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        {
            let entry = self.inner.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        // the read guard must be released before removing; a concurrent
        // writer may have stored a fresh value since
        self.inner
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        None
    }

    async fn set(&self, key: &str, value: Bytes) {
        if self.inner.len() >= self.next_sweep.load(Ordering::Relaxed) {
            let removed = self.sweep();
            tracing::debug!(removed, live = self.inner.len(), "Swept expired cache entries");
        }
        self.inner.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn flush(&self, pattern: &str) -> usize {
        let pattern = FlushPattern::parse(pattern);
        let before = self.inner.len();
        self.inner.retain(|key, _| !pattern.matches(key));
        let removed = before.saturating_sub(self.inner.len());
        tracing::info!(removed, "Cache flushed");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        assert!(cache.get("a").await.is_none());

        cache.set("a", Bytes::from_static(b"one")).await;
        assert_eq!(cache.get("a").await.unwrap(), Bytes::from_static(b"one"));

        cache.set("a", Bytes::from_static(b"two")).await;
        assert_eq!(cache.get("a").await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = MemoryCache::new(Duration::from_millis(0));
        cache.set("a", Bytes::from_static(b"one")).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_write_sweeps_expired_entries() {
        let cache = MemoryCache::new(Duration::from_millis(1));
        for i in 0..SWEEP_THRESHOLD {
            cache.set(&format!("page={i}"), Bytes::from_static(b"x")).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.set("fresh", Bytes::from_static(b"y")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Bytes::from_static(b"y"));
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        for i in 0..SWEEP_THRESHOLD + 10 {
            cache.set(&format!("k{i}"), Bytes::from_static(b"x")).await;
        }
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), SWEEP_THRESHOLD + 10);
    }

    #[tokio::test]
    async fn test_expired_read_keeps_fresh_rewrite() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.inner.insert(
            "a".into(),
            Entry {
                value: Bytes::from_static(b"stale"),
                expires_at: Instant::now(),
            },
        );
        assert!(cache.get("a").await.is_none());

        cache.set("a", Bytes::from_static(b"fresh")).await;
        cache
            .inner
            .remove_if("a", |_, entry| entry.expires_at <= Instant::now());
        assert_eq!(cache.get("a").await.unwrap(), Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn test_flush_patterns() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        for key in ["aa1", "aa2", "bb1"] {
            cache.set(key, Bytes::from_static(b"x")).await;
        }

        assert_eq!(cache.flush("aa*").await, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.flush("bb1").await, 1);
        assert_eq!(cache.flush("*").await, 0);
    }
}
