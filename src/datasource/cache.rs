//! Datasource result caching.
//!
//! # Responsibilities
//! - Derive stable cache keys from the datasource name and endpoint
//! - Decide per request whether a datasource may use the cache
//! - Store and retrieve JSON payloads through a [`CacheBackend`]
//!
//! # Design Decisions
//! - Key = sha256(name) ++ sha256(endpoint or provider key), hex encoded, so
//!   every key of a datasource shares a flushable prefix
//! - A cached payload that no longer parses is treated as a miss
//! - Static datasources are never cached

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::CacheBackend;
use crate::config::schema::CachingConfig;
use crate::datasource::Datasource;
use crate::observability::metrics;
use crate::routing::RequestContext;

/// Cache front for datasource payloads.
#[derive(Clone)]
pub struct DatasourceCache {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    local: bool,
    remote: bool,
    debug: bool,
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

impl DatasourceCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CachingConfig, debug: bool) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            local: config.local,
            remote: config.remote,
            debug,
        }
    }

    /// Prefix shared by every key of one datasource.
    pub fn name_prefix(name: &str) -> String {
        digest(name)
    }

    /// Cache key for a datasource fetch.
    pub fn key(name: &str, endpoint: &str) -> String {
        format!("{}{}", digest(name), digest(endpoint))
    }

    /// Whether `datasource` may read and write the cache for this request.
    pub fn enabled_for(&self, datasource: &Datasource, ctx: &RequestContext) -> bool {
        self.enabled
            && (self.local || self.remote)
            && !self.debug
            && ctx.query.get("cache").map(String::as_str) != Some("false")
            && !datasource.is_static()
            && datasource.schema().cache
    }

    /// Look up a cached payload.
    pub async fn get(&self, datasource: &str, key: &str) -> Option<Value> {
        let hit = match self.backend.get(key).await {
            Some(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(datasource, error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            None => None,
        };
        metrics::record_cache_lookup(datasource, hit.is_some());
        hit
    }

    pub async fn set(&self, key: &str, payload: axum::body::Bytes) {
        self.backend.set(key, payload).await;
    }

    /// Flush by pattern (`*`, `prefix*` or an exact key).
    pub async fn flush(&self, pattern: &str) -> usize {
        self.backend.flush(pattern).await
    }

    /// Flush every entry of one datasource.
    pub async fn flush_datasource(&self, name: &str) -> usize {
        let removed = self.flush(&format!("{}*", Self::name_prefix(name))).await;
        tracing::info!(datasource = name, removed, "Flushed datasource cache");
        removed
    }
}
