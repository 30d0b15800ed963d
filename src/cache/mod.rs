//! Cache storage backends.
//!
//! # Responsibilities
//! - Define the get/set/flush contract datasource caching relies on
//! - Provide the in-process store
//!
//! # Design Decisions
//! - Backends store opaque bytes; serialization belongs to the caller
//! - TTL is backend-defined
//! - Flush accepts an exact key, a `prefix*` glob, or `*` for everything

pub mod memory;

use async_trait::async_trait;
use axum::body::Bytes;

pub use memory::MemoryCache;

/// Storage contract for cached datasource payloads.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Store an entry, replacing any previous value.
    async fn set(&self, key: &str, value: Bytes);

    /// Remove matching entries, returning how many were removed.
    async fn flush(&self, pattern: &str) -> usize;
}

/// How a flush pattern selects keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushPattern<'a> {
    All,
    Prefix(&'a str),
    Exact(&'a str),
}

impl<'a> FlushPattern<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        match pattern {
            "*" => FlushPattern::All,
            p => match p.strip_suffix('*') {
                Some(prefix) => FlushPattern::Prefix(prefix),
                None => FlushPattern::Exact(p),
            },
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            FlushPattern::All => true,
            FlushPattern::Prefix(prefix) => key.starts_with(prefix),
            FlushPattern::Exact(exact) => key == *exact,
        }
    }
}
