//! Key/value cache used to absorb hashing and permission lookups.
//!
//! [`Cache`] is the seam the resolver and permission cache are built against:
//! string keys, string values, a TTL on every write and glob-style pattern
//! deletion (`apiKey-1a2b3c4d*`). [`MemoryCache`] is the in-process backend,
//! built on [`moka`] with a per-entry expiry policy so every `set` carries
//! its own time-to-live.
//!
//! Values are JSON; [`get_json`] and [`set_json`] do the encoding.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use globset::Glob;
use moka::{Expiry, future::Cache as MokaCache};
use serde::{Serialize, de::DeserializeOwned};

/// Failure talking to (or decoding from) the cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cached value could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key pattern: {0}")]
    Pattern(#[from] globset::Error),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes every entry whose key matches the glob `pattern`
    /// (`*` matches any run of characters).
    ///
    /// Returns the number of entries removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Round trip used by the health check.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Reads and decodes a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn Cache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, raw, ttl).await
}

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by `moka`.
#[derive(Clone)]
pub struct MemoryCache {
    inner: MokaCache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let matcher = Glob::new(pattern)?.compile_matcher();

        let matching: Vec<_> = self
            .inner
            .iter()
            .filter(|(key, _)| matcher.is_match(key.as_str()))
            .map(|(key, _)| key)
            .collect();

        for key in &matching {
            self.inner.invalidate(key.as_str()).await;
        }

        Ok(matching.len() as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
