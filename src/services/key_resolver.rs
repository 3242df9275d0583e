//! Resolves a presented secret to its stored key record.
//!
//! Secrets are stored only as salted hashes, so a lookup cannot be an
//! equality query on the secret. Instead:
//!
//! 1. Check the cache under `apiKey-<secret>`; a hit is trusted for its TTL
//! 2. On a miss, load every key sharing the secret's 8-char prefix
//! 3. Verify the secret against each candidate's hash until one matches
//! 4. Cache the matching record and return it
//!
//! # Staleness
//!
//! Cache reads are not fenced against concurrent invalidation. A lookup that
//! reads the cache just before an edit or deactivation invalidates it returns
//! the old record for that one request.
//!
//! An edit or deactivation can also commit between the prefix scan and the
//! cache write, after its invalidation already ran. To close that window the
//! row is re-read after every write; if it no longer matches what was cached,
//! the entry is dropped and the current row is returned.

use std::{sync::Arc, time::Duration};

use crate::{
    cache::{self, Cache},
    error::AppError,
    models::api_key::{ApiKey, SECRET_PREFIX_LEN},
    services::key_issuer::SecretHasher,
    store::KeyStore,
};

pub const KEY_CACHE_PREFIX: &str = "apiKey-";

pub fn key_cache_key(presented: &str) -> String {
    format!("{KEY_CACHE_PREFIX}{presented}")
}

/// Pattern matching every cached lookup of secrets starting with `secret_prefix`.
pub fn key_cache_pattern(secret_prefix: &str) -> String {
    format!("{KEY_CACHE_PREFIX}{secret_prefix}*")
}

#[derive(Clone)]
pub struct KeyResolver {
    store: Arc<dyn KeyStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl KeyResolver {
    pub fn new(store: Arc<dyn KeyStore>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// # Errors
    ///
    /// - `Unauthorized`: empty credential
    /// - `NotFound`: no stored key matches the secret
    /// - `Database` / `Internal`: store or hash verification failure
    pub async fn resolve(&self, presented: &str) -> Result<ApiKey, AppError> {
        if presented.is_empty() {
            return Err(AppError::Unauthorized("Missing API key"));
        }

        let cache_key = key_cache_key(presented);

        // A broken cache costs latency, not correctness
        match cache::get_json::<ApiKey>(self.cache.as_ref(), &cache_key).await {
            Ok(Some(key)) => {
                tracing::debug!(key_id = key.id, "API key served from cache");
                return Ok(key);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "API key cache read failed, falling back to store"),
        }

        let prefix = presented.get(..SECRET_PREFIX_LEN).unwrap_or(presented);
        let candidates = self.store.find_by_prefix(prefix).await?;
        tracing::debug!(prefix, candidates = candidates.len(), "API key cache miss");

        for candidate in candidates {
            let matched =
                SecretHasher::verify_blocking(presented.to_string(), candidate.secret_hash.clone())
                    .await?;
            if !matched {
                continue;
            }

            return self.cache_resolved(&cache_key, candidate).await;
        }

        Err(AppError::key_not_found())
    }

    /// Cache a freshly verified key, then re-read its row.
    async fn cache_resolved(&self, cache_key: &str, candidate: ApiKey) -> Result<ApiKey, AppError> {
        if let Err(e) = cache::set_json(self.cache.as_ref(), cache_key, &candidate, self.ttl).await {
            tracing::warn!(key_id = candidate.id, error = %e, "failed to cache resolved API key");
            return Ok(candidate);
        }

        let current = match self.store.find_by_id(candidate.id).await {
            Ok(current) => current,
            Err(e) => {
                self.evict(cache_key, candidate.id).await;
                return Err(e);
            }
        };

        match current {
            Some(current) if current.active == candidate.active && current.name == candidate.name => {
                Ok(candidate)
            }
            current => {
                tracing::debug!(key_id = candidate.id, "API key changed during lookup, dropped cached copy");
                self.evict(cache_key, candidate.id).await;
                current.ok_or_else(AppError::key_not_found)
            }
        }
    }

    async fn evict(&self, cache_key: &str, key_id: i64) {
        if let Err(e) = self.cache.delete_pattern(cache_key).await {
            tracing::warn!(key_id, error = %e, "failed to drop stale cached API key");
        }
    }
}
