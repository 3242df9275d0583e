//! Cached view of the permissions granted to each key.

use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    cache::{self, Cache},
    error::AppError,
    store::KeyStore,
};

pub const PERMISSIONS_CACHE_PREFIX: &str = "keyPermissionsStrings-";

pub fn permissions_cache_key(key_id: i64) -> String {
    format!("{PERMISSIONS_CACHE_PREFIX}{key_id}")
}

#[derive(Clone)]
pub struct PermissionCache {
    store: Arc<dyn KeyStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl PermissionCache {
    pub fn new(store: Arc<dyn KeyStore>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// The set of permission names granted to `key_id`.
    ///
    /// Served from `keyPermissionsStrings-<id>` when present; otherwise loaded
    /// from the store and cached. Cache failures degrade to a store read.
    pub async fn permissions_of(&self, key_id: i64) -> Result<HashSet<String>, AppError> {
        let cache_key = permissions_cache_key(key_id);

        match cache::get_json::<Vec<String>>(self.cache.as_ref(), &cache_key).await {
            Ok(Some(permissions)) => return Ok(permissions.into_iter().collect()),
            Ok(None) => {}
            Err(e) => tracing::warn!(key_id, error = %e, "permission cache read failed, falling back to store"),
        }

        let permissions = self.store.permissions_of(key_id).await?;

        if let Err(e) = cache::set_json(self.cache.as_ref(), &cache_key, &permissions, self.ttl).await {
            tracing::warn!(key_id, error = %e, "failed to cache key permissions");
        }

        Ok(permissions.into_iter().collect())
    }

    /// True iff the key holds every permission in `required`.
    pub async fn has_all(&self, key_id: i64, required: &[String]) -> Result<bool, AppError> {
        let held = self.permissions_of(key_id).await?;
        Ok(required.iter().all(|permission| held.contains(permission)))
    }
}
