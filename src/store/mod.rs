//! Persistence of API keys, their permission grants, and user role lookups.
//!
//! Services depend on the [`KeyStore`] and [`RoleResolver`] traits so the
//! Postgres implementation can be swapped for the in-memory one in tests.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::{
    error::AppError,
    models::api_key::{ApiKey, ListApiKeysQuery, NewApiKey},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Key records and their grant sets.
///
/// Implementations must apply `insert_key` and `update_key` atomically: a
/// failure leaves neither a half-written key nor a half-replaced grant set.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Persists a new key (active, zero calls) together with its grants.
    async fn insert_key(&self, key: NewApiKey, permissions: &[String]) -> Result<ApiKey, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>, AppError>;

    /// Every key whose `secret_prefix` equals `prefix`. May return several.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, AppError>;

    /// One page of keys matching the filter, newest first, plus the total match count.
    async fn list(&self, query: &ListApiKeysQuery) -> Result<(Vec<ApiKey>, i64), AppError>;

    async fn count(&self) -> Result<i64, AppError>;

    /// Renames the key and/or replaces its whole grant set.
    ///
    /// Returns `None` if no key has this id.
    async fn update_key(
        &self,
        id: i64,
        name: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<Option<ApiKey>, AppError>;

    /// Sets `active = false`. Returns `None` if no key has this id.
    async fn deactivate(&self, id: i64) -> Result<Option<ApiKey>, AppError>;

    async fn increment_calls(&self, id: i64) -> Result<(), AppError>;

    async fn permissions_of(&self, id: i64) -> Result<Vec<String>, AppError>;

    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Resolves the permissions a user holds through their role.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn permissions_for_user(&self, user_id: i64) -> Result<HashSet<String>, AppError>;
}
