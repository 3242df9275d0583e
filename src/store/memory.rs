//! In-memory stores for tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;

use super::{KeyStore, RoleResolver};
use crate::{
    error::AppError,
    models::api_key::{ApiKey, ListApiKeysQuery, NewApiKey},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    keys: BTreeMap<i64, ApiKey>,
    grants: BTreeMap<i64, BTreeSet<String>>,
}

/// [`KeyStore`] held in a mutex-guarded map.
///
/// `set_unavailable(true)` makes every call fail the way a lost database
/// connection would.
#[derive(Default)]
pub struct MemoryKeyStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    prefix_lookups: AtomicU64,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `find_by_prefix` calls served, i.e. resolver cache misses.
    pub fn prefix_lookups(&self) -> u64 {
        self.prefix_lookups.load(Ordering::SeqCst)
    }

    /// Inserts a record verbatim, bypassing the issuer. Used to stage prefix collisions.
    pub fn insert_raw(&self, key: ApiKey, permissions: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = inner.next_id.max(key.id);
        inner
            .grants
            .insert(key.id, permissions.iter().map(|p| p.to_string()).collect());
        inner.keys.insert(key.id, key);
    }

    fn check(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn insert_key(&self, key: NewApiKey, permissions: &[String]) -> Result<ApiKey, AppError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let record = ApiKey {
            id: inner.next_id,
            name: key.name,
            secret_prefix: key.secret_prefix,
            secret_hash: key.secret_hash,
            active: true,
            expires_at: key.expires_at,
            calls: 0,
            created_by: key.created_by,
            created_at: Utc::now(),
        };
        inner
            .grants
            .insert(record.id, permissions.iter().cloned().collect());
        inner.keys.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().keys.get(&id).cloned())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, AppError> {
        self.check()?;
        self.prefix_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .keys
            .values()
            .filter(|key| key.secret_prefix == prefix)
            .cloned()
            .collect())
    }

    async fn list(&self, query: &ListApiKeysQuery) -> Result<(Vec<ApiKey>, i64), AppError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let needle = query.name.as_ref().map(|n| n.to_lowercase());
        let mut matching: Vec<ApiKey> = inner
            .keys
            .values()
            .filter(|key| {
                needle
                    .as_ref()
                    .is_none_or(|n| key.name.to_lowercase().contains(n))
            })
            .filter(|key| query.active.is_none_or(|active| key.active == active))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn count(&self) -> Result<i64, AppError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().keys.len() as i64)
    }

    async fn update_key(
        &self,
        id: i64,
        name: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<Option<ApiKey>, AppError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(key) = inner.keys.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            key.name = name.to_string();
        }
        let record = key.clone();
        if let Some(permissions) = permissions {
            inner.grants.insert(id, permissions.iter().cloned().collect());
        }
        Ok(Some(record))
    }

    async fn deactivate(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.keys.get_mut(&id).map(|key| {
            key.active = false;
            key.clone()
        }))
    }

    async fn increment_calls(&self, id: i64) -> Result<(), AppError> {
        self.check()?;
        if let Some(key) = self.inner.lock().unwrap().keys.get_mut(&id) {
            key.calls += 1;
        }
        Ok(())
    }

    async fn permissions_of(&self, id: i64) -> Result<Vec<String>, AppError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .grants
            .get(&id)
            .map(|grants| grants.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }
}

/// [`RoleResolver`] over a fixed user → permissions map.
#[derive(Default)]
pub struct StaticRoleResolver {
    users: HashMap<i64, HashSet<String>>,
}

impl StaticRoleResolver {
    pub fn with_user(mut self, user_id: i64, permissions: &[&str]) -> Self {
        self.users
            .insert(user_id, permissions.iter().map(|p| p.to_string()).collect());
        self
    }
}

#[async_trait]
impl RoleResolver for StaticRoleResolver {
    async fn permissions_for_user(&self, user_id: i64) -> Result<HashSet<String>, AppError> {
        Ok(self.users.get(&user_id).cloned().unwrap_or_default())
    }
}
