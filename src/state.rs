//! Shared application state handed to handlers and middleware.

use std::{sync::Arc, time::Duration};

use crate::{
    cache::Cache,
    middleware::permission::PermissionRegistry,
    models::permission::PermissionCatalog,
    services::{
        key_issuer::{KeyIssuer, SecretHasher},
        key_resolver::KeyResolver,
        key_service::KeyService,
        permission_cache::PermissionCache,
    },
    store::{KeyStore, RoleResolver},
};

/// Cloned into every request; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyStore>,
    pub cache: Arc<dyn Cache>,
    pub roles: Arc<dyn RoleResolver>,
    pub catalog: PermissionCatalog,
    pub registry: Arc<PermissionRegistry>,
    pub issuer: KeyIssuer,
    pub resolver: KeyResolver,
    pub permissions: PermissionCache,
    pub keys: KeyService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KeyStore>,
        cache: Arc<dyn Cache>,
        roles: Arc<dyn RoleResolver>,
        catalog: PermissionCatalog,
        registry: PermissionRegistry,
        hasher: SecretHasher,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            issuer: KeyIssuer::new(store.clone(), catalog.clone(), hasher),
            resolver: KeyResolver::new(store.clone(), cache.clone(), cache_ttl),
            permissions: PermissionCache::new(store.clone(), cache.clone(), cache_ttl),
            keys: KeyService::new(store.clone(), cache.clone(), catalog.clone()),
            registry: Arc::new(registry),
            store,
            cache,
            roles,
            catalog,
        }
    }
}
