//! Key management: listing, editing, and deactivation.
//!
//! Every mutation clears the cache entries derived from the key:
//!
//! - `apiKey-<prefix>*`: resolved records for any secret with the key's prefix
//! - `keyPermissionsStrings-<id>`: the cached grant set
//!
//! Clearing by prefix may also drop entries of other keys sharing the prefix;
//! those are simply re-resolved on their next request.

use std::sync::Arc;

use crate::{
    cache::Cache,
    error::AppError,
    models::{
        api_key::{ApiKey, ApiKeyPage, ApiKeyResponse, EditApiKeyRequest, ListApiKeysQuery},
        permission::PermissionCatalog,
    },
    services::{
        key_issuer::dedup, key_resolver::key_cache_pattern, permission_cache::permissions_cache_key,
    },
    store::KeyStore,
};

#[derive(Clone)]
pub struct KeyService {
    store: Arc<dyn KeyStore>,
    cache: Arc<dyn Cache>,
    catalog: PermissionCatalog,
}

impl KeyService {
    pub fn new(store: Arc<dyn KeyStore>, cache: Arc<dyn Cache>, catalog: PermissionCatalog) -> Self {
        Self {
            store,
            cache,
            catalog,
        }
    }

    pub async fn list(&self, query: &ListApiKeysQuery) -> Result<ApiKeyPage, AppError> {
        let (keys, total) = self.store.list(query).await?;

        Ok(ApiKeyPage {
            items: keys.into_iter().map(Into::into).collect(),
            total,
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    /// A single key with its grants.
    pub async fn get(&self, key_id: i64) -> Result<ApiKeyResponse, AppError> {
        let key = self
            .store
            .find_by_id(key_id)
            .await?
            .ok_or_else(AppError::key_not_found)?;
        let permissions = self.store.permissions_of(key_id).await?;

        Ok(ApiKeyResponse::from(key).with_permissions(permissions))
    }

    /// Rename a key and/or replace its grant set.
    ///
    /// # Process
    ///
    /// 1. Validate the new name and permissions (nothing is written on failure)
    /// 2. Update name, delete all grants, insert the new set, in one transaction
    /// 3. Invalidate cached lookups and the cached grant set
    ///
    /// # Errors
    ///
    /// - `Validation`: empty name, empty permission list, or unknown permissions (all listed)
    /// - `NotFound`: no key with this id
    /// - `Cache`: the change is stored but cached data could not be cleared
    pub async fn edit(&self, key_id: i64, request: EditApiKeyRequest) -> Result<ApiKey, AppError> {
        let name = match request.name.as_deref().map(str::trim) {
            Some("") => return Err(AppError::validation("Name must not be empty")),
            other => other,
        };

        let permissions = match request.permissions {
            Some(ref permissions) => {
                self.catalog.validate(permissions)?;
                Some(dedup(permissions))
            }
            None => None,
        };

        let key = self
            .store
            .update_key(key_id, name, permissions.as_deref())
            .await?
            .ok_or_else(AppError::key_not_found)?;

        self.invalidate(&key).await?;

        tracing::info!(
            key_id,
            renamed = name.is_some(),
            permissions_replaced = permissions.is_some(),
            "API key edited"
        );

        Ok(key)
    }

    /// Permanently deactivate a key. Deactivating an inactive key is a no-op success.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no key with this id
    /// - `Cache`: the key is inactive but cached lookups could not be cleared
    pub async fn deactivate(&self, key_id: i64) -> Result<(), AppError> {
        let key = self
            .store
            .deactivate(key_id)
            .await?
            .ok_or_else(AppError::key_not_found)?;

        self.invalidate(&key).await?;

        tracing::info!(key_id, prefix = %key.secret_prefix, "API key deactivated");

        Ok(())
    }

    async fn invalidate(&self, key: &ApiKey) -> Result<(), AppError> {
        let removed = self
            .cache
            .delete_pattern(&key_cache_pattern(&key.secret_prefix))
            .await?;
        self.cache
            .delete_pattern(&permissions_cache_key(key.id))
            .await?;

        tracing::debug!(key_id = key.id, removed, "invalidated cached API key lookups");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCache,
        models::permission::{EDIT_KEYS, VIEW_KEYS},
        services::{
            key_issuer::{
                IssuedKey, KeyIssuer,
                tests::{admin, fast_hasher},
            },
            key_resolver::{KeyResolver, tests::BrokenCache},
            permission_cache::PermissionCache,
        },
        store::memory::MemoryKeyStore,
    };
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryKeyStore>,
        issuer: KeyIssuer,
        resolver: KeyResolver,
        permissions: PermissionCache,
        service: KeyService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKeyStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(1_000));
        let ttl = Duration::from_secs(60);
        let catalog = PermissionCatalog::builtin();
        Fixture {
            issuer: KeyIssuer::new(store.clone(), catalog.clone(), fast_hasher()),
            resolver: KeyResolver::new(store.clone(), cache.clone(), ttl),
            permissions: PermissionCache::new(store.clone(), cache.clone(), ttl),
            service: KeyService::new(store.clone(), cache, catalog),
            store,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn issue(f: &Fixture, permissions: &[&str]) -> IssuedKey {
        f.issuer
            .create("ingest", &strings(permissions), None, &admin())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn edit_replaces_grants_and_invalidates_cached_permissions() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS, EDIT_KEYS]).await;
        let both = strings(&[VIEW_KEYS, EDIT_KEYS]);
        assert!(f.permissions.has_all(issued.key.id, &both).await.unwrap());

        f.service
            .edit(
                issued.key.id,
                EditApiKeyRequest {
                    name: None,
                    permissions: Some(strings(&[VIEW_KEYS])),
                },
            )
            .await
            .unwrap();

        assert!(!f.permissions.has_all(issued.key.id, &both).await.unwrap());
        assert!(f.permissions.has_all(issued.key.id, &strings(&[VIEW_KEYS])).await.unwrap());
    }

    #[tokio::test]
    async fn edit_rename_is_visible_through_the_resolver() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;
        f.resolver.resolve(&issued.secret).await.unwrap();

        let edited = f
            .service
            .edit(
                issued.key.id,
                EditApiKeyRequest {
                    name: Some("  renamed ".to_string()),
                    permissions: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.name, "renamed");
        assert_eq!(f.resolver.resolve(&issued.secret).await.unwrap().name, "renamed");
        // grants untouched
        assert_eq!(f.store.permissions_of(issued.key.id).await.unwrap(), strings(&[VIEW_KEYS]));
    }

    #[tokio::test]
    async fn edit_unknown_key_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .edit(
                404,
                EditApiKeyRequest {
                    name: Some("x".to_string()),
                    permissions: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_with_invalid_permissions_changes_nothing() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;

        let err = f
            .service
            .edit(
                issued.key.id,
                EditApiKeyRequest {
                    name: Some("renamed".to_string()),
                    permissions: Some(strings(&[EDIT_KEYS, "BOGUS", "WORSE"])),
                },
            )
            .await
            .unwrap_err();

        match err {
            AppError::Validation { invalid, .. } => assert_eq!(invalid, strings(&["BOGUS", "WORSE"])),
            other => panic!("unexpected error: {other:?}"),
        }
        let stored = f.store.find_by_id(issued.key.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "ingest");
        assert_eq!(f.store.permissions_of(issued.key.id).await.unwrap(), strings(&[VIEW_KEYS]));
    }

    #[tokio::test]
    async fn edit_rejects_blank_name_and_empty_grant_set() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;

        for request in [
            EditApiKeyRequest {
                name: Some(" ".to_string()),
                permissions: None,
            },
            EditApiKeyRequest {
                name: None,
                permissions: Some(Vec::new()),
            },
        ] {
            let err = f.service.edit(issued.key.id, request).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
    }

    #[tokio::test]
    async fn deactivate_clears_cached_active_record() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;
        assert!(f.resolver.resolve(&issued.secret).await.unwrap().active);

        f.service.deactivate(issued.key.id).await.unwrap();

        let resolved = f.resolver.resolve(&issued.secret).await.unwrap();
        assert!(!resolved.active);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent_and_reports_missing_keys() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;

        f.service.deactivate(issued.key.id).await.unwrap();
        f.service.deactivate(issued.key.id).await.unwrap();

        let err = f.service.deactivate(404).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_invalidation_is_reported() {
        let store = Arc::new(MemoryKeyStore::new());
        let issuer = KeyIssuer::new(store.clone(), PermissionCatalog::builtin(), fast_hasher());
        let service = KeyService::new(store.clone(), Arc::new(BrokenCache), PermissionCatalog::builtin());
        let issued = issuer
            .create("k", &strings(&[VIEW_KEYS]), None, &admin())
            .await
            .unwrap();

        let err = service.deactivate(issued.key.id).await.unwrap_err();

        assert!(matches!(err, AppError::Cache(_)));
        // the store change itself went through
        assert!(!store.find_by_id(issued.key.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn list_and_get_never_expose_secret_material() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS, EDIT_KEYS]).await;

        let page = f.service.list(&ListApiKeysQuery::default()).await.unwrap();
        let single = f.service.get(issued.key.id).await.unwrap();

        let listed = serde_json::to_string(&page).unwrap();
        let fetched = serde_json::to_string(&single).unwrap();
        for json in [&listed, &fetched] {
            assert!(!json.contains(&issued.secret));
            assert!(!json.contains(&issued.key.secret_hash));
        }
        assert_eq!(page.total, 1);
        assert_eq!(single.permissions, Some(strings(&[EDIT_KEYS, VIEW_KEYS])));
    }

    #[tokio::test]
    async fn list_filters_by_name_and_active() {
        let f = fixture();
        let first = issue(&f, &[VIEW_KEYS]).await;
        f.issuer
            .create("Telemetry", &strings(&[VIEW_KEYS]), None, &admin())
            .await
            .unwrap();
        f.service.deactivate(first.key.id).await.unwrap();

        let by_name = f
            .service
            .list(&ListApiKeysQuery {
                name: Some("tele".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let inactive = f
            .service
            .list(&ListApiKeysQuery {
                active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(by_name.total, 1);
        assert_eq!(by_name.items[0].name, "Telemetry");
        assert_eq!(inactive.total, 1);
        assert_eq!(inactive.items[0].id, first.key.id);
    }

    #[tokio::test]
    async fn cached_lookup_key_is_removed_on_edit() {
        let f = fixture();
        let issued = issue(&f, &[VIEW_KEYS]).await;
        f.resolver.resolve(&issued.secret).await.unwrap();
        let lookups_before = f.store.prefix_lookups();

        f.service
            .edit(
                issued.key.id,
                EditApiKeyRequest {
                    name: Some("other".to_string()),
                    permissions: None,
                },
            )
            .await
            .unwrap();
        f.resolver.resolve(&issued.secret).await.unwrap();

        assert_eq!(f.store.prefix_lookups(), lookups_before + 1);
    }
}
