//! Key issuing: secret generation, hashing, and persistence of new keys.
//!
//! # Secret Format
//!
//! 32 random bytes hex-encoded (64 characters). The first 8 characters are
//! stored in clear as a lookup prefix; the full secret is stored only as an
//! Argon2id PHC string with a random 16-byte salt.
//!
//! Hashing is deliberately slow (tens of milliseconds with default
//! parameters), so it always runs on tokio's blocking pool.

use std::{fmt, sync::Arc};

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        api_key::{ApiKey, NewApiKey, SECRET_PREFIX_LEN},
        permission::PermissionCatalog,
    },
    store::KeyStore,
};

/// Generate a 256-bit secret as 64 hex characters.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Argon2id hashing with fixed cost parameters.
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
}

impl SecretHasher {
    /// # Errors
    ///
    /// `AppError::Internal` if the parameters are outside Argon2's accepted ranges
    /// (e.g. memory below 8 KiB per lane).
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret into a PHC string (`$argon2id$v=19$m=...`).
    pub fn hash(&self, secret: &str) -> Result<String, AppError> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;

        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("hashing failed: {e}")))?;

        Ok(hash.to_string())
    }

    /// Check a presented secret against a stored PHC string.
    ///
    /// The cost parameters are read from the PHC string, so hashes written under
    /// older settings keep verifying.
    pub fn verify(secret: &str, phc: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(phc)
            .map_err(|e| AppError::Internal(format!("stored hash is malformed: {e}")))?;

        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!("verification failed: {e}"))),
        }
    }

    pub async fn hash_blocking(&self, secret: String) -> Result<String, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
    }

    pub async fn verify_blocking(secret: String, phc: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || Self::verify(&secret, &phc))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?
    }
}

/// A freshly generated secret and its stored forms.
pub struct GeneratedSecret {
    pub plaintext: String,
    pub prefix: String,
    pub hash: String,
}

/// A key that was just issued. `secret` exists nowhere else after this is dropped.
pub struct IssuedKey {
    pub key: ApiKey,
    pub secret: String,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Creates keys.
#[derive(Clone)]
pub struct KeyIssuer {
    store: Arc<dyn KeyStore>,
    catalog: PermissionCatalog,
    hasher: SecretHasher,
}

impl KeyIssuer {
    pub fn new(store: Arc<dyn KeyStore>, catalog: PermissionCatalog, hasher: SecretHasher) -> Self {
        Self {
            store,
            catalog,
            hasher,
        }
    }

    pub async fn generate(&self) -> Result<GeneratedSecret, AppError> {
        let plaintext = generate_secret();
        let prefix = plaintext[..SECRET_PREFIX_LEN].to_string();
        let hash = self.hasher.hash_blocking(plaintext.clone()).await?;

        Ok(GeneratedSecret {
            plaintext,
            prefix,
            hash,
        })
    }

    /// Issue a new active key on behalf of `created_by` (a principal reference).
    ///
    /// # Process
    ///
    /// 1. Validate name and permission set (nothing is written on failure)
    /// 2. Generate and hash a secret
    /// 3. Persist the key and its grants in one transaction
    /// 4. Hand back the plaintext, the only time it leaves this service
    ///
    /// # Errors
    ///
    /// - `Validation`: empty name, empty permission list, or unknown permissions (all listed)
    /// - `Database` / `Internal`: store or hashing failure
    pub async fn create(
        &self,
        name: &str,
        permissions: &[String],
        expires_at: Option<DateTime<Utc>>,
        created_by: &str,
    ) -> Result<IssuedKey, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Name must not be empty"));
        }
        self.catalog.validate(permissions)?;
        let permissions = dedup(permissions);

        let secret = self.generate().await?;

        let key = self
            .store
            .insert_key(
                NewApiKey {
                    name: name.to_string(),
                    secret_prefix: secret.prefix,
                    secret_hash: secret.hash,
                    expires_at,
                    created_by: created_by.to_string(),
                },
                &permissions,
            )
            .await?;

        tracing::info!(
            key_id = key.id,
            prefix = %key.secret_prefix,
            created_by = %key.created_by,
            permissions = permissions.len(),
            "API key issued"
        );

        Ok(IssuedKey {
            key,
            secret: secret.plaintext,
        })
    }
}

/// Drop repeated names, keeping first occurrences in order.
pub(crate) fn dedup(permissions: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(permissions.len());
    for permission in permissions {
        if !unique.contains(permission) {
            unique.push(permission.clone());
        }
    }
    unique
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        models::{api_key::SECRET_LEN, permission::VIEW_KEYS},
        store::{KeyStore, memory::MemoryKeyStore},
    };

    /// Minimum-cost parameters so tests stay fast.
    pub(crate) fn fast_hasher() -> SecretHasher {
        SecretHasher::new(8, 1, 1).unwrap()
    }

    pub(crate) fn admin() -> &'static str {
        "user:1"
    }

    fn issuer(store: Arc<MemoryKeyStore>) -> KeyIssuer {
        KeyIssuer::new(store, PermissionCatalog::builtin(), fast_hasher())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn secrets_are_64_hex_chars_and_distinct() {
        let a = generate_secret();
        let b = generate_secret();

        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_salted_and_verifies() {
        let hasher = fast_hasher();
        let secret = generate_secret();

        let first = hasher.hash(&secret).unwrap();
        let second = hasher.hash(&secret).unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains(&secret));
        assert!(SecretHasher::verify(&secret, &first).unwrap());
        assert!(!SecretHasher::verify(&generate_secret(), &first).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_internal_error() {
        let err = SecretHasher::verify("abc", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn rejects_out_of_range_params() {
        assert!(SecretHasher::new(0, 1, 1).is_err());
    }

    #[tokio::test]
    async fn create_persists_prefix_hash_and_grants() {
        let store = Arc::new(MemoryKeyStore::new());
        let issued = issuer(store.clone())
            .create("ingest", &strings(&[VIEW_KEYS, VIEW_KEYS, "VIEW_ENGINES"]), None, &admin())
            .await
            .unwrap();

        assert_eq!(issued.secret.len(), SECRET_LEN);
        assert_eq!(issued.key.secret_prefix, &issued.secret[..SECRET_PREFIX_LEN]);
        assert!(issued.key.active);
        assert_eq!(issued.key.calls, 0);
        assert_eq!(issued.key.created_by, "user:1");
        assert!(SecretHasher::verify(&issued.secret, &issued.key.secret_hash).unwrap());

        let grants = store.permissions_of(issued.key.id).await.unwrap();
        assert_eq!(grants, strings(&["VIEW_ENGINES", VIEW_KEYS]));
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let store = Arc::new(MemoryKeyStore::new());
        let err = issuer(store.clone())
            .create("   ", &strings(&[VIEW_KEYS]), None, &admin())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_rejects_empty_and_unknown_permissions_without_persisting() {
        let store = Arc::new(MemoryKeyStore::new());
        let issuer = issuer(store.clone());

        let err = issuer.create("k", &[], None, &admin()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = issuer
            .create("k", &strings(&[VIEW_KEYS, "NOT_A_REAL_PERMISSION"]), None, &admin())
            .await
            .unwrap_err();
        match err {
            AppError::Validation { invalid, .. } => {
                assert_eq!(invalid, strings(&["NOT_A_REAL_PERMISSION"]))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn plaintext_is_not_stored_anywhere() {
        let store = Arc::new(MemoryKeyStore::new());
        let issued = issuer(store.clone())
            .create("k", &strings(&[VIEW_KEYS]), None, &admin())
            .await
            .unwrap();

        let stored = store.find_by_id(issued.key.id).await.unwrap().unwrap();
        let serialized = serde_json::to_string(&stored).unwrap();
        assert!(!serialized.contains(&issued.secret));
    }

    #[tokio::test]
    async fn debug_output_redacts_the_secret() {
        let store = Arc::new(MemoryKeyStore::new());
        let issued = issuer(store)
            .create("k", &strings(&[VIEW_KEYS]), None, admin())
            .await
            .unwrap();

        let rendered = format!("{issued:?}");

        assert!(!rendered.contains(&issued.secret));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains(&issued.key.secret_prefix));
    }
}
