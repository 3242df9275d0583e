//! API key model and request/response types.
//!
//! Only a salted Argon2id hash of each secret is stored. The first 8 hex
//! characters of the secret are kept in `secret_prefix` purely as a lookup
//! index; they are never enough to authenticate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the hex-encoded plaintext secret.
pub const SECRET_LEN: usize = 64;

/// Number of leading secret characters stored as the lookup index.
pub const SECRET_PREFIX_LEN: usize = 8;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. Grants live in `api_key_permissions`.
///
/// The whole record (hash included) is what gets cached under `apiKey-<secret>`,
/// so it is (de)serializable. It is never returned to clients directly; use
/// [`ApiKeyResponse`].
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,

    /// Human-readable label
    pub name: String,

    /// First 8 hex characters of the plaintext secret (non-unique)
    pub secret_prefix: String,

    /// Argon2id PHC string of the full secret
    pub secret_hash: String,

    /// Deactivation flips this to false; it is never flipped back
    pub active: bool,

    pub expires_at: Option<DateTime<Utc>>,

    /// Usage counter, incremented once per authenticated request
    pub calls: i64,

    /// Principal reference of the issuer, e.g. `user:12` or `api-key:3`
    pub created_by: String,

    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether `expires_at` lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// Fields needed to insert a new key. Built by the issuer, never by clients.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub secret_prefix: String,
    pub secret_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

/// Request body for issuing a key.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "fleet telemetry ingest",
///   "permissions": ["VIEW_ENGINES", "VIEW_REPAIRS"],
///   "expires_at": "2026-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body for editing a key. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct EditApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Filter and page parameters for listing keys.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListApiKeysQuery {
    /// Case-insensitive substring match on the name
    pub name: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListApiKeysQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// One page of keys plus the total matching the filter.
#[derive(Debug, Serialize)]
pub struct ApiKeyPage {
    pub items: Vec<ApiKeyResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Client-facing view of a key. Carries neither the secret nor its hash.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub name: String,
    pub secret_prefix: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub calls: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl ApiKeyResponse {
    pub fn with_permissions(mut self, mut permissions: Vec<String>) -> Self {
        permissions.sort();
        self.permissions = Some(permissions);
        self
    }
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            secret_prefix: key.secret_prefix,
            active: key.active,
            expires_at: key.expires_at,
            calls: key.calls,
            created_by: key.created_by,
            created_at: key.created_at,
            permissions: None,
        }
    }
}

/// Response to a successful issue. `secret` is shown here and nowhere else.
#[derive(Debug, Serialize)]
pub struct IssuedApiKeyResponse {
    pub key: ApiKeyResponse,
    pub secret: String,
}

/// Body of an explicit bundle check against the calling key.
#[derive(Debug, Deserialize)]
pub struct PermissionCheckRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PermissionCheckResponse {
    pub granted: bool,
}
