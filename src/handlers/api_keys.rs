//! API key management HTTP handlers.
//!
//! This module implements the key-related API endpoints:
//! - POST /api/v1/keys - Issue a new key
//! - GET /api/v1/keys - List keys (filtered, paged)
//! - GET /api/v1/keys/{id} - Get one key with its permissions
//! - PATCH /api/v1/keys/{id} - Rename a key and/or replace its permissions
//! - POST /api/v1/keys/{id}/deactivate - Deactivate a key
//! - GET /api/v1/keys/me - The calling key
//! - POST /api/v1/keys/me/check - Whether the calling key holds a whole permission bundle
//!
//! Which permission each endpoint requires is declared in [`crate::routes`].

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    models::{
        api_key::{
            ApiKeyPage, ApiKeyResponse, CreateApiKeyRequest, EditApiKeyRequest,
            IssuedApiKeyResponse, ListApiKeysQuery, PermissionCheckRequest,
            PermissionCheckResponse,
        },
        principal::Principal,
    },
    state::AppState,
};

/// Issue a new key.
///
/// # Endpoint
///
/// `POST /api/v1/keys`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "fleet telemetry ingest",
///   "permissions": ["VIEW_ENGINES", "VIEW_REPAIRS"],
///   "expires_at": "2026-01-01T00:00:00Z"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the key and its plaintext `secret`. The secret
///   is not stored and cannot be retrieved again.
/// - **Error (400)**: empty name, empty permission list, or unknown permissions
///   (`details` lists every unknown name)
pub async fn issue_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<IssuedApiKeyResponse>), AppError> {
    let issued = state
        .issuer
        .create(
            &request.name,
            &request.permissions,
            request.expires_at,
            &principal.to_string(),
        )
        .await?;

    let permissions = state.store.permissions_of(issued.key.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedApiKeyResponse {
            key: ApiKeyResponse::from(issued.key).with_permissions(permissions),
            secret: issued.secret,
        }),
    ))
}

/// List keys.
///
/// # Endpoint
///
/// `GET /api/v1/keys?name=ingest&active=true&limit=50&offset=0`
///
/// All parameters are optional. `limit` defaults to 50 and is capped at 200.
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListApiKeysQuery>,
) -> Result<Json<ApiKeyPage>, AppError> {
    Ok(Json(state.keys.list(&query).await?))
}

/// Get one key with its permissions.
///
/// # Endpoint
///
/// `GET /api/v1/keys/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: the key, without secret or hash
/// - **Error (404)**: no such key
pub async fn get_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    Ok(Json(state.keys.get(id).await?))
}

/// Edit a key.
///
/// # Endpoint
///
/// `PATCH /api/v1/keys/{id}`
///
/// # Request Body
///
/// ```json
/// { "name": "renamed", "permissions": ["VIEW_ENGINES"] }
/// ```
///
/// Absent fields are left untouched. A present `permissions` list replaces the
/// whole grant set. Cached entries for the key are evicted before responding.
pub async fn edit_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<EditApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key = state.keys.edit(id, request).await?;
    let permissions = state.store.permissions_of(key.id).await?;

    Ok(Json(ApiKeyResponse::from(key).with_permissions(permissions)))
}

/// Deactivate a key.
///
/// # Endpoint
///
/// `POST /api/v1/keys/{id}/deactivate`
///
/// # Response
///
/// - **Success (204 No Content)**: the key is rejected from the next request on
/// - **Error (404)**: no such key
pub async fn deactivate_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.keys.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The key making this request.
///
/// # Endpoint
///
/// `GET /api/v1/keys/me`
pub async fn current_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let Principal::ApiKey(key) = principal else {
        return Err(AppError::Unauthorized("API key required"));
    };

    Ok(Json(state.keys.get(key.id).await?))
}

/// Whether the calling key holds every permission in the body.
///
/// # Endpoint
///
/// `POST /api/v1/keys/me/check`
///
/// ```json
/// { "permissions": ["VIEW_ENGINES", "EDIT_ENGINES"] }
/// ```
///
/// Responds `{"granted": true}` only if all are held. An empty list is granted.
pub async fn check_permissions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<PermissionCheckRequest>,
) -> Result<Json<PermissionCheckResponse>, AppError> {
    let Principal::ApiKey(key) = principal else {
        return Err(AppError::Unauthorized("API key required"));
    };

    let granted = state.permissions.has_all(key.id, &request.permissions).await?;

    Ok(Json(PermissionCheckResponse { granted }))
}
