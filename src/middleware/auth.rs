//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the secret from the `x-api-key` header
//! 2. Resolve it to a stored key (cache first, then prefix scan + hash check)
//! 3. Reject deactivated and expired keys
//! 4. Count the call and inject the key as the request's [`Principal`]
//!
//! Any rejection short-circuits with HTTP 401 (or 404 when no key matches).

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        api_key::{ApiKey, SECRET_LEN},
        principal::Principal,
    },
    state::AppState,
};

/// Header carrying the plaintext secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Pull the secret out of the request headers.
///
/// A header that is not UTF-8, not 64 characters, or not hex is treated the
/// same as a missing one.
pub fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();

    let well_formed = value.len() == SECRET_LEN && value.chars().all(|c| c.is_ascii_hexdigit());
    well_formed.then_some(value)
}

/// Decide whether a presented secret may make a request.
///
/// # Flow
///
/// 1. No credential → `Unauthorized`
/// 2. Resolve; resolver errors (`NotFound`, store failures) pass through
/// 3. `active = false` → `Unauthorized`
/// 4. `expires_at` in the past → `Unauthorized`
/// 5. Increment the usage counter and return the key
///
/// The counter update is best-effort: it is awaited, but a failure is logged
/// and does not reject an otherwise valid request.
pub async fn authorize(state: &AppState, presented: Option<&str>) -> Result<ApiKey, AppError> {
    let presented = presented.ok_or(AppError::Unauthorized("Missing API key"))?;

    let key = state.resolver.resolve(presented).await?;

    if !key.active {
        tracing::debug!(key_id = key.id, "rejected deactivated API key");
        return Err(AppError::Unauthorized("API key has been deactivated"));
    }

    if key.is_expired_at(Utc::now()) {
        tracing::debug!(key_id = key.id, "rejected expired API key");
        return Err(AppError::Unauthorized("API key has expired"));
    }

    if let Err(e) = state.store.increment_calls(key.id).await {
        tracing::warn!(key_id = key.id, error = %e, "failed to record API key usage");
    }

    Ok(key)
}

/// API key authentication middleware function.
///
/// # Headers
///
/// ```text
/// x-api-key: 3f9a0c1e...  (64 hex characters)
/// ```
///
/// # Returns
///
/// - `Ok(Response)` from the next handler, with `Principal::ApiKey` in the request extensions
/// - `Err(AppError)` if the key is missing, unknown, deactivated or expired
pub async fn api_key_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = presented_secret(request.headers()).map(str::to_owned);
    let key = authorize(&state, presented.as_deref()).await?;

    // Handlers extract this with Extension<Principal>
    request.extensions_mut().insert(Principal::ApiKey(key));

    Ok(next.run(request).await)
}
