//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, the caller's [`Principal`](crate::models::principal::Principal))
//! 2. Delegates to a service on [`AppState`](crate::state::AppState)
//! 3. Returns HTTP response (JSON, status code)

/// API key management endpoints
pub mod api_keys;
/// Service health
pub mod health;
/// Permission catalog
pub mod permissions;
