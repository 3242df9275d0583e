//! HTTP middleware components.
//!
//! Middleware run before route handlers and short-circuit requests that
//! fail authentication or authorization.

/// API key authentication middleware
pub mod auth;
/// Declared-permission gate
pub mod permission;
