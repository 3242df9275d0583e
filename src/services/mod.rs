//! Business logic services.
//!
//! Services hold the key lifecycle and lookup logic, separated from HTTP
//! handlers and middleware. Each is built once at startup around shared
//! store and cache handles.

pub mod key_issuer;
pub mod key_resolver;
pub mod key_service;
pub mod permission_cache;
