//! Data models representing database entities and API payloads.

/// API key records and request/response bodies
pub mod api_key;
/// Permission catalog
pub mod permission;
/// Authenticated actors
pub mod principal;
