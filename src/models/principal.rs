//! The actor a request is authorized as.

use std::fmt;

use super::api_key::ApiKey;

/// Inserted into request extensions by an authentication layer.
///
/// `ApiKey` comes from the key gate in this service; `User` is attached by the
/// session layer that fronts user traffic.
#[derive(Debug, Clone)]
pub enum Principal {
    User { id: i64 },
    ApiKey(ApiKey),
}

/// Renders the reference stored in `api_keys.created_by`.
impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User { id } => write!(f, "user:{id}"),
            Principal::ApiKey(key) => write!(f, "api-key:{}", key.id),
        }
    }
}
