//! Permission gate middleware.
//!
//! Required permissions are declared up front in a [`PermissionRegistry`]:
//! per operation (`"PATCH /api/v1/keys/{id}"`) and per route group
//! (`"/api/v1/keys"`), the group acting as the default for every operation
//! under it. An operation with no declaration at either level is unrestricted.
//!
//! A request is allowed when its principal holds ANY of the declared
//! permissions. This is deliberately looser than
//! [`PermissionCache::has_all`], which answers whether a key satisfies a whole
//! bundle.

use std::collections::HashMap;

use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    models::{permission::PermissionCatalog, principal::Principal},
    services::permission_cache::PermissionCache,
    state::AppState,
    store::RoleResolver,
};

/// `"<METHOD> <route template>"`, e.g. `"GET /api/v1/keys/{id}"`.
pub fn operation_id(method: &Method, route: &str) -> String {
    format!("{method} {route}")
}

/// Static mapping from operations and route groups to required permissions.
#[derive(Debug, Default, Clone)]
pub struct PermissionRegistry {
    operations: HashMap<String, Vec<String>>,
    groups: Vec<(String, Vec<String>)>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default requirement for every route under `prefix`.
    pub fn group(mut self, prefix: &str, permissions: &[&str]) -> Self {
        self.groups
            .push((prefix.to_string(), to_strings(permissions)));
        // Longest prefix first so the most specific group wins
        self.groups.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Requirement for one operation; overrides any group default.
    pub fn operation(mut self, method: Method, route: &str, permissions: &[&str]) -> Self {
        self.operations
            .insert(operation_id(&method, route), to_strings(permissions));
        self
    }

    /// Declared permissions for an operation, or `None` if it is unrestricted.
    pub fn required(&self, method: &Method, route: &str) -> Option<&[String]> {
        if let Some(permissions) = self.operations.get(&operation_id(method, route)) {
            return Some(permissions);
        }

        self.groups
            .iter()
            .find(|(prefix, _)| route_in_group(route, prefix))
            .map(|(_, permissions)| permissions.as_slice())
    }

    /// Declared names missing from `catalog`, sorted and deduplicated.
    pub fn undeclared(&self, catalog: &PermissionCatalog) -> Vec<String> {
        let mut missing: Vec<String> = self
            .operations
            .values()
            .chain(self.groups.iter().map(|(_, permissions)| permissions))
            .flatten()
            .filter(|permission| !catalog.contains(permission))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// `/api/v1/keys` contains `/api/v1/keys` and `/api/v1/keys/{id}` but not `/api/v1/keysets`.
fn route_in_group(route: &str, prefix: &str) -> bool {
    match route.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Decide whether `principal` may invoke an operation declaring `declared`.
///
/// # Errors
///
/// - `Unauthorized`: restricted operation with no principal, or none of the declared permissions held
/// - store errors while resolving the principal's permissions
pub async fn authorize_permission(
    principal: Option<&Principal>,
    declared: Option<&[String]>,
    permissions: &PermissionCache,
    roles: &dyn RoleResolver,
) -> Result<(), AppError> {
    let declared = match declared {
        Some(declared) if !declared.is_empty() => declared,
        _ => return Ok(()),
    };

    let principal = principal.ok_or(AppError::Unauthorized("Authentication required"))?;

    let held = match principal {
        Principal::User { id } => roles.permissions_for_user(*id).await?,
        Principal::ApiKey(key) => permissions.permissions_of(key.id).await?,
    };

    if declared.iter().any(|permission| held.contains(permission)) {
        Ok(())
    } else {
        tracing::debug!(%principal, required = ?declared, "permission denied");
        Err(AppError::Unauthorized("Insufficient permissions"))
    }
}

/// Permission gate middleware function.
///
/// Must run after an authentication layer has inserted the [`Principal`].
/// Routes are identified by their matched template, so
/// `/api/v1/keys/42` is looked up as `/api/v1/keys/{id}`.
pub async fn permission_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let principal = request.extensions().get::<Principal>().cloned();
    let declared = state
        .registry
        .required(request.method(), &route)
        .map(<[String]>::to_vec);

    authorize_permission(
        principal.as_ref(),
        declared.as_deref(),
        &state.permissions,
        state.roles.as_ref(),
    )
    .await?;

    Ok(next.run(request).await)
}
