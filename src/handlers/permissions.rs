//! Permission catalog endpoint.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PermissionCatalogResponse {
    pub permissions: Vec<String>,
}

/// Every permission name a key may be granted, sorted.
///
/// `GET /api/v1/permissions`
pub async fn list_permissions(State(state): State<AppState>) -> Json<PermissionCatalogResponse> {
    Json(PermissionCatalogResponse {
        permissions: state.catalog.names().map(str::to_string).collect(),
    })
}
