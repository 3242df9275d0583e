//! HTTP router assembly and the permission declarations for each route.

use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers,
    middleware::{
        auth::api_key_auth,
        permission::{PermissionRegistry, permission_gate},
    },
    models::permission::{CREATE_KEYS, DEACTIVATE_KEYS, EDIT_KEYS, VIEW_KEYS},
    state::AppState,
};

/// Permissions required by the routes in [`app`].
///
/// Everything under `/api/v1/keys` needs `VIEW_KEYS` unless overridden. The
/// `/me` endpoints are open to any authenticated key.
pub fn default_registry() -> PermissionRegistry {
    PermissionRegistry::new()
        .group("/api/v1/keys", &[VIEW_KEYS])
        .group("/api/v1/permissions", &[VIEW_KEYS])
        .operation(Method::POST, "/api/v1/keys", &[CREATE_KEYS])
        .operation(Method::PATCH, "/api/v1/keys/{id}", &[EDIT_KEYS])
        .operation(Method::POST, "/api/v1/keys/{id}/deactivate", &[DEACTIVATE_KEYS])
        .operation(Method::GET, "/api/v1/keys/me", &[])
        .operation(Method::POST, "/api/v1/keys/me/check", &[])
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/keys",
            post(handlers::api_keys::issue_key).get(handlers::api_keys::list_keys),
        )
        .route("/api/v1/keys/me", get(handlers::api_keys::current_key))
        .route(
            "/api/v1/keys/me/check",
            post(handlers::api_keys::check_permissions),
        )
        .route(
            "/api/v1/keys/{id}",
            get(handlers::api_keys::get_key).patch(handlers::api_keys::edit_key),
        )
        .route(
            "/api/v1/keys/{id}/deactivate",
            post(handlers::api_keys::deactivate_key),
        )
        .route(
            "/api/v1/permissions",
            get(handlers::permissions::list_permissions),
        )
        // Layers run outside-in: authentication, then the permission gate
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            permission_gate,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            api_key_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
