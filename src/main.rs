//! Asset Key Server - Main Application Entry Point
//!
//! REST API that issues API keys for machine clients, authenticates requests
//! carrying them, and gates every operation on the permissions the key holds.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Cache**: in-process moka cache behind the [`cache::Cache`] trait
//! - **Authentication**: `x-api-key` header, prefix lookup + Argon2id verification
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Check every declared route permission against the catalog
//! 5. Optionally issue a bootstrap admin key
//! 6. Build HTTP router with routes and middleware
//! 7. Start server on configured port

mod cache;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use anyhow::bail;
use tracing_subscriber::EnvFilter;

use crate::{
    cache::MemoryCache,
    models::permission::PermissionCatalog,
    services::key_issuer::SecretHasher,
    state::AppState,
    store::postgres::{PgKeyStore, PgRoleResolver},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let catalog = match &config.permission_catalog {
        Some(names) => PermissionCatalog::from_names(names),
        None => PermissionCatalog::builtin(),
    };

    let registry = routes::default_registry();
    let undeclared = registry.undeclared(&catalog);
    if !undeclared.is_empty() {
        bail!(
            "routes require permissions missing from the catalog: {}",
            undeclared.join(", ")
        );
    }

    let hasher = SecretHasher::new(
        config.hash_memory_kib,
        config.hash_iterations,
        config.hash_parallelism,
    )?;

    let state = AppState::new(
        Arc::new(PgKeyStore::new(pool.clone())),
        Arc::new(MemoryCache::new(config.cache_max_entries)),
        Arc::new(PgRoleResolver::new(pool)),
        catalog,
        registry,
        hasher,
        config.cache_ttl(),
    );
    tracing::info!(
        permissions = state.catalog.names().count(),
        cache_ttl_secs = config.cache_ttl_secs,
        "Key services ready"
    );

    if config.bootstrap_admin_key {
        bootstrap_admin_key(&state).await?;
    }

    let app = routes::app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Issue a key holding the whole catalog if no key exists yet.
///
/// The plaintext goes to stdout once and never into the log.
async fn bootstrap_admin_key(state: &AppState) -> anyhow::Result<()> {
    if state.store.count().await? > 0 {
        tracing::info!("Keys already exist, skipping bootstrap key");
        return Ok(());
    }

    let permissions: Vec<String> = state.catalog.names().map(str::to_string).collect();
    let issued = state
        .issuer
        .create("bootstrap admin", &permissions, None, "bootstrap")
        .await?;

    println!("Bootstrap API key (shown once): {}", issued.secret);
    tracing::warn!(key_id = issued.key.id, "Bootstrap admin key issued");

    Ok(())
}
