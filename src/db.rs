//! PostgreSQL pool and schema migrations for the key store.

use std::time::Duration;

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

pub type DbPool = Pool<Postgres>;

/// How long a request waits for a pooled connection before failing with a
/// database error (surfaced to clients as a 500).
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to PostgreSQL.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the server cannot be reached or
/// rejects the credentials.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `migrations/` (embedded at compile time).
///
/// Applied versions are tracked in `_sqlx_migrations`, so startup is
/// idempotent.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
