//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `CACHE_TTL_SECS` (optional): lifetime of cached keys and permission sets, defaults to 24 hours
/// - `CACHE_MAX_ENTRIES` (optional): upper bound on cached entries, defaults to 100000
/// - `HASH_MEMORY_KIB`, `HASH_ITERATIONS`, `HASH_PARALLELISM` (optional): Argon2id cost parameters
/// - `PERMISSION_CATALOG` (optional): comma-separated list replacing the built-in permission catalog
/// - `BOOTSTRAP_ADMIN_KEY` (optional): issue a full-catalog key on first start, defaults to false
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    #[serde(default = "default_hash_memory_kib")]
    pub hash_memory_kib: u32,

    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,

    #[serde(default = "default_hash_parallelism")]
    pub hash_parallelism: u32,

    /// Parsed by envy from a comma-separated value.
    #[serde(default)]
    pub permission_catalog: Option<Vec<String>>,

    #[serde(default)]
    pub bootstrap_admin_key: bool,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

/// Keys and permission sets stay cached for a day unless invalidated.
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_max_entries() -> u64 {
    100_000
}

/// OWASP-recommended Argon2id baseline (19 MiB, 2 passes, 1 lane).
fn default_hash_memory_kib() -> u32 {
    19_456
}

fn default_hash_iterations() -> u32 {
    2
}

fn default_hash_parallelism() -> u32 {
    1
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
