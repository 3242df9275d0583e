//! PostgreSQL-backed stores.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{KeyStore, RoleResolver};
use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKey, ListApiKeysQuery, NewApiKey},
};

const KEY_COLUMNS: &str =
    "id, name, secret_prefix, secret_hash, active, expires_at, calls, created_by, created_at";

/// [`KeyStore`] over the `api_keys` and `api_key_permissions` tables.
#[derive(Clone)]
pub struct PgKeyStore {
    pool: DbPool,
}

impl PgKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn insert_key(&self, key: NewApiKey, permissions: &[String]) -> Result<ApiKey, AppError> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            INSERT INTO api_keys (name, secret_prefix, secret_hash, expires_at, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {KEY_COLUMNS}
            "#
        ))
        .bind(&key.name)
        .bind(&key.secret_prefix)
        .bind(&key.secret_hash)
        .bind(key.expires_at)
        .bind(&key.created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO api_key_permissions (api_key_id, permission)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(permissions)
        .execute(&mut *tx)
        .await?;

        // Key and grants become visible together
        tx.commit().await?;

        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        let record = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, AppError> {
        let records = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE secret_prefix = $1"
        ))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list(&self, query: &ListApiKeysQuery) -> Result<(Vec<ApiKey>, i64), AppError> {
        // NULL parameters disable their filter
        const FILTER: &str = "($1::text IS NULL OR name ILIKE $1 ESCAPE '\\') \
                              AND ($2::bool IS NULL OR active = $2)";

        let name = query.name.as_deref().map(contains_pattern);

        let records = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            SELECT {KEY_COLUMNS} FROM api_keys
            WHERE {FILTER}
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(name.as_deref())
        .bind(query.active)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM api_keys WHERE {FILTER}"))
                .bind(name.as_deref())
                .bind(query.active)
                .fetch_one(&self.pool)
                .await?;

        Ok((records, total))
    }

    async fn count(&self) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn update_key(
        &self,
        id: i64,
        name: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<Option<ApiKey>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock the key row so concurrent edits apply one after the other
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM api_keys WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        if let Some(name) = name {
            sqlx::query("UPDATE api_keys SET name = $1 WHERE id = $2")
                .bind(name)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(permissions) = permissions {
            sqlx::query("DELETE FROM api_key_permissions WHERE api_key_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO api_key_permissions (api_key_id, permission)
                SELECT $1, UNNEST($2::text[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(permissions)
            .execute(&mut *tx)
            .await?;
        }

        let record = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(record))
    }

    async fn deactivate(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        let record = sqlx::query_as::<_, ApiKey>(&format!(
            "UPDATE api_keys SET active = false WHERE id = $1 RETURNING {KEY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn increment_calls(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET calls = calls + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn permissions_of(&self, id: i64) -> Result<Vec<String>, AppError> {
        let permissions = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM api_key_permissions WHERE api_key_id = $1 ORDER BY permission",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// `ILIKE` pattern matching `needle` as a literal substring.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// [`RoleResolver`] reading `users.role_id` → `role_permissions`.
#[derive(Clone)]
pub struct PgRoleResolver {
    pool: DbPool,
}

impl PgRoleResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleResolver for PgRoleResolver {
    async fn permissions_for_user(&self, user_id: i64) -> Result<HashSet<String>, AppError> {
        let permissions = sqlx::query_scalar::<_, String>(
            r#"
            SELECT rp.permission
            FROM users u
            JOIN role_permissions rp ON rp.role_id = u.role_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions.into_iter().collect())
    }
}
