use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Row in the registry `tenants` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub database: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, name, database, is_active, created_at, updated_at, deleted_at";

impl Tenant {
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    /// Active, non-deleted tenant owning `database`
    pub async fn find_active_by_database(pool: &PgPool, database: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE database = $1 AND is_active AND deleted_at IS NULL"
        ))
        .bind(database)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE deleted_at IS NULL ORDER BY name"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn insert(pool: &PgPool, name: &str, database: &str) -> Result<Tenant, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "INSERT INTO tenants (name, database) VALUES ($1, $2) RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(database)
        .fetch_one(pool)
        .await
    }

    /// Returns false when no live tenant has that name
    pub async fn set_active(pool: &PgPool, name: &str, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tenants SET is_active = $2, updated_at = now() WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
