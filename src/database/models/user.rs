use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::types::Role;

/// Dashboard account. The id is shared with the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: role.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "role".to_string(),
                source: e.into(),
            })?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const COLUMNS: &str = "id, email, name, role, created_at, updated_at";

impl User {
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE lower(email) = lower($1)"))
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// One page of users, newest first, with the total match count
    pub async fn list(
        pool: &PgPool,
        search: Option<&str>,
        role: Option<Role>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), sqlx::Error> {
        let pattern = search.map(|s| format!("%{}%", crate::filter::filter_where::escape_like(s.trim())));
        let role = role.map(|r| r.as_str());
        let predicate = "($1::text IS NULL OR email ILIKE $1 OR name ILIKE $1) AND ($2::text IS NULL OR role = $2)";

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE {predicate} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(&pattern)
        .bind(role)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {predicate}"))
            .bind(&pattern)
            .bind(role)
            .fetch_one(pool)
            .await?;

        Ok((users, total))
    }

    pub async fn insert(
        conn: &mut PgConnection,
        id: Uuid,
        email: &str,
        name: &str,
        role: Role,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, name, role) VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(role.as_str())
        .fetch_one(conn)
        .await
    }

    /// Partial update; `None` keeps the stored value
    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        name: Option<&str>,
        role: Option<Role>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = COALESCE($2, name), role = COALESCE($3, role), updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(role.map(|r| r.as_str()))
        .fetch_optional(conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("DELETE FROM users WHERE id = $1 RETURNING {COLUMNS}"))
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn count_with_role(conn: &mut PgConnection, role: Role) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(conn)
            .await
    }
}
