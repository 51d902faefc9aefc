//! Audit trail: one `tracer_updates` row per changed column.
//!
//! In trigger mode a generic plpgsql function diffs `OLD`/`NEW` and the API
//! only tags the transaction with the acting user. In application mode the
//! repository calls [`diff_rows`] and [`record_changes`] itself.

use serde_json::Value;
use sqlx::{Executor, PgConnection, PgPool};
use std::collections::BTreeSet;

use super::manager::DatabaseError;
use crate::types::ActionType;

pub const AUDIT_FUNCTION_SQL: &str = include_str!("../../sql/audit.sql");

/// Columns that change on every write and carry no audit value
const IGNORED_COLUMNS: &[&str] = &["created_at", "updated_at"];

pub fn trigger_name(table: &str) -> String {
    format!("tracer_{}_audit", table)
}

pub fn trigger_sql(table: &str) -> String {
    let name = trigger_name(table);
    format!(
        "DROP TRIGGER IF EXISTS \"{name}\" ON \"{table}\";\n\
         CREATE TRIGGER \"{name}\" AFTER INSERT OR UPDATE OR DELETE ON \"{table}\" \
         FOR EACH ROW EXECUTE FUNCTION tracer_log_changes();"
    )
}

/// Install (or replace) the trigger function and one trigger per table
pub async fn install_audit_triggers(pool: &PgPool, tables: &[&str]) -> Result<usize, DatabaseError> {
    let mut tx = pool.begin().await?;
    // Multi-statement bodies go through the simple query protocol
    (&mut *tx).execute(AUDIT_FUNCTION_SQL).await?;
    for table in tables {
        (&mut *tx).execute(trigger_sql(table).as_str()).await?;
        tracing::debug!("Installed audit trigger on {}", table);
    }
    tx.commit().await?;

    tracing::info!("Installed audit triggers on {} tables", tables.len());
    Ok(tables.len())
}

pub async fn remove_audit_triggers(pool: &PgPool, tables: &[&str]) -> Result<usize, DatabaseError> {
    let mut tx = pool.begin().await?;
    for table in tables {
        let sql = format!("DROP TRIGGER IF EXISTS \"{}\" ON \"{}\"", trigger_name(table), table);
        (&mut *tx).execute(sql.as_str()).await?;
    }
    (&mut *tx).execute("DROP FUNCTION IF EXISTS tracer_log_changes()").await?;
    tx.commit().await?;

    tracing::info!("Removed audit triggers from {} tables", tables.len());
    Ok(tables.len())
}

/// Tables that currently carry an audit trigger
pub async fn installed_triggers(pool: &PgPool) -> Result<Vec<String>, DatabaseError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT c.relname::text
        FROM pg_trigger t
        JOIN pg_class c ON c.oid = t.tgrelid
        WHERE NOT t.tgisinternal
          AND t.tgname = 'tracer_' || c.relname || '_audit'
        ORDER BY c.relname
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Tag the current transaction with the acting user for the trigger function
pub async fn set_audit_user(conn: &mut PgConnection, user: &str) -> Result<(), DatabaseError> {
    sqlx::query("SELECT set_config('app.current_user', $1, true)")
        .bind(user)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Render a JSON value the way Postgres `->>` does
pub fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Per-column differences between two row snapshots. Pass `Value::Null`
/// for the missing side of an insert or delete.
pub fn diff_rows(old: &Value, new: &Value) -> Vec<FieldChange> {
    let empty = serde_json::Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.into_iter()
        .filter(|k| !IGNORED_COLUMNS.contains(&k.as_str()))
        .filter_map(|k| {
            let before = old_map.get(k).unwrap_or(&Value::Null);
            let after = new_map.get(k).unwrap_or(&Value::Null);
            if before == after {
                return None;
            }
            Some(FieldChange {
                field_name: k.clone(),
                old_value: text_value(before),
                new_value: text_value(after),
            })
        })
        .collect()
}

/// Write tracer rows for one mutated record
pub async fn record_changes(
    conn: &mut PgConnection,
    table: &str,
    source_key: &str,
    action: ActionType,
    changes: &[FieldChange],
    changed_by: Option<&str>,
) -> Result<usize, DatabaseError> {
    for change in changes {
        sqlx::query(
            r#"
            INSERT INTO tracer_updates
                (source_table, source_key, field_name, old_value, new_value, action_type, changed_at, changed_by)
            VALUES ($1, $2, $3, $4, $5, $6, now(), $7)
            "#,
        )
        .bind(table)
        .bind(source_key)
        .bind(&change.field_name)
        .bind(&change.old_value)
        .bind(&change.new_value)
        .bind(action.as_str())
        .bind(changed_by)
        .execute(&mut *conn)
        .await?;
    }
    Ok(changes.len())
}
