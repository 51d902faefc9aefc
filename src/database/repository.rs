use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::config::{self, AuditMode};
use crate::database::audit;
use crate::database::manager::DatabaseError;
use crate::database::record::Record;
use crate::database::retry::with_retry;
use crate::filter::filter_where::escape_like;
use crate::filter::{Filter, FilterError, SqlResult};
use crate::resources::ResourceDef;
use crate::types::ActionType;

/// Who is performing a write, for audit tagging and author columns
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
}

impl Actor {
    /// Non-user writer such as the CLI; carries the nil id
    pub fn system(label: &str) -> Self {
        Self {
            id: Uuid::nil(),
            email: label.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.id.is_nil()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Case-insensitive match against the resource's search columns
    pub search: Option<String>,
    /// Equality filters keyed by column
    pub filters: Map<String, Value>,
    /// `"name asc, created_at desc"`; the resource default when absent
    pub order: Option<String>,
    /// 1-based
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self { page, limit, total, total_pages }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Value>,
    pub pagination: Pagination,
}

/// CRUD over one registered resource table. Rows travel as JSON objects
/// produced by `to_jsonb`, so one implementation serves every table.
pub struct ResourceRepository {
    def: &'static ResourceDef,
    pool: PgPool,
    audit_mode: AuditMode,
}

impl ResourceRepository {
    pub fn new(def: &'static ResourceDef, pool: PgPool) -> Self {
        Self {
            def,
            pool,
            audit_mode: config::config().audit.mode,
        }
    }

    pub fn with_audit_mode(mut self, mode: AuditMode) -> Self {
        self.audit_mode = mode;
        self
    }

    /// Build the list filter without touching the database
    pub fn list_filter(&self, params: &ListParams) -> Result<Filter, DatabaseError> {
        let def = self.def;
        let mut filter = Filter::new(def.table)?;
        for (column, pg_type) in def.filterable() {
            filter.cast(column, pg_type);
        }

        let mut conditions = Vec::new();
        for (column, value) in &params.filters {
            if !def.is_filterable(column) {
                return Err(FilterError::InvalidColumn(column.clone()).into());
            }
            conditions.push(json!({ column.as_str(): value }));
        }

        if let Some(term) = params.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !def.search.is_empty() {
                let pattern = format!("%{}%", escape_like(term));
                let any: Vec<Value> = def
                    .search
                    .iter()
                    .map(|col| json!({ *col: { "$ilike": pattern } }))
                    .collect();
                conditions.push(json!({ "$or": any }));
            }
        }

        if !conditions.is_empty() {
            filter.where_clause(json!({ "$and": conditions }))?;
        }

        let order = params.order.as_deref().unwrap_or(def.order);
        filter.order(Value::String(order.to_string()))?;
        if let Some(bad) = filter.order_columns().find(|c| !def.is_filterable(c)) {
            return Err(FilterError::InvalidColumn(bad.to_string()).into());
        }

        let offset = page_offset(params.page, params.limit)
            .ok_or_else(|| FilterError::InvalidOffset(format!("page {} is out of range", params.page)))?;
        filter.limit(params.limit, Some(offset))?;
        Ok(filter)
    }

    pub async fn list(&self, params: &ListParams) -> Result<Page, DatabaseError> {
        let filter = self.list_filter(params)?;
        let select = filter.to_sql()?;
        let count = filter.to_count_sql()?;
        let (pool, select, count) = (&self.pool, &select, &count);
        let label = self.def.name;

        let (items, total) = futures::try_join!(
            with_retry(label, move || fetch_rows(pool, select)),
            with_retry(label, move || fetch_count(pool, count)),
        )?;

        let limit = filter.applied_limit().unwrap_or(params.limit);
        Ok(Page {
            items,
            pagination: Pagination::new(params.page.max(1), limit, total),
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Value, DatabaseError> {
        let sql = format!(
            "SELECT to_jsonb(t) AS data FROM \"{}\" t WHERE t.\"id\" = $1",
            self.def.table
        );
        let pool = &self.pool;
        let sql = sql.as_str();
        let row = with_retry(self.def.name, move || async move {
            sqlx::query(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(DatabaseError::classify)
        })
        .await?;

        match row {
            Some(row) => Ok(row.try_get::<Value, _>("data")?),
            None => Err(self.not_found(id)),
        }
    }

    /// Direct children grouped by child resource name
    pub async fn children(&self, id: Uuid) -> Result<Map<String, Value>, DatabaseError> {
        let mut grouped = Map::new();
        for child in self.def.children() {
            let parent = match child.parent {
                Some(p) => p,
                None => continue,
            };
            let mut filter = Filter::new(child.table)?;
            filter
                .cast(parent.column, "uuid")
                .where_clause(json!({ parent.column: id.to_string() }))?
                .order(Value::String(child.order.to_string()))?;
            let select = filter.to_sql()?;
            let pool = &self.pool;
            let select = &select;
            let rows = with_retry(child.name, move || fetch_rows(pool, select)).await?;
            grouped.insert(child.name.to_string(), Value::Array(rows));
        }
        Ok(grouped)
    }

    pub async fn get_with_children(&self, id: Uuid) -> Result<Value, DatabaseError> {
        let mut row = self.get(id).await?;
        let children = self.children(id).await?;
        if let Value::Object(obj) = &mut row {
            obj.insert("children".to_string(), Value::Object(children));
        }
        Ok(row)
    }

    /// Stamp the author column with the acting user. System writers leave it unset.
    pub fn with_author(&self, mut record: Record, actor: &Actor) -> Record {
        if let Some(column) = self.def.author_column.filter(|_| !actor.is_system()) {
            record.set_default(column, json!(actor.id));
        }
        record
    }

    pub fn insert_sql(&self, record: &Record) -> String {
        format!(
            r#"WITH written AS (
                INSERT INTO "{table}" ({cols})
                SELECT {cols} FROM jsonb_populate_record(NULL::"{table}", $1)
                RETURNING *
            ) SELECT to_jsonb(written) AS data FROM written"#,
            table = self.def.table,
            cols = quoted_columns(record).join(", "),
        )
    }

    pub fn update_sql(&self, record: &Record) -> String {
        let assignments: Vec<String> = quoted_columns(record)
            .iter()
            .map(|c| format!("{c} = src.{c}"))
            .collect();
        format!(
            r#"WITH written AS (
                UPDATE "{table}" AS target
                SET {assignments}, "updated_at" = now()
                FROM jsonb_populate_record(NULL::"{table}", $1) AS src
                WHERE target."id" = $2
                RETURNING target.*
            ) SELECT to_jsonb(written) AS data FROM written"#,
            table = self.def.table,
            assignments = assignments.join(", "),
        )
    }

    pub fn delete_sql(&self) -> String {
        format!(
            r#"WITH removed AS (
                DELETE FROM "{}" WHERE "id" = $1 RETURNING *
            ) SELECT to_jsonb(removed) AS data FROM removed"#,
            self.def.table
        )
    }

    pub async fn create(&self, record: Record, actor: &Actor) -> Result<Value, DatabaseError> {
        let record = self.with_author(record, actor);
        let sql = self.insert_sql(&record);
        let body = record.to_json();

        let (sql, body, mode, table) = (sql.as_str(), &body, self.audit_mode, self.def.table);
        let pool = &self.pool;
        let row = with_retry(self.def.name, move || async move {
            let mut tx = pool.begin().await?;
            tag_transaction(&mut tx, mode, actor).await?;

            let row: Value = sqlx::query(sql)
                .bind(body)
                .fetch_one(&mut *tx)
                .await
                .map_err(DatabaseError::classify)?
                .try_get("data")?;

            if let Some(changes) = application_changes(mode, None, Some(&row)) {
                audit::record_changes(&mut tx, table, &row_key(&row), ActionType::Insert, &changes, Some(&actor.email))
                    .await?;
            }

            tx.commit().await?;
            Ok::<_, DatabaseError>(row)
        })
        .await?;

        tracing::info!("{} created {} {}", actor.email, self.def.name, row_key(&row));
        Ok(row)
    }

    pub async fn update(&self, id: Uuid, record: Record, actor: &Actor) -> Result<Value, DatabaseError> {
        let sql = self.update_sql(&record);
        let body = record.to_json();
        let before_sql = self.locked_select_sql();

        let (sql, before_sql, body) = (sql.as_str(), before_sql.as_str(), &body);
        let (mode, table, pool) = (self.audit_mode, self.def.table, &self.pool);
        let row = with_retry(self.def.name, move || async move {
            let mut tx = pool.begin().await?;
            tag_transaction(&mut tx, mode, actor).await?;

            let before = match mode {
                AuditMode::Application => fetch_locked(&mut tx, before_sql, id).await?,
                AuditMode::Trigger => None,
            };

            let row: Option<Value> = sqlx::query(sql)
                .bind(body)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::classify)?
                .map(|r| r.try_get::<Value, _>("data"))
                .transpose()?;

            let changes = application_changes(mode, before.as_ref(), row.as_ref())
                .filter(|_| before.is_some() && row.is_some());
            if let Some(changes) = changes {
                audit::record_changes(&mut tx, table, &id.to_string(), ActionType::Update, &changes, Some(&actor.email))
                    .await?;
            }

            tx.commit().await?;
            Ok::<_, DatabaseError>(row)
        })
        .await?;

        let row = row.ok_or_else(|| self.not_found(id))?;
        tracing::info!("{} updated {} {}", actor.email, self.def.name, id);
        Ok(row)
    }

    pub async fn delete(&self, id: Uuid, actor: &Actor) -> Result<Value, DatabaseError> {
        let sql = self.delete_sql();

        let (sql, mode, table, pool) = (sql.as_str(), self.audit_mode, self.def.table, &self.pool);
        let row = with_retry(self.def.name, move || async move {
            let mut tx = pool.begin().await?;
            tag_transaction(&mut tx, mode, actor).await?;

            let row: Option<Value> = sqlx::query(sql)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::classify)?
                .map(|r| r.try_get::<Value, _>("data"))
                .transpose()?;

            if let Some(changes) = application_changes(mode, row.as_ref(), None) {
                audit::record_changes(&mut tx, table, &id.to_string(), ActionType::Delete, &changes, Some(&actor.email))
                    .await?;
            }

            tx.commit().await?;
            Ok::<_, DatabaseError>(row)
        })
        .await?;

        let row = row.ok_or_else(|| self.not_found(id))?;
        tracing::info!("{} deleted {} {}", actor.email, self.def.name, id);
        Ok(row)
    }

    fn locked_select_sql(&self) -> String {
        format!(
            "SELECT to_jsonb(t) AS data FROM \"{}\" t WHERE t.\"id\" = $1 FOR UPDATE",
            self.def.table
        )
    }

    fn not_found(&self, id: Uuid) -> DatabaseError {
        DatabaseError::NotFound(format!("{} '{}' not found", self.def.name, id))
    }
}

/// Row offset of a 1-based page; `None` when it does not fit in an i64
pub fn page_offset(page: i64, limit: i64) -> Option<i64> {
    (page.max(1) - 1).checked_mul(limit.max(0))
}

fn quoted_columns(record: &Record) -> Vec<String> {
    record.columns().map(|c| format!("\"{}\"", c)).collect()
}

/// Tracer rows the repository writes itself. Trigger mode leaves this to
/// the database, and a write that matched no row logs nothing.
fn application_changes(
    mode: AuditMode,
    before: Option<&Value>,
    after: Option<&Value>,
) -> Option<Vec<audit::FieldChange>> {
    if mode != AuditMode::Application || (before.is_none() && after.is_none()) {
        return None;
    }
    Some(audit::diff_rows(
        before.unwrap_or(&Value::Null),
        after.unwrap_or(&Value::Null),
    ))
}

fn row_key(row: &Value) -> String {
    row.get("id").and_then(audit::text_value).unwrap_or_default()
}

/// Tag the transaction for the trigger function. Application mode writes
/// the actor directly into tracer rows instead.
pub(crate) async fn tag_transaction(
    conn: &mut PgConnection,
    mode: AuditMode,
    actor: &Actor,
) -> Result<(), DatabaseError> {
    if mode == AuditMode::Trigger {
        audit::set_audit_user(conn, &actor.email).await?;
    }
    Ok(())
}

async fn fetch_locked(conn: &mut PgConnection, sql: &str, id: Uuid) -> Result<Option<Value>, DatabaseError> {
    let row = sqlx::query(sql).bind(id).fetch_optional(conn).await?;
    Ok(row.map(|r| r.try_get::<Value, _>("data")).transpose()?)
}

/// Filter parameters are bound as text and cast in SQL to the column type
pub(crate) fn bind_params<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    for p in params {
        q = q.bind(audit::text_value(p));
    }
    q
}

pub(crate) async fn fetch_rows(pool: &PgPool, sql: &SqlResult) -> Result<Vec<Value>, DatabaseError> {
    let rows = bind_params(sqlx::query(&sql.query), &sql.params)
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::classify)?;
    rows.into_iter()
        .map(|r| r.try_get::<Value, _>("data").map_err(DatabaseError::from))
        .collect()
}

pub(crate) async fn fetch_count(pool: &PgPool, sql: &SqlResult) -> Result<i64, DatabaseError> {
    let row = bind_params(sqlx::query(&sql.query), &sql.params)
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::classify)?;
    Ok(row.try_get("count")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::record::WriteMode;
    use crate::resources::find;

    fn repo(name: &str) -> ResourceRepository {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/tenant_test")
            .unwrap();
        ResourceRepository::new(find(name).unwrap(), pool)
    }

    #[tokio::test]
    async fn list_filter_combines_parent_and_search() {
        let repo = repo("categories");
        let mut filters = Map::new();
        filters.insert("brand_id".to_string(), json!("8d5e7f1c-3b1a-4c9e-9f0a-2b6d1e4c7a10"));
        let params = ListParams {
            search: Some("50%".to_string()),
            filters,
            order: None,
            page: 3,
            limit: 10,
        };

        let sql = repo.list_filter(&params).unwrap().to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(t) AS data FROM \"categories\" t WHERE ((\"brand_id\" = $1::uuid) AND \
             (((\"name\"::text ILIKE $2) OR (\"description\"::text ILIKE $3)))) \
             ORDER BY \"name\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(sql.params[1], json!("%50\\%%"));
    }

    #[tokio::test]
    async fn list_filter_rejects_unknown_columns() {
        let repo = repo("brands");
        let mut filters = Map::new();
        filters.insert("password".to_string(), json!("x"));
        let params = ListParams { filters, page: 1, limit: 10, ..Default::default() };
        assert!(matches!(repo.list_filter(&params), Err(DatabaseError::Filter(_))));

        let params = ListParams {
            order: Some("secret desc".to_string()),
            page: 1,
            limit: 10,
            ..Default::default()
        };
        assert!(matches!(repo.list_filter(&params), Err(DatabaseError::Filter(_))));
    }

    #[tokio::test]
    async fn list_filter_without_conditions_matches_all() {
        let repo = repo("announcements");
        let params = ListParams { page: 1, limit: 5, ..Default::default() };
        let sql = repo.list_filter(&params).unwrap().to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(t) AS data FROM \"announcements\" t WHERE 1=1 ORDER BY \"created_at\" DESC LIMIT 5 OFFSET 0"
        );
    }

    fn announcement() -> Record {
        Record::from_json(
            find("announcements").unwrap(),
            json!({"title": "Maintenance", "content": "Saturday 02:00"}),
            WriteMode::Create,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_sql_lists_only_supplied_columns() {
        let repo = repo("announcements");
        let sql = repo.insert_sql(&announcement());
        assert!(sql.contains("INSERT INTO \"announcements\" (\"content\", \"title\")"));
        assert!(sql.contains(
            "SELECT \"content\", \"title\" FROM jsonb_populate_record(NULL::\"announcements\", $1)"
        ));
        assert!(sql.contains("SELECT to_jsonb(written) AS data FROM written"));
    }

    #[tokio::test]
    async fn update_sql_assigns_from_the_populated_record() {
        let repo = repo("brands");
        let record = Record::from_json(
            find("brands").unwrap(),
            json!({"name": "Acme", "description": "Tools"}),
            WriteMode::Update,
        )
        .unwrap();
        let sql = repo.update_sql(&record);
        assert!(sql.contains(
            "SET \"description\" = src.\"description\", \"name\" = src.\"name\", \"updated_at\" = now()"
        ));
        assert!(sql.contains("FROM jsonb_populate_record(NULL::\"brands\", $1) AS src"));
        assert!(sql.contains("WHERE target.\"id\" = $2"));
    }

    #[tokio::test]
    async fn delete_sql_returns_the_removed_row() {
        let sql = repo("sop").delete_sql();
        assert!(sql.contains("DELETE FROM \"sop\" WHERE \"id\" = $1 RETURNING *"));
        assert!(sql.contains("SELECT to_jsonb(removed) AS data FROM removed"));
    }

    #[tokio::test]
    async fn author_column_follows_the_actor() {
        let repo = repo("announcements");
        let user = Actor {
            id: Uuid::parse_str("8d5e7f1c-3b1a-4c9e-9f0a-2b6d1e4c7a10").unwrap(),
            email: "admin@example.com".to_string(),
        };
        let stamped = repo.with_author(announcement(), &user);
        assert_eq!(stamped.get("author_id"), Some(&json!(user.id)));
        assert!(repo.insert_sql(&stamped).contains("\"author_id\""));

        let seeded = repo.with_author(announcement(), &Actor::system("seed"));
        assert_eq!(seeded.get("author_id"), None);
        assert!(!repo.insert_sql(&seeded).contains("author_id"));

        // Resources without an author column are untouched
        let brands = self::repo("brands");
        let record = Record::from_json(find("brands").unwrap(), json!({"name": "Acme"}), WriteMode::Create).unwrap();
        assert_eq!(brands.with_author(record, &user).len(), 1);
    }

    #[test]
    fn application_mode_diffs_before_and_after_rows() {
        let before = json!({"id": "b1", "name": "Acme", "updated_at": "a"});
        let after = json!({"id": "b1", "name": "Acme Ltd", "updated_at": "b"});

        let changes = application_changes(AuditMode::Application, Some(&before), Some(&after)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field_name, "name");
        assert_eq!(changes[0].old_value.as_deref(), Some("Acme"));
        assert_eq!(changes[0].new_value.as_deref(), Some("Acme Ltd"));

        let inserted = application_changes(AuditMode::Application, None, Some(&after)).unwrap();
        assert!(inserted.iter().all(|c| c.old_value.is_none()));
        let deleted = application_changes(AuditMode::Application, Some(&before), None).unwrap();
        assert!(deleted.iter().all(|c| c.new_value.is_none()));

        assert!(application_changes(AuditMode::Application, None, None).is_none());
        assert!(application_changes(AuditMode::Trigger, Some(&before), Some(&after)).is_none());
    }

    #[tokio::test]
    async fn list_filter_rejects_overflowing_pages() {
        let repo = repo("brands");
        let params = ListParams { page: i64::MAX, limit: 10, ..Default::default() };
        assert!(matches!(
            repo.list_filter(&params),
            Err(DatabaseError::Filter(FilterError::InvalidOffset(_)))
        ));
    }

    #[test]
    fn page_offsets_are_checked() {
        assert_eq!(page_offset(1, 20), Some(0));
        assert_eq!(page_offset(3, 20), Some(40));
        assert_eq!(page_offset(0, 20), Some(0));
        assert_eq!(page_offset(i64::MAX, 500), None);
    }

    #[test]
    fn pagination_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 41).total_pages, 3);
        assert_eq!(Pagination::new(1, 20, 40).total_pages, 2);
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
    }
}
