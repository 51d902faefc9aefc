use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{FromRow, PgPool};

use crate::config;
use crate::database::manager::DatabaseError;
use crate::database::repository::{fetch_count, fetch_rows, page_offset, Page, Pagination};
use crate::database::retry::with_retry;
use crate::filter::{Filter, FilterError};
use crate::types::ActionType;

/// One audited column change
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TracerUpdate {
    pub id: i64,
    pub source_table: String,
    pub source_key: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub action_type: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
}

/// Audit log query; every filter is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracerQuery {
    pub source_table: Option<String>,
    pub source_key: Option<String>,
    pub field_name: Option<String>,
    pub action_type: Option<ActionType>,
    pub changed_by: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl TracerQuery {
    /// `(page, limit, offset)` with the limit clamped before the offset is taken
    pub fn paging(&self, default_limit: i64) -> Result<(i64, i64, i64), FilterError> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(FilterError::InvalidOffset("page must be a positive integer".to_string()));
        }
        let limit = self.limit.unwrap_or(default_limit);
        if limit < 1 {
            return Err(FilterError::InvalidLimit("limit must be a positive integer".to_string()));
        }
        let limit = limit.min(config::config().api.max_page_size);
        let offset = page_offset(page, limit)
            .ok_or_else(|| FilterError::InvalidOffset(format!("page {} is out of range", page)))?;
        Ok((page, limit, offset))
    }

    pub fn to_filter(&self, default_limit: i64) -> Result<Filter, DatabaseError> {
        let mut filter = Filter::new("tracer_updates")?;
        filter.cast("changed_at", "timestamptz");

        let mut conditions = Map::new();
        let exact = [
            ("source_table", &self.source_table),
            ("source_key", &self.source_key),
            ("field_name", &self.field_name),
            ("changed_by", &self.changed_by),
        ];
        for (column, value) in exact {
            if let Some(v) = value {
                conditions.insert(column.to_string(), json!(v));
            }
        }
        if let Some(action) = self.action_type {
            conditions.insert("action_type".to_string(), json!(action.as_str()));
        }

        let mut window = Map::new();
        if let Some(since) = self.since {
            window.insert("$gte".to_string(), json!(since.to_rfc3339()));
        }
        if let Some(until) = self.until {
            window.insert("$lte".to_string(), json!(until.to_rfc3339()));
        }
        if !window.is_empty() {
            conditions.insert("changed_at".to_string(), Value::Object(window));
        }

        filter.where_clause(Value::Object(conditions))?;
        filter.order(json!("changed_at desc, id desc"))?;

        let (_, limit, offset) = self.paging(default_limit)?;
        filter.limit(limit, Some(offset))?;
        Ok(filter)
    }

    pub async fn fetch(&self, pool: &PgPool, default_limit: i64) -> Result<Page, DatabaseError> {
        let (page, limit, _) = self.paging(default_limit)?;
        let filter = self.to_filter(default_limit)?;
        let select = filter.to_sql()?;
        let count = filter.to_count_sql()?;
        let (select, count) = (&select, &count);

        let (items, total) = futures::try_join!(
            with_retry("tracer_updates", move || fetch_rows(pool, select)),
            with_retry("tracer_updates", move || fetch_count(pool, count)),
        )?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builds_filtered_audit_query() {
        let query = TracerQuery {
            source_table: Some("brands".to_string()),
            action_type: Some(ActionType::Update),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            page: Some(2),
            limit: Some(25),
            ..Default::default()
        };
        let sql = query.to_filter(50).unwrap().to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(t) AS data FROM \"tracer_updates\" t WHERE \"action_type\" = $1 AND \
             \"changed_at\" >= $2::timestamptz AND \"source_table\" = $3 \
             ORDER BY \"changed_at\" DESC, \"id\" DESC LIMIT 25 OFFSET 25"
        );
        assert_eq!(sql.params[0], json!("UPDATE"));
    }

    #[test]
    fn oversized_limit_is_clamped_before_the_offset() {
        let max = config::config().api.max_page_size;
        let query = TracerQuery {
            page: Some(2),
            limit: Some(max * 10),
            ..Default::default()
        };
        assert_eq!(query.paging(50).unwrap(), (2, max, max));
        let sql = query.to_filter(50).unwrap().to_sql().unwrap();
        assert!(sql.query.ends_with(&format!("LIMIT {} OFFSET {}", max, max)));
    }

    #[test]
    fn rejects_empty_limits_and_unreachable_pages() {
        let zero = TracerQuery { limit: Some(0), ..Default::default() };
        assert!(matches!(zero.paging(50), Err(FilterError::InvalidLimit(_))));

        let negative = TracerQuery { page: Some(-1), ..Default::default() };
        assert!(negative.paging(50).is_err());

        let huge = TracerQuery { page: Some(i64::MAX), ..Default::default() };
        assert!(matches!(huge.paging(50), Err(FilterError::InvalidOffset(_))));
        assert!(huge.to_filter(50).is_err());
    }

    #[test]
    fn unfiltered_query_uses_default_limit() {
        let sql = TracerQuery::default().to_filter(50).unwrap().to_sql().unwrap();
        assert!(sql.query.contains("WHERE 1=1"));
        assert!(sql.query.ends_with("LIMIT 50 OFFSET 0"));
    }
}
