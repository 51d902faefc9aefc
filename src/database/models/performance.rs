use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::retry::with_retry;

/// Aggregated performance for one agent over an optional period window
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PerformanceSummary {
    pub agent_id: Uuid,
    pub periods: i64,
    pub handled_calls: i64,
    pub resolved_calls: i64,
    pub avg_quality_score: Option<f64>,
    pub avg_csat_score: Option<f64>,
    pub first_period: Option<NaiveDate>,
    pub last_period: Option<NaiveDate>,
    #[sqlx(skip)]
    pub resolution_rate: Option<f64>,
}

const SUMMARY_SQL: &str = r#"
    SELECT
        $1::uuid AS agent_id,
        COUNT(*) AS periods,
        COALESCE(SUM(handled_calls), 0)::bigint AS handled_calls,
        COALESCE(SUM(resolved_calls), 0)::bigint AS resolved_calls,
        AVG(quality_score)::float8 AS avg_quality_score,
        AVG(csat_score)::float8 AS avg_csat_score,
        MIN(period) AS first_period,
        MAX(period) AS last_period
    FROM performance
    WHERE agent_id = $1
      AND ($2::date IS NULL OR period >= $2)
      AND ($3::date IS NULL OR period <= $3)
"#;

impl PerformanceSummary {
    pub async fn for_agent(
        pool: &PgPool,
        agent_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<PerformanceSummary, DatabaseError> {
        let exists = with_retry("performance", move || async move {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM agents WHERE id = $1)")
                .bind(agent_id)
                .fetch_one(pool)
                .await
                .map_err(DatabaseError::from)
        })
        .await?;
        if !exists {
            return Err(DatabaseError::NotFound(format!("agents '{}' not found", agent_id)));
        }

        let mut summary = with_retry("performance", move || async move {
            sqlx::query_as::<_, PerformanceSummary>(SUMMARY_SQL)
                .bind(agent_id)
                .bind(from)
                .bind(to)
                .fetch_one(pool)
                .await
                .map_err(DatabaseError::from)
        })
        .await?;

        summary.resolution_rate = resolution_rate(summary.handled_calls, summary.resolved_calls);
        Ok(summary)
    }
}

fn resolution_rate(handled: i64, resolved: i64) -> Option<f64> {
    if handled > 0 {
        Some(resolved as f64 / handled as f64)
    } else {
        None
    }
}
