use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query};
use axum::Extension;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::database::models::PerformanceSummary;
use crate::error::ApiError;
use crate::handlers::{parse_id, query_params};
use crate::middleware::{ApiResponse, ApiResult, TenantPool};

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|_| ApiError::field_error(field, "Expected a date (YYYY-MM-DD)"))
        })
        .transpose()
}

/// GET /api/agents/:id/performance/summary?from=&to=
///
/// Registered under the generic resource pattern; only `agents` answers.
pub async fn summary_get(
    Path((resource, agent_id)): Path<(String, String)>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> ApiResult<PerformanceSummary> {
    if resource != "agents" {
        return Err(ApiError::not_found(format!("No performance summary for '{}'", resource)));
    }
    let agent_id = parse_id(&agent_id)?;
    let query = query_params(query)?;
    let from = parse_date("from", query.from.as_deref())?;
    let to = parse_date("to", query.to.as_deref())?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ApiError::bad_request("'from' must not be after 'to'"));
        }
    }

    let summary = PerformanceSummary::for_agent(&pool, agent_id, from, to).await?;
    Ok(ApiResponse::success(summary))
}
