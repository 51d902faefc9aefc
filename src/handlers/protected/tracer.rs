use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::Extension;

use crate::config;
use crate::database::models::TracerQuery;
use crate::database::Page;
use crate::handlers::query_params;
use crate::middleware::{ApiResponse, ApiResult, TenantPool};

/// GET /api/tracer-updates - audit log, newest first
pub async fn tracer_updates_get(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    query: Result<Query<TracerQuery>, QueryRejection>,
) -> ApiResult<Page> {
    let query = query_params(query)?;
    let page = query.fetch(&pool, config::config().api.default_page_size).await?;
    Ok(ApiResponse::success(page))
}
