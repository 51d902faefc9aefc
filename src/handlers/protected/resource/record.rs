use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use serde_json::{Map, Value};

use super::resolve;
use crate::database::{Record, ResourceRepository, WriteMode};
use crate::handlers::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, TenantPool};

/// GET /api/:resource/:id
pub async fn record_get(
    Path((resource, id)): Path<(String, String)>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
) -> ApiResult<Value> {
    let def = resolve(&resource)?;
    let id = parse_id(&id)?;
    let row = ResourceRepository::new(def, pool).get(id).await?;
    Ok(ApiResponse::success(row))
}

/// GET /api/:resource/:id/children - direct children grouped by resource
pub async fn children_get(
    Path((resource, id)): Path<(String, String)>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
) -> ApiResult<Map<String, Value>> {
    let def = resolve(&resource)?;
    let id = parse_id(&id)?;
    let repo = ResourceRepository::new(def, pool);
    // 404 for a missing parent rather than an empty listing
    repo.get(id).await?;
    Ok(ApiResponse::success(repo.children(id).await?))
}

/// PUT /api/:resource/:id - full replacement: required columns must be sent
pub async fn record_put(
    path: Path<(String, String)>,
    pool: Extension<TenantPool>,
    auth_user: Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    write_record(path, pool, auth_user, body, WriteMode::Create).await
}

/// PATCH /api/:resource/:id - partial update
pub async fn record_patch(
    path: Path<(String, String)>,
    pool: Extension<TenantPool>,
    auth_user: Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    write_record(path, pool, auth_user, body, WriteMode::Update).await
}

async fn write_record(
    Path((resource, id)): Path<(String, String)>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
    mode: WriteMode,
) -> ApiResult<Value> {
    let def = resolve(&resource)?;
    let id = parse_id(&id)?;

    let record = Record::from_json(def, json_body(body)?, mode)?;
    let row = ResourceRepository::new(def, pool)
        .update(id, record, &auth_user.actor())
        .await?;
    Ok(ApiResponse::success(row))
}

/// DELETE /api/:resource/:id - returns the removed row; children cascade
pub async fn record_delete(
    Path((resource, id)): Path<(String, String)>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let def = resolve(&resource)?;
    let id = parse_id(&id)?;

    let row = ResourceRepository::new(def, pool)
        .delete(id, &auth_user.actor())
        .await?;
    Ok(ApiResponse::success(row))
}
