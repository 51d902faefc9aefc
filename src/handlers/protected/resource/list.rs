use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::resolve;
use crate::database::{ListParams, Page, Record, ResourceRepository, WriteMode};
use crate::error::ApiError;
use crate::handlers::{json_body, page_and_limit, query_params};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, TenantPool};
use crate::resources::ResourceDef;

/// Query keys with a fixed meaning; everything else is a column filter
const RESERVED: &[&str] = &["search", "page", "limit", "order"];

pub(crate) fn list_params(def: &ResourceDef, query: HashMap<String, String>) -> Result<ListParams, ApiError> {
    let (page, limit) = page_and_limit(
        query.get("page").map(String::as_str),
        query.get("limit").map(String::as_str),
    )?;

    let mut filters = Map::new();
    for (key, value) in &query {
        if RESERVED.contains(&key.as_str()) {
            continue;
        }
        if !def.is_filterable(key) {
            return Err(ApiError::bad_request(format!(
                "Unknown filter '{}' for {}",
                key, def.name
            )));
        }
        filters.insert(key.clone(), Value::String(value.clone()));
    }

    Ok(ListParams {
        search: query.get("search").cloned(),
        filters,
        order: query.get("order").cloned(),
        page,
        limit,
    })
}

/// GET /api/:resource - list with search, column filters, order and paging
///
/// `?brand_id=<uuid>` narrows to one parent, `?published=true` filters
/// announcements, and so on for any column of the resource.
pub async fn resource_get(
    Path(resource): Path<String>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Page> {
    let def = resolve(&resource)?;
    let params = list_params(def, query_params(query)?)?;
    let page = ResourceRepository::new(def, pool).list(&params).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/:resource - create one record
pub async fn resource_post(
    Path(resource): Path<String>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let def = resolve(&resource)?;

    let record = Record::from_json(def, json_body(body)?, WriteMode::Create)?;
    let row = ResourceRepository::new(def, pool)
        .create(record, &auth_user.actor())
        .await?;
    Ok(ApiResponse::created(row))
}
