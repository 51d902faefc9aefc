use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::AppState;
use crate::database::models::User;
use crate::database::{page_offset, Pagination};
use crate::error::ApiError;
use crate::handlers::{json_body, page_and_limit, parse_body, parse_id, query_params, require_fields};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, TenantPool};
use crate::services::{NewUser, UserChanges, UserService};
use crate::types::Role;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub items: Vec<User>,
    pub pagination: Pagination,
}

fn lookup_failed(e: sqlx::Error) -> ApiError {
    tracing::error!("User lookup failed: {}", e);
    ApiError::internal_server_error("Failed to look up users")
}

/// GET /api/users
pub async fn users_get(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> ApiResult<UserPage> {
    let query = query_params(query)?;
    let (page, limit) = page_and_limit(query.page.as_deref(), query.limit.as_deref())?;
    let role = query
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(ApiError::bad_request)?;
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());

    let offset = page_offset(page, limit).ok_or_else(|| ApiError::bad_request("page is out of range"))?;
    let (items, total) = User::list(&pool, search, role, limit, offset)
        .await
        .map_err(lookup_failed)?;

    Ok(ApiResponse::success(UserPage {
        items,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// GET /api/users/:id
pub async fn user_get(
    Path(id): Path<String>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let user = User::find(&pool, id)
        .await
        .map_err(lookup_failed)?
        .ok_or_else(|| ApiError::not_found(format!("user '{}' not found", id)))?;
    Ok(ApiResponse::success(user))
}

/// POST /api/users - create login and role row together
pub async fn users_post(
    State(state): State<AppState>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<User> {
    let body = json_body(body)?;
    require_fields(&body, &["email", "password", "name", "role"])?;
    let new_user: NewUser = parse_body(body)?;

    let user = UserService::new(pool, state.identity.clone())
        .create(new_user, &auth_user.actor())
        .await?;
    Ok(ApiResponse::created(user))
}

/// PATCH /api/users/:id - change name and/or role
pub async fn user_patch(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let changes: UserChanges = parse_body(json_body(body)?)?;

    let user = UserService::new(pool, state.identity.clone())
        .update(id, changes, &auth_user.actor())
        .await?;
    Ok(ApiResponse::success(user))
}

/// DELETE /api/users/:id - refuses to delete the caller
pub async fn user_delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let user = UserService::new(pool, state.identity.clone())
        .delete(id, &auth_user.actor())
        .await?;
    Ok(ApiResponse::success(user))
}
