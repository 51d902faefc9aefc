use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{issue_session, SessionResponse};
use crate::auth::validate_jwt;
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Tenant, User};
use crate::error::ApiError;
use crate::handlers::{json_body, parse_body, require_fields};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// POST /auth/refresh - exchange a recently expired (or live) token for a new one
///
/// The role is re-read from the tenant database so promotions and demotions
/// take effect on the next refresh.
pub async fn refresh_post(body: Result<Json<Value>, JsonRejection>) -> ApiResult<SessionResponse> {
    let body = json_body(body)?;
    require_fields(&body, &["token"])?;
    let request: RefreshRequest = parse_body(body)?;

    let claims = validate_jwt(request.token.trim(), true)?;
    if !claims.within_refresh_window(config::config().security.refresh_window_hours) {
        return Err(ApiError::unauthorized("Session token is too old to refresh"));
    }

    let main_pool = DatabaseManager::main_pool().await?;
    let tenant = Tenant::find_active_by_database(&main_pool, &claims.database)
        .await
        .map_err(|e| {
            tracing::error!("Tenant lookup failed: {}", e);
            ApiError::internal_server_error("Failed to look up tenant")
        })?
        .ok_or_else(|| ApiError::forbidden(format!("Tenant '{}' is not active", claims.tenant)))?;

    let pool = DatabaseManager::tenant_pool(&tenant.database).await?;
    let user = User::find(&pool, claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("User lookup failed: {}", e);
            ApiError::internal_server_error("Failed to look up user")
        })?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    if user.role != claims.role {
        tracing::info!("Role for {} changed from {} to {}", user.email, claims.role, user.role);
    }
    Ok(ApiResponse::success(issue_session(&tenant, user)?))
}
