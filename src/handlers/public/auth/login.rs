use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{issue_session, SessionResponse};
use crate::app::AppState;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Tenant, User};
use crate::error::ApiError;
use crate::handlers::{json_body, parse_body, require_fields};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login/:tenant - exchange email and password for a session token
///
/// Credentials are checked by the identity provider. Access to the tenant
/// comes from the tenant's own `users` table, which also supplies the role.
pub async fn login_post(
    State(state): State<AppState>,
    Path(tenant_name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<SessionResponse> {
    let body = json_body(body)?;
    require_fields(&body, &["email", "password"])?;
    let request: LoginRequest = parse_body(body)?;

    let main_pool = DatabaseManager::main_pool().await?;
    let tenant = Tenant::find_by_name(&main_pool, &tenant_name)
        .await
        .map_err(|e| {
            tracing::error!("Tenant lookup failed: {}", e);
            ApiError::internal_server_error("Failed to look up tenant")
        })?
        .ok_or_else(|| {
            tracing::warn!("Login attempt for unknown tenant '{}'", tenant_name);
            ApiError::unauthorized("Invalid tenant or credentials")
        })?;
    if !tenant.is_active {
        return Err(ApiError::forbidden(format!("Tenant '{}' is not active", tenant.name)));
    }

    let identity = state.identity.sign_in(request.email.trim(), &request.password).await?;

    let pool = DatabaseManager::tenant_pool(&tenant.database).await?;
    let user = User::find(&pool, identity.id)
        .await
        .map_err(|e| {
            tracing::error!("User lookup failed: {}", e);
            ApiError::internal_server_error("Failed to look up user")
        })?
        .ok_or_else(|| {
            tracing::warn!("{} authenticated but has no account in {}", identity.email, tenant.name);
            ApiError::forbidden("User has no access to this tenant")
        })?;

    tracing::info!("{} logged in to {} as {}", user.email, tenant.name, user.role);
    Ok(ApiResponse::success(issue_session(&tenant, user)?))
}
