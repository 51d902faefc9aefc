use axum::Extension;
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, TenantPool, ValidatedTenant};
use crate::types::Role;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub tenant: String,
    pub database: String,
}

/// GET /api/auth/whoami - current user as stored in the tenant database
pub async fn whoami_get(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(tenant): Extension<ValidatedTenant>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<WhoAmI> {
    let user = User::find(&pool, auth_user.id)
        .await
        .map_err(|e| {
            tracing::error!("User lookup failed: {}", e);
            ApiError::internal_server_error("Failed to look up user")
        })?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    Ok(ApiResponse::success(WhoAmI {
        id: user.id,
        email: user.email,
        name: user.name,
        role: user.role,
        tenant: tenant.name,
        database: tenant.database,
    }))
}
