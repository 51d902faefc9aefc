use axum::{extract::Request, middleware::Next, response::Response};
use sqlx::PgPool;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::database::manager::DatabaseManager;
use crate::database::models::Tenant;
use crate::error::ApiError;

/// Extracted tenant database pool, injected by middleware
#[derive(Clone)]
pub struct TenantPool(pub PgPool);

/// Tenant row confirmed active in the registry
#[derive(Clone, Debug)]
pub struct ValidatedTenant {
    pub id: Uuid,
    pub name: String,
    pub database: String,
}

/// Middleware that validates the tenant from JWT claims against the registry
/// and injects a pool for its database
pub async fn validate_tenant_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant validation"))?;

    let main_pool = DatabaseManager::main_pool().await?;
    let tenant = Tenant::find_active_by_database(&main_pool, &auth_user.database)
        .await
        .map_err(|e| {
            tracing::error!("Database error validating tenant: {}", e);
            ApiError::internal_server_error("Failed to validate tenant")
        })?
        .ok_or_else(|| {
            tracing::warn!("Tenant validation failed: '{}' not found or inactive", auth_user.database);
            ApiError::forbidden(format!("Tenant '{}' is not active or does not exist", auth_user.tenant))
        })?;

    let pool = DatabaseManager::tenant_pool(&tenant.database).await?;
    tracing::debug!("Tenant validation successful: {} ({})", tenant.name, tenant.database);

    request.extensions_mut().insert(ValidatedTenant {
        id: tenant.id,
        name: tenant.name,
        database: tenant.database,
    });
    request.extensions_mut().insert(TenantPool(pool));

    Ok(next.run(request).await)
}
