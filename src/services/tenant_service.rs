use sha2::{Digest, Sha256};
use sqlx::{Executor, PgPool};
use std::sync::Arc;

use crate::auth::identity::IdentityProvider;
use crate::config::{self, AuditMode};
use crate::database::audit::install_audit_triggers;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{Tenant, User};
use crate::database::repository::Actor;
use crate::resources;
use crate::services::user_service::{NewUser, UserError, UserService};
use crate::types::Role;

pub const REGISTRY_SQL: &str = include_str!("../../sql/registry.sql");
pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] DatabaseError),
    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),
    #[error("Tenant not found: {0}")]
    NotFound(String),
    #[error("Invalid tenant name: {0}")]
    InvalidName(String),
    #[error("Tenant '{0}' already has a SUPER_ADMIN")]
    AlreadyBootstrapped(String),
    #[error(transparent)]
    User(#[from] UserError),
}

pub struct TenantService {
    main_pool: PgPool,
}

impl TenantService {
    pub async fn new() -> Result<Self, TenantError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    /// Create the registry database if needed and apply its schema
    pub async fn init_registry() -> Result<bool, TenantError> {
        let created = if DatabaseManager::database_exists(DatabaseManager::SYSTEM_DB_NAME).await? {
            false
        } else {
            DatabaseManager::create_database(DatabaseManager::SYSTEM_DB_NAME).await?;
            true
        };

        let pool = DatabaseManager::main_pool().await?;
        pool.execute(REGISTRY_SQL).await?;
        tracing::info!("Registry database {} ready", DatabaseManager::SYSTEM_DB_NAME);
        Ok(created)
    }

    /// Create a tenant database, load the schema and register it
    pub async fn create_tenant(&self, tenant_name: &str) -> Result<Tenant, TenantError> {
        validate_tenant_name(tenant_name)?;
        let tenant_db = hash_tenant_name(tenant_name);

        if Tenant::find_by_name(&self.main_pool, tenant_name).await?.is_some() {
            return Err(TenantError::AlreadyExists(tenant_name.to_string()));
        }

        DatabaseManager::create_database(&tenant_db).await?;

        match self.provision(tenant_name, &tenant_db).await {
            Ok(tenant) => {
                tracing::info!("Created tenant {} ({})", tenant.name, tenant.database);
                Ok(tenant)
            }
            Err(e) => {
                tracing::error!("Provisioning {} failed, dropping {}: {}", tenant_name, tenant_db, e);
                if let Err(drop_err) = DatabaseManager::drop_database(&tenant_db).await {
                    tracing::error!("Failed to drop {}: {}", tenant_db, drop_err);
                }
                Err(e)
            }
        }
    }

    async fn provision(&self, tenant_name: &str, tenant_db: &str) -> Result<Tenant, TenantError> {
        let pool = DatabaseManager::tenant_pool(tenant_db).await?;

        let mut tx = pool.begin().await?;
        (&mut *tx).execute(SCHEMA_SQL).await?;
        tx.commit().await?;

        // Application mode writes tracer rows itself; triggers would double them
        if config::config().audit.mode == AuditMode::Trigger {
            install_audit_triggers(&pool, &resources::audited_tables()).await?;
        }

        Ok(Tenant::insert(&self.main_pool, tenant_name, tenant_db).await?)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, TenantError> {
        Ok(Tenant::list(&self.main_pool).await?)
    }

    pub async fn get_tenant(&self, tenant_name: &str) -> Result<Tenant, TenantError> {
        Tenant::find_by_name(&self.main_pool, tenant_name)
            .await?
            .ok_or_else(|| TenantError::NotFound(tenant_name.to_string()))
    }

    /// Tenant row plus a pool for its database
    pub async fn tenant_pool(&self, tenant_name: &str) -> Result<(Tenant, PgPool), TenantError> {
        let tenant = self.get_tenant(tenant_name).await?;
        let pool = DatabaseManager::tenant_pool(&tenant.database).await?;
        Ok((tenant, pool))
    }

    pub async fn set_active(&self, tenant_name: &str, active: bool) -> Result<(), TenantError> {
        if !Tenant::set_active(&self.main_pool, tenant_name, active).await? {
            return Err(TenantError::NotFound(tenant_name.to_string()));
        }
        tracing::info!(
            "Tenant {} {}",
            tenant_name,
            if active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    /// Create the first SUPER_ADMIN of a tenant
    pub async fn bootstrap_admin(
        &self,
        tenant_name: &str,
        identity: Arc<dyn IdentityProvider>,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User, TenantError> {
        let (tenant, pool) = self.tenant_pool(tenant_name).await?;

        let mut conn = pool.acquire().await?;
        if User::count_with_role(&mut conn, Role::SuperAdmin).await? > 0 {
            return Err(TenantError::AlreadyBootstrapped(tenant.name));
        }
        drop(conn);

        let system = Actor::system("system");
        let user = UserService::new(pool, identity)
            .create(
                NewUser {
                    email: email.to_string(),
                    password: password.to_string(),
                    name: name.to_string(),
                    role: Role::SuperAdmin,
                },
                &system,
            )
            .await?;

        tracing::info!("Bootstrapped {} as SUPER_ADMIN of {}", user.email, tenant.name);
        Ok(user)
    }
}

/// Hash tenant name to consistent database name
pub fn hash_tenant_name(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let hash_str = format!("{:x}", hasher.finalize());

    // First 16 hex characters keep the name short
    format!("tenant_{}", &hash_str[..16])
}

pub fn validate_tenant_name(name: &str) -> Result<(), TenantError> {
    if name.len() < 2 {
        return Err(TenantError::InvalidName("Tenant name must be at least 2 characters".to_string()));
    }

    if name.len() > 100 {
        return Err(TenantError::InvalidName("Tenant name must be less than 100 characters".to_string()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(TenantError::InvalidName(
            "Tenant name can only contain letters, numbers, hyphens, and underscores".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_names_are_stable_and_valid() {
        let a = hash_tenant_name("acme");
        assert_eq!(a, hash_tenant_name("acme"));
        assert_ne!(a, hash_tenant_name("acme-2"));
        assert_eq!(a.len(), "tenant_".len() + 16);
        assert!(DatabaseManager::is_valid_db_name(&a));
    }

    #[test]
    fn tenant_names_are_validated() {
        assert!(validate_tenant_name("acme_support-1").is_ok());
        assert!(matches!(validate_tenant_name("a"), Err(TenantError::InvalidName(_))));
        assert!(matches!(validate_tenant_name("acme corp"), Err(TenantError::InvalidName(_))));
        assert!(matches!(validate_tenant_name(&"x".repeat(101)), Err(TenantError::InvalidName(_))));
    }

    #[test]
    fn bundled_sql_defines_expected_tables() {
        assert!(REGISTRY_SQL.contains("CREATE TABLE IF NOT EXISTS tenants"));
        for table in resources::audited_tables() {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "schema is missing {}",
                table
            );
        }
        assert!(SCHEMA_SQL.contains("tracer_updates"));
    }
}
