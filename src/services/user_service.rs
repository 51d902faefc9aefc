use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::identity::{IdentityError, IdentityProvider};
use crate::config::{self, AuditMode};
use crate::database::audit;
use crate::database::manager::DatabaseError;
use crate::database::models::User;
use crate::database::repository::{tag_transaction, Actor};
use crate::types::{ActionType, Role};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    Invalid(String),
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        UserError::Database(DatabaseError::classify(err))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), UserError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(UserError::Invalid("A valid email address is required".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserError::Invalid(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.name.trim().is_empty() {
            return Err(UserError::Invalid("Name is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub name: Option<String>,
    pub role: Option<Role>,
}

/// Dashboard accounts live in two places: the identity provider holds the
/// credentials and the tenant `users` table holds the role. This service
/// keeps them in step.
pub struct UserService {
    pool: PgPool,
    identity: Arc<dyn IdentityProvider>,
    audit_mode: AuditMode,
}

impl UserService {
    pub fn new(pool: PgPool, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            pool,
            identity,
            audit_mode: config::config().audit.mode,
        }
    }

    pub async fn create(&self, new_user: NewUser, actor: &Actor) -> Result<User, UserError> {
        new_user.validate()?;
        let email = new_user.email.trim().to_lowercase();

        let identity = self.identity.create_user(&email, &new_user.password).await?;

        match self.insert_row(identity.id, &email, new_user.name.trim(), new_user.role, actor).await {
            Ok(user) => {
                tracing::info!("{} created user {} ({})", actor.email, user.email, user.role);
                Ok(user)
            }
            Err(e) => {
                // Leave no orphaned login behind
                if let Err(rollback) = self.identity.delete_user(identity.id).await {
                    tracing::error!("Failed to roll back identity {} after insert error: {}", identity.id, rollback);
                }
                Err(e)
            }
        }
    }

    async fn insert_row(
        &self,
        id: Uuid,
        email: &str,
        name: &str,
        role: Role,
        actor: &Actor,
    ) -> Result<User, UserError> {
        let mut tx = self.pool.begin().await?;
        tag_transaction(&mut tx, self.audit_mode, actor).await?;
        let user = User::insert(&mut tx, id, email, name, role).await?;
        self.record(&mut tx, None, Some(&user), ActionType::Insert, actor).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, changes: UserChanges, actor: &Actor) -> Result<User, UserError> {
        let name = changes.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(UserError::Invalid("Name cannot be blank".to_string()));
        }
        if name.is_none() && changes.role.is_none() {
            return Err(UserError::Invalid("Nothing to update: supply name or role".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        tag_transaction(&mut tx, self.audit_mode, actor).await?;

        let before = fetch_for_update(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        if let Some(role) = changes.role {
            if before.role == Role::SuperAdmin && role != Role::SuperAdmin {
                ensure_not_last_super_admin(&mut tx).await?;
            }
        }

        let user = User::update(&mut tx, id, name, changes.role)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.record(&mut tx, Some(&before), Some(&user), ActionType::Update, actor).await?;
        tx.commit().await?;

        tracing::info!("{} updated user {}", actor.email, user.email);
        Ok(user)
    }

    /// Remove the role row first, then the login
    pub async fn delete(&self, id: Uuid, actor: &Actor) -> Result<User, UserError> {
        if id == actor.id {
            return Err(UserError::Invalid("You cannot delete your own account".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        tag_transaction(&mut tx, self.audit_mode, actor).await?;

        let before = fetch_for_update(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        if before.role == Role::SuperAdmin {
            ensure_not_last_super_admin(&mut tx).await?;
        }

        let user = User::delete(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        self.record(&mut tx, Some(&user), None, ActionType::Delete, actor).await?;
        tx.commit().await?;

        self.release_identity(id).await;
        tracing::info!("{} deleted user {}", actor.email, user.email);
        Ok(user)
    }

    /// Drop the login of a user whose row is already gone. Without the row
    /// the login is refused at sign-in, so a failure here is only logged.
    async fn release_identity(&self, id: Uuid) -> bool {
        match self.identity.delete_user(id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("User row {} removed but identity deletion failed: {}", id, e);
                false
            }
        }
    }

    async fn record(
        &self,
        conn: &mut PgConnection,
        before: Option<&User>,
        after: Option<&User>,
        action: ActionType,
        actor: &Actor,
    ) -> Result<(), UserError> {
        if self.audit_mode != AuditMode::Application {
            return Ok(());
        }
        let old = to_value(before);
        let new = to_value(after);
        let key = after.or(before).map(|u| u.id.to_string()).unwrap_or_default();
        let changes = audit::diff_rows(&old, &new);
        audit::record_changes(conn, "users", &key, action, &changes, Some(&actor.email)).await?;
        Ok(())
    }
}

fn to_value(user: Option<&User>) -> Value {
    user.and_then(|u| serde_json::to_value(u).ok()).unwrap_or(Value::Null)
}

fn not_found(id: Uuid) -> UserError {
    UserError::Database(DatabaseError::NotFound(format!("user '{}' not found", id)))
}

async fn fetch_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, name, role, created_at, updated_at FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

async fn ensure_not_last_super_admin(conn: &mut PgConnection) -> Result<(), UserError> {
    if User::count_with_role(conn, Role::SuperAdmin).await? <= 1 {
        return Err(UserError::Invalid(
            "At least one SUPER_ADMIN must remain".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Identity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Identity provider whose account deletion always fails
    #[derive(Default)]
    struct UnreachableIdentity {
        deletes: AtomicU32,
    }

    #[async_trait]
    impl IdentityProvider for UnreachableIdentity {
        async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }
        async fn create_user(&self, email: &str, _password: &str) -> Result<Identity, IdentityError> {
            Err(IdentityError::AlreadyRegistered(email.to_string()))
        }
        async fn delete_user(&self, _id: Uuid) -> Result<(), IdentityError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(IdentityError::Rejected {
                status: 503,
                message: "auth service unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_identity_cleanup_does_not_fail_the_delete() {
        let identity = Arc::new(UnreachableIdentity::default());
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/tenant_test")
            .unwrap();
        let service = UserService::new(pool, identity.clone());

        assert!(!service.release_identity(Uuid::new_v4()).await);
        assert_eq!(identity.deletes.load(Ordering::SeqCst), 1);
    }

    fn new_user() -> NewUser {
        NewUser {
            email: "agent@example.com".to_string(),
            password: "s3cret-pass".to_string(),
            name: "Agent One".to_string(),
            role: Role::Agent,
        }
    }

    #[test]
    fn accepts_complete_user() {
        assert!(new_user().validate().is_ok());
    }

    #[test]
    fn rejects_bad_email_short_password_and_blank_name() {
        let mut u = new_user();
        u.email = "not-an-email".to_string();
        assert!(matches!(u.validate(), Err(UserError::Invalid(_))));

        let mut u = new_user();
        u.password = "abc".to_string();
        assert!(matches!(u.validate(), Err(UserError::Invalid(m)) if m.contains("at least 6")));

        let mut u = new_user();
        u.name = "  ".to_string();
        assert!(matches!(u.validate(), Err(UserError::Invalid(_))));
    }

    #[test]
    fn role_deserialises_from_wire_names() {
        let u: NewUser = serde_json::from_value(serde_json::json!({
            "email": "a@b.c", "password": "123456", "name": "A", "role": "SUPER_ADMIN"
        }))
        .unwrap();
        assert_eq!(u.role, Role::SuperAdmin);

        let bad = serde_json::from_value::<NewUser>(serde_json::json!({
            "email": "a@b.c", "password": "123456", "name": "A", "role": "ROOT"
        }));
        assert!(bad.is_err());
    }
}
