// Token acquisition endpoints

pub mod login;
pub mod refresh;

pub use login::login_post;
pub use refresh::refresh_post;

use serde::Serialize;

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::models::{Tenant, User};
use crate::error::ApiError;

/// Token plus the profile the dashboard shows in its header
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_in: i64,
    pub tenant: String,
    pub user: User,
}

pub(crate) fn issue_session(tenant: &Tenant, user: User) -> Result<SessionResponse, ApiError> {
    let claims = Claims::new(
        user.id,
        user.email.clone(),
        tenant.name.clone(),
        tenant.database.clone(),
        user.role,
    );
    let token = generate_jwt(&claims)?;

    Ok(SessionResponse {
        token,
        expires_in: config::config().security.jwt_expiry_hours as i64 * 3600,
        tenant: tenant.name.clone(),
        user,
    })
}
