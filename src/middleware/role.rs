//! Role gates. Reads are open to every authenticated role; writes and the
//! audit log need an admin; user management writes need a super admin.

use axum::{extract::Request, http::Method, middleware::Next, response::Response};

use super::auth::AuthUser;
use crate::error::ApiError;
use crate::types::Role;

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn role_of(request: &Request) -> Result<Role, ApiError> {
    request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.role)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

fn check(role: Role, super_admin: bool) -> Result<(), ApiError> {
    if super_admin && !role.is_super_admin() {
        return Err(ApiError::forbidden("Super admin role required"));
    }
    if !role.is_admin() {
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(())
}

/// SUPER_ADMIN or ADMIN for every method
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    check(role_of(&request)?, false)?;
    Ok(next.run(request).await)
}

/// SUPER_ADMIN or ADMIN for anything but reads
pub async fn require_admin_for_writes(request: Request, next: Next) -> Result<Response, ApiError> {
    let role = role_of(&request)?;
    if !is_read(request.method()) {
        check(role, false)?;
    }
    Ok(next.run(request).await)
}

/// SUPER_ADMIN for anything but reads
pub async fn require_super_admin_for_writes(request: Request, next: Next) -> Result<Response, ApiError> {
    let role = role_of(&request)?;
    if !is_read(request.method()) {
        check(role, true)?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn gate_decisions() {
        assert!(check(Role::Admin, false).is_ok());
        assert!(check(Role::SuperAdmin, true).is_ok());
        assert_eq!(check(Role::Viewer, false).unwrap_err().status_code(), StatusCode::FORBIDDEN);
        assert_eq!(check(Role::Admin, true).unwrap_err().status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn only_safe_methods_are_reads() {
        assert!(is_read(&Method::GET));
        assert!(!is_read(&Method::POST));
        assert!(!is_read(&Method::PATCH));
        assert!(!is_read(&Method::DELETE));
    }
}
