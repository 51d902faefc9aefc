pub mod auth;
pub mod response;
pub mod role;
pub mod validate_tenant;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
pub use role::{require_admin, require_admin_for_writes, require_super_admin_for_writes};
pub use validate_tenant::{validate_tenant_middleware, TenantPool, ValidatedTenant};
