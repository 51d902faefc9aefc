pub mod tenant_service;
pub mod user_service;

pub use tenant_service::{TenantError, TenantService};
pub use user_service::{NewUser, UserChanges, UserError, UserService};
