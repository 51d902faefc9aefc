// Protected handlers: every route here runs behind JWT authentication and
// tenant validation. Role gates are applied per route group in the router.

pub mod auth;
pub mod performance;
pub mod resource;
pub mod tracer;
pub mod upload;
pub mod users;
