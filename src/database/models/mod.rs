pub mod performance;
pub mod tenant;
pub mod tracer_update;
pub mod user;

pub use performance::PerformanceSummary;
pub use tenant::Tenant;
pub use tracer_update::{TracerQuery, TracerUpdate};
pub use user::User;
