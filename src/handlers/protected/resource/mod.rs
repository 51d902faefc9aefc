// Generic CRUD over every registered resource:
//   GET|POST            /api/:resource
//   GET|PUT|PATCH|DELETE /api/:resource/:id
//   GET                 /api/:resource/:id/children

pub mod list;
pub mod record;

pub use list::{resource_get, resource_post};
pub use record::{children_get, record_delete, record_get, record_patch, record_put};

use crate::error::ApiError;
use crate::resources::{self, ResourceDef};

pub(crate) fn resolve(name: &str) -> Result<&'static ResourceDef, ApiError> {
    resources::find(name).ok_or_else(|| ApiError::not_found(format!("Unknown resource '{}'", name)))
}
