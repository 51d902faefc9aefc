pub mod audit;
pub mod manager;
pub mod models;
pub mod record;
pub mod repository;
pub mod retry;

pub use manager::{DatabaseError, DatabaseManager};
pub use record::{Record, RecordError, WriteMode};
pub use repository::{page_offset, Actor, ListParams, Page, Pagination, ResourceRepository};
pub use retry::with_retry;
