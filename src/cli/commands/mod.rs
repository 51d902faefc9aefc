pub mod audit;
pub mod registry;
pub mod seed;
pub mod tenant;
