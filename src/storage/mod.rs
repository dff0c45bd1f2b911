pub mod database;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
pub use queries::*;
