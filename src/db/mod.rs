//! Database layer - connection pooling and the fixed application schema

pub mod pool;
pub mod schema;

pub use pool::Pool;
pub use schema::app_tables;
