//! Database Engine Module

pub mod database;
pub mod options;
pub mod query;
pub mod transaction;

pub use database::{Database, MEMORY_PATH};
pub use options::{EngineKind, Options};
pub use query::{Param, PreparedStatement, QueryResult};
pub use transaction::Transaction;
