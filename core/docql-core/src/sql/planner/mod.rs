//! SQL 플래너 모듈
//!
//! Statements become [`Stream`]s: linear pipelines of operators that the
//! optimizer rewrites and the executor runs.

pub mod logical;
pub mod stream;
pub mod types;

pub use logical::LogicalPlanner;
pub use stream::{Range, Stream, StreamOp};
pub use types::*;
