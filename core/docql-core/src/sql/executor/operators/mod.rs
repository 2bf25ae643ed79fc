//! Physical Operators Module

mod distinct;
mod filter;
mod hash_aggregate;
mod limit;
mod mutation;
mod physical_operator;
mod projection;
mod sort;
mod table_scan;
mod union;

pub use distinct::DistinctOperator;
pub use filter::FilterOperator;
pub use hash_aggregate::HashAggregateOperator;
pub use limit::{SkipOperator, TakeOperator, row_count};
pub use mutation::{DeleteOperator, InsertOperator, ReplaceOperator};
pub use physical_operator::{ExecContext, OneRowOperator, PhysicalOperator, Row, collect};
pub use projection::{ProjectionOperator, RenameOperator, SetOperator, UnsetOperator};
pub use sort::SortOperator;
pub use table_scan::{DocsOperator, IndexScanOperator, PkScanOperator, SeqScanOperator};
pub use union::{ConcatOperator, UnionOperator};
