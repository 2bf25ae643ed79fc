// SQL 모듈 진입점
pub mod executor;
pub mod optimizer;
pub mod parser;
pub mod planner;

pub use executor::{ExecContext, PhysicalOperator, Row};
pub use optimizer::{OptimizationRule, OptimizerContext, QueryOptimizer};
pub use parser::{SqlParser, parse_expr, parse_path, parse_query, parse_statement};
pub use planner::{Expr, LogicalPlanner, Statement, Stream, StreamOp};
