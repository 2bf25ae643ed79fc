//! Rule 3: Remove truthy filters
//!
//! `filter(true)` and other constant truthy predicates are dropped.

use crate::error::DocqlResult;
use crate::sql::planner::{Expr, Stream, StreamOp};

use super::{OptimizationRule, OptimizerContext};

pub struct RemoveTruthyFilterRule;

impl OptimizationRule for RemoveTruthyFilterRule {
    fn name(&self) -> &str {
        "RemoveTruthyFilter"
    }

    fn apply(&self, mut stream: Stream, _ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        stream
            .ops
            .retain(|op| !matches!(op, StreamOp::Filter(Expr::Literal(v)) if v.is_truthy()));
        Ok(stream)
    }
}
