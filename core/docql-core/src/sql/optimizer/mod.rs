//! SQL 쿼리 옵티마이저 — 규칙 기반 최적화
//!
//! Rewrites a [`Stream`] before execution. Rules run in order:
//! SplitAnd, ConstantFolding, RemoveTruthyFilter, IndexSelection.

mod constant_folding;
mod index_selection;
mod split_and;
mod truthy_filter;


use tracing::debug;

use crate::catalog::Catalog;
use crate::engine::query::Param;
use crate::error::DocqlResult;
use crate::sql::planner::{Stream, StreamOp};

pub use constant_folding::ConstantFoldingRule;
pub use index_selection::IndexSelectionRule;
pub use split_and::SplitAndRule;
pub use truthy_filter::RemoveTruthyFilterRule;

/// What the rules may consult: the schema and the bound parameters.
#[derive(Clone, Copy)]
pub struct OptimizerContext<'a> {
    pub catalog: &'a Catalog,
    pub params: &'a [Param],
}

/// 최적화 규칙 트레이트
pub trait OptimizationRule: Send + Sync {
    /// 규칙 이름
    fn name(&self) -> &str;

    /// Stream에 규칙 적용
    fn apply(&self, stream: Stream, ctx: &OptimizerContext<'_>) -> DocqlResult<Stream>;
}

/// 쿼리 옵티마이저
pub struct QueryOptimizer {
    rules: Vec<Box<dyn OptimizationRule>>,
}

impl QueryOptimizer {
    /// 기본 최적화 규칙으로 생성
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(SplitAndRule),
                Box::new(ConstantFoldingRule),
                Box::new(RemoveTruthyFilterRule),
                Box::new(IndexSelectionRule),
            ],
        }
    }

    /// 모든 규칙 적용
    pub fn optimize(&self, stream: Stream, ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        let optimized = self.apply_rules(stream, ctx)?;
        debug!(plan = %optimized, "optimized plan");
        Ok(optimized)
    }

    /// Branches of `union` and `concat` are optimized on their own first.
    fn apply_rules(&self, stream: Stream, ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        let branches = |streams: Vec<Stream>| -> DocqlResult<Vec<Stream>> {
            streams.into_iter().map(|s| self.apply_rules(s, ctx)).collect()
        };
        let ops = stream
            .ops
            .into_iter()
            .map(|op| match op {
                StreamOp::Union(streams) => Ok(StreamOp::Union(branches(streams)?)),
                StreamOp::Concat(streams) => Ok(StreamOp::Concat(branches(streams)?)),
                other => Ok(other),
            })
            .collect::<DocqlResult<Vec<_>>>()?;

        let mut optimized = Stream::new(ops);
        for rule in &self.rules {
            optimized = rule.apply(optimized, ctx)?;
        }
        Ok(optimized)
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
