//! Rule 2: Constant Folding
//!
//! 상수 표현식을 미리 평가 (1 + 2 → 3). Bound parameters count as
//! constants, so `a > ?` becomes `a > 10` and can drive an index scan.

use crate::error::DocqlResult;
use crate::sql::executor::expr::{Env, eval};
use crate::sql::planner::{Expr, Stream, StreamOp};

use super::{OptimizationRule, OptimizerContext};

/// 상수 표현식을 미리 평가
pub struct ConstantFoldingRule;

impl OptimizationRule for ConstantFoldingRule {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn apply(&self, stream: Stream, ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        let env = Env::new(ctx.params);
        let ops = stream
            .ops
            .into_iter()
            .map(|op| match op {
                StreamOp::Filter(e) => StreamOp::Filter(fold(&e, &env)),
                other => other,
            })
            .collect();
        Ok(Stream::new(ops))
    }
}

/// Replaces every maximal constant subtree by its value. Subtrees whose
/// evaluation fails are kept so the error surfaces at execution.
pub(crate) fn fold(e: &Expr, env: &Env<'_>) -> Expr {
    e.map(&mut |node| {
        if matches!(node, Expr::Literal(_)) || !node.is_constant() {
            return None;
        }
        eval(node, env).ok().map(Expr::Literal)
    })
}
