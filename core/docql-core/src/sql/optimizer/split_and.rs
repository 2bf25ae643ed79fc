//! Rule 1: Split AND
//!
//! `filter(a AND b)` → `filter(a) | filter(b)` so later rules see each
//! conjunct on its own.

use crate::error::DocqlResult;
use crate::sql::planner::{BinaryOp, Expr, Stream, StreamOp};

use super::{OptimizationRule, OptimizerContext};

pub struct SplitAndRule;

impl OptimizationRule for SplitAndRule {
    fn name(&self) -> &str {
        "SplitAnd"
    }

    fn apply(&self, stream: Stream, _ctx: &OptimizerContext<'_>) -> DocqlResult<Stream> {
        let mut ops = Vec::with_capacity(stream.ops.len());
        for op in stream.ops {
            match op {
                StreamOp::Filter(e) => {
                    let mut conjuncts = Vec::new();
                    split(e, &mut conjuncts);
                    ops.extend(conjuncts.into_iter().map(StreamOp::Filter));
                }
                other => ops.push(other),
            }
        }
        Ok(Stream::new(ops))
    }
}

fn split(e: Expr, out: &mut Vec<Expr>) {
    match e {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            split(*left, out);
            split(*right, out);
        }
        Expr::Paren(inner) if matches!(*inner, Expr::Binary { op: BinaryOp::And, .. }) => {
            split(*inner, out)
        }
        other => out.push(other),
    }
}
