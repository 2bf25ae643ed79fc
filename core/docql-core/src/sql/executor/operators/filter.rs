//! Filter Operator — WHERE clause evaluation

use crate::error::DocqlResult;
use crate::sql::executor::expr::eval_predicate;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::Expr;

/// 필터 연산자 (WHERE 조건) — keeps rows whose predicate is truthy
pub struct FilterOperator {
    input: Box<dyn PhysicalOperator>,
    predicate: Expr,
    ctx: ExecContext,
}

impl FilterOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, predicate: Expr, ctx: ExecContext) -> Self {
        Self {
            input,
            predicate,
            ctx,
        }
    }
}

impl PhysicalOperator for FilterOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        while let Some(row) = self.input.next()? {
            let env = self.ctx.env().on_row(row.key.as_deref(), &row.doc);
            if eval_predicate(&self.predicate, &env)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}
