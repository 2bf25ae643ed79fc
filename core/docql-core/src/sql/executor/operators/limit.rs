//! Skip and Take Operators — OFFSET / LIMIT clause handling

use crate::error::{DocqlError, DocqlResult};
use crate::sql::executor::expr::eval;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::Expr;
use crate::value::Value;

/// Evaluates a LIMIT or OFFSET expression to a row count.
pub fn row_count(expr: &Expr, ctx: &ExecContext, clause: &str) -> DocqlResult<u64> {
    match eval(expr, &ctx.env())? {
        Value::Integer(n) if n >= 0 => Ok(n as u64),
        Value::Double(d) if d >= 0.0 && d.fract() == 0.0 => Ok(d as u64),
        other => Err(DocqlError::invalid(
            format!("{clause} expects a non-negative integer, got {other}"),
            expr.to_string(),
        )),
    }
}

/// OFFSET 연산자
pub struct SkipOperator {
    input: Box<dyn PhysicalOperator>,
    remaining: u64,
}

impl SkipOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, count: u64) -> Self {
        Self {
            input,
            remaining: count,
        }
    }
}

impl PhysicalOperator for SkipOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        while self.remaining > 0 {
            if self.input.next()?.is_none() {
                self.remaining = 0;
                return Ok(None);
            }
            self.remaining -= 1;
        }
        self.input.next()
    }
}

/// LIMIT 연산자
pub struct TakeOperator {
    input: Box<dyn PhysicalOperator>,
    remaining: u64,
}

impl TakeOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, count: u64) -> Self {
        Self {
            input,
            remaining: count,
        }
    }
}

impl PhysicalOperator for TakeOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        // Already reached the limit
        if self.remaining == 0 {
            return Ok(None);
        }
        let row = self.input.next()?;
        if row.is_some() {
            self.remaining -= 1;
        }
        Ok(row)
    }
}
