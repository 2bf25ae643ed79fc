//! Aggregate functions.

use crate::error::DocqlResult;
use crate::sql::executor::expr::{Env, eval};
use crate::sql::planner::Function;
use crate::value::Value;

/// Running state of one aggregate over a group.
#[derive(Debug, Clone)]
pub enum Aggregator {
    Count(i64),
    Min(Option<Value>),
    Max(Option<Value>),
    /// Integer sum until it overflows or meets a double.
    Sum {
        int: Option<i64>,
        double: Option<f64>,
    },
    Avg {
        total: f64,
        count: u64,
    },
}

impl Aggregator {
    /// `None` for non-aggregate functions.
    pub fn new(f: &Function) -> Option<Self> {
        Some(match f {
            Function::Count(_) => Aggregator::Count(0),
            Function::Min(_) => Aggregator::Min(None),
            Function::Max(_) => Aggregator::Max(None),
            Function::Sum(_) => Aggregator::Sum {
                int: None,
                double: None,
            },
            Function::Avg(_) => Aggregator::Avg { total: 0.0, count: 0 },
            _ => return None,
        })
    }

    /// Feeds the current row of `env` into the aggregate.
    pub fn feed(&mut self, f: &Function, env: &Env<'_>) -> DocqlResult<()> {
        let v = match f.argument() {
            Some(arg) => eval(arg, env)?,
            // COUNT(*)
            None => Value::Bool(true),
        };
        if v.is_null() {
            return Ok(());
        }
        match self {
            Aggregator::Count(n) => *n += 1,
            Aggregator::Min(cur) => {
                if cur.as_ref().is_none_or(|c| v < *c) {
                    *cur = Some(v);
                }
            }
            Aggregator::Max(cur) => {
                if cur.as_ref().is_none_or(|c| v > *c) {
                    *cur = Some(v);
                }
            }
            Aggregator::Sum { int, double } => match v {
                Value::Integer(i) => {
                    if let Some(d) = double {
                        *d += i as f64;
                    } else {
                        let acc = (*int).unwrap_or(0);
                        match acc.checked_add(i) {
                            Some(sum) => *int = Some(sum),
                            None => {
                                *double = Some(acc as f64 + i as f64);
                                *int = None;
                            }
                        }
                    }
                }
                Value::Double(d) => {
                    let base = double.unwrap_or(0.0) + int.take().map_or(0.0, |i| i as f64);
                    *double = Some(base + d);
                }
                _ => {}
            },
            Aggregator::Avg { total, count } => {
                if let Some(x) = v.as_f64() {
                    *total += x;
                    *count += 1;
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Value {
        match self {
            Aggregator::Count(n) => Value::Integer(n),
            Aggregator::Min(v) | Aggregator::Max(v) => v.unwrap_or(Value::Null),
            Aggregator::Sum { double: Some(d), .. } => Value::Double(d),
            Aggregator::Sum { int: Some(i), .. } => Value::Integer(i),
            Aggregator::Sum { .. } => Value::Null,
            Aggregator::Avg { count: 0, .. } => Value::Null,
            Aggregator::Avg { total, count } => Value::Double(total / count as f64),
        }
    }
}
