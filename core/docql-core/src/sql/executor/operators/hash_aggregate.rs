//! Hash Aggregate Operator — GROUP BY and aggregate functions

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::error::DocqlResult;
use crate::sql::executor::expr::eval;
use crate::sql::executor::functions::Aggregator;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::{Expr, Function};
use crate::value::{Document, Value};

/// 해시 집계 연산자
///
/// Consumes its whole input on the first call. Each output row holds the
/// group value under the group expression's name, then one field per
/// aggregate named after the function (`COUNT(*)`). Groups come out in
/// value order. Without GROUP BY an empty input still yields one row.
pub struct HashAggregateOperator {
    input: Option<Box<dyn PhysicalOperator>>,
    group: Option<Expr>,
    functions: Vec<Function>,
    ctx: ExecContext,
    output: VecDeque<Row>,
}

impl HashAggregateOperator {
    pub fn new(
        input: Box<dyn PhysicalOperator>,
        group: Option<Expr>,
        functions: Vec<Function>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            input: Some(input),
            group,
            functions,
            ctx,
            output: VecDeque::new(),
        }
    }

    fn fresh(&self) -> Vec<Aggregator> {
        self.functions
            .iter()
            .filter_map(Aggregator::new)
            .collect()
    }

    fn aggregate(&mut self, mut input: Box<dyn PhysicalOperator>) -> DocqlResult<()> {
        let mut slots: AHashMap<Value, usize> = AHashMap::new();
        let mut groups: Vec<(Value, Vec<Aggregator>)> = Vec::new();

        while let Some(row) = input.next()? {
            let env = self.ctx.env().on_row(row.key.as_deref(), &row.doc);
            let key = match &self.group {
                Some(e) => eval(e, &env)?,
                None => Value::Null,
            };
            let slot = match slots.get(&key) {
                Some(&i) => i,
                None => {
                    groups.push((key.clone(), self.fresh()));
                    slots.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let aggregators = &mut groups[slot].1;
            for (f, agg) in self.functions.iter().zip(aggregators.iter_mut()) {
                agg.feed(f, &env)?;
            }
        }

        if groups.is_empty() && self.group.is_none() {
            groups.push((Value::Null, self.fresh()));
        }
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, aggregators) in groups {
            let mut doc = Document::with_capacity(self.functions.len() + 1);
            if let Some(e) = &self.group {
                doc.set(e.to_string(), key);
            }
            for (f, agg) in self.functions.iter().zip(aggregators) {
                doc.set(f.to_string(), agg.finish());
            }
            self.output.push_back(Row::new(None, doc));
        }
        Ok(())
    }
}

impl PhysicalOperator for HashAggregateOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        if let Some(input) = self.input.take() {
            self.aggregate(input)?;
        }
        Ok(self.output.pop_front())
    }
}
