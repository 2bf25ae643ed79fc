//! SQL Query Executor Module
//!
//! Turns a [`Stream`] into a chain of pull-based physical operators.

pub mod expr;
pub mod functions;
pub mod operators;

pub use expr::{Env, eval, eval_predicate};
pub use operators::{ExecContext, PhysicalOperator, Row};

use tracing::trace;

use crate::error::{DocqlError, DocqlResult};
use crate::sql::planner::{Stream, StreamOp};
use operators::*;

fn missing_input(op: &StreamOp) -> DocqlError {
    DocqlError::invalid("operator needs an input stream", op.to_string())
}

/// Builds the operator chain of `stream`. A stream with no source reads
/// a single empty row.
pub fn build(stream: &Stream, ctx: &ExecContext) -> DocqlResult<Box<dyn PhysicalOperator>> {
    trace!(plan = %stream, "building operators");
    let mut current: Option<Box<dyn PhysicalOperator>> = None;
    let mut ops = stream.ops.iter().peekable();

    while let Some(op) = ops.next() {
        let tx = &ctx.tx;
        let next: Box<dyn PhysicalOperator> = match op {
            StreamOp::SeqScan { table, reverse } => {
                Box::new(SeqScanOperator::new(&tx.table(table)?, *reverse)?)
            }
            StreamOp::PkScan {
                table,
                ranges,
                reverse,
            } => Box::new(PkScanOperator::new(tx.table(table)?, ranges.clone(), *reverse)),
            StreamOp::IndexScan {
                index,
                ranges,
                reverse,
            } => {
                let index = tx.index(index)?;
                let table = tx.table(&index.info.table_name)?;
                Box::new(IndexScanOperator::new(table, index, ranges.clone(), *reverse))
            }
            StreamOp::Docs(exprs) => Box::new(DocsOperator::new(ctx.clone(), exprs.clone())),
            StreamOp::Union(branches) => Box::new(UnionOperator::new(build_all(branches, ctx)?)),
            StreamOp::Concat(branches) => Box::new(ConcatOperator::new(build_all(branches, ctx)?)),
            _ => {
                let input = match current.take() {
                    Some(input) => input,
                    None if matches!(op, StreamOp::TableInsert { .. }) => {
                        return Err(missing_input(op));
                    }
                    None => Box::new(OneRowOperator::new()),
                };
                match op {
                    StreamOp::Filter(e) => Box::new(FilterOperator::new(input, e.clone(), ctx.clone())),
                    StreamOp::Distinct => Box::new(DistinctOperator::new(input)),
                    StreamOp::Project(items) => {
                        Box::new(ProjectionOperator::new(input, items.clone(), ctx.clone()))
                    }
                    StreamOp::Rename(names) => Box::new(RenameOperator::new(input, names.clone())),
                    StreamOp::Set(path, e) => {
                        Box::new(SetOperator::new(input, path.clone(), e.clone(), ctx.clone()))
                    }
                    StreamOp::Unset(path) => Box::new(UnsetOperator::new(input, path.clone())),
                    StreamOp::GroupBy(e) => {
                        // groupBy is always followed by hashAggregate
                        let functions = match ops.next() {
                            Some(StreamOp::HashAggregate(fns)) => fns.clone(),
                            _ => Vec::new(),
                        };
                        Box::new(HashAggregateOperator::new(
                            input,
                            Some(e.clone()),
                            functions,
                            ctx.clone(),
                        ))
                    }
                    StreamOp::HashAggregate(fns) => {
                        Box::new(HashAggregateOperator::new(input, None, fns.clone(), ctx.clone()))
                    }
                    StreamOp::Sort(e) => Box::new(SortOperator::new(input, e.clone(), false, ctx.clone())),
                    StreamOp::SortReverse(e) => {
                        Box::new(SortOperator::new(input, e.clone(), true, ctx.clone()))
                    }
                    StreamOp::Skip(e) => Box::new(SkipOperator::new(input, row_count(e, ctx, "OFFSET")?)),
                    StreamOp::Take(e) => Box::new(TakeOperator::new(input, row_count(e, ctx, "LIMIT")?)),
                    StreamOp::TableInsert { table, on_conflict } => {
                        Box::new(InsertOperator::new(input, tx.table(table)?, *on_conflict))
                    }
                    StreamOp::TableReplace(table) => Box::new(ReplaceOperator::new(input, tx.table(table)?)),
                    StreamOp::TableDelete(table) => Box::new(DeleteOperator::new(input, tx.table(table)?)),
                    source => return Err(missing_input(source)),
                }
            }
        };
        current = Some(next);
    }

    Ok(current.unwrap_or_else(|| Box::new(OneRowOperator::new())))
}

fn build_all(streams: &[Stream], ctx: &ExecContext) -> DocqlResult<Vec<Box<dyn PhysicalOperator>>> {
    streams.iter().map(|s| build(s, ctx)).collect()
}
