//! SQL 논리 플래너 — statements to operator streams
//!
//! The planner resolves tables against the transaction's catalog and lays
//! out the canonical pipeline of each statement:
//!
//! ```text
//! SELECT  scan | filter | [groupBy | hashAggregate] | sort | skip | take | project
//! DISTINCT  scan | filter | [groupBy | hashAggregate] | project | distinct | sort | skip | take
//! UNION   union(core, core) | sort | skip | take    (UNION ALL: concat)
//! INSERT  docs | tableInsert [| project]
//! UPDATE  scan | filter | set... | tableReplace
//! DELETE  scan | filter | tableDelete
//! ```
//!
//! Index selection and predicate rewriting are left to the optimizer.

use tracing::trace;

use crate::catalog::Catalog;
use crate::error::{DocqlError, DocqlResult};
use crate::sql::planner::stream::{Stream, StreamOp};
use crate::sql::planner::types::*;
use crate::value::Path;

/// 논리 플래너
pub struct LogicalPlanner<'a> {
    catalog: &'a Catalog,
}

impl<'a> LogicalPlanner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Plans a query or mutation. DDL and transaction control have no
    /// stream and are rejected.
    pub fn plan(&self, statement: &Statement) -> DocqlResult<Stream> {
        let stream = match statement {
            Statement::Select(select) => self.plan_select(select)?,
            Statement::Insert(insert) => self.plan_insert(insert)?,
            Statement::Update(update) => self.plan_update(update)?,
            Statement::Delete(delete) => self.plan_delete(delete)?,
            _ => {
                return Err(DocqlError::invalid(
                    "statement has no query plan",
                    "planner",
                ));
            }
        };
        trace!(plan = %stream, "logical plan");
        Ok(stream)
    }

    fn scan(&self, table: &str, writing: bool) -> DocqlResult<StreamOp> {
        let info = self.catalog.get_table(table)?;
        if writing && info.read_only {
            return Err(DocqlError::ReadOnlyTable(info.name.clone()));
        }
        Ok(StreamOp::SeqScan {
            table: info.name.clone(),
            reverse: false,
        })
    }

    fn plan_select(&self, select: &SelectStmt) -> DocqlResult<Stream> {
        if select.compound.is_empty() {
            return self.plan_core(select, true);
        }
        let mut stream = self.plan_core(select, false)?;
        for (op, core) in &select.compound {
            let branch = self.plan_core(core, false)?;
            stream = combine(stream, *op, branch);
        }
        // ORDER BY sees the combined rows, aliases are plain fields there
        if let Some(o) = &select.order_by {
            let e = output_field(&o.expr, &select.projection)?;
            stream.push(if o.desc {
                StreamOp::SortReverse(e)
            } else {
                StreamOp::Sort(e)
            });
        }
        push_window(&mut stream, select);
        Ok(stream)
    }

    /// One SELECT core. `tail` adds its ORDER BY, OFFSET and LIMIT.
    fn plan_core(&self, select: &SelectStmt, tail: bool) -> DocqlResult<Stream> {
        let mut stream = Stream::default();
        if let Some(table) = &select.from {
            stream.push(self.scan(table, false)?);
        }
        if let Some(w) = &select.where_clause {
            if w.contains_aggregate() {
                return Err(DocqlError::invalid(
                    "aggregate functions are not allowed in WHERE",
                    w.to_string(),
                ));
            }
            stream.push(StreamOp::Filter(w.clone()));
        }

        let order_by = select
            .order_by
            .as_ref()
            .filter(|_| tail)
            .map(|o| (resolve_alias(&o.expr, &select.projection), o.desc));

        let aggregated = select.group_by.is_some()
            || select.projection.iter().any(|p| match p {
                Projected::Expr { expr, .. } => expr.contains_aggregate(),
                Projected::Wildcard => false,
            })
            || order_by.as_ref().is_some_and(|(e, _)| e.contains_aggregate());

        let (projection, order_by) = if aggregated {
            let mut rewriter = AggregateRewriter::new(select.group_by.as_ref());
            let mut projection = Vec::with_capacity(select.projection.len());
            for item in &select.projection {
                let Projected::Expr { expr, alias } = item else {
                    return Err(DocqlError::invalid(
                        "wildcard cannot be used with aggregation",
                        "SELECT *",
                    ));
                };
                let rewritten = rewriter.rewrite(expr)?;
                // keep the name the user wrote
                let alias = alias.clone().or_else(|| {
                    let name = expr.to_string();
                    (rewritten.to_string() != name).then_some(name)
                });
                projection.push(Projected::Expr {
                    expr: rewritten,
                    alias,
                });
            }
            let order_by = match order_by {
                Some((e, desc)) => Some((rewriter.rewrite(&e)?, desc)),
                None => None,
            };
            if let Some(g) = &select.group_by {
                stream.push(StreamOp::GroupBy(g.clone()));
            }
            stream.push(StreamOp::HashAggregate(rewriter.functions));
            (projection, order_by)
        } else {
            (select.projection.clone(), order_by)
        };

        if select.distinct {
            // duplicates are judged on the projected rows
            if projection != [Projected::Wildcard] {
                stream.push(StreamOp::Project(projection));
            }
            stream.push(StreamOp::Distinct);
            if let Some(o) = select.order_by.as_ref().filter(|_| tail) {
                let e = output_field(&o.expr, &select.projection)?;
                stream.push(if o.desc {
                    StreamOp::SortReverse(e)
                } else {
                    StreamOp::Sort(e)
                });
            }
            if tail {
                push_window(&mut stream, select);
            }
            return Ok(stream);
        }

        if let Some((e, desc)) = order_by {
            stream.push(if desc {
                StreamOp::SortReverse(e)
            } else {
                StreamOp::Sort(e)
            });
        }
        if tail {
            push_window(&mut stream, select);
        }
        if projection != [Projected::Wildcard] {
            stream.push(StreamOp::Project(projection));
        }
        Ok(stream)
    }

    fn plan_insert(&self, insert: &InsertStmt) -> DocqlResult<Stream> {
        let info = self.catalog.get_table(&insert.table)?;
        if info.read_only {
            return Err(DocqlError::ReadOnlyTable(info.name.clone()));
        }
        let mut stream = match &insert.source {
            InsertSource::Values(values) => Stream::new(vec![StreamOp::Docs(values.clone())]),
            InsertSource::Select(select) => {
                let mut stream = self.plan_select(select)?;
                if !insert.fields.is_empty() {
                    stream.push(StreamOp::Rename(insert.fields.clone()));
                }
                stream
            }
        };
        stream.push(StreamOp::TableInsert {
            table: info.name.clone(),
            on_conflict: insert.on_conflict,
        });
        if !insert.returning.is_empty() {
            stream.push(StreamOp::Project(insert.returning.clone()));
        }
        Ok(stream)
    }

    fn plan_update(&self, update: &UpdateStmt) -> DocqlResult<Stream> {
        let mut stream = Stream::new(vec![self.scan(&update.table, true)?]);
        if let Some(w) = &update.where_clause {
            stream.push(StreamOp::Filter(w.clone()));
        }
        match &update.action {
            UpdateAction::Set(pairs) => {
                for (path, e) in pairs {
                    if e.contains_aggregate() {
                        return Err(DocqlError::invalid(
                            "aggregate functions are not allowed in SET",
                            e.to_string(),
                        ));
                    }
                    stream.push(StreamOp::Set(path.clone(), e.clone()));
                }
            }
            UpdateAction::Unset(paths) => {
                for path in paths {
                    stream.push(StreamOp::Unset(path.clone()));
                }
            }
        }
        stream.push(StreamOp::TableReplace(update.table.clone()));
        Ok(stream)
    }

    fn plan_delete(&self, delete: &DeleteStmt) -> DocqlResult<Stream> {
        let mut stream = Stream::new(vec![self.scan(&delete.table, true)?]);
        if let Some(w) = &delete.where_clause {
            stream.push(StreamOp::Filter(w.clone()));
        }
        stream.push(StreamOp::TableDelete(delete.table.clone()));
        Ok(stream)
    }
}

fn push_window(stream: &mut Stream, select: &SelectStmt) {
    if let Some(offset) = &select.offset {
        stream.push(StreamOp::Skip(offset.clone()));
    }
    if let Some(limit) = &select.limit {
        stream.push(StreamOp::Take(limit.clone()));
    }
}

/// Adds `branch` to `acc`, extending the last set operation when it is
/// the same kind.
fn combine(acc: Stream, op: CompoundOp, branch: Stream) -> Stream {
    let mut ops = acc.ops;
    match (op, ops.as_mut_slice()) {
        (CompoundOp::Union, [StreamOp::Union(branches)])
        | (CompoundOp::UnionAll, [StreamOp::Concat(branches)]) => {
            branches.push(branch);
            return Stream::new(ops);
        }
        _ => {}
    }
    let branches = vec![Stream::new(ops), branch];
    Stream::new(vec![match op {
        CompoundOp::Union => StreamOp::Union(branches),
        CompoundOp::UnionAll => StreamOp::Concat(branches),
    }])
}

/// Sort key over already projected rows. A projected expression maps to
/// the field it was stored under; other expressions must only use paths.
fn output_field(e: &Expr, projection: &[Projected]) -> DocqlResult<Expr> {
    let projected = projection.iter().find(|item| match item {
        Projected::Expr { expr, .. } => expr.unwrap_paren() == e.unwrap_paren(),
        Projected::Wildcard => false,
    });
    if let Some(item) = projected {
        return Ok(Expr::Path(Path::field(item.name())));
    }
    if e.contains_aggregate() || e.any(&|n| matches!(n, Expr::Function(Function::Pk))) {
        return Err(DocqlError::invalid(
            "ORDER BY of a DISTINCT or UNION query must use selected fields",
            e.to_string(),
        ));
    }
    Ok(e.clone())
}

/// `ORDER BY x` where `x` is a projection alias sorts by the aliased
/// expression.
fn resolve_alias(e: &Expr, projection: &[Projected]) -> Expr {
    let Expr::Path(p) = e else {
        return e.clone();
    };
    if p.len() != 1 {
        return e.clone();
    }
    let Some(name) = p.first_field() else {
        return e.clone();
    };
    projection
        .iter()
        .find_map(|item| match item {
            Projected::Expr {
                expr,
                alias: Some(alias),
            } if alias == name => Some(expr.clone()),
            _ => None,
        })
        .unwrap_or_else(|| e.clone())
}

/// Replaces aggregate calls and the group expression by references to the
/// fields `hashAggregate` emits, collecting the aggregates to compute.
struct AggregateRewriter<'a> {
    group: Option<&'a Expr>,
    functions: Vec<Function>,
}

impl<'a> AggregateRewriter<'a> {
    fn new(group: Option<&'a Expr>) -> Self {
        Self {
            group,
            functions: Vec::new(),
        }
    }

    fn rewrite(&mut self, e: &Expr) -> DocqlResult<Expr> {
        let group = self.group;
        let functions = &mut self.functions;
        let mut stray: Option<String> = None;
        let rewritten = e.map(&mut |node| {
            if group.is_some_and(|g| g.unwrap_paren() == node.unwrap_paren()) {
                return Some(Expr::Path(Path::field(node.unwrap_paren().to_string())));
            }
            match node {
                Expr::Function(f) if f.is_aggregate() => {
                    if !functions.contains(f) {
                        functions.push(f.clone());
                    }
                    Some(Expr::Path(Path::field(f.to_string())))
                }
                Expr::Path(_) | Expr::Function(Function::Pk) => {
                    stray.get_or_insert_with(|| node.to_string());
                    None
                }
                _ => None,
            }
        });
        match stray {
            Some(field) => Err(DocqlError::invalid(
                format!("field {field} must appear in the GROUP BY clause or be used in an aggregate function"),
                e.to_string(),
            )),
            None => Ok(rewritten),
        }
    }
}
