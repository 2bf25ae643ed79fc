//! Projection Operators — SELECT lists and UPDATE actions

use crate::error::{DocqlError, DocqlResult};
use crate::sql::executor::expr::eval;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::{Expr, Projected};
use crate::value::{Document, Path};

/// 프로젝션 연산자 — builds one output document per row
pub struct ProjectionOperator {
    input: Box<dyn PhysicalOperator>,
    items: Vec<Projected>,
    ctx: ExecContext,
}

impl ProjectionOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, items: Vec<Projected>, ctx: ExecContext) -> Self {
        Self { input, items, ctx }
    }
}

impl PhysicalOperator for ProjectionOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(row) = self.input.next()? else {
            return Ok(None);
        };
        let env = self.ctx.env().on_row(row.key.as_deref(), &row.doc);
        let mut out = Document::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                Projected::Wildcard => {
                    for (name, value) in row.doc.iter() {
                        out.set(name, value.clone());
                    }
                }
                Projected::Expr { expr, .. } => out.set(item.name(), eval(expr, &env)?),
            }
        }
        Ok(Some(Row::new(row.key, out)))
    }
}

/// Renames the top-level fields of each row, in order.
pub struct RenameOperator {
    input: Box<dyn PhysicalOperator>,
    names: Vec<String>,
}

impl RenameOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, names: Vec<String>) -> Self {
        Self { input, names }
    }
}

impl PhysicalOperator for RenameOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(row) = self.input.next()? else {
            return Ok(None);
        };
        if row.doc.len() != self.names.len() {
            return Err(DocqlError::invalid(
                format!(
                    "cannot rename {} fields to {} names",
                    row.doc.len(),
                    self.names.len()
                ),
                self.names.join(", "),
            ));
        }
        let doc = self
            .names
            .iter()
            .cloned()
            .zip(row.doc.into_iter().map(|(_, v)| v))
            .collect();
        Ok(Some(Row::new(row.key, doc)))
    }
}

/// `UPDATE ... SET path = expr`
pub struct SetOperator {
    input: Box<dyn PhysicalOperator>,
    path: Path,
    expr: Expr,
    ctx: ExecContext,
}

impl SetOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, path: Path, expr: Expr, ctx: ExecContext) -> Self {
        Self {
            input,
            path,
            expr,
            ctx,
        }
    }
}

impl PhysicalOperator for SetOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(mut row) = self.input.next()? else {
            return Ok(None);
        };
        let value = eval(
            &self.expr,
            &self.ctx.env().on_row(row.key.as_deref(), &row.doc),
        )?;
        row.doc.set_path(&self.path, value)?;
        Ok(Some(row))
    }
}

/// `UPDATE ... UNSET path`
pub struct UnsetOperator {
    input: Box<dyn PhysicalOperator>,
    path: Path,
}

impl UnsetOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, path: Path) -> Self {
        Self { input, path }
    }
}

impl PhysicalOperator for UnsetOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(mut row) = self.input.next()? else {
            return Ok(None);
        };
        row.doc.delete_path(&self.path);
        Ok(Some(row))
    }
}
