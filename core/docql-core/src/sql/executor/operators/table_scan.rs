//! Scan operators — full table, primary key ranges, index ranges, and
//! literal documents.

use crate::encoding::decode_values;
use crate::error::{DocqlError, DocqlResult};
use crate::index::{Index, IndexCursor};
use crate::sql::executor::expr::eval;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::{Expr, Range};
use crate::table::{Table, TableCursor};
use crate::value::Value;

/// 순차 스캔
pub struct SeqScanOperator {
    cursor: TableCursor,
}

impl SeqScanOperator {
    pub fn new(table: &Table, reverse: bool) -> DocqlResult<Self> {
        Ok(SeqScanOperator {
            cursor: table.cursor(reverse)?,
        })
    }
}

impl PhysicalOperator for SeqScanOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        Ok(self
            .cursor
            .next_row()?
            .map(|(key, doc)| Row::new(Some(key), doc)))
    }
}

/// Visits ranges in scan order: reverse scans walk them backwards.
struct RangeWalk {
    ranges: Vec<Range>,
    reverse: bool,
    pos: usize,
}

impl RangeWalk {
    fn new(ranges: Vec<Range>, reverse: bool) -> Self {
        RangeWalk {
            ranges,
            reverse,
            pos: 0,
        }
    }

    fn current(&self) -> Option<&Range> {
        if self.pos >= self.ranges.len() {
            return None;
        }
        let i = if self.reverse {
            self.ranges.len() - 1 - self.pos
        } else {
            self.pos
        };
        self.ranges.get(i)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

fn reverse_pivot(mut pivot: Vec<u8>) -> Vec<u8> {
    if !pivot.is_empty() {
        pivot.push(0xff);
    }
    pivot
}

/// 기본 키 범위 스캔
pub struct PkScanOperator {
    table: Table,
    walk: RangeWalk,
    cursor: Option<TableCursor>,
}

impl PkScanOperator {
    pub fn new(table: Table, ranges: Vec<Range>, reverse: bool) -> Self {
        PkScanOperator {
            table,
            walk: RangeWalk::new(ranges, reverse),
            cursor: None,
        }
    }
}

impl PhysicalOperator for PkScanOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        loop {
            let Some(range) = self.walk.current() else {
                return Ok(None);
            };
            let reverse = self.walk.reverse;
            if self.cursor.is_none() {
                let pivot = range.seek_pivot(reverse);
                let pivot = if reverse { reverse_pivot(pivot) } else { pivot };
                self.cursor = Some(self.table.cursor_from(&pivot, reverse)?);
            }
            let next = match self.cursor.as_mut() {
                Some(c) => c.next_row()?,
                None => None,
            };
            let Some((key, doc)) = next else {
                self.cursor = None;
                self.walk.advance();
                continue;
            };
            let values = decode_values(&key)?;
            if range.is_past(&values, reverse) {
                self.cursor = None;
                self.walk.advance();
                continue;
            }
            if range.contains(&values) {
                return Ok(Some(Row::new(Some(key), doc)));
            }
        }
    }
}

/// 인덱스 범위 스캔
pub struct IndexScanOperator {
    table: Table,
    index: Index,
    walk: RangeWalk,
    cursor: Option<IndexCursor>,
}

impl IndexScanOperator {
    pub fn new(table: Table, index: Index, ranges: Vec<Range>, reverse: bool) -> Self {
        IndexScanOperator {
            table,
            index,
            walk: RangeWalk::new(ranges, reverse),
            cursor: None,
        }
    }
}

impl PhysicalOperator for IndexScanOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        loop {
            let Some(range) = self.walk.current() else {
                return Ok(None);
            };
            let reverse = self.walk.reverse;
            if self.cursor.is_none() {
                let pivot = range.seek_pivot(reverse);
                self.cursor = Some(if reverse {
                    self.index.descend_from(&pivot)
                } else {
                    self.index.ascend_from(&pivot)
                });
            }
            let next = match self.cursor.as_mut() {
                Some(c) => c.next_entry()?,
                None => None,
            };
            let Some((values, pk)) = next else {
                self.cursor = None;
                self.walk.advance();
                continue;
            };
            if range.is_past(&values, reverse) {
                self.cursor = None;
                self.walk.advance();
                continue;
            }
            if range.contains(&values) {
                let doc = self.table.get(&pk)?;
                return Ok(Some(Row::new(Some(pk), doc)));
            }
        }
    }
}

/// Rows produced by evaluating document expressions.
pub struct DocsOperator {
    ctx: ExecContext,
    exprs: Vec<Expr>,
    pos: usize,
}

impl DocsOperator {
    pub fn new(ctx: ExecContext, exprs: Vec<Expr>) -> Self {
        DocsOperator { ctx, exprs, pos: 0 }
    }
}

impl PhysicalOperator for DocsOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(expr) = self.exprs.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        match eval(expr, &self.ctx.env())? {
            Value::Document(doc) => Ok(Some(Row::new(None, doc))),
            other => Err(DocqlError::type_mismatch("document", other.value_type())),
        }
    }
}
