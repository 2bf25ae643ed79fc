//! Table mutation operators — INSERT, UPDATE and DELETE sinks.
//!
//! Each operator drains its input before touching the table, so a scan
//! never observes rows written by the same statement. The rows written
//! are then replayed downstream (used by RETURNING).

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{DocqlError, DocqlResult};
use crate::sql::executor::operators::{PhysicalOperator, Row, collect};
use crate::sql::planner::OnConflict;
use crate::table::Table;

fn row_key(row: &Row, table: &Table) -> DocqlResult<Vec<u8>> {
    row.key
        .clone()
        .ok_or_else(|| DocqlError::invalid("row has no primary key", table.name().to_string()))
}

enum Stage {
    Pending(Box<dyn PhysicalOperator>),
    Written(VecDeque<Row>),
}

impl Stage {
    /// Runs `apply` once over the drained input, then yields its output.
    fn next(
        &mut self,
        apply: impl FnOnce(Vec<Row>) -> DocqlResult<VecDeque<Row>>,
    ) -> DocqlResult<Option<Row>> {
        if let Stage::Pending(input) = self {
            let rows = collect(input.as_mut())?;
            *self = Stage::Written(apply(rows)?);
        }
        match self {
            Stage::Written(out) => Ok(out.pop_front()),
            Stage::Pending(_) => Ok(None),
        }
    }
}

/// 삽입 연산자
pub struct InsertOperator {
    stage: Stage,
    table: Table,
    on_conflict: Option<OnConflict>,
}

impl InsertOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, table: Table, on_conflict: Option<OnConflict>) -> Self {
        Self {
            stage: Stage::Pending(input),
            table,
            on_conflict,
        }
    }
}

impl PhysicalOperator for InsertOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let table = &self.table;
        let on_conflict = self.on_conflict;
        self.stage.next(|rows| {
            let mut out = VecDeque::with_capacity(rows.len());
            for row in rows {
                if let Some((key, doc)) = table.insert_with(row.doc, on_conflict)? {
                    out.push_back(Row::new(Some(key), doc));
                }
            }
            debug!(table = table.name(), rows = out.len(), "insert applied");
            Ok(out)
        })
    }
}

/// 갱신 연산자 — replaces each input row at its key
pub struct ReplaceOperator {
    stage: Stage,
    table: Table,
}

impl ReplaceOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, table: Table) -> Self {
        Self {
            stage: Stage::Pending(input),
            table,
        }
    }
}

impl PhysicalOperator for ReplaceOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let table = &self.table;
        self.stage.next(|rows| {
            let mut out = VecDeque::with_capacity(rows.len());
            for row in rows {
                let key = row_key(&row, table)?;
                let doc = table.replace(&key, row.doc)?;
                out.push_back(Row::new(Some(key), doc));
            }
            debug!(table = table.name(), rows = out.len(), "update applied");
            Ok(out)
        })
    }
}

/// 삭제 연산자
pub struct DeleteOperator {
    stage: Stage,
    table: Table,
}

impl DeleteOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, table: Table) -> Self {
        Self {
            stage: Stage::Pending(input),
            table,
        }
    }
}

impl PhysicalOperator for DeleteOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let table = &self.table;
        self.stage.next(|rows| {
            let mut out = VecDeque::with_capacity(rows.len());
            for row in rows {
                let key = row_key(&row, table)?;
                table.delete(&key)?;
                out.push_back(row);
            }
            debug!(table = table.name(), rows = out.len(), "delete applied");
            Ok(out)
        })
    }
}
