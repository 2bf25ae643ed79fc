//! Physical Operator Trait — Volcano Execution Model

use std::sync::Arc;

use crate::engine::query::Param;
use crate::engine::transaction::Transaction;
use crate::error::DocqlResult;
use crate::sql::executor::expr::Env;
use crate::value::Document;

/// One row flowing through a pipeline. `key` is the encoded primary key
/// for rows read from a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: Option<Vec<u8>>,
    pub doc: Document,
}

impl Row {
    pub fn new(key: Option<Vec<u8>>, doc: Document) -> Self {
        Row { key, doc }
    }
}

/// 물리 연산자 트레이트 — Volcano 실행 모델 (Pull 기반)
pub trait PhysicalOperator {
    /// 다음 행 반환 (None이면 끝)
    fn next(&mut self) -> DocqlResult<Option<Row>>;
}

/// State shared by the operators of one pipeline.
#[derive(Clone)]
pub struct ExecContext {
    pub tx: Transaction,
    pub params: Arc<[Param]>,
}

impl ExecContext {
    pub fn new(tx: Transaction, params: Arc<[Param]>) -> Self {
        ExecContext { tx, params }
    }

    pub fn env(&self) -> Env<'_> {
        Env::new(&self.params).tx(Some(&self.tx))
    }
}

/// Drains an operator into a vector.
pub fn collect(op: &mut dyn PhysicalOperator) -> DocqlResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = op.next()? {
        rows.push(row);
    }
    Ok(rows)
}

/// Source of `SELECT` without `FROM`: a single empty row.
pub struct OneRowOperator {
    done: bool,
}

impl OneRowOperator {
    pub fn new() -> Self {
        OneRowOperator { done: false }
    }
}

impl Default for OneRowOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalOperator for OneRowOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Row::new(None, Document::new())))
    }
}
