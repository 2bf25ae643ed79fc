//! Sort Operator — ORDER BY clause handling
//!
//! Rows are buffered in memory up to the configured spill threshold. Larger
//! inputs are written to a transient storage engine keyed by the encoded
//! sort value, so the engine's key order does the sorting.

use tracing::debug;

use crate::encoding::{append_value, decode_document, encode_document};
use crate::error::{DocqlError, DocqlResult};
use crate::sql::executor::expr::eval;
use crate::sql::executor::operators::{ExecContext, PhysicalOperator, Row};
use crate::sql::planner::Expr;
use crate::storage::{IteratorOptions, StorageEngine, StorageTransaction, StoreIterator};
use crate::value::{Document, Value};

const SPILL_STORE: &[u8] = b"sort";

enum Sorted {
    Pending(Box<dyn PhysicalOperator>),
    Memory(std::vec::IntoIter<Row>),
    Spilled(Spill),
    Done,
}

/// Sort 연산자 (ORDER BY)
pub struct SortOperator {
    state: Sorted,
    expr: Expr,
    reverse: bool,
    ctx: ExecContext,
}

impl SortOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, expr: Expr, reverse: bool, ctx: ExecContext) -> Self {
        Self {
            state: Sorted::Pending(input),
            expr,
            reverse,
            ctx,
        }
    }

    fn sort_value(&self, row: &Row) -> DocqlResult<Value> {
        eval(&self.expr, &self.ctx.env().on_row(row.key.as_deref(), &row.doc))
    }

    fn materialize(&self, mut input: Box<dyn PhysicalOperator>) -> DocqlResult<Sorted> {
        let threshold = self.ctx.tx.shared().options.sort_spill_threshold;
        let mut buffer: Vec<(Value, Row)> = Vec::new();
        while let Some(row) = input.next()? {
            let v = self.sort_value(&row)?;
            buffer.push((v, row));
            if buffer.len() > threshold {
                return self.spill(buffer, input).map(Sorted::Spilled);
            }
        }
        // stable: ties keep input order
        if self.reverse {
            buffer.sort_by(|a, b| b.0.cmp(&a.0));
        } else {
            buffer.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let rows: Vec<Row> = buffer.into_iter().map(|(_, row)| row).collect();
        Ok(Sorted::Memory(rows.into_iter()))
    }

    fn spill(
        &self,
        buffer: Vec<(Value, Row)>,
        mut input: Box<dyn PhysicalOperator>,
    ) -> DocqlResult<Spill> {
        let engine = self.ctx.tx.shared().engine.new_transient()?;
        let kv = engine.begin(true, self.ctx.tx.cancel_token().clone())?;
        let mut spill = Spill {
            engine: Some(engine),
            kv: Some(kv),
            it: None,
        };
        spill.kv()?.create_store(SPILL_STORE)?;
        let store = spill.kv()?.get_store(SPILL_STORE)?;

        let reverse = self.reverse;
        let mut seq: u64 = 0;
        let mut put = |v: &Value, row: &Row| -> DocqlResult<()> {
            let mut key = Vec::with_capacity(32);
            append_value(&mut key, v);
            // ties come back in input order in both directions
            let tie = if reverse { !seq } else { seq };
            key.extend_from_slice(&tie.to_be_bytes());
            seq += 1;
            let pk = row.key.clone().map_or(Value::Null, Value::Blob);
            let entry = Document::new()
                .with("key", pk)
                .with("doc", Value::Document(row.doc.clone()));
            store.put(&key, &encode_document(&entry))
        };
        for (v, row) in &buffer {
            put(v, row)?;
        }
        drop(buffer);
        while let Some(row) = input.next()? {
            let v = self.sort_value(&row)?;
            put(&v, &row)?;
        }
        debug!(rows = seq, "sort spilled to transient storage");

        let mut it = store.iterator(IteratorOptions {
            reverse: self.reverse,
        });
        it.seek(&[]);
        spill.it = Some(it);
        Ok(spill)
    }
}

impl PhysicalOperator for SortOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        if let Sorted::Pending(_) = self.state {
            let Sorted::Pending(input) = std::mem::replace(&mut self.state, Sorted::Done) else {
                return Ok(None);
            };
            self.state = self.materialize(input)?;
        }
        match &mut self.state {
            Sorted::Memory(rows) => Ok(rows.next()),
            Sorted::Spilled(spill) => match spill.next()? {
                Some(row) => Ok(Some(row)),
                None => {
                    spill.finish()?;
                    self.state = Sorted::Done;
                    Ok(None)
                }
            },
            Sorted::Pending(_) | Sorted::Done => Ok(None),
        }
    }
}

/// Transient engine holding spilled rows; released on exhaustion or drop.
struct Spill {
    engine: Option<Box<dyn StorageEngine>>,
    kv: Option<Box<dyn StorageTransaction>>,
    it: Option<Box<dyn StoreIterator>>,
}

impl Spill {
    fn kv(&self) -> DocqlResult<&dyn StorageTransaction> {
        self.kv
            .as_deref()
            .ok_or(DocqlError::TransactionDiscarded)
    }

    fn next(&mut self) -> DocqlResult<Option<Row>> {
        let Some(it) = self.it.as_mut() else {
            return Ok(None);
        };
        if !it.valid() {
            it.close()?;
            return Ok(None);
        }
        let entry = match it.value() {
            Some(v) => decode_document(v)?,
            None => return Ok(None),
        };
        it.next();
        let key = match entry.get("key") {
            Some(Value::Blob(b)) => Some(b.clone()),
            _ => None,
        };
        match entry.get("doc") {
            Some(Value::Document(doc)) => Ok(Some(Row::new(key, doc.clone()))),
            _ => Err(DocqlError::encoding("spilled row without document")),
        }
    }

    fn finish(&mut self) -> DocqlResult<()> {
        self.it = None;
        if let Some(kv) = self.kv.take() {
            kv.rollback()?;
        }
        if let Some(engine) = self.engine.take() {
            engine.drop_transient()?;
        }
        Ok(())
    }
}

impl Drop for Spill {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            debug!(error = %e, "releasing sort spill failed");
        }
    }
}
