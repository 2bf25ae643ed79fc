//! Tables — documents keyed by their encoded primary key.
//!
//! A table owns one store. Keys are the concatenated encoding of the
//! primary key values, or of an integer docid drawn from the table's
//! private sequence when no primary key is declared. Every write keeps the
//! table's indexes in step within the same transaction.

use std::sync::Arc;

use tracing::trace;

use crate::catalog::TableInfo;
use crate::encoding::{decode_document, encode_document, encode_key};
use crate::engine::transaction::Transaction;
use crate::error::{DocqlError, DocqlResult};
use crate::index::Index;
use crate::sql::executor::expr::{Env, eval};
use crate::sql::planner::OnConflict;
use crate::storage::{IteratorOptions, Store, StoreIterator};
use crate::value::{Document, Value};

/// 테이블 핸들
pub struct Table {
    tx: Transaction,
    pub info: Arc<TableInfo>,
    store: Box<dyn Store>,
}

impl Table {
    pub(crate) fn new(tx: Transaction, info: Arc<TableInfo>, store: Box<dyn Store>) -> Self {
        Table { tx, info, store }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    fn ensure_mutable(&self) -> DocqlResult<()> {
        self.tx.ensure_writable()?;
        if self.info.read_only {
            return Err(DocqlError::ReadOnlyTable(self.info.name.clone()));
        }
        Ok(())
    }

    /// Applies field constraints and CHECK clauses to `doc`.
    pub fn validate(&self, doc: Document) -> DocqlResult<Document> {
        let env = Env::with_tx(&self.tx);
        let doc = self.info.validate(doc, &mut |e| eval(e, &env))?;
        for check in &self.info.checks {
            let result = eval(check, &Env::with_tx(&self.tx).on_doc(&doc))?;
            // NULL passes
            if !result.is_null() && !result.is_truthy() {
                return Err(DocqlError::CheckViolation {
                    table: self.info.name.clone(),
                    check: check.to_string(),
                });
            }
        }
        Ok(doc)
    }

    /// Encoded primary key of `doc`; draws a docid when the table has no
    /// declared primary key.
    fn key_for(&self, doc: &Document) -> DocqlResult<Vec<u8>> {
        if let Some(values) = self.info.pk_values(doc)? {
            return Ok(encode_key(&values));
        }
        let seq = self.info.docid_sequence.as_deref().ok_or_else(|| {
            DocqlError::invalid("table has neither primary key nor docid sequence", self.info.name.clone())
        })?;
        let docid = self.tx.next_sequence_value(seq)?;
        Ok(encode_key(&[Value::Integer(docid)]))
    }

    fn indexes(&self) -> DocqlResult<Vec<Index>> {
        self.tx.indexes_of(&self.info.name)
    }

    /// First unique index already holding the values of `doc` under a key
    /// other than `key`.
    fn unique_conflict(
        &self,
        indexes: &[Index],
        key: &[u8],
        doc: &Document,
    ) -> DocqlResult<Option<(String, Vec<u8>)>> {
        for idx in indexes.iter().filter(|i| i.info.unique) {
            let values = idx.values_of(doc)?;
            if let Some(existing) = idx.conflict(&values)? {
                if existing != key {
                    return Ok(Some((idx.info.name.clone(), existing)));
                }
            }
        }
        Ok(None)
    }

    fn write(&self, indexes: &[Index], key: &[u8], doc: &Document) -> DocqlResult<()> {
        self.store.put(key, &encode_document(doc))?;
        for idx in indexes {
            idx.set(&idx.values_of(doc)?, key)?;
        }
        Ok(())
    }

    fn unindex(&self, indexes: &[Index], key: &[u8], doc: &Document) -> DocqlResult<()> {
        for idx in indexes {
            idx.delete(&idx.values_of(doc)?, key)?;
        }
        Ok(())
    }

    /// Inserts `doc` and returns its key and stored form.
    pub fn insert(&self, doc: Document) -> DocqlResult<(Vec<u8>, Document)> {
        self.insert_with(doc, None)?
            .ok_or_else(|| DocqlError::DuplicateKey {
                table: self.info.name.clone(),
            })
    }

    /// Inserts `doc`, resolving key and unique conflicts per `on_conflict`.
    /// Returns `None` when the row was skipped by `DO NOTHING`.
    pub fn insert_with(
        &self,
        doc: Document,
        on_conflict: Option<OnConflict>,
    ) -> DocqlResult<Option<(Vec<u8>, Document)>> {
        self.ensure_mutable()?;
        let doc = self.validate(doc)?;
        let key = self.key_for(&doc)?;

        if self.store.contains(&key)? {
            return match on_conflict {
                None => Err(DocqlError::DuplicateKey {
                    table: self.info.name.clone(),
                }),
                Some(OnConflict::DoNothing) => Ok(None),
                Some(OnConflict::DoReplace) => {
                    let doc = self.replace_validated(&key, doc)?;
                    Ok(Some((key, doc)))
                }
            };
        }

        let indexes = self.indexes()?;
        if let Some((index, existing)) = self.unique_conflict(&indexes, &key, &doc)? {
            match on_conflict {
                None => return Err(DocqlError::UniqueViolation { index }),
                Some(OnConflict::DoNothing) => return Ok(None),
                Some(OnConflict::DoReplace) => {
                    self.delete(&existing)?;
                    if let Some((index, _)) = self.unique_conflict(&indexes, &key, &doc)? {
                        return Err(DocqlError::UniqueViolation { index });
                    }
                }
            }
        }

        self.write(&indexes, &key, &doc)?;
        trace!(table = %self.info.name, "row inserted");
        Ok(Some((key, doc)))
    }

    pub fn get(&self, key: &[u8]) -> DocqlResult<Document> {
        self.tx.ensure_active()?;
        decode_document(&self.store.get(key)?)
    }

    pub fn exists(&self, key: &[u8]) -> DocqlResult<bool> {
        self.tx.ensure_active()?;
        self.store.contains(key)
    }

    /// Deletes the row and its index entries; `KeyNotFound` if missing.
    pub fn delete(&self, key: &[u8]) -> DocqlResult<()> {
        self.ensure_mutable()?;
        let old = self.get(key)?;
        self.unindex(&self.indexes()?, key, &old)?;
        self.store.delete(key)
    }

    /// Replaces the row stored at `key`. The primary key cannot change.
    pub fn replace(&self, key: &[u8], doc: Document) -> DocqlResult<Document> {
        self.ensure_mutable()?;
        let doc = self.validate(doc)?;
        self.replace_validated(key, doc)
    }

    fn replace_validated(&self, key: &[u8], doc: Document) -> DocqlResult<Document> {
        let old = self.get(key)?;
        if let Some(values) = self.info.pk_values(&doc)? {
            if encode_key(&values) != key {
                return Err(DocqlError::invalid(
                    "primary key fields cannot be modified",
                    self.info.name.clone(),
                ));
            }
        }
        let indexes = self.indexes()?;
        if let Some((index, _)) = self.unique_conflict(&indexes, key, &doc)? {
            return Err(DocqlError::UniqueViolation { index });
        }
        self.unindex(&indexes, key, &old)?;
        self.write(&indexes, key, &doc)?;
        Ok(doc)
    }

    /// Removes every row and index entry.
    pub fn truncate(&self) -> DocqlResult<()> {
        self.ensure_mutable()?;
        for idx in self.indexes()? {
            idx.truncate()?;
        }
        self.store.truncate()
    }

    /// Full scan in key order.
    pub fn cursor(&self, reverse: bool) -> DocqlResult<TableCursor> {
        self.cursor_from(&[], reverse)
    }

    /// Scan starting at `pivot`: first key `>= pivot` ascending, last key
    /// `<= pivot` descending.
    pub fn cursor_from(&self, pivot: &[u8], reverse: bool) -> DocqlResult<TableCursor> {
        self.tx.ensure_active()?;
        let mut it = self.store.iterator(IteratorOptions { reverse });
        it.seek(pivot);
        Ok(TableCursor { it })
    }
}

/// Decoding cursor over a table's rows.
pub struct TableCursor {
    it: Box<dyn StoreIterator>,
}

impl TableCursor {
    pub fn next_row(&mut self) -> DocqlResult<Option<(Vec<u8>, Document)>> {
        if !self.it.valid() {
            self.it.close()?;
            return Ok(None);
        }
        let row = match (self.it.key(), self.it.value()) {
            (Some(k), Some(v)) => (k.to_vec(), decode_document(v)?),
            _ => return Ok(None),
        };
        self.it.next();
        Ok(Some(row))
    }

    /// Current key without consuming it.
    pub fn peek_key(&self) -> Option<&[u8]> {
        if self.it.valid() { self.it.key() } else { None }
    }
}
