//! Secondary indexes.
//!
//! Each index owns one store. An entry key is the concatenated encoding of
//! the indexed values followed by the encoded primary key of the row, so
//! entries sharing values stay distinct and sort by primary key. The entry
//! value is the raw primary key.
//!
//! ```text
//! key   = enc(v1) enc(v2) ... enc(blob(pk))
//! value = pk
//! ```

use std::sync::Arc;

use crate::catalog::IndexInfo;
use crate::encoding::{append_value, decode_prefix, encode_equality_prefix, encode_values};
use crate::error::{DocqlError, DocqlResult};
use crate::storage::{IteratorOptions, Store, StoreIterator};
use crate::table::Table;
use crate::value::{Document, Value};

/// Index handle bound to one transaction's store.
pub struct Index {
    pub info: Arc<IndexInfo>,
    store: Box<dyn Store>,
}

impl Index {
    pub(crate) fn new(info: Arc<IndexInfo>, store: Box<dyn Store>) -> Self {
        Index { info, store }
    }

    pub fn arity(&self) -> usize {
        self.info.paths.len()
    }

    fn entry_key(values: &[Value], pk: &[u8]) -> Vec<u8> {
        let mut key = encode_values(values);
        append_value(&mut key, &Value::Blob(pk.to_vec()));
        key
    }

    fn check_arity(&self, values: &[Value]) -> DocqlResult<()> {
        if values.len() != self.arity() {
            return Err(DocqlError::invalid(
                format!(
                    "index expects {} values, got {}",
                    self.arity(),
                    values.len()
                ),
                self.info.name.clone(),
            ));
        }
        Ok(())
    }

    /// Indexed values of `doc` converted to the declared types.
    pub fn values_of(&self, doc: &Document) -> DocqlResult<Vec<Value>> {
        self.info.values_of(doc)
    }

    /// Adds the entry `values -> pk`. Uniqueness is checked by the table
    /// before any write through [`Index::conflict`].
    pub fn set(&self, values: &[Value], pk: &[u8]) -> DocqlResult<()> {
        self.check_arity(values)?;
        self.store.put(&Self::entry_key(values, pk), pk)
    }

    /// Removes the entry `values -> pk`; a missing entry is not an error.
    pub fn delete(&self, values: &[Value], pk: &[u8]) -> DocqlResult<()> {
        self.check_arity(values)?;
        match self.store.delete(&Self::entry_key(values, pk)) {
            Err(DocqlError::KeyNotFound) => Ok(()),
            other => other,
        }
    }

    /// Primary key of an existing entry whose values are SQL-equal to
    /// `values` (`2` matches `2.0`), if any. `NULL` never conflicts.
    pub fn conflict(&self, values: &[Value]) -> DocqlResult<Option<Vec<u8>>> {
        self.check_arity(values)?;
        if values.iter().any(Value::is_null) {
            return Ok(None);
        }
        let prefix = encode_equality_prefix(values);
        let mut it = self.store.iterator(IteratorOptions::default());
        it.seek(&prefix);
        let mut found = None;
        while it.valid() {
            let (Some(k), Some(v)) = (it.key(), it.value()) else {
                break;
            };
            if !k.starts_with(&prefix) {
                break;
            }
            let (stored, _) = decode_prefix(k, values.len())?;
            if stored.iter().zip(values).all(|(a, b)| a.sql_eq(b) == Some(true)) {
                found = Some(v.to_vec());
                break;
            }
            it.next();
        }
        it.close()?;
        Ok(found)
    }

    pub fn truncate(&self) -> DocqlResult<()> {
        self.store.truncate()
    }

    /// Entries in ascending order, starting at the first entry whose key
    /// is `>= pivot`. An empty pivot starts at the first entry.
    pub fn ascend_from(&self, pivot: &[u8]) -> IndexCursor {
        self.cursor(pivot, false)
    }

    /// Entries in descending order, starting at the last entry whose
    /// values are `<= pivot`. An empty pivot starts at the last entry.
    pub fn descend_from(&self, pivot: &[u8]) -> IndexCursor {
        self.cursor(pivot, true)
    }

    fn cursor(&self, pivot: &[u8], reverse: bool) -> IndexCursor {
        let mut it = self.store.iterator(IteratorOptions { reverse });
        if reverse && !pivot.is_empty() {
            // entries extend the pivot with more bytes: 0xff sorts past all
            let mut seek = pivot.to_vec();
            seek.push(0xff);
            it.seek(&seek);
        } else {
            it.seek(pivot);
        }
        IndexCursor {
            it,
            arity: self.arity(),
        }
    }

    /// Truncates the index and rebuilds it from every row of `table`.
    /// A unique index fails on the first duplicate.
    pub fn rebuild(&self, table: &Table) -> DocqlResult<u64> {
        self.truncate()?;
        let mut count = 0;
        let mut cursor = table.cursor(false)?;
        while let Some((pk, doc)) = cursor.next_row()? {
            let values = self.values_of(&doc)?;
            if self.info.unique && self.conflict(&values)?.is_some_and(|other| other != pk) {
                return Err(DocqlError::UniqueViolation {
                    index: self.info.name.clone(),
                });
            }
            self.set(&values, &pk)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Decoding cursor over index entries.
pub struct IndexCursor {
    it: Box<dyn StoreIterator>,
    arity: usize,
}

impl IndexCursor {
    /// Next `(values, pk)` pair.
    pub fn next_entry(&mut self) -> DocqlResult<Option<(Vec<Value>, Vec<u8>)>> {
        if !self.it.valid() {
            return match self.it.close() {
                Ok(()) => Ok(None),
                Err(e) => Err(e),
            };
        }
        let entry = match (self.it.key(), self.it.value()) {
            (Some(k), Some(v)) => {
                let (values, _) = decode_prefix(k, self.arity)?;
                (values, v.to_vec())
            }
            _ => return Ok(None),
        };
        self.it.next();
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryEngine;
    use crate::storage::{CancelToken, StorageEngine, StorageTransaction};
    use crate::value::Path;

    fn index(kv: &dyn StorageTransaction, paths: &[&str], unique: bool) -> Index {
        kv.create_store(b"i").unwrap();
        let info = IndexInfo {
            name: "idx".into(),
            table_name: "t".into(),
            paths: paths.iter().map(|p| Path::parse_simple(p).unwrap()).collect(),
            unique,
            types: vec![None; paths.len()],
            store_name: b"i".to_vec(),
            owner: None,
        };
        Index::new(Arc::new(info), kv.get_store(b"i").unwrap())
    }

    fn drain(mut c: IndexCursor) -> Vec<(Vec<Value>, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(e) = c.next_entry().unwrap() {
            out.push(e);
        }
        out
    }

    #[test]
    fn entries_sort_by_values_then_pk() {
        let engine = MemoryEngine::new();
        let kv = engine.begin(true, CancelToken::new()).unwrap();
        let idx = index(kv.as_ref(), &["a"], false);
        idx.set(&[Value::Integer(2)], b"k2").unwrap();
        idx.set(&[Value::Integer(1)], b"k9").unwrap();
        idx.set(&[Value::Integer(1)], b"k1").unwrap();
        idx.set(&[Value::Text("x".into())], b"k3").unwrap();

        let asc = drain(idx.ascend_from(&[]));
        let pks: Vec<&[u8]> = asc.iter().map(|(_, pk)| pk.as_slice()).collect();
        assert_eq!(pks, vec![&b"k1"[..], b"k9", b"k2", b"k3"]);
        assert_eq!(asc[2].0, vec![Value::Integer(2)]);

        let desc = drain(idx.descend_from(&encode_values(&[Value::Integer(1)])));
        let pks: Vec<&[u8]> = desc.iter().map(|(_, pk)| pk.as_slice()).collect();
        assert_eq!(pks, vec![&b"k9"[..], b"k1"]);
    }

    #[test]
    fn conflicts_match_full_values_only() {
        let engine = MemoryEngine::new();
        let kv = engine.begin(true, CancelToken::new()).unwrap();
        let idx = index(kv.as_ref(), &["a", "b"], true);
        idx.set(&[Value::Integer(1), Value::Integer(2)], b"k1").unwrap();

        let hit = idx.conflict(&[Value::Integer(1), Value::Integer(2)]).unwrap();
        assert_eq!(hit, Some(b"k1".to_vec()));
        assert!(idx.conflict(&[Value::Integer(1), Value::Integer(3)]).unwrap().is_none());
        assert!(idx.conflict(&[Value::Integer(1), Value::Null]).unwrap().is_none());
        assert!(idx.conflict(&[Value::Integer(1)]).is_err());
    }

    #[test]
    fn conflicts_compare_numbers_by_value() {
        let engine = MemoryEngine::new();
        let kv = engine.begin(true, CancelToken::new()).unwrap();
        let idx = index(kv.as_ref(), &["a", "b"], true);
        idx.set(&[Value::Integer(2), Value::from("x")], b"k1").unwrap();
        idx.set(&[Value::Double(2.5), Value::from("x")], b"k2").unwrap();

        let hit = idx.conflict(&[Value::Double(2.0), Value::from("x")]).unwrap();
        assert_eq!(hit, Some(b"k1".to_vec()));
        assert!(idx.conflict(&[Value::Double(2.0), Value::from("y")]).unwrap().is_none());
        assert_eq!(
            idx.conflict(&[Value::Double(2.5), Value::from("x")]).unwrap(),
            Some(b"k2".to_vec())
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let engine = MemoryEngine::new();
        let kv = engine.begin(true, CancelToken::new()).unwrap();
        let idx = index(kv.as_ref(), &["a"], false);
        idx.set(&[Value::Integer(1)], b"k1").unwrap();
        idx.delete(&[Value::Integer(1)], b"k1").unwrap();
        idx.delete(&[Value::Integer(1)], b"k1").unwrap();
        assert!(drain(idx.ascend_from(&[])).is_empty());
    }
}
