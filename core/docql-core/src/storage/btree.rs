//! B+tree engine — redb-backed single-file storage.
//!
//! Each store is a redb table named `s:` followed by the URL-safe base64
//! form of the store name. redb provides MVCC snapshots and atomic commits,
//! so no overlay is needed: writes go straight to the write transaction.

use std::collections::HashSet;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use redb::{
    AccessGuard, Database, Durability, ReadTransaction, ReadableTable, TableDefinition,
    TableHandle, WriteTransaction,
};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{DocqlError, DocqlResult};
use crate::storage::iterator::{ChunkedIterator, Entry, RangeSource};
use crate::storage::writer::{WriterGuard, WriterLock};
use crate::storage::{
    CancelToken, IteratorOptions, StorageEngine, StorageTransaction, Store, StoreIterator,
    TxStatus, check_key, check_write, display_name,
};

const TABLE_PREFIX: &str = "s:";

type Bytes = &'static [u8];

fn definition(table: &str) -> TableDefinition<'_, Bytes, Bytes> {
    TableDefinition::new(table)
}

fn table_name(store: &[u8]) -> String {
    format!("{TABLE_PREFIX}{}", URL_SAFE_NO_PAD.encode(store))
}

/// redb-backed storage engine.
pub struct BTreeEngine {
    db: Arc<Database>,
    writer: WriterLock,
    sync_on_commit: bool,
    // keeps the scratch directory of a transient engine alive
    scratch: Option<TempDir>,
}

impl BTreeEngine {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DocqlResult<Self> {
        let db = Database::create(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened btree engine");
        Ok(Self {
            db: Arc::new(db),
            writer: WriterLock::default(),
            sync_on_commit: true,
            scratch: None,
        })
    }

    /// Database file inside a fresh temporary directory.
    pub fn open_temporary() -> DocqlResult<Self> {
        let dir = tempfile::tempdir()?;
        let db = Database::create(dir.path().join("transient.redb"))?;
        Ok(Self {
            db: Arc::new(db),
            writer: WriterLock::default(),
            sync_on_commit: false,
            scratch: Some(dir),
        })
    }

    /// With `false`, commits skip fsync (redb `Durability::None`).
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

impl StorageEngine for BTreeEngine {
    fn name(&self) -> &'static str {
        "btree"
    }

    fn begin(&self, writable: bool, cancel: CancelToken) -> DocqlResult<Box<dyn StorageTransaction>> {
        cancel.check()?;
        let (tx, guard) = if writable {
            let guard = self.writer.acquire(&cancel)?;
            let mut wtx = self.db.begin_write()?;
            if !self.sync_on_commit {
                wtx.set_durability(Durability::None);
            }
            (Handle::Write(Mutex::new(Some(wtx))), Some(guard))
        } else {
            (Handle::Read(Mutex::new(self.db.begin_read()?)), None)
        };
        let known = match &tx {
            Handle::Read(rtx) => rtx
                .lock()
                .list_tables()?
                .map(|h| h.name().to_string())
                .collect::<HashSet<_>>(),
            Handle::Write(wtx) => match wtx.lock().as_ref() {
                Some(wtx) => wtx
                    .list_tables()?
                    .map(|h| h.name().to_string())
                    .collect::<HashSet<_>>(),
                None => HashSet::new(),
            },
        };
        Ok(Box::new(BTreeTransaction {
            inner: Arc::new(TxInner {
                tx,
                known: Mutex::new(known),
                cancel,
                status: Mutex::new(TxStatus::Active),
                guard: Mutex::new(guard),
            }),
        }))
    }

    fn new_transient(&self) -> DocqlResult<Box<dyn StorageEngine>> {
        Ok(Box::new(BTreeEngine::open_temporary()?))
    }

    fn drop_transient(self: Box<Self>) -> DocqlResult<()> {
        let BTreeEngine { db, scratch, .. } = *self;
        let Some(dir) = scratch else {
            return Err(DocqlError::invalid("engine is not transient", "btree"));
        };
        drop(db);
        dir.close()?;
        Ok(())
    }

    fn close(&self) -> DocqlResult<()> {
        Ok(())
    }
}

enum Handle {
    Read(Mutex<ReadTransaction>),
    Write(Mutex<Option<WriteTransaction>>),
}

struct TxInner {
    tx: Handle,
    /// redb table names visible to this transaction.
    known: Mutex<HashSet<String>>,
    cancel: CancelToken,
    status: Mutex<TxStatus>,
    guard: Mutex<Option<WriterGuard>>,
}

impl TxInner {
    fn check(&self) -> DocqlResult<()> {
        self.cancel.check()?;
        self.status.lock().ensure_active()
    }

    fn check_writable(&self) -> DocqlResult<()> {
        self.check()?;
        match self.tx {
            Handle::Write(_) => Ok(()),
            Handle::Read(_) => Err(DocqlError::ReadOnlyTransaction),
        }
    }

    /// Runs `f` against the open write transaction.
    fn with_write<T>(&self, f: impl FnOnce(&WriteTransaction) -> DocqlResult<T>) -> DocqlResult<T> {
        match &self.tx {
            Handle::Write(wtx) => {
                let guard = wtx.lock();
                let wtx = guard.as_ref().ok_or(DocqlError::TransactionDiscarded)?;
                f(wtx)
            }
            Handle::Read(_) => Err(DocqlError::ReadOnlyTransaction),
        }
    }

    fn finish(&self, status: TxStatus) {
        *self.status.lock() = status;
        self.guard.lock().take();
    }
}

pub struct BTreeTransaction {
    inner: Arc<TxInner>,
}

impl StorageTransaction for BTreeTransaction {
    fn writable(&self) -> bool {
        matches!(self.inner.tx, Handle::Write(_))
    }

    fn get_store(&self, name: &[u8]) -> DocqlResult<Box<dyn Store>> {
        self.inner.check()?;
        let table = table_name(name);
        if !self.inner.known.lock().contains(&table) {
            return Err(DocqlError::StoreNotFound(display_name(name)));
        }
        Ok(Box::new(BTreeStore {
            tx: self.inner.clone(),
            table,
        }))
    }

    fn create_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        check_key(name)?;
        let table = table_name(name);
        if self.inner.known.lock().contains(&table) {
            return Err(DocqlError::StoreAlreadyExists(display_name(name)));
        }
        self.inner.with_write(|wtx| {
            wtx.open_table(definition(&table))?;
            Ok(())
        })?;
        self.inner.known.lock().insert(table);
        Ok(())
    }

    fn drop_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        let table = table_name(name);
        if !self.inner.known.lock().contains(&table) {
            return Err(DocqlError::StoreNotFound(display_name(name)));
        }
        self.inner.with_write(|wtx| {
            wtx.delete_table(definition(&table))?;
            Ok(())
        })?;
        self.inner.known.lock().remove(&table);
        Ok(())
    }

    fn commit(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()?;
        self.inner.cancel.check()?;
        let Handle::Write(wtx) = &self.inner.tx else {
            return Err(DocqlError::ReadOnlyTransaction);
        };
        let wtx = wtx.lock().take().ok_or(DocqlError::TransactionDiscarded)?;
        wtx.commit()?;
        self.inner.finish(TxStatus::Committed);
        debug!(engine = "btree", "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()?;
        if let Handle::Write(wtx) = &self.inner.tx {
            if let Some(wtx) = wtx.lock().take() {
                wtx.abort()?;
            }
        }
        self.inner.finish(TxStatus::RolledBack);
        Ok(())
    }
}

#[derive(Clone)]
struct BTreeStore {
    tx: Arc<TxInner>,
    table: String,
}

fn drain<'a, I>(iter: I, limit: usize) -> DocqlResult<Vec<Entry>>
where
    I: Iterator<Item = Result<(AccessGuard<'a, Bytes>, AccessGuard<'a, Bytes>), redb::StorageError>>,
{
    let mut out = Vec::new();
    for item in iter.take(limit) {
        let (k, v) = item?;
        out.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(out)
}

fn fetch_from<T>(table: &T, from: Bound<&[u8]>, reverse: bool, limit: usize) -> DocqlResult<Vec<Entry>>
where
    T: ReadableTable<Bytes, Bytes>,
{
    let bounds = match (from, reverse) {
        (Bound::Unbounded, _) => (Bound::Unbounded, Bound::Unbounded),
        (b, false) => (b, Bound::Unbounded),
        (b, true) => (Bound::Unbounded, b),
    };
    let range = table.range::<&[u8]>(bounds)?;
    if reverse {
        drain(range.rev(), limit)
    } else {
        drain(range, limit)
    }
}

impl Store for BTreeStore {
    fn get(&self, key: &[u8]) -> DocqlResult<Vec<u8>> {
        self.tx.check()?;
        check_key(key)?;
        let found = match &self.tx.tx {
            Handle::Read(rtx) => {
                let table = rtx.lock().open_table(definition(&self.table))?;
                table.get(key)?.map(|v| v.value().to_vec())
            }
            Handle::Write(_) => self.tx.with_write(|wtx| {
                let table = wtx.open_table(definition(&self.table))?;
                let v = table.get(key)?.map(|v| v.value().to_vec());
                Ok(v)
            })?,
        };
        found.ok_or(DocqlError::KeyNotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> DocqlResult<()> {
        self.tx.check_writable()?;
        check_write(key, value)?;
        self.tx.with_write(|wtx| {
            let mut table = wtx.open_table(definition(&self.table))?;
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> DocqlResult<()> {
        self.tx.check_writable()?;
        check_key(key)?;
        self.tx.with_write(|wtx| {
            let mut table = wtx.open_table(definition(&self.table))?;
            let removed = table.remove(key)?.is_some();
            if removed { Ok(()) } else { Err(DocqlError::KeyNotFound) }
        })
    }

    fn truncate(&self) -> DocqlResult<()> {
        self.tx.check_writable()?;
        self.tx.with_write(|wtx| {
            wtx.delete_table(definition(&self.table))?;
            wtx.open_table(definition(&self.table))?;
            Ok(())
        })
    }

    fn iterator(&self, opts: IteratorOptions) -> Box<dyn StoreIterator> {
        Box::new(ChunkedIterator::new(self.clone(), opts))
    }
}

impl RangeSource for BTreeStore {
    fn check(&self) -> DocqlResult<()> {
        self.tx.check()
    }

    fn fetch(&self, from: Bound<&[u8]>, reverse: bool, limit: usize) -> DocqlResult<Vec<Entry>> {
        match &self.tx.tx {
            Handle::Read(rtx) => {
                let table = rtx.lock().open_table(definition(&self.table))?;
                fetch_from(&table, from, reverse, limit)
            }
            Handle::Write(_) => self.tx.with_write(|wtx| {
                let table = wtx.open_table(definition(&self.table))?;
                fetch_from(&table, from, reverse, limit)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> BTreeEngine {
        let engine = BTreeEngine::open_temporary().unwrap();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.create_store(b"s").unwrap();
        tx.commit().unwrap();
        engine
    }

    #[test]
    fn writes_visible_inside_transaction() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        store.put(b"b", b"2").unwrap();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");

        let mut it = store.iterator(IteratorOptions::default());
        it.seek(&[]);
        assert_eq!(it.key().unwrap(), b"a");
        it.next();
        assert_eq!(it.key().unwrap(), b"b");
        it.next();
        assert!(!it.valid());
        tx.commit().unwrap();
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let engine = engine();
        let reader = engine.begin(false, CancelToken::new()).unwrap();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.get_store(b"s").unwrap().put(b"k", b"v").unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            reader.get_store(b"s").unwrap().get(b"k"),
            Err(DocqlError::KeyNotFound)
        ));
    }

    #[test]
    fn delete_missing_key_fails() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        assert!(matches!(store.delete(b"nope"), Err(DocqlError::KeyNotFound)));
        assert!(matches!(store.put(b"k", b""), Err(DocqlError::EmptyValue)));
    }

    #[test]
    fn store_lifecycle() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        assert!(matches!(tx.create_store(b"s"), Err(DocqlError::StoreAlreadyExists(_))));
        tx.get_store(b"s").unwrap().put(b"k", b"v").unwrap();
        tx.get_store(b"s").unwrap().truncate().unwrap();
        assert!(tx.get_store(b"s").unwrap().get(b"k").is_err());
        tx.drop_store(b"s").unwrap();
        assert!(matches!(tx.get_store(b"s"), Err(DocqlError::StoreNotFound(_))));
        tx.rollback().unwrap();

        let tx = engine.begin(false, CancelToken::new()).unwrap();
        assert!(tx.get_store(b"s").is_ok());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.redb");
        {
            let engine = BTreeEngine::open(&path).unwrap();
            let tx = engine.begin(true, CancelToken::new()).unwrap();
            tx.create_store(b"s").unwrap();
            tx.get_store(b"s").unwrap().put(b"k", b"v").unwrap();
            tx.commit().unwrap();
        }
        let engine = BTreeEngine::open(&path).unwrap();
        let tx = engine.begin(false, CancelToken::new()).unwrap();
        assert_eq!(tx.get_store(b"s").unwrap().get(b"k").unwrap(), b"v");
    }
}
