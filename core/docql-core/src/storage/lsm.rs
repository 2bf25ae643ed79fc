//! LSM engine — sled-backed durable storage.
//!
//! All stores share one sled keyspace so a commit is a single atomic
//! `apply_batch`:
//!
//! ```text
//! 'm' name                       → store marker
//! 'd' len(name):u32be name key   → value
//! ```
//!
//! Writers buffer into an [`Overlay`]; readers see the latest committed
//! batch (sled has no snapshots, so isolation is read-committed).

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{DocqlError, DocqlResult};
use crate::storage::iterator::{ChunkedIterator, Entry, RangeSource};
use crate::storage::overlay::{Lookup, Overlay};
use crate::storage::writer::{WriterGuard, WriterLock};
use crate::storage::{
    CancelToken, IteratorOptions, StorageEngine, StorageTransaction, Store, StoreIterator,
    TxStatus, check_key, check_write, display_name,
};

const META: u8 = b'm';
const DATA: u8 = b'd';
const MARKER: &[u8] = &[1];

/// sled-backed storage engine.
pub struct LsmEngine {
    db: sled::Db,
    writer: WriterLock,
    sync_on_commit: bool,
    transient: bool,
}

impl LsmEngine {
    /// Opens (or creates) the database directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> DocqlResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened lsm engine");
        Ok(Self {
            db,
            writer: WriterLock::default(),
            sync_on_commit: false,
            transient: false,
        })
    }

    /// Temporary database, deleted on drop.
    pub fn open_temporary() -> DocqlResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            writer: WriterLock::default(),
            sync_on_commit: false,
            transient: true,
        })
    }

    /// Flush to disk on every commit.
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

impl StorageEngine for LsmEngine {
    fn name(&self) -> &'static str {
        "lsm"
    }

    fn begin(&self, writable: bool, cancel: CancelToken) -> DocqlResult<Box<dyn StorageTransaction>> {
        cancel.check()?;
        let guard = if writable {
            Some(self.writer.acquire(&cancel)?)
        } else {
            None
        };
        Ok(Box::new(LsmTransaction {
            inner: Arc::new(TxInner {
                db: self.db.clone(),
                overlay: Mutex::new(Overlay::default()),
                writable,
                sync_on_commit: self.sync_on_commit,
                cancel,
                status: Mutex::new(TxStatus::Active),
                guard: Mutex::new(guard),
            }),
        }))
    }

    fn new_transient(&self) -> DocqlResult<Box<dyn StorageEngine>> {
        Ok(Box::new(LsmEngine::open_temporary()?))
    }

    fn drop_transient(self: Box<Self>) -> DocqlResult<()> {
        if !self.transient {
            return Err(DocqlError::invalid("engine is not transient", "lsm"));
        }
        // temporary sled databases remove their files on drop
        drop(self);
        Ok(())
    }

    fn close(&self) -> DocqlResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn meta_key(name: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(name.len() + 1);
    k.push(META);
    k.extend_from_slice(name);
    k
}

fn data_prefix(name: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(name.len() + 5);
    k.push(DATA);
    k.extend_from_slice(&(name.len() as u32).to_be_bytes());
    k.extend_from_slice(name);
    k
}

fn join(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + key.len());
    k.extend_from_slice(prefix);
    k.extend_from_slice(key);
    k
}

/// Smallest key greater than every key starting with `prefix`.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last < u8::MAX {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

struct TxInner {
    db: sled::Db,
    overlay: Mutex<Overlay>,
    writable: bool,
    sync_on_commit: bool,
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
        if !self.writable {
            return Err(DocqlError::ReadOnlyTransaction);
        }
        Ok(())
    }

    fn in_base(&self, name: &[u8]) -> DocqlResult<bool> {
        Ok(self.db.contains_key(meta_key(name))?)
    }

    fn exists(&self, name: &[u8]) -> DocqlResult<bool> {
        let in_base = self.in_base(name)?;
        Ok(self.overlay.lock().store_exists(name, in_base))
    }

    /// Queues removal of every committed key of `name`.
    fn clear_committed(&self, name: &[u8], batch: &mut sled::Batch) -> DocqlResult<()> {
        for item in self.db.scan_prefix(data_prefix(name)) {
            let (k, _) = item?;
            batch.remove(k);
        }
        Ok(())
    }

    fn finish(&self, status: TxStatus) {
        *self.status.lock() = status;
        self.guard.lock().take();
    }
}

pub struct LsmTransaction {
    inner: Arc<TxInner>,
}

impl StorageTransaction for LsmTransaction {
    fn writable(&self) -> bool {
        self.inner.writable
    }

    fn get_store(&self, name: &[u8]) -> DocqlResult<Box<dyn Store>> {
        self.inner.check()?;
        if !self.inner.exists(name)? {
            return Err(DocqlError::StoreNotFound(display_name(name)));
        }
        Ok(Box::new(LsmStore {
            tx: self.inner.clone(),
            name: name.to_vec(),
            prefix: data_prefix(name),
        }))
    }

    fn create_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        check_key(name)?;
        let in_base = self.inner.in_base(name)?;
        let mut overlay = self.inner.overlay.lock();
        if overlay.store_exists(name, in_base) {
            return Err(DocqlError::StoreAlreadyExists(display_name(name)));
        }
        overlay.create_store(name, in_base);
        Ok(())
    }

    fn drop_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        let in_base = self.inner.in_base(name)?;
        let mut overlay = self.inner.overlay.lock();
        if !overlay.store_exists(name, in_base) {
            return Err(DocqlError::StoreNotFound(display_name(name)));
        }
        overlay.drop_store(name, in_base);
        Ok(())
    }

    fn commit(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()?;
        if !self.inner.writable {
            return Err(DocqlError::ReadOnlyTransaction);
        }
        self.inner.cancel.check()?;

        let overlay = std::mem::take(&mut *self.inner.overlay.lock());
        let mut batch = sled::Batch::default();
        let mut ops = 0usize;
        for name in &overlay.dropped {
            batch.remove(meta_key(name));
            self.inner.clear_committed(name, &mut batch)?;
        }
        for name in &overlay.created {
            batch.insert(meta_key(name), MARKER);
        }
        for (name, pending) in &overlay.stores {
            if pending.cleared {
                self.inner.clear_committed(name, &mut batch)?;
            }
            let prefix = data_prefix(name);
            for (k, v) in &pending.writes {
                match v {
                    Some(v) => batch.insert(join(&prefix, k), v.as_slice()),
                    None => batch.remove(join(&prefix, k)),
                }
                ops += 1;
            }
        }
        self.inner.db.apply_batch(batch)?;
        if self.inner.sync_on_commit {
            self.inner.db.flush()?;
        }
        self.inner.finish(TxStatus::Committed);
        debug!(engine = "lsm", ops, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()?;
        *self.inner.overlay.lock() = Overlay::default();
        self.inner.finish(TxStatus::RolledBack);
        Ok(())
    }
}

#[derive(Clone)]
struct LsmStore {
    tx: Arc<TxInner>,
    name: Vec<u8>,
    prefix: Vec<u8>,
}

impl Store for LsmStore {
    fn get(&self, key: &[u8]) -> DocqlResult<Vec<u8>> {
        self.tx.check()?;
        check_key(key)?;
        if self.tx.writable {
            match self.tx.overlay.lock().lookup(&self.name, key) {
                Lookup::Found(v) => return Ok(v),
                Lookup::Deleted => return Err(DocqlError::KeyNotFound),
                Lookup::Base => {}
            }
        }
        self.tx
            .db
            .get(join(&self.prefix, key))?
            .map(|v| v.to_vec())
            .ok_or(DocqlError::KeyNotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> DocqlResult<()> {
        self.tx.check_writable()?;
        check_write(key, value)?;
        self.tx.overlay.lock().put(&self.name, key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> DocqlResult<()> {
        self.tx.check_writable()?;
        check_key(key)?;
        if !self.contains(key)? {
            return Err(DocqlError::KeyNotFound);
        }
        self.tx.overlay.lock().delete(&self.name, key);
        Ok(())
    }

    fn truncate(&self) -> DocqlResult<()> {
        self.tx.check_writable()?;
        self.tx.overlay.lock().truncate(&self.name);
        Ok(())
    }

    fn iterator(&self, opts: IteratorOptions) -> Box<dyn StoreIterator> {
        Box::new(ChunkedIterator::new(self.clone(), opts))
    }
}

impl RangeSource for LsmStore {
    fn check(&self) -> DocqlResult<()> {
        self.tx.check()
    }

    fn fetch(&self, from: Bound<&[u8]>, reverse: bool, limit: usize) -> DocqlResult<Vec<Entry>> {
        let start = Bound::Included(self.prefix.clone());
        let end = match prefix_successor(&self.prefix) {
            Some(s) => Bound::Excluded(s),
            None => Bound::Unbounded,
        };
        // excluded lower bounds are applied as a filter below
        let (lo, hi, skip) = match (from, reverse) {
            (Bound::Unbounded, _) => (start, end, None),
            (Bound::Included(k), false) => (Bound::Included(join(&self.prefix, k)), end, None),
            (Bound::Excluded(k), false) => {
                let k = join(&self.prefix, k);
                (Bound::Included(k.clone()), end, Some(k))
            }
            (Bound::Included(k), true) => (start, Bound::Included(join(&self.prefix, k)), None),
            (Bound::Excluded(k), true) => (start, Bound::Excluded(join(&self.prefix, k)), None),
        };
        let strip = self.prefix.len();
        let range = self.tx.db.range::<Vec<u8>, _>((lo, hi));
        let base = range
            .filter(move |item| match (item, &skip) {
                (Ok((k, _)), Some(s)) => &k[..] != s.as_slice(),
                _ => true,
            })
            .map(move |item| -> DocqlResult<Entry> {
                let (k, v) = item?;
                Ok((k[strip..].to_vec(), v.to_vec()))
            });
        let overlay = self.tx.overlay.lock();
        if reverse {
            overlay.merge(&self.name, base.rev(), from, reverse, limit)
        } else {
            overlay.merge(&self.name, base, from, reverse, limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LsmEngine {
        let engine = LsmEngine::open_temporary().unwrap();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.create_store(b"a").unwrap();
        tx.create_store(b"ab").unwrap();
        tx.commit().unwrap();
        engine
    }

    fn keys(store: &dyn Store, opts: IteratorOptions) -> Vec<Vec<u8>> {
        let mut it = store.iterator(opts);
        it.seek(&[]);
        let mut out = Vec::new();
        while it.valid() {
            out.push(it.key().unwrap().to_vec());
            it.next();
        }
        out
    }

    #[test]
    fn stores_do_not_leak_into_each_other() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.get_store(b"a").unwrap().put(b"1", b"x").unwrap();
        tx.get_store(b"ab").unwrap().put(b"2", b"y").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin(false, CancelToken::new()).unwrap();
        let a = tx.get_store(b"a").unwrap();
        assert_eq!(keys(a.as_ref(), IteratorOptions::default()), vec![b"1".to_vec()]);
        assert_eq!(keys(a.as_ref(), IteratorOptions::reverse()), vec![b"1".to_vec()]);
    }

    #[test]
    fn drop_store_removes_data() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.get_store(b"a").unwrap().put(b"1", b"x").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.drop_store(b"a").unwrap();
        tx.create_store(b"a").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin(false, CancelToken::new()).unwrap();
        assert!(keys(tx.get_store(b"a").unwrap().as_ref(), IteratorOptions::default()).is_empty());
        assert!(matches!(tx.get_store(b"zz"), Err(DocqlError::StoreNotFound(_))));
    }

    #[test]
    fn seek_excluded_continuation() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        let store = tx.get_store(b"a").unwrap();
        for i in 0u16..400 {
            store.put(&i.to_be_bytes(), b"v").unwrap();
        }
        tx.commit().unwrap();

        let tx = engine.begin(false, CancelToken::new()).unwrap();
        let store = tx.get_store(b"a").unwrap();
        let all = keys(store.as_ref(), IteratorOptions::default());
        assert_eq!(all.len(), 400);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        let mut it = store.iterator(IteratorOptions::reverse());
        it.seek(&10u16.to_be_bytes());
        assert_eq!(it.key().unwrap(), 10u16.to_be_bytes());
    }

    #[test]
    fn rollback_keeps_committed_state() {
        let engine = engine();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.get_store(b"a").unwrap().put(b"k", b"v").unwrap();
        tx.rollback().unwrap();
        let tx = engine.begin(false, CancelToken::new()).unwrap();
        assert!(tx.get_store(b"a").unwrap().get(b"k").is_err());
    }

    #[test]
    fn successor_of_prefix() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[1, 255]), Some(vec![2]));
        assert_eq!(prefix_successor(&[255, 255]), None);
    }
}
