//! In-memory engine using copy-on-write BTreeMaps
//!
//! Committed state is a map from store name to `Arc<BTreeMap>`. A transaction
//! clones the outer map at begin (cheap `Arc` clones), which gives readers a
//! stable snapshot. The writer records changes in an [`Overlay`] and commit
//! folds them into the shared state with `Arc::make_mut`.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{DocqlError, DocqlResult};
use crate::storage::iterator::{ChunkedIterator, Entry, RangeSource};
use crate::storage::overlay::{Lookup, Overlay};
use crate::storage::writer::{WriterGuard, WriterLock};
use crate::storage::{
    CancelToken, IteratorOptions, StorageEngine, StorageTransaction, Store, StoreIterator,
    TxStatus, check_key, check_write, display_name,
};

type StoreMap = BTreeMap<Vec<u8>, Vec<u8>>;
type Snapshot = HashMap<Vec<u8>, Arc<StoreMap>>;

/// In-memory storage engine.
#[derive(Default)]
pub struct MemoryEngine {
    state: Arc<RwLock<Snapshot>>,
    writer: WriterLock,
    transient: bool,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self, writable: bool, cancel: CancelToken) -> DocqlResult<Box<dyn StorageTransaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DocqlError::invalid("engine is closed", "memory"));
        }
        cancel.check()?;
        let guard = if writable {
            Some(self.writer.acquire(&cancel)?)
        } else {
            None
        };
        let snapshot = self.state.read().clone();
        Ok(Box::new(MemoryTransaction {
            inner: Arc::new(TxInner {
                snapshot,
                overlay: Mutex::new(Overlay::default()),
                state: self.state.clone(),
                writable,
                cancel,
                status: Mutex::new(TxStatus::Active),
                guard: Mutex::new(guard),
            }),
        }))
    }

    fn new_transient(&self) -> DocqlResult<Box<dyn StorageEngine>> {
        Ok(Box::new(MemoryEngine {
            transient: true,
            ..MemoryEngine::default()
        }))
    }

    fn drop_transient(self: Box<Self>) -> DocqlResult<()> {
        if !self.transient {
            return Err(DocqlError::invalid("engine is not transient", "memory"));
        }
        self.state.write().clear();
        Ok(())
    }

    fn close(&self) -> DocqlResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct TxInner {
    snapshot: Snapshot,
    overlay: Mutex<Overlay>,
    state: Arc<RwLock<Snapshot>>,
    writable: bool,
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

    fn in_base(&self, name: &[u8]) -> bool {
        self.snapshot.contains_key(name)
    }

    fn exists(&self, name: &[u8]) -> bool {
        self.overlay.lock().store_exists(name, self.in_base(name))
    }

    fn finish(&self, status: TxStatus) {
        *self.status.lock() = status;
        self.guard.lock().take();
    }
}

pub struct MemoryTransaction {
    inner: Arc<TxInner>,
}

impl StorageTransaction for MemoryTransaction {
    fn writable(&self) -> bool {
        self.inner.writable
    }

    fn get_store(&self, name: &[u8]) -> DocqlResult<Box<dyn Store>> {
        self.inner.check()?;
        if !self.inner.exists(name) {
            return Err(DocqlError::StoreNotFound(display_name(name)));
        }
        Ok(Box::new(MemoryStore {
            tx: self.inner.clone(),
            name: name.to_vec(),
        }))
    }

    fn create_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        check_key(name)?;
        let in_base = self.inner.in_base(name);
        let mut overlay = self.inner.overlay.lock();
        if overlay.store_exists(name, in_base) {
            return Err(DocqlError::StoreAlreadyExists(display_name(name)));
        }
        overlay.create_store(name, in_base);
        Ok(())
    }

    fn drop_store(&self, name: &[u8]) -> DocqlResult<()> {
        self.inner.check_writable()?;
        let in_base = self.inner.in_base(name);
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
        let mut state = self.inner.state.write();
        for name in &overlay.dropped {
            state.remove(name);
        }
        for name in &overlay.created {
            state.insert(name.clone(), Arc::new(StoreMap::new()));
        }
        for (name, pending) in overlay.stores {
            let Some(map) = state.get_mut(&name) else {
                continue;
            };
            let map = Arc::make_mut(map);
            if pending.cleared {
                map.clear();
            }
            for (k, v) in pending.writes {
                match v {
                    Some(v) => {
                        map.insert(k, v);
                    }
                    None => {
                        map.remove(&k);
                    }
                }
            }
        }
        drop(state);
        self.inner.finish(TxStatus::Committed);
        debug!(engine = "memory", "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()?;
        self.inner.overlay.lock().stores.clear();
        self.inner.finish(TxStatus::RolledBack);
        Ok(())
    }
}

#[derive(Clone)]
struct MemoryStore {
    tx: Arc<TxInner>,
    name: Vec<u8>,
}

impl Store for MemoryStore {
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
            .snapshot
            .get(&self.name)
            .and_then(|m| m.get(key))
            .cloned()
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

impl RangeSource for MemoryStore {
    fn check(&self) -> DocqlResult<()> {
        self.tx.check()
    }

    fn fetch(&self, from: Bound<&[u8]>, reverse: bool, limit: usize) -> DocqlResult<Vec<Entry>> {
        let range = match (from, reverse) {
            (Bound::Unbounded, _) => (Bound::Unbounded, Bound::Unbounded),
            (b, false) => (b, Bound::Unbounded),
            (b, true) => (Bound::Unbounded, b),
        };
        let empty = StoreMap::new();
        let map = self.tx.snapshot.get(&self.name).map_or(&empty, |m| m.as_ref());
        let base = map
            .range::<[u8], _>(range)
            .map(|(k, v)| Ok((k.clone(), v.clone())));
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

    fn engine_with_store() -> MemoryEngine {
        let engine = MemoryEngine::new();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.create_store(b"s").unwrap();
        tx.commit().unwrap();
        engine
    }

    #[test]
    fn readers_see_snapshot() {
        let engine = engine_with_store();
        let writer = engine.begin(true, CancelToken::new()).unwrap();
        writer.get_store(b"s").unwrap().put(b"k", b"v").unwrap();

        let reader = engine.begin(false, CancelToken::new()).unwrap();
        assert!(matches!(
            reader.get_store(b"s").unwrap().get(b"k"),
            Err(DocqlError::KeyNotFound)
        ));
        writer.commit().unwrap();
        // existing reader keeps its snapshot
        assert!(reader.get_store(b"s").unwrap().get(b"k").is_err());
        let fresh = engine.begin(false, CancelToken::new()).unwrap();
        assert_eq!(fresh.get_store(b"s").unwrap().get(b"k").unwrap(), b"v");
    }

    #[test]
    fn rollback_discards_writes() {
        let engine = engine_with_store();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        tx.get_store(b"s").unwrap().put(b"k", b"v").unwrap();
        tx.rollback().unwrap();
        assert!(matches!(tx.commit(), Err(DocqlError::TransactionDiscarded)));
        assert!(matches!(tx.rollback(), Err(DocqlError::TransactionDiscarded)));
        let tx = engine.begin(false, CancelToken::new()).unwrap();
        assert!(tx.get_store(b"s").unwrap().get(b"k").is_err());
    }

    #[test]
    fn read_only_rejects_writes() {
        let engine = engine_with_store();
        let tx = engine.begin(false, CancelToken::new()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        assert!(matches!(store.put(b"k", b"v"), Err(DocqlError::ReadOnlyTransaction)));
        assert!(matches!(tx.commit(), Err(DocqlError::ReadOnlyTransaction)));
    }

    #[test]
    fn cancelled_token_fails_fast() {
        let engine = engine_with_store();
        let token = CancelToken::new();
        let tx = engine.begin(true, token.clone()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        token.cancel();
        assert!(matches!(store.put(b"k", b"v"), Err(DocqlError::Cancelled)));
    }

    #[test]
    fn iteration_skips_pending_deletes_across_chunks() {
        let engine = engine_with_store();
        let tx = engine.begin(true, CancelToken::new()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        for i in 0u32..300 {
            store.put(&i.to_be_bytes(), b"v").unwrap();
        }
        tx.commit().unwrap();

        let tx = engine.begin(true, CancelToken::new()).unwrap();
        let store = tx.get_store(b"s").unwrap();
        for i in 0u32..200 {
            store.delete(&i.to_be_bytes()).unwrap();
        }
        let mut it = store.iterator(IteratorOptions::default());
        it.seek(&[]);
        let mut n = 0;
        while it.valid() {
            n += 1;
            it.next();
        }
        assert_eq!(n, 100);

        let mut it = store.iterator(IteratorOptions::reverse());
        it.seek(&[]);
        assert_eq!(it.key().unwrap(), 299u32.to_be_bytes());
    }

    #[test]
    fn transient_engine_drops() {
        let engine = MemoryEngine::new();
        let transient = engine.new_transient().unwrap();
        let tx = transient.begin(true, CancelToken::new()).unwrap();
        tx.create_store(b"tmp").unwrap();
        tx.commit().unwrap();
        assert!(transient.drop_transient().is_ok());
        assert!(Box::new(MemoryEngine::new()).drop_transient().is_err());
    }
}
