//! Storage module — ordered key-value engines under the document layer.
//!
//! Every backend implements [`StorageEngine`]. Tables, indexes, sequences
//! and the catalog only see the traits defined here.
//!
//! | backend | module | layout |
//! |---------|--------|--------|
//! | in-memory | [`memory`] | copy-on-write `BTreeMap` per store |
//! | B+tree file | [`btree`] | one redb table per store |
//! | log-structured | [`lsm`] | one sled keyspace, stores as key prefixes |

pub mod btree;
pub mod cancel;
pub mod iterator;
pub mod lsm;
pub mod memory;
pub(crate) mod overlay;
pub(crate) mod writer;

pub use cancel::CancelToken;
pub use iterator::{IteratorOptions, StoreIterator};

use crate::error::{DocqlError, DocqlResult};

/// Ordered byte-string key-value engine with ACID transactions.
///
/// # Design Principles
///
/// - **Single writer**: at most one writable transaction is active per
///   engine; `begin(true)` blocks until the previous writer finishes or the
///   cancellation token fires.
/// - **Readers never block**: read transactions run concurrently with each
///   other and with the writer.
/// - **Thread Safety**: engines are `Send + Sync`; transactions, stores and
///   iterators belong to one call site.
///
/// # Contract
///
/// - Keys and values are non-empty.
/// - Every operation checks the transaction's [`CancelToken`] first.
/// - `commit` / `rollback` on a finished transaction return
///   [`DocqlError::TransactionDiscarded`].
pub trait StorageEngine: Send + Sync {
    /// Backend name for logs and `Debug` output.
    fn name(&self) -> &'static str;

    fn begin(&self, writable: bool, cancel: CancelToken) -> DocqlResult<Box<dyn StorageTransaction>>;

    /// Creates a throw-away engine of the same family for scratch data
    /// (external sorts, index rebuilds). No durability guarantees.
    fn new_transient(&self) -> DocqlResult<Box<dyn StorageEngine>>;

    /// Reclaims the memory or files of a transient engine.
    fn drop_transient(self: Box<Self>) -> DocqlResult<()>;

    fn close(&self) -> DocqlResult<()>;
}

/// Storage-level transaction.
pub trait StorageTransaction: Send + Sync {
    fn writable(&self) -> bool;

    fn get_store(&self, name: &[u8]) -> DocqlResult<Box<dyn Store>>;

    fn create_store(&self, name: &[u8]) -> DocqlResult<()>;

    fn drop_store(&self, name: &[u8]) -> DocqlResult<()>;

    fn commit(&self) -> DocqlResult<()>;

    fn rollback(&self) -> DocqlResult<()>;
}

/// A named, ordered key-value namespace inside one transaction.
///
/// Writes are visible to later reads and iterators of the same transaction.
pub trait Store {
    /// Fails with [`DocqlError::KeyNotFound`] for missing keys.
    fn get(&self, key: &[u8]) -> DocqlResult<Vec<u8>>;

    /// Upsert.
    fn put(&self, key: &[u8], value: &[u8]) -> DocqlResult<()>;

    /// Fails with [`DocqlError::KeyNotFound`] for missing keys.
    fn delete(&self, key: &[u8]) -> DocqlResult<()>;

    /// Removes every key, keeping the store.
    fn truncate(&self) -> DocqlResult<()>;

    fn iterator(&self, opts: IteratorOptions) -> Box<dyn StoreIterator>;

    fn contains(&self, key: &[u8]) -> DocqlResult<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(DocqlError::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Lifecycle of a storage transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

impl TxStatus {
    pub(crate) fn ensure_active(self) -> DocqlResult<()> {
        match self {
            TxStatus::Active => Ok(()),
            _ => Err(DocqlError::TransactionDiscarded),
        }
    }
}

pub(crate) fn check_key(key: &[u8]) -> DocqlResult<()> {
    if key.is_empty() {
        return Err(DocqlError::EmptyKey);
    }
    Ok(())
}

pub(crate) fn check_write(key: &[u8], value: &[u8]) -> DocqlResult<()> {
    check_key(key)?;
    if value.is_empty() {
        return Err(DocqlError::EmptyValue);
    }
    Ok(())
}

/// Printable form of a binary store name for errors.
pub(crate) fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
