//! Transaction — storage transaction plus a private catalog view.
//!
//! A transaction copies the published catalog when it begins. DDL mutates
//! the copy; a successful writable commit publishes it back to the
//! database, so other transactions never observe uncommitted schema.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::catalog::{Catalog, store};
use crate::engine::database::Shared;
use crate::error::{DocqlError, DocqlResult};
use crate::index::Index;
use crate::storage::{CancelToken, StorageTransaction, TxStatus};
use crate::table::Table;

/// 트랜잭션 핸들
///
/// Cheap to clone; clones share the same underlying transaction. Results
/// returned by [`Transaction::query`] keep a clone alive while iterating.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxInner>,
}

struct TxInner {
    kv: Box<dyn StorageTransaction>,
    catalog: RwLock<Catalog>,
    shared: Arc<Shared>,
    writable: bool,
    cancel: CancelToken,
    status: Mutex<TxStatus>,
}

impl Transaction {
    pub(crate) fn begin(shared: Arc<Shared>, writable: bool) -> DocqlResult<Self> {
        let cancel = match shared.options.timeout() {
            Some(timeout) => CancelToken::with_timeout(timeout),
            None => CancelToken::new(),
        };
        Self::begin_with(shared, writable, cancel)
    }

    pub(crate) fn begin_with(
        shared: Arc<Shared>,
        writable: bool,
        cancel: CancelToken,
    ) -> DocqlResult<Self> {
        shared.ensure_open()?;
        // the catalog must match the storage snapshot: writers hold the
        // writer lock before copying it, readers copy it under the lock
        // that commits publish through
        let (kv, catalog) = if writable {
            let kv = shared.engine.begin(true, cancel.clone())?;
            let catalog = shared.catalog.read().clone();
            (kv, catalog)
        } else {
            let published = shared.catalog.read();
            let kv = shared.engine.begin(false, cancel.clone())?;
            (kv, published.clone())
        };
        Ok(Transaction {
            inner: Arc::new(TxInner {
                kv,
                catalog: RwLock::new(catalog),
                shared,
                writable,
                cancel,
                status: Mutex::new(TxStatus::Active),
            }),
        })
    }

    pub fn writable(&self) -> bool {
        self.inner.writable
    }

    /// Token cancelling every storage call of this transaction.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub(crate) fn kv(&self) -> &dyn StorageTransaction {
        self.inner.kv.as_ref()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    pub fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.inner.catalog.read()
    }

    pub(crate) fn catalog_mut(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.inner.catalog.write()
    }

    pub(crate) fn ensure_active(&self) -> DocqlResult<()> {
        self.inner.status.lock().ensure_active()
    }

    pub(crate) fn ensure_writable(&self) -> DocqlResult<()> {
        self.ensure_active()?;
        if !self.inner.writable {
            return Err(DocqlError::ReadOnlyTransaction);
        }
        Ok(())
    }

    /// Handle on a table of this transaction's catalog.
    pub fn table(&self, name: &str) -> DocqlResult<Table> {
        self.ensure_active()?;
        let info = self.catalog().get_table(name)?;
        let store = self.kv().get_store(&info.store_name)?;
        Ok(Table::new(self.clone(), info, store))
    }

    pub fn index(&self, name: &str) -> DocqlResult<Index> {
        self.ensure_active()?;
        let info = self.catalog().get_index(name)?;
        let store = self.kv().get_store(&info.store_name)?;
        Ok(Index::new(info, store))
    }

    /// Indexes of `table` in creation order.
    pub(crate) fn indexes_of(&self, table: &str) -> DocqlResult<Vec<Index>> {
        let infos = self.catalog().table_indexes(table);
        infos
            .into_iter()
            .map(|info| {
                let store = self.kv().get_store(&info.store_name)?;
                Ok(Index::new(info, store))
            })
            .collect()
    }

    /// Advances a sequence, persisting a new lease when the cached range
    /// is used up.
    pub fn next_sequence_value(&self, name: &str) -> DocqlResult<i64> {
        self.ensure_writable()?;
        let mut catalog = self.catalog_mut();
        let seq = catalog.get_sequence_mut(name)?;
        let (value, lease) = seq.next()?;
        if let Some(lease) = lease {
            store::put_lease(self.kv(), name, lease)?;
        }
        Ok(value)
    }

    /// Commits and publishes the catalog. Committing a read-only
    /// transaction just releases it.
    pub fn commit(&self) -> DocqlResult<()> {
        let mut status = self.inner.status.lock();
        status.ensure_active()?;
        if !self.inner.writable {
            self.inner.kv.rollback()?;
            *status = TxStatus::Committed;
            return Ok(());
        }
        let mut published = self.inner.shared.catalog.write();
        match self.inner.kv.commit() {
            Ok(()) => {
                *status = TxStatus::Committed;
                *published = self.inner.catalog.read().clone();
                debug!("transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "commit failed, rolling back");
                let _ = self.inner.kv.rollback();
                *status = TxStatus::RolledBack;
                Err(e)
            }
        }
    }

    pub fn rollback(&self) -> DocqlResult<()> {
        let mut status = self.inner.status.lock();
        status.ensure_active()?;
        *status = TxStatus::RolledBack;
        self.inner.kv.rollback()?;
        debug!("transaction rolled back");
        Ok(())
    }

    pub(crate) fn is_active(&self) -> bool {
        *self.inner.status.lock() == TxStatus::Active
    }

    pub(crate) fn same_as(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for TxInner {
    fn drop(&mut self) {
        if *self.status.get_mut() == TxStatus::Active {
            // releases the writer lock of abandoned transactions
            if let Err(e) = self.kv.rollback() {
                warn!(error = %e, "rollback of dropped transaction failed");
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writable", &self.inner.writable)
            .field("status", &*self.inner.status.lock())
            .finish()
    }
}
