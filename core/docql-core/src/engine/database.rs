//! Database struct definition — the core data structure

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{
    CATALOG_STORE, Catalog, SEQUENCE_STORE, STORE_SEQUENCE, Sequence, store, store_sequence_info,
};
use crate::engine::options::{EngineKind, Options};
use crate::engine::query::{Param, PreparedStatement, QueryResult, Scope, prepare, run};
use crate::engine::transaction::Transaction;
use crate::error::{DocqlError, DocqlResult};
use crate::sql::optimizer::QueryOptimizer;
use crate::sql::parser::parse_query;
use crate::sql::planner::Statement;
use crate::storage::btree::BTreeEngine;
use crate::storage::lsm::LsmEngine;
use crate::storage::memory::MemoryEngine;
use crate::storage::{CancelToken, StorageEngine};
use crate::value::Document;

/// Path selecting the in-memory engine in [`Database::open`].
pub const MEMORY_PATH: &str = ":memory:";

/// State shared by a database and all of its transactions.
pub(crate) struct Shared {
    pub(crate) engine: Box<dyn StorageEngine>,
    /// Catalog published by the last writable commit.
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) options: Options,
    pub(crate) optimizer: QueryOptimizer,
    statements: Mutex<Option<LruCache<String, Arc<Vec<Statement>>>>>,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn ensure_open(&self) -> DocqlResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DocqlError::Closed);
        }
        Ok(())
    }

    /// Parses `sql`, going through the statement cache when enabled.
    pub(crate) fn parse(&self, sql: &str) -> DocqlResult<Arc<Vec<Statement>>> {
        if let Some(cache) = self.statements.lock().as_mut() {
            if let Some(hit) = cache.get(sql) {
                return Ok(Arc::clone(hit));
            }
        }
        let parsed = Arc::new(parse_query(sql)?);
        if let Some(cache) = self.statements.lock().as_mut() {
            cache.put(sql.to_string(), Arc::clone(&parsed));
        }
        Ok(parsed)
    }
}

/// 문서 데이터베이스
///
/// Owns a storage engine and the published catalog. Statements run through
/// [`Database::exec`] and [`Database::query`] auto-commit, unless a
/// `BEGIN` attached a transaction to the database.
///
/// # 예제
///
/// ```rust
/// use docql_core::Database;
///
/// # fn main() -> docql_core::DocqlResult<()> {
/// let db = Database::open_in_memory()?;
/// db.exec("CREATE TABLE users (id INT PRIMARY KEY, name TEXT)", &[])?;
/// db.exec("INSERT INTO users (id, name) VALUES (1, 'Alice')", &[])?;
/// let doc = db.query_document("SELECT name FROM users WHERE id = 1", &[])?;
/// assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Alice"));
/// # Ok(())
/// # }
/// ```
pub struct Database {
    pub(crate) shared: Arc<Shared>,
    /// Transaction opened by `BEGIN`, until `COMMIT` or `ROLLBACK`.
    pub(crate) attached: Mutex<Option<Transaction>>,
}

impl Database {
    /// Opens the database at `path` with the LSM engine, or in memory for
    /// `":memory:"`.
    pub fn open(path: impl AsRef<Path>) -> DocqlResult<Self> {
        let options = if path.as_ref() == Path::new(MEMORY_PATH) {
            Options::in_memory()
        } else {
            Options::default()
        };
        Self::open_with(path, options)
    }

    pub fn open_in_memory() -> DocqlResult<Self> {
        Self::open_with(MEMORY_PATH, Options::in_memory())
    }

    /// Opens with explicit options; `options.engine` picks the backend and
    /// the path is ignored for the memory engine.
    #[instrument(skip(path, options), fields(engine = ?options.engine))]
    pub fn open_with(path: impl AsRef<Path>, options: Options) -> DocqlResult<Self> {
        let path = path.as_ref();
        let engine: Box<dyn StorageEngine> = match options.engine {
            EngineKind::Memory => Box::new(MemoryEngine::new()),
            EngineKind::BTree => {
                Box::new(BTreeEngine::open(path)?.with_sync_on_commit(options.sync_on_commit))
            }
            EngineKind::Lsm => {
                Box::new(LsmEngine::open(path)?.with_sync_on_commit(options.sync_on_commit))
            }
        };
        let catalog = bootstrap(engine.as_ref())?;
        info!(
            path = %path.display(),
            backend = engine.name(),
            tables = catalog.list_tables().len(),
            "database opened"
        );

        let statements = NonZeroUsize::new(options.statement_cache_size).map(LruCache::new);
        Ok(Database {
            shared: Arc::new(Shared {
                engine,
                catalog: RwLock::new(catalog),
                options,
                optimizer: QueryOptimizer::new(),
                statements: Mutex::new(statements),
                closed: AtomicBool::new(false),
            }),
            attached: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &Options {
        &self.shared.options
    }

    /// Starts a transaction outside of SQL. It is not attached to the
    /// database: statements run through `exec`/`query` on the database
    /// do not see it.
    pub fn begin(&self, writable: bool) -> DocqlResult<Transaction> {
        Transaction::begin(Arc::clone(&self.shared), writable)
    }

    /// Runs every statement of `sql` and discards the rows.
    pub fn exec(&self, sql: &str, params: &[Param]) -> DocqlResult<()> {
        self.query(sql, params)?.close()
    }

    /// Runs `sql` and returns the rows of its last statement.
    pub fn query(&self, sql: &str, params: &[Param]) -> DocqlResult<QueryResult> {
        self.shared.ensure_open()?;
        let statements = self.shared.parse(sql)?;
        run(
            &self.shared,
            Scope::Database(&self.attached),
            &statements,
            params.into(),
        )
    }

    /// First row of `sql`; [`DocqlError::NotFound`] when there is none.
    pub fn query_document(&self, sql: &str, params: &[Param]) -> DocqlResult<Document> {
        self.query(sql, params)?.first()
    }

    /// Parses and validates `sql` for repeated execution.
    pub fn prepare(&self, sql: &str) -> DocqlResult<PreparedStatement<'_>> {
        self.shared.ensure_open()?;
        let statements = self.shared.parse(sql)?;
        prepare(self, statements)
    }

    /// Rolls back the attached transaction and closes the engine. Later
    /// calls fail with [`DocqlError::Closed`].
    #[instrument(skip(self))]
    pub fn close(&self) -> DocqlResult<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(DocqlError::Closed);
        }
        if let Some(tx) = self.attached.lock().take() {
            warn!("closing with an open transaction, rolling back");
            tx.rollback()?;
        }
        self.shared.engine.close()?;
        info!("database closed");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(tx) = self.attached.get_mut().take() {
            if let Err(e) = tx.rollback() {
                warn!(error = %e, "rollback of attached transaction failed");
            }
        }
    }
}

/// Creates the system stores on first open and loads the catalog.
fn bootstrap(engine: &dyn StorageEngine) -> DocqlResult<Catalog> {
    let kv = engine.begin(true, CancelToken::new())?;
    for name in [CATALOG_STORE, SEQUENCE_STORE] {
        match kv.create_store(name) {
            Ok(()) => debug!(store = %String::from_utf8_lossy(name), "system store created"),
            Err(DocqlError::StoreAlreadyExists(_)) => {}
            Err(e) => {
                let _ = kv.rollback();
                return Err(e);
            }
        }
    }
    let loaded = store::load(kv.as_ref()).and_then(|mut catalog| {
        if catalog.get_sequence(STORE_SEQUENCE).is_err() {
            let info = store_sequence_info();
            store::put_sequence(kv.as_ref(), &info)?;
            catalog.put_sequence(Sequence::new(info));
        }
        Ok(catalog)
    });
    match loaded {
        Ok(catalog) => {
            kv.commit()?;
            Ok(catalog)
        }
        Err(e) => {
            let _ = kv.rollback();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn catalog_survives_reopen() {
        let dir = tempdir().unwrap();
        let options = Options {
            engine: EngineKind::BTree,
            ..Options::default()
        };
        {
            let db = Database::open_with(dir.path().join("db.redb"), options.clone()).unwrap();
            db.exec("CREATE TABLE t (a INT PRIMARY KEY, b TEXT UNIQUE)", &[])
                .unwrap();
            db.exec("CREATE SEQUENCE s CACHE 10", &[]).unwrap();
            db.exec("INSERT INTO t (a, b) VALUES (1, 'x')", &[]).unwrap();
            db.close().unwrap();
        }
        let db = Database::open_with(dir.path().join("db.redb"), options).unwrap();
        let tx = db.begin(false).unwrap();
        assert!(tx.catalog().get_table("t").is_ok());
        assert!(tx.catalog().get_index("t_b_idx").is_ok());
        assert!(tx.catalog().get_sequence("s").is_ok());
        drop(tx);
        let doc = db.query_document("SELECT b FROM t WHERE a = 1", &[]).unwrap();
        assert_eq!(doc.get("b").and_then(|v| v.as_str()), Some("x"));
    }

    #[test]
    fn closed_database_rejects_calls() {
        let db = Database::open_in_memory().unwrap();
        db.close().unwrap();
        assert!(matches!(db.exec("SELECT 1", &[]), Err(DocqlError::Closed)));
        assert!(matches!(db.close(), Err(DocqlError::Closed)));
    }
}
