//! Statement execution — parameters, results and prepared statements.
//!
//! A script runs statement by statement. Outside of `BEGIN ... COMMIT`
//! each statement gets its own transaction: every statement but the last
//! commits immediately, the last one hands its transaction to the
//! [`QueryResult`], which commits when closed or dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::catalog::Catalog;
use crate::engine::database::{Database, Shared};
use crate::engine::transaction::Transaction;
use crate::error::{DocqlError, DocqlResult};
use crate::sql::executor::{self, ExecContext, PhysicalOperator};
use crate::sql::optimizer::OptimizerContext;
use crate::sql::planner::{AlterTable, LogicalPlanner, Statement, Stream};
use crate::value::{Document, Value};

/// 쿼리 파라미터 — `?` / `?N` 위치 또는 `$name` 이름
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Positional(Value),
    Named(String, Value),
}

impl Param {
    pub fn positional(value: impl Into<Value>) -> Self {
        Param::Positional(value.into())
    }

    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Param::Named(name.into(), value.into())
    }

    pub fn value(&self) -> &Value {
        match self {
            Param::Positional(v) | Param::Named(_, v) => v,
        }
    }
}

enum Source {
    Rows(Box<dyn PhysicalOperator>),
    Single(Option<Document>),
    Empty,
}

/// 쿼리 결과 스트림
///
/// Rows are produced lazily. When the result owns its transaction,
/// closing it commits (or rolls back after a failed read); unread rows of
/// a writing statement are drained first so every write happens.
pub struct QueryResult {
    source: Source,
    tx: Option<Transaction>,
    /// Whether unread rows must still be pulled before committing.
    writes: bool,
    failed: bool,
    done: bool,
}

impl QueryResult {
    fn new(source: Source, tx: Option<Transaction>, writes: bool) -> Self {
        QueryResult {
            source,
            tx,
            writes,
            failed: false,
            done: false,
        }
    }

    fn empty() -> Self {
        Self::new(Source::Empty, None, false)
    }

    /// Next document, `None` once exhausted.
    pub fn next(&mut self) -> DocqlResult<Option<Document>> {
        let next = match &mut self.source {
            Source::Rows(op) => op.next().map(|row| row.map(|r| r.doc)),
            Source::Single(doc) => Ok(doc.take()),
            Source::Empty => Ok(None),
        };
        if next.is_err() {
            self.failed = true;
        }
        next
    }

    /// Calls `f` on every remaining document; stops at the first error.
    pub fn iterate<F>(&mut self, mut f: F) -> DocqlResult<()>
    where
        F: FnMut(&Document) -> DocqlResult<()>,
    {
        while let Some(doc) = self.next()? {
            f(&doc)?;
        }
        Ok(())
    }

    /// Consumes the result, counting its documents.
    pub fn count(mut self) -> DocqlResult<usize> {
        let mut n = 0;
        self.iterate(|_| {
            n += 1;
            Ok(())
        })?;
        self.close()?;
        Ok(n)
    }

    /// First document; [`DocqlError::NotFound`] when there is none.
    pub fn first(mut self) -> DocqlResult<Document> {
        let doc = self.next()?;
        self.close()?;
        doc.ok_or(DocqlError::NotFound)
    }

    /// Drains, then commits or rolls back the owned transaction.
    pub fn close(mut self) -> DocqlResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> DocqlResult<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let drained = if self.writes && !self.failed {
            self.drain()
        } else {
            Ok(())
        };
        // operators hold transaction handles and scratch engines
        self.source = Source::Empty;
        let Some(tx) = self.tx.take() else {
            return drained;
        };
        if !tx.is_active() {
            return drained;
        }
        match drained {
            Ok(()) if !self.failed => tx.commit(),
            Ok(()) => tx.rollback(),
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    fn drain(&mut self) -> DocqlResult<()> {
        while self.next()?.is_some() {}
        Ok(())
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(error = %e, "closing dropped query result failed");
        }
    }
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Rows(_) => "rows",
            Source::Single(_) => "single",
            Source::Empty => "empty",
        };
        f.debug_struct("QueryResult")
            .field("source", &source)
            .field("owns_tx", &self.tx.is_some())
            .field("done", &self.done)
            .finish()
    }
}

/// Where a script runs: on the database, with `BEGIN` / `COMMIT` allowed,
/// or inside a caller-managed transaction.
#[derive(Clone, Copy)]
pub(crate) enum Scope<'a> {
    Database(&'a Mutex<Option<Transaction>>),
    Transaction(&'a Transaction),
}

impl Scope<'_> {
    /// Transaction for `statement`, and whether the caller owns it.
    fn transaction_for(
        self,
        shared: &Arc<Shared>,
        statement: &Statement,
    ) -> DocqlResult<(Transaction, bool)> {
        match self {
            Scope::Transaction(tx) => Ok((tx.clone(), false)),
            Scope::Database(slot) => {
                if let Some(tx) = slot.lock().as_ref() {
                    return Ok((tx.clone(), false));
                }
                let tx = Transaction::begin(Arc::clone(shared), !statement.is_read_only())?;
                Ok((tx, true))
            }
        }
    }
}

#[instrument(skip_all, fields(statements = statements.len()))]
pub(crate) fn run(
    shared: &Arc<Shared>,
    scope: Scope<'_>,
    statements: &[Statement],
    params: Arc<[Param]>,
) -> DocqlResult<QueryResult> {
    let mut last = QueryResult::empty();
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            std::mem::replace(&mut last, QueryResult::empty()).close()?;
        }
        last = match statement {
            Statement::Begin { writable } => {
                begin(shared, scope, *writable).inspect_err(|_| abandon(scope))?;
                QueryResult::empty()
            }
            Statement::Commit | Statement::Rollback => {
                end(scope, matches!(statement, Statement::Commit)).inspect_err(|_| abandon(scope))?;
                QueryResult::empty()
            }
            _ => {
                let (tx, owned) = scope.transaction_for(shared, statement)?;
                match execute_statement(shared, &tx, statement, Arc::clone(&params)) {
                    Ok(source) => {
                        let writes = !statement.is_read_only();
                        QueryResult::new(source, owned.then_some(tx), writes)
                    }
                    Err(e) => {
                        if owned {
                            let _ = tx.rollback();
                        }
                        return Err(e);
                    }
                }
            }
        };
    }
    Ok(last)
}

fn begin(shared: &Arc<Shared>, scope: Scope<'_>, writable: bool) -> DocqlResult<()> {
    let Scope::Database(slot) = scope else {
        return Err(DocqlError::TransactionControl(
            "cannot BEGIN inside a transaction".into(),
        ));
    };
    let mut slot = slot.lock();
    if slot.is_some() {
        return Err(DocqlError::TransactionControl(
            "a transaction is already open".into(),
        ));
    }
    *slot = Some(Transaction::begin(Arc::clone(shared), writable)?);
    debug!(writable, "transaction attached");
    Ok(())
}

fn end(scope: Scope<'_>, commit: bool) -> DocqlResult<()> {
    let keyword = if commit { "COMMIT" } else { "ROLLBACK" };
    let Scope::Database(slot) = scope else {
        return Err(DocqlError::TransactionControl(format!(
            "cannot {keyword} a transaction not opened with BEGIN"
        )));
    };
    let tx = slot.lock().take().ok_or_else(|| {
        DocqlError::TransactionControl(format!("{keyword} without an open transaction"))
    })?;
    debug!(keyword, "transaction detached");
    if commit { tx.commit() } else { tx.rollback() }
}

/// Rolls back and detaches the attached transaction after a failed
/// BEGIN, COMMIT or ROLLBACK. Failed ordinary statements leave it open.
fn abandon(scope: Scope<'_>) {
    let Scope::Database(slot) = scope else {
        return;
    };
    if let Some(tx) = slot.lock().take() {
        warn!("transaction control failed, rolling back the open transaction");
        if let Err(e) = tx.rollback() {
            debug!(error = %e, "rollback after failed transaction control");
        }
    }
}

fn is_dml(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Select(_) | Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_)
    )
}

/// Logical plan of a DML statement after optimization.
fn plan(shared: &Shared, catalog: &Catalog, statement: &Statement, params: &[Param]) -> DocqlResult<Stream> {
    let stream = LogicalPlanner::new(catalog).plan(statement)?;
    shared
        .optimizer
        .optimize(stream, &OptimizerContext { catalog, params })
}

fn execute_statement(
    shared: &Shared,
    tx: &Transaction,
    statement: &Statement,
    params: Arc<[Param]>,
) -> DocqlResult<Source> {
    tx.ensure_active()?;
    match statement {
        Statement::Select(_) | Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => {
            let stream = {
                let catalog = tx.catalog();
                plan(shared, &catalog, statement, &params)?
            };
            let ctx = ExecContext::new(tx.clone(), params);
            let mut op = executor::build(&stream, &ctx)?;
            if statement.produces_rows() {
                return Ok(Source::Rows(op));
            }
            while op.next()?.is_some() {}
            Ok(Source::Empty)
        }
        Statement::Explain(inner) => {
            if !is_dml(inner) {
                return Err(DocqlError::invalid(
                    "EXPLAIN only supports SELECT, INSERT, UPDATE and DELETE",
                    "EXPLAIN",
                ));
            }
            let stream = {
                let catalog = tx.catalog();
                plan(shared, &catalog, inner, &params)?
            };
            let doc = Document::new().with("plan", stream.to_string());
            Ok(Source::Single(Some(doc)))
        }
        Statement::CreateTable { info, if_not_exists } => {
            unless_exists(tx.create_table(info.clone()), *if_not_exists)
        }
        Statement::CreateIndex { info, if_not_exists } => {
            unless_exists(tx.create_index(info.clone()).map(drop), *if_not_exists)
        }
        Statement::CreateSequence { info, if_not_exists } => {
            unless_exists(tx.create_sequence(info.clone()), *if_not_exists)
        }
        Statement::DropTable { name, if_exists } => unless_missing(tx.drop_table(name), *if_exists),
        Statement::DropIndex { name, if_exists } => unless_missing(tx.drop_index(name), *if_exists),
        Statement::DropSequence { name, if_exists } => {
            unless_missing(tx.drop_sequence(name), *if_exists)
        }
        Statement::AlterTable { table, action } => {
            match action {
                AlterTable::RenameTo(new) => tx.rename_table(table, new)?,
                AlterTable::AddField { field, constraints } => {
                    tx.add_field(table, field.clone(), constraints.clone())?
                }
            }
            Ok(Source::Empty)
        }
        Statement::Reindex(target) => {
            tx.reindex(target.as_deref())?;
            Ok(Source::Empty)
        }
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback => Err(
            DocqlError::TransactionControl("transaction control outside of a script".into()),
        ),
    }
}

fn unless_exists(result: DocqlResult<()>, if_not_exists: bool) -> DocqlResult<Source> {
    match result {
        Err(e) if if_not_exists && e.is_already_exists() => Ok(Source::Empty),
        other => other.map(|()| Source::Empty),
    }
}

fn unless_missing(result: DocqlResult<()>, if_exists: bool) -> DocqlResult<Source> {
    match result {
        Err(e) if if_exists && e.is_not_found() => Ok(Source::Empty),
        other => other.map(|()| Source::Empty),
    }
}

impl Transaction {
    /// Runs `sql` inside this transaction. `BEGIN`, `COMMIT` and
    /// `ROLLBACK` are rejected.
    pub fn query(&self, sql: &str, params: &[Param]) -> DocqlResult<QueryResult> {
        let shared = Arc::clone(self.shared());
        shared.ensure_open()?;
        let statements = shared.parse(sql)?;
        run(&shared, Scope::Transaction(self), &statements, params.into())
    }

    pub fn exec(&self, sql: &str, params: &[Param]) -> DocqlResult<()> {
        self.query(sql, params)?.close()
    }

    pub fn query_document(&self, sql: &str, params: &[Param]) -> DocqlResult<Document> {
        self.query(sql, params)?.first()
    }

    pub fn prepare(&self, sql: &str) -> DocqlResult<PreparedStatement<'_>> {
        let statements = self.shared().parse(sql)?;
        validate(&self.catalog(), &statements)?;
        Ok(PreparedStatement {
            target: Target::Transaction(self),
            statements,
        })
    }
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Database(&'a Database),
    Transaction(&'a Transaction),
}

/// 준비된 문장
///
/// Parsed once; every execution plans against the catalog of its own
/// transaction and binds fresh parameters.
pub struct PreparedStatement<'a> {
    target: Target<'a>,
    statements: Arc<Vec<Statement>>,
}

impl PreparedStatement<'_> {
    pub fn query(&self, params: &[Param]) -> DocqlResult<QueryResult> {
        match self.target {
            Target::Database(db) => {
                db.shared.ensure_open()?;
                run(
                    &db.shared,
                    Scope::Database(&db.attached),
                    &self.statements,
                    params.into(),
                )
            }
            Target::Transaction(tx) => run(
                tx.shared(),
                Scope::Transaction(tx),
                &self.statements,
                params.into(),
            ),
        }
    }

    pub fn exec(&self, params: &[Param]) -> DocqlResult<()> {
        self.query(params)?.close()
    }

    pub fn query_document(&self, params: &[Param]) -> DocqlResult<Document> {
        self.query(params)?.first()
    }
}

pub(crate) fn prepare(db: &Database, statements: Arc<Vec<Statement>>) -> DocqlResult<PreparedStatement<'_>> {
    match db.attached.lock().as_ref() {
        Some(tx) => validate(&tx.catalog(), &statements)?,
        None => validate(&db.shared.catalog.read(), &statements)?,
    }
    Ok(PreparedStatement {
        target: Target::Database(db),
        statements,
    })
}

/// Plans the leading DML statements; later ones may depend on DDL that has
/// not run yet.
fn validate(catalog: &Catalog, statements: &[Statement]) -> DocqlResult<()> {
    for statement in statements.iter().take_while(|s| is_dml(s)) {
        LogicalPlanner::new(catalog).plan(statement)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.exec("CREATE TABLE t (a INT PRIMARY KEY, b TEXT)", &[]).unwrap();
        db
    }

    fn count(db: &Database, sql: &str) -> usize {
        db.query(sql, &[]).unwrap().count().unwrap()
    }

    #[test]
    fn auto_commit_per_statement() {
        let db = db();
        db.exec("INSERT INTO t (a, b) VALUES (1, 'x'); INSERT INTO t (a) VALUES (2)", &[])
            .unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 2);

        // the failing statement rolls back alone
        assert!(db.exec("INSERT INTO t (a) VALUES (3); INSERT INTO t (a) VALUES (1)", &[]).is_err());
        assert_eq!(count(&db, "SELECT * FROM t"), 3);
    }

    #[test]
    fn begin_commit_rollback() {
        let db = db();
        db.exec("BEGIN; INSERT INTO t (a) VALUES (1)", &[]).unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 1);
        db.exec("ROLLBACK", &[]).unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 0);

        db.exec("BEGIN; INSERT INTO t (a) VALUES (1); COMMIT", &[]).unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 1);
    }

    #[test]
    fn misplaced_transaction_control() {
        let db = db();
        assert!(matches!(db.exec("COMMIT", &[]), Err(DocqlError::TransactionControl(_))));
        db.exec("BEGIN", &[]).unwrap();
        assert!(matches!(db.exec("BEGIN", &[]), Err(DocqlError::TransactionControl(_))));
        // the failed BEGIN discarded the open transaction
        assert!(matches!(db.exec("ROLLBACK", &[]), Err(DocqlError::TransactionControl(_))));

        let tx = db.begin(true).unwrap();
        assert!(matches!(tx.exec("COMMIT", &[]), Err(DocqlError::TransactionControl(_))));
        tx.rollback().unwrap();
    }

    #[test]
    fn failed_statement_keeps_attached_transaction() {
        let db = db();
        db.exec("BEGIN; INSERT INTO t (a) VALUES (1)", &[]).unwrap();
        assert!(matches!(
            db.exec("INSERT INTO t (a) VALUES (1)", &[]),
            Err(DocqlError::DuplicateKey { .. })
        ));
        db.exec("INSERT INTO t (a) VALUES (2); COMMIT", &[]).unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 2);

        // a failed BEGIN discards the open transaction
        db.exec("BEGIN; INSERT INTO t (a) VALUES (3)", &[]).unwrap();
        assert!(db.exec("BEGIN", &[]).is_err());
        assert_eq!(count(&db, "SELECT * FROM t"), 2);
        db.exec("INSERT INTO t (a) VALUES (3)", &[]).unwrap();
    }

    #[test]
    fn read_only_begin_rejects_writes() {
        let db = db();
        db.exec("BEGIN READ ONLY", &[]).unwrap();
        assert!(matches!(
            db.exec("INSERT INTO t (a) VALUES (1)", &[]),
            Err(DocqlError::ReadOnlyTransaction)
        ));
        db.exec("ROLLBACK", &[]).unwrap();
    }

    #[test]
    fn transaction_query_sees_own_writes() {
        let db = db();
        let tx = db.begin(true).unwrap();
        tx.exec("INSERT INTO t (a, b) VALUES (1, 'x')", &[]).unwrap();
        let doc = tx.query_document("SELECT b FROM t", &[]).unwrap();
        assert_eq!(doc.get("b"), Some(&Value::from("x")));
        tx.rollback().unwrap();
        assert_eq!(count(&db, "SELECT * FROM t"), 0);
    }

    #[test]
    fn params_bind_by_position_and_name() {
        let db = db();
        db.exec(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            &[Param::positional(1), Param::positional("one")],
        )
        .unwrap();
        let doc = db
            .query_document("SELECT b FROM t WHERE a = $key", &[Param::named("key", 1)])
            .unwrap();
        assert_eq!(doc.get("b"), Some(&Value::from("one")));
    }

    #[test]
    fn unread_returning_rows_are_still_written() {
        let db = db();
        let res = db
            .query("INSERT INTO t (a) VALUES (1), (2), (3) RETURNING a", &[])
            .unwrap();
        drop(res);
        assert_eq!(count(&db, "SELECT * FROM t"), 3);
    }

    #[test]
    fn first_on_empty_result() {
        let db = db();
        assert!(matches!(
            db.query_document("SELECT * FROM t", &[]),
            Err(DocqlError::NotFound)
        ));
    }

    #[test]
    fn prepared_statement_reruns_with_new_params() {
        let db = db();
        let insert = db.prepare("INSERT INTO t (a) VALUES (?)").unwrap();
        for i in 0..5 {
            insert.exec(&[Param::positional(i)]).unwrap();
        }
        assert_eq!(count(&db, "SELECT * FROM t"), 5);
        assert!(matches!(
            db.prepare("SELECT * FROM missing"),
            Err(DocqlError::TableNotFound(_))
        ));
    }

    #[test]
    fn if_exists_variants() {
        let db = db();
        db.exec("CREATE TABLE IF NOT EXISTS t (x INT)", &[]).unwrap();
        assert!(db.exec("CREATE TABLE t (x INT)", &[]).unwrap_err().is_already_exists());
        db.exec("DROP INDEX IF EXISTS nope", &[]).unwrap();
        assert!(db.exec("DROP TABLE nope", &[]).unwrap_err().is_not_found());
    }

    #[test]
    fn explain_renders_the_plan() {
        let db = db();
        let doc = db.query_document("EXPLAIN SELECT * FROM t WHERE a = 1", &[]).unwrap();
        assert_eq!(doc.get("plan").and_then(|v| v.as_str()), Some("pkScan(t, 1)"));
    }
}
