// 영속성 테스트 — 파일 기반 엔진 재시작 후 카탈로그, 데이터, 시퀀스 복원

use docql_core::{Database, DocqlError, EngineKind, Options, Value};
use tempfile::TempDir;

fn options(engine: EngineKind) -> Options {
    Options {
        engine,
        ..Options::default()
    }
}

fn reopen(dir: &TempDir, engine: EngineKind) -> Database {
    Database::open_with(dir.path().join("data.db"), options(engine)).unwrap()
}

fn next_value(db: &Database, seq: &str) -> i64 {
    let doc = db
        .query_document(&format!("SELECT NEXT VALUE FOR {seq} AS v"), &[])
        .unwrap();
    doc.get("v").and_then(Value::as_i64).unwrap()
}

fn survives_reopen(engine: EngineKind) {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = reopen(&dir, engine);
        db.exec(
            "CREATE TABLE users (id INT PRIMARY KEY, name TEXT NOT NULL, email TEXT UNIQUE); \
             CREATE INDEX users_name ON users (name); \
             CREATE TABLE logs; \
             CREATE SEQUENCE s CACHE 10",
            &[],
        )
        .unwrap();
        db.exec(
            "INSERT INTO users (id, name, email) VALUES (1, 'Alice', 'a@x'), (2, 'Bob', 'b@x'); \
             INSERT INTO logs VALUES {msg: 'hello'}",
            &[],
        )
        .unwrap();
        assert_eq!(next_value(&db, "s"), 1);
        db.close().unwrap();
    }

    let db = reopen(&dir, engine);
    let doc = db
        .query_document("SELECT id FROM users WHERE name = 'Bob'", &[])
        .unwrap();
    assert_eq!(doc.get("id"), Some(&Value::Integer(2)));

    let plan = db
        .query_document("EXPLAIN SELECT * FROM users WHERE name = 'Bob'", &[])
        .unwrap();
    assert_eq!(
        plan.get("plan").and_then(|v| v.as_str()),
        Some("indexScan(users_name, 'Bob')")
    );

    // constraints are re-derived from the stored SQL
    assert!(matches!(
        db.exec("INSERT INTO users (id, email) VALUES (3, 'c@x')", &[]),
        Err(DocqlError::NotNullViolation { .. })
    ));
    assert!(matches!(
        db.exec("INSERT INTO users (id, name, email) VALUES (3, 'C', 'a@x')", &[]),
        Err(DocqlError::UniqueViolation { .. })
    ));

    // leases skip the reserved range, values are never reused
    assert_eq!(next_value(&db, "s"), 11);

    db.exec("INSERT INTO logs VALUES {msg: 'again'}", &[]).unwrap();
    let keys: Vec<Value> = {
        let mut out = Vec::new();
        db.query("SELECT pk() AS k FROM logs", &[])
            .unwrap()
            .iterate(|d| {
                out.push(d.get("k").cloned().unwrap_or(Value::Null));
                Ok(())
            })
            .unwrap();
        out
    };
    assert_eq!(keys, vec![Value::Integer(1), Value::Integer(65)]);
}

#[test]
fn test_btree_survives_reopen() {
    survives_reopen(EngineKind::BTree);
}

#[test]
fn test_lsm_survives_reopen() {
    survives_reopen(EngineKind::Lsm);
}

#[test]
fn test_uncommitted_work_is_lost() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = reopen(&dir, EngineKind::BTree);
        db.exec("CREATE TABLE t (a INT)", &[]).unwrap();
        db.exec("BEGIN; INSERT INTO t (a) VALUES (1); CREATE TABLE u (b INT)", &[])
            .unwrap();
        // dropping the database rolls the attached transaction back
    }
    let db = reopen(&dir, EngineKind::BTree);
    assert_eq!(db.query("SELECT * FROM t", &[]).unwrap().count().unwrap(), 0);
    assert!(matches!(
        db.exec("SELECT * FROM u", &[]),
        Err(DocqlError::TableNotFound(_))
    ));
}

#[test]
fn test_timed_out_statement_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = reopen(&dir, EngineKind::BTree);
        db.exec("CREATE TABLE src (a INT); CREATE TABLE dst (a INT)", &[]).unwrap();
        let tx = db.begin(true).unwrap();
        let insert = tx.prepare("INSERT INTO src (a) VALUES (?)").unwrap();
        for i in 0..20_000i64 {
            insert.exec(&[docql_core::Param::positional(i)]).unwrap();
        }
        tx.commit().unwrap();
        db.close().unwrap();
    }
    {
        let opts = Options {
            timeout_ms: Some(1),
            ..options(EngineKind::BTree)
        };
        let db = Database::open_with(dir.path().join("data.db"), opts).unwrap();
        let err = db
            .exec("INSERT INTO dst SELECT a FROM src", &[])
            .unwrap_err();
        assert!(matches!(err, DocqlError::DeadlineExceeded), "{err}");
        db.close().unwrap();
    }
    let db = reopen(&dir, EngineKind::BTree);
    assert_eq!(db.query("SELECT * FROM dst", &[]).unwrap().count().unwrap(), 0);
    assert_eq!(db.query("SELECT * FROM src", &[]).unwrap().count().unwrap(), 20_000);
}

#[test]
fn test_cancelled_transaction_keeps_nothing() {
    let db = Database::open_in_memory().unwrap();
    db.exec("CREATE TABLE t (a INT)", &[]).unwrap();
    let tx = db.begin(true).unwrap();
    tx.exec("INSERT INTO t (a) VALUES (1)", &[]).unwrap();
    tx.cancel_token().cancel();
    assert!(matches!(
        tx.exec("INSERT INTO t (a) VALUES (2)", &[]),
        Err(DocqlError::Cancelled)
    ));
    assert!(tx.commit().is_err());
    drop(tx);
    assert_eq!(db.query("SELECT * FROM t", &[]).unwrap().count().unwrap(), 0);
    db.exec("INSERT INTO t (a) VALUES (3)", &[]).unwrap();
}

#[test]
fn test_reindex_restores_corrupted_index() {
    let db = Database::open_in_memory().unwrap();
    db.exec("CREATE TABLE t (a INT, b INT); CREATE INDEX ia ON t (a)", &[])
        .unwrap();
    db.exec("INSERT INTO t (a, b) VALUES (1, 10), (2, 20), (2, 30)", &[])
        .unwrap();

    let count_a2 = |db: &Database| {
        db.query("SELECT b FROM t WHERE a = 2", &[])
            .unwrap()
            .count()
            .unwrap()
    };
    assert_eq!(count_a2(&db), 2);

    let tx = db.begin(true).unwrap();
    tx.index("ia").unwrap().truncate().unwrap();
    tx.commit().unwrap();
    assert_eq!(count_a2(&db), 0);

    db.exec("REINDEX ia", &[]).unwrap();
    assert_eq!(count_a2(&db), 2);
}

#[test]
fn test_options_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Options::from_json(r#"{"engine": "lsm", "sort_spill_threshold": 8}"#).unwrap();
    assert_eq!(opts.engine, EngineKind::Lsm);
    let db = Database::open_with(dir.path().join("j.db"), opts).unwrap();
    assert_eq!(db.options().sort_spill_threshold, 8);
    db.close().unwrap();
}
