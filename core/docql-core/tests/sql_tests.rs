// SQL 통합 테스트
//
// Database::exec / query 를 통한 종단 간 동작 검증

use docql_core::{Database, Document, DocqlError, DocqlResult, Param, Value};

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn rows(db: &Database, sql: &str) -> Vec<Document> {
    let mut out = Vec::new();
    db.query(sql, &[])
        .unwrap()
        .iterate(|d| {
            out.push(d.clone());
            Ok(())
        })
        .unwrap();
    out
}

fn column(db: &Database, sql: &str, field: &str) -> Vec<Value> {
    rows(db, sql)
        .into_iter()
        .map(|d| d.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn ints(xs: &[i64]) -> Vec<Value> {
    xs.iter().map(|&i| Value::Integer(i)).collect()
}

fn plan(db: &Database, sql: &str) -> String {
    let doc = db.query_document(&format!("EXPLAIN {sql}"), &[]).unwrap();
    doc.get("plan").and_then(|v| v.as_str()).unwrap().to_string()
}

#[test]
fn test_auto_commit_script_sees_previous_statements() {
    let db = db();
    let n = db
        .query("CREATE TABLE t; INSERT INTO t VALUES {a: 1}; SELECT * FROM t", &[])
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(n, 1);
}

#[test]
fn test_duplicate_primary_key() {
    let db = db();
    db.exec("CREATE TABLE t (k INT PRIMARY KEY); INSERT INTO t (k) VALUES (1)", &[])
        .unwrap();
    let err = db.exec("INSERT INTO t (k) VALUES (1)", &[]).unwrap_err();
    assert!(matches!(err, DocqlError::DuplicateKey { .. }), "{err}");
    assert_eq!(column(&db, "SELECT k FROM t", "k"), ints(&[1]));
}

#[test]
fn test_on_conflict() {
    let db = db();
    db.exec("CREATE TABLE t (k INT PRIMARY KEY, v TEXT)", &[]).unwrap();
    db.exec("INSERT INTO t (k, v) VALUES (1, 'a')", &[]).unwrap();
    db.exec("INSERT INTO t (k, v) VALUES (1, 'b') ON CONFLICT DO NOTHING", &[])
        .unwrap();
    assert_eq!(column(&db, "SELECT v FROM t", "v"), vec![Value::from("a")]);
    db.exec("INSERT INTO t (k, v) VALUES (1, 'c') ON CONFLICT DO REPLACE", &[])
        .unwrap();
    assert_eq!(column(&db, "SELECT v FROM t", "v"), vec![Value::from("c")]);
}

#[test]
fn test_constraints() {
    let db = db();
    db.exec(
        "CREATE TABLE t (a INT NOT NULL, b TEXT DEFAULT 'x', c INT UNIQUE, CHECK (a > 0))",
        &[],
    )
    .unwrap();

    assert!(matches!(
        db.exec("INSERT INTO t (b) VALUES ('y')", &[]),
        Err(DocqlError::NotNullViolation { .. })
    ));
    assert!(matches!(
        db.exec("INSERT INTO t (a) VALUES ('nope')", &[]),
        Err(DocqlError::TypeMismatch { .. })
    ));
    assert!(matches!(
        db.exec("INSERT INTO t (a) VALUES (-1)", &[]),
        Err(DocqlError::CheckViolation { .. })
    ));

    db.exec("INSERT INTO t (a, c) VALUES (1, 10)", &[]).unwrap();
    assert_eq!(column(&db, "SELECT b FROM t", "b"), vec![Value::from("x")]);
    assert!(matches!(
        db.exec("INSERT INTO t (a, c) VALUES (2, 10)", &[]),
        Err(DocqlError::UniqueViolation { .. })
    ));
    // NULLs never collide
    db.exec("INSERT INTO t (a) VALUES (3); INSERT INTO t (a) VALUES (4)", &[])
        .unwrap();
}

#[test]
fn test_where_order_limit_offset() {
    let db = db();
    db.exec("CREATE TABLE t (a INT PRIMARY KEY, b INT)", &[]).unwrap();
    for i in 0..10 {
        db.exec(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            &[Param::positional(i), Param::positional(i % 3)],
        )
        .unwrap();
    }
    assert_eq!(
        column(&db, "SELECT a FROM t WHERE b = 1 ORDER BY a DESC", "a"),
        ints(&[7, 4, 1])
    );
    assert_eq!(
        column(&db, "SELECT a FROM t ORDER BY b LIMIT 3 OFFSET 2", "a"),
        ints(&[6, 9, 1])
    );
    assert_eq!(column(&db, "SELECT a FROM t WHERE a IN (2, 5, 42)", "a"), ints(&[2, 5]));
    assert_eq!(
        column(&db, "SELECT a FROM t WHERE a BETWEEN 3 AND 5 AND b != 1", "a"),
        ints(&[3, 5])
    );
}

#[test]
fn test_nested_documents_and_paths() {
    let db = db();
    db.exec("CREATE TABLE t (id INT PRIMARY KEY, info.age INT)", &[])
        .unwrap();
    db.exec(
        "INSERT INTO t VALUES {id: 1, info: {age: 30, tags: ['a', 'b']}}, {id: 2, info: {age: 20}}",
        &[],
    )
    .unwrap();
    assert_eq!(
        column(&db, "SELECT info.tags[1] AS t FROM t WHERE info.age > 25", "t"),
        vec![Value::from("b")]
    );
    assert_eq!(
        column(&db, "SELECT id FROM t ORDER BY info.age", "id"),
        ints(&[2, 1])
    );
}

#[test]
fn test_update_and_delete() {
    let db = db();
    db.exec("CREATE TABLE t (a INT PRIMARY KEY, b INT, c TEXT)", &[])
        .unwrap();
    db.exec("INSERT INTO t (a, b, c) VALUES (1, 10, 'x'), (2, 20, 'y'), (3, 30, 'z')", &[])
        .unwrap();

    db.exec("UPDATE t SET b = b + 1 WHERE a >= 2", &[]).unwrap();
    assert_eq!(column(&db, "SELECT b FROM t", "b"), ints(&[10, 21, 31]));

    db.exec("UPDATE t UNSET c WHERE a = 1", &[]).unwrap();
    let first = db.query_document("SELECT * FROM t WHERE a = 1", &[]).unwrap();
    assert!(!first.contains("c"));

    db.exec("DELETE FROM t WHERE b > 20", &[]).unwrap();
    assert_eq!(column(&db, "SELECT a FROM t", "a"), ints(&[1]));
}

#[test]
fn test_update_through_index_does_not_revisit_rows() {
    let db = db();
    db.exec("CREATE TABLE t (a INT PRIMARY KEY, b INT); CREATE INDEX ON t (b)", &[])
        .unwrap();
    db.exec("INSERT INTO t (a, b) VALUES (1, 1), (2, 2), (3, 3)", &[])
        .unwrap();
    db.exec("UPDATE t SET b = b + 10 WHERE b > 0", &[]).unwrap();
    assert_eq!(column(&db, "SELECT b FROM t", "b"), ints(&[11, 12, 13]));
    assert_eq!(column(&db, "SELECT a FROM t WHERE b = 12", "a"), ints(&[2]));
}

#[test]
fn test_group_by_and_aggregates() {
    let db = db();
    db.exec("CREATE TABLE t (a INT, b INT)", &[]).unwrap();
    db.exec("INSERT INTO t (a, b) VALUES (1, 2), (1, 4), (2, 6)", &[])
        .unwrap();

    let out = rows(&db, "SELECT a, COUNT(*), SUM(b), AVG(b) FROM t GROUP BY a");
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get("a"), Some(&Value::Integer(1)));
    assert_eq!(out[0].get("COUNT(*)"), Some(&Value::Integer(2)));
    assert_eq!(out[0].get("SUM(b)"), Some(&Value::Integer(6)));
    assert_eq!(out[0].get("AVG(b)"), Some(&Value::Double(3.0)));

    let total = db
        .query_document("SELECT COUNT(*) AS n, MIN(b), MAX(b) FROM t", &[])
        .unwrap();
    assert_eq!(total.get("n"), Some(&Value::Integer(3)));
    assert_eq!(total.get("MIN(b)"), Some(&Value::Integer(2)));
    assert_eq!(total.get("MAX(b)"), Some(&Value::Integer(6)));

    // aggregates over an empty table still yield one row
    db.exec("CREATE TABLE e", &[]).unwrap();
    let empty = db.query_document("SELECT COUNT(*) FROM e", &[]).unwrap();
    assert_eq!(empty.get("COUNT(*)"), Some(&Value::Integer(0)));

    assert!(db.query("SELECT b FROM t GROUP BY a", &[]).is_err());
}

#[test]
fn test_insert_select_and_returning() {
    let db = db();
    db.exec("CREATE TABLE src (a INT); CREATE TABLE dst (x INT PRIMARY KEY)", &[])
        .unwrap();
    db.exec("INSERT INTO src (a) VALUES (3), (1), (2)", &[]).unwrap();
    db.exec("INSERT INTO dst (x) SELECT a FROM src", &[]).unwrap();
    assert_eq!(column(&db, "SELECT x FROM dst", "x"), ints(&[1, 2, 3]));

    let returned = column(&db, "INSERT INTO dst (x) VALUES (10), (11) RETURNING x * 2 AS y", "y");
    assert_eq!(returned, ints(&[20, 22]));
}

#[test]
fn test_expressions() {
    let db = db();
    let doc = db
        .query_document(
            "SELECT 1 + 2 * 3 AS a, 7 / 0 AS b, 'ab' || 'cd' AS c, typeof(1.5) AS d, \
             CAST('12' AS INT) AS e, NULL = NULL AS f, 'abc' LIKE 'a%' AS g, 1 = 'a' AS h, \
             len([1, 2, 3]) AS i, 9223372036854775807 + 1 AS j",
            &[],
        )
        .unwrap();
    assert_eq!(doc.get("a"), Some(&Value::Integer(7)));
    assert_eq!(doc.get("b"), Some(&Value::Null));
    assert_eq!(doc.get("c"), Some(&Value::from("abcd")));
    assert_eq!(doc.get("d"), Some(&Value::from("double")));
    assert_eq!(doc.get("e"), Some(&Value::Integer(12)));
    assert_eq!(doc.get("f"), Some(&Value::Null));
    assert_eq!(doc.get("g"), Some(&Value::Bool(true)));
    assert_eq!(doc.get("h"), Some(&Value::Bool(false)));
    assert_eq!(doc.get("i"), Some(&Value::Integer(3)));
    assert_eq!(doc.get("j"), Some(&Value::Null));
}

#[test]
fn test_docid_tables_and_pk() {
    let db = db();
    db.exec("CREATE TABLE t", &[]).unwrap();
    db.exec("INSERT INTO t VALUES {a: 'x'}, {a: 'y'}", &[]).unwrap();
    assert_eq!(
        column(&db, "SELECT pk() AS k FROM t", "k"),
        ints(&[1, 2])
    );
}

#[test]
fn test_sequences() {
    let db = db();
    db.exec("CREATE SEQUENCE s INCREMENT BY 5 START WITH 10 MAXVALUE 20", &[])
        .unwrap();
    let next = |db: &Database| -> DocqlResult<Value> {
        let doc = db.query_document("SELECT NEXT VALUE FOR s AS v", &[])?;
        Ok(doc.get("v").cloned().unwrap_or(Value::Null))
    };
    assert_eq!(next(&db).unwrap(), Value::Integer(10));
    assert_eq!(next(&db).unwrap(), Value::Integer(15));
    assert_eq!(next(&db).unwrap(), Value::Integer(20));
    assert!(matches!(next(&db), Err(DocqlError::SequenceExhausted { .. })));

    db.exec("CREATE TABLE t", &[]).unwrap();
    assert!(db.exec("DROP SEQUENCE t_seq", &[]).is_err());
    db.exec("DROP SEQUENCE s", &[]).unwrap();
    assert!(matches!(next(&db), Err(DocqlError::SequenceNotFound(_))));
}

#[test]
fn test_explain_plan_selection() {
    let db = db();
    db.exec(
        "CREATE TABLE test (a INT, b INT, c INT); CREATE INDEX idx_a ON test (a)",
        &[],
    )
    .unwrap();
    assert_eq!(
        plan(&db, "SELECT a + 1 FROM test WHERE a > 10"),
        "indexScan(idx_a, [10, -1, true]) | project(a + 1)"
    );
    assert_eq!(
        plan(&db, "SELECT a + 1 FROM test WHERE c > 10"),
        "seqScan(test) | filter(c > 10) | project(a + 1)"
    );
    assert_eq!(
        plan(&db, "SELECT * FROM test WHERE a = 3 AND b = 2"),
        "indexScan(idx_a, 3) | filter(b = 2)"
    );
}

#[test]
fn test_alter_table() {
    let db = db();
    db.exec("CREATE TABLE t (a INT PRIMARY KEY)", &[]).unwrap();
    db.exec("INSERT INTO t (a) VALUES (1), (2)", &[]).unwrap();

    db.exec("ALTER TABLE t ADD FIELD b INT DEFAULT 0", &[]).unwrap();
    assert_eq!(column(&db, "SELECT b FROM t", "b"), ints(&[0, 0]));
    assert!(db.exec("ALTER TABLE t ADD FIELD c INT NOT NULL", &[]).is_err());
    assert!(db.exec("ALTER TABLE t ADD FIELD d INT UNIQUE", &[]).is_ok());

    db.exec("ALTER TABLE t RENAME TO u", &[]).unwrap();
    assert!(matches!(
        db.exec("SELECT * FROM t", &[]),
        Err(DocqlError::TableNotFound(_))
    ));
    assert_eq!(column(&db, "SELECT a FROM u", "a"), ints(&[1, 2]));
    assert!(db.exec("ALTER TABLE u RENAME TO u", &[]).unwrap_err().is_already_exists());
}

#[test]
fn test_system_tables_are_read_only() {
    let db = db();
    db.exec("CREATE TABLE t (a INT)", &[]).unwrap();
    let tables: Vec<Value> = rows(&db, "SELECT * FROM __docql_catalog")
        .into_iter()
        .filter(|d| d.get("type") == Some(&Value::from("table")))
        .filter_map(|d| d.get("name").cloned())
        .collect();
    assert_eq!(tables, vec![Value::from("t")]);
    assert!(matches!(
        db.exec("DELETE FROM __docql_catalog", &[]),
        Err(DocqlError::ReadOnlyTable(_))
    ));
    assert!(db.exec("CREATE TABLE __docql_mine (a INT)", &[]).is_err());
}

#[test]
fn test_read_isolation() {
    let db = db();
    db.exec("CREATE TABLE t (a INT)", &[]).unwrap();
    let writer = db.begin(true).unwrap();
    writer.exec("INSERT INTO t (a) VALUES (1)", &[]).unwrap();

    let reader = db.begin(false).unwrap();
    assert_eq!(reader.query("SELECT * FROM t", &[]).unwrap().count().unwrap(), 0);
    writer.commit().unwrap();
    assert_eq!(reader.query("SELECT * FROM t", &[]).unwrap().count().unwrap(), 0);
    reader.rollback().unwrap();

    assert_eq!(db.query("SELECT * FROM t", &[]).unwrap().count().unwrap(), 1);
}

#[test]
fn test_ddl_rolls_back_with_transaction() {
    let db = db();
    db.exec("BEGIN; CREATE TABLE t (a INT); CREATE INDEX ON t (a); ROLLBACK", &[])
        .unwrap();
    assert!(matches!(
        db.exec("SELECT * FROM t", &[]),
        Err(DocqlError::TableNotFound(_))
    ));
    db.exec("CREATE TABLE t (a INT); CREATE INDEX ON t (a)", &[]).unwrap();
    assert_eq!(plan(&db, "SELECT * FROM t WHERE a = 1"), "indexScan(t_a_idx, 1)");
}

/// Every entry of each index is exactly a (values, pk) pair of a live row.
fn assert_indexes_match_rows(db: &Database, table: &str, indexes: &[&str]) {
    let tx = db.begin(false).unwrap();
    let t = tx.table(table).unwrap();
    for name in indexes {
        let idx = tx.index(name).unwrap();
        let mut expected = Vec::new();
        let mut rows = t.cursor(false).unwrap();
        while let Some((pk, doc)) = rows.next_row().unwrap() {
            expected.push((idx.values_of(&doc).unwrap(), pk));
        }
        let mut actual = Vec::new();
        let mut entries = idx.ascend_from(&[]);
        while let Some(entry) = entries.next_entry().unwrap() {
            actual.push(entry);
        }
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected, "index {name}");
    }
    tx.rollback().unwrap();
}

#[test]
fn test_reindex_repairs_damaged_indexes() {
    let db = db();
    db.exec("CREATE TABLE t (a INT, b INT); CREATE INDEX ia ON t (a); CREATE INDEX ib ON t (b)", &[])
        .unwrap();
    db.exec("INSERT INTO t (a, b) VALUES (1, 1), (2, 2), (2, 3), (3, NULL)", &[])
        .unwrap();

    // drop some entries of ia and every entry of ib
    let tx = db.begin(true).unwrap();
    {
        let t = tx.table("t").unwrap();
        let ia = tx.index("ia").unwrap();
        let mut rows = t.cursor(false).unwrap();
        while let Some((pk, doc)) = rows.next_row().unwrap() {
            if doc.get("a") == Some(&Value::Integer(2)) {
                ia.delete(&ia.values_of(&doc).unwrap(), &pk).unwrap();
            }
        }
        tx.index("ib").unwrap().truncate().unwrap();
    }
    tx.commit().unwrap();
    assert!(column(&db, "SELECT a FROM t WHERE a = 2", "a").is_empty());

    db.exec("REINDEX ia", &[]).unwrap();
    assert_indexes_match_rows(&db, "t", &["ia"]);
    assert_eq!(column(&db, "SELECT a FROM t WHERE a = 2", "a"), ints(&[2, 2]));

    db.exec("REINDEX t", &[]).unwrap();
    assert_indexes_match_rows(&db, "t", &["ia", "ib"]);
    assert_eq!(column(&db, "SELECT b FROM t WHERE b < 2", "b"), ints(&[1]));

    // rebuilding healthy indexes changes nothing
    db.exec("REINDEX", &[]).unwrap();
    assert_indexes_match_rows(&db, "t", &["ia", "ib"]);
    assert!(matches!(db.exec("REINDEX nope", &[]), Err(DocqlError::IndexNotFound(_))));
}

#[test]
fn test_indexes_follow_every_write() {
    let db = db();
    db.exec(
        "CREATE TABLE t (id INT PRIMARY KEY, a INT, b TEXT UNIQUE); \
         CREATE INDEX ia ON t (a); \
         CREATE INDEX iab ON t (a, b)",
        &[],
    )
    .unwrap();
    let indexes = ["ia", "iab", "t_b_idx"];

    db.exec(
        "INSERT INTO t (id, a, b) VALUES (1, 10, 'x'), (2, 20, 'y'), (3, 10, 'z'), (4, 30, 'w')",
        &[],
    )
    .unwrap();
    assert_indexes_match_rows(&db, "t", &indexes);

    db.exec("UPDATE t SET a = a + 1 WHERE a = 10", &[]).unwrap();
    db.exec("UPDATE t SET b = 'v' WHERE id = 2", &[]).unwrap();
    db.exec("UPDATE t UNSET b WHERE id = 4", &[]).unwrap();
    assert_indexes_match_rows(&db, "t", &indexes);

    db.exec("DELETE FROM t WHERE a = 11 AND b = 'z'", &[]).unwrap();
    // same primary key, then same unique value under a new key
    db.exec("INSERT INTO t (id, a, b) VALUES (1, 50, 'q') ON CONFLICT DO REPLACE", &[])
        .unwrap();
    db.exec("INSERT INTO t (id, a, b) VALUES (9, 60, 'v') ON CONFLICT DO REPLACE", &[])
        .unwrap();
    db.exec("INSERT INTO t (id, a, b) VALUES (4, 70, 'q') ON CONFLICT DO NOTHING", &[])
        .unwrap();
    assert_indexes_match_rows(&db, "t", &indexes);

    assert_eq!(column(&db, "SELECT id FROM t ORDER BY id", "id"), ints(&[1, 4, 9]));
    assert_eq!(column(&db, "SELECT id FROM t WHERE b = 'v'", "id"), ints(&[9]));
}

#[test]
fn test_numeric_keys_compare_by_value() {
    let db = db();
    db.exec("CREATE TABLE t (a UNIQUE); INSERT INTO t (a) VALUES (2)", &[])
        .unwrap();
    assert!(matches!(
        db.exec("INSERT INTO t (a) VALUES (2.0)", &[]),
        Err(DocqlError::UniqueViolation { .. })
    ));
    db.exec("INSERT INTO t (a) VALUES (2.5)", &[]).unwrap();
    db.exec("INSERT INTO t (a) VALUES (2.0) ON CONFLICT DO NOTHING", &[])
        .unwrap();
    assert_eq!(rows(&db, "SELECT a FROM t").len(), 2);

    db.exec("CREATE TABLE p (k PRIMARY KEY); INSERT INTO p (k) VALUES (2)", &[])
        .unwrap();
    assert!(matches!(
        db.exec("INSERT INTO p (k) VALUES (2.0)", &[]),
        Err(DocqlError::DuplicateKey { .. })
    ));
    db.exec("INSERT INTO p (k) VALUES (2.0), (3) ON CONFLICT DO NOTHING", &[])
        .unwrap();
    assert_eq!(column(&db, "SELECT k FROM p", "k"), ints(&[2, 3]));
    assert_eq!(rows(&db, "SELECT * FROM p WHERE k = 2.0").len(), 1);
}

#[test]
fn test_select_distinct() {
    let db = db();
    db.exec("CREATE TABLE t", &[]).unwrap();
    db.exec(
        "INSERT INTO t VALUES {a: 1, b: 'x'}, {b: 'x', a: 1}, {a: 2, b: 'y'}, {a: 1.0, b: 'x'}, {a: 3, b: 'y'}",
        &[],
    )
    .unwrap();
    assert_eq!(rows(&db, "SELECT DISTINCT a, b FROM t").len(), 3);
    assert_eq!(
        column(&db, "SELECT DISTINCT b FROM t ORDER BY b DESC", "b"),
        vec![Value::from("y"), Value::from("x")]
    );
    assert_eq!(
        column(&db, "SELECT DISTINCT a + 1 AS n FROM t ORDER BY n LIMIT 2", "n"),
        ints(&[2, 3])
    );
    assert_eq!(
        plan(&db, "SELECT DISTINCT b FROM t"),
        "seqScan(t) | project(b) | distinct()"
    );
}

#[test]
fn test_union_and_union_all() {
    let db = db();
    db.exec(
        "CREATE TABLE t1 (a INT); CREATE TABLE t2 (a INT); \
         INSERT INTO t1 (a) VALUES (3), (1), (2); \
         INSERT INTO t2 (a) VALUES (4), (2), (3)",
        &[],
    )
    .unwrap();

    assert_eq!(
        column(&db, "SELECT a FROM t1 UNION SELECT a FROM t2", "a"),
        ints(&[1, 2, 3, 4])
    );
    assert_eq!(rows(&db, "SELECT a FROM t1 UNION ALL SELECT a FROM t2").len(), 6);
    assert_eq!(
        column(&db, "SELECT a FROM t1 UNION ALL SELECT a FROM t2 ORDER BY a DESC LIMIT 3", "a"),
        ints(&[4, 3, 3])
    );
    assert_eq!(
        column(&db, "SELECT a FROM t1 WHERE a > 1 UNION SELECT 10 AS a", "a"),
        ints(&[2, 3, 10])
    );
    assert_eq!(
        plan(&db, "SELECT a FROM t1 UNION ALL SELECT a FROM t2 LIMIT 1"),
        "concat(seqScan(t1) | project(a), seqScan(t2) | project(a)) | take(1)"
    );

    // INSERT ... SELECT over a union
    db.exec("CREATE TABLE all_a (a INT)", &[]).unwrap();
    db.exec("INSERT INTO all_a SELECT a FROM t1 UNION SELECT a FROM t2", &[])
        .unwrap();
    assert_eq!(rows(&db, "SELECT * FROM all_a").len(), 4);

    assert!(matches!(
        db.exec("SELECT a FROM t1 LIMIT 1 UNION SELECT a FROM t2", &[]),
        Err(DocqlError::SqlParse { .. })
    ));
}

#[test]
fn test_large_sort_spills() {
    let options = docql_core::Options {
        sort_spill_threshold: 16,
        ..docql_core::Options::in_memory()
    };
    let db = Database::open_with(":memory:", options).unwrap();
    db.exec("CREATE TABLE t (a INT PRIMARY KEY, b INT)", &[]).unwrap();
    let insert = db.prepare("INSERT INTO t (a, b) VALUES (?, ?)").unwrap();
    for i in 0..100i64 {
        insert
            .exec(&[Param::positional(i), Param::positional((i * 37) % 100)])
            .unwrap();
    }
    let sorted = column(&db, "SELECT b FROM t ORDER BY b DESC", "b");
    assert_eq!(sorted, (0..100).rev().map(Value::Integer).collect::<Vec<_>>());
}

#[test]
fn test_spilled_sort_keeps_ties_in_input_order() {
    let spilling = Database::open_with(
        ":memory:",
        docql_core::Options {
            sort_spill_threshold: 16,
            ..docql_core::Options::in_memory()
        },
    )
    .unwrap();
    let in_memory = db();
    for db in [&spilling, &in_memory] {
        db.exec("CREATE TABLE t (a INT PRIMARY KEY, b INT)", &[]).unwrap();
        let insert = db.prepare("INSERT INTO t (a, b) VALUES (?, ?)").unwrap();
        for i in 0..100i64 {
            insert
                .exec(&[Param::positional(i), Param::positional(i % 5)])
                .unwrap();
        }
    }

    let expected: Vec<Value> = (0..5i64)
        .rev()
        .flat_map(|b| (0..100i64).filter(move |a| a % 5 == b))
        .map(Value::Integer)
        .collect();
    for db in [&spilling, &in_memory] {
        assert_eq!(column(db, "SELECT a FROM t ORDER BY b DESC", "a"), expected);
    }
    let ascending = column(&spilling, "SELECT a FROM t ORDER BY b", "a");
    assert_eq!(ascending[..3], ints(&[0, 5, 10])[..]);
}
