//! SQL INSERT / SELECT Performance Benchmark
//!
//! Compares multi-row scripts, prepared statements and explicit
//! transactions across the storage backends.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use docql_core::{Database, EngineKind, Options, Param};
use tempfile::TempDir;

const SCHEMA: &str = "CREATE TABLE users (id INT PRIMARY KEY, name TEXT, email TEXT); \
                      CREATE INDEX users_name_idx ON users (name)";

/// Generate SQL INSERT statement with multiple rows
fn generate_multi_row_insert(count: usize) -> String {
    let mut sql = String::from("INSERT INTO users (id, name, email) VALUES ");
    for i in 0..count {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!("({}, 'user{}', 'user{}@example.com')", i, i, i));
    }
    sql
}

fn open(kind: EngineKind) -> (Database, Option<TempDir>) {
    let options = Options {
        engine: kind,
        sync_on_commit: false,
        ..Options::default()
    };
    let (db, dir) = match kind {
        EngineKind::Memory => (Database::open_with(":memory:", options).unwrap(), None),
        _ => {
            let dir = tempfile::tempdir().unwrap();
            let db = Database::open_with(dir.path().join("bench.db"), options).unwrap();
            (db, Some(dir))
        }
    };
    db.exec(SCHEMA, &[]).unwrap();
    (db, dir)
}

const ENGINES: [EngineKind; 3] = [EngineKind::Memory, EngineKind::BTree, EngineKind::Lsm];

/// Benchmark: Multi-row INSERT in one statement
fn bench_multi_row_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_row_insert");
    group.sample_size(20);

    for kind in ENGINES {
        for count in [10, 100, 1000] {
            let sql = generate_multi_row_insert(count);
            group.bench_with_input(
                BenchmarkId::new(format!("{kind:?}"), count),
                &sql,
                |b, sql| {
                    b.iter_batched(
                        || open(kind),
                        |(db, _dir)| black_box(db.exec(sql, &[])),
                        criterion::BatchSize::PerIteration,
                    );
                },
            );
        }
    }

    group.finish();
}

/// Benchmark: Prepared INSERT inside one transaction vs auto-commit
fn bench_prepared_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepared_insert");
    group.sample_size(20);

    group.bench_function("auto_commit", |b| {
        b.iter_batched(
            || open(EngineKind::Memory),
            |(db, _dir)| {
                let stmt = db
                    .prepare("INSERT INTO users (id, name, email) VALUES (?, ?, ?)")
                    .unwrap();
                for i in 0..100i64 {
                    stmt.exec(&[
                        Param::positional(i),
                        Param::positional(format!("user{i}")),
                        Param::positional(format!("user{i}@example.com")),
                    ])
                    .unwrap();
                }
            },
            criterion::BatchSize::PerIteration,
        );
    });

    group.bench_function("single_transaction", |b| {
        b.iter_batched(
            || open(EngineKind::Memory),
            |(db, _dir)| {
                let tx = db.begin(true).unwrap();
                let stmt = tx
                    .prepare("INSERT INTO users (id, name, email) VALUES (?, ?, ?)")
                    .unwrap();
                for i in 0..100i64 {
                    stmt.exec(&[
                        Param::positional(i),
                        Param::positional(format!("user{i}")),
                        Param::positional(format!("user{i}@example.com")),
                    ])
                    .unwrap();
                }
                drop(stmt);
                tx.commit().unwrap();
            },
            criterion::BatchSize::PerIteration,
        );
    });

    group.finish();
}

/// Benchmark: point lookups through the primary key and a secondary index
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    let (db, _dir) = open(EngineKind::Memory);
    db.exec(&generate_multi_row_insert(1000), &[]).unwrap();

    group.bench_function("pk", |b| {
        b.iter(|| {
            black_box(
                db.query_document("SELECT * FROM users WHERE id = ?", &[Param::positional(500)])
                    .unwrap(),
            )
        });
    });

    group.bench_function("secondary_index", |b| {
        b.iter(|| {
            black_box(
                db.query_document(
                    "SELECT * FROM users WHERE name = ?",
                    &[Param::positional("user500")],
                )
                .unwrap(),
            )
        });
    });

    group.bench_function("full_scan_sorted", |b| {
        b.iter(|| {
            black_box(
                db.query("SELECT id FROM users ORDER BY email DESC LIMIT 10", &[])
                    .unwrap()
                    .count()
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_multi_row_insert,
    bench_prepared_insert,
    bench_lookup
);
criterion_main!(benches);
