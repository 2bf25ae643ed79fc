//! 기본 CRUD 작업 예제
//!
//! 실행: cargo run --example basic_crud

use docql_core::{Database, Param};

fn main() -> docql_core::DocqlResult<()> {
    println!("=== docql 기본 CRUD 예제 ===\n");

    // 1. 인메모리 데이터베이스 생성
    println!("1. 데이터베이스 생성...");
    let db = Database::open_in_memory()?;
    db.exec(
        "CREATE TABLE users (id INT PRIMARY KEY, name TEXT NOT NULL, address.city TEXT)",
        &[],
    )?;
    println!("   ✓ users 테이블 생성 완료\n");

    // 2. 데이터 삽입 (Create)
    println!("2. 데이터 삽입...");
    db.exec(
        "INSERT INTO users VALUES {id: 1, name: 'Alice', address: {city: 'Seoul'}}",
        &[],
    )?;
    db.exec("INSERT INTO users (id, name) VALUES (2, 'Bob'), (3, 'Charlie')", &[])?;
    println!("   ✓ 3개 문서 삽입 완료\n");

    // 3. 데이터 조회 (Read)
    println!("3. 데이터 조회...");
    let alice = db.query_document("SELECT * FROM users WHERE id = ?", &[Param::positional(1)])?;
    println!("   id=1 → {}", alice.to_json_string()?);
    println!();

    // 4. 데이터 수정 (Update)
    println!("4. 데이터 수정...");
    db.exec(
        "UPDATE users SET name = $name WHERE id = 1",
        &[Param::named("name", "Alice Updated")],
    )?;
    let alice = db.query_document("SELECT name FROM users WHERE id = 1", &[])?;
    println!("   id=1 → {} (수정됨)\n", alice.to_json_string()?);

    // 5. 데이터 삭제 (Delete)
    println!("5. 데이터 삭제...");
    db.exec("DELETE FROM users WHERE id = 3", &[])?;
    println!("   ✓ id=3 삭제 완료\n");

    // 6. 통계 확인
    println!("6. 통계 확인...");
    let count = db.query("SELECT * FROM users", &[])?.count()?;
    println!("   총 문서 수: {}\n", count);

    // 7. 실행 계획
    println!("7. EXPLAIN...");
    let plan = db.query_document("EXPLAIN SELECT name FROM users WHERE id > 1", &[])?;
    println!("   {}\n", plan.to_json_string()?);

    db.close()?;
    println!("=== 예제 완료 ===");
    Ok(())
}
