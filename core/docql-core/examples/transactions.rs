//! 트랜잭션 사용 예제
//!
//! 실행: cargo run --example transactions

use docql_core::{Database, DocqlError};

fn main() -> docql_core::DocqlResult<()> {
    println!("=== docql 트랜잭션 예제 ===\n");

    let db = Database::open_in_memory()?;
    db.exec("CREATE TABLE accounts (id INT PRIMARY KEY, balance INT CHECK (balance >= 0))", &[])?;
    db.exec("INSERT INTO accounts (id, balance) VALUES (1, 1000), (2, 2000)", &[])?;

    // 1. API 트랜잭션
    println!("1. API 트랜잭션...");
    let tx = db.begin(true)?;
    tx.exec("UPDATE accounts SET balance = balance - 300 WHERE id = 1", &[])?;
    tx.exec("UPDATE accounts SET balance = balance + 300 WHERE id = 2", &[])?;
    tx.commit()?;
    println!("   ✓ 이체 커밋\n");

    // 2. 실패한 이체는 롤백
    println!("2. 제약 위반 → 롤백...");
    let tx = db.begin(true)?;
    tx.exec("UPDATE accounts SET balance = balance + 5000 WHERE id = 2", &[])?;
    match tx.exec("UPDATE accounts SET balance = balance - 5000 WHERE id = 1", &[]) {
        Err(e @ DocqlError::CheckViolation { .. }) => {
            println!("   ✓ {e}");
            tx.rollback()?;
        }
        other => {
            other?;
            tx.commit()?;
        }
    }
    println!();

    // 3. SQL 트랜잭션
    println!("3. BEGIN / COMMIT...");
    db.exec("BEGIN; INSERT INTO accounts (id, balance) VALUES (3, 0)", &[])?;
    db.exec("COMMIT", &[])?;

    let mut rows = db.query("SELECT id, balance FROM accounts", &[])?;
    rows.iterate(|doc| {
        println!("   {}", doc.to_json_string()?);
        Ok(())
    })?;
    rows.close()?;

    println!("\n=== 예제 완료 ===");
    Ok(())
}
