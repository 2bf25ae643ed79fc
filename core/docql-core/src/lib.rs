//! # docql — Embedded Document SQL Database
//!
//! docql는 정렬된 키-값 저장소 위에 구현된 임베디드 문서 데이터베이스입니다.
//! 테이블은 스키마가 느슨한 문서를 저장하고, SQL로 조회하고 변경합니다.
//!
//! ## 주요 특징
//!
//! - **문서 모델**: 중첩 문서와 배열, 선택적 필드 타입 제약
//! - **SQL 지원**: SELECT, INSERT, UPDATE, DELETE, GROUP BY, ORDER BY, RETURNING
//! - **ACID 트랜잭션**: 단일 writer, 동시 reader
//! - **보조 인덱스**: 복합 키, UNIQUE, 옵티마이저의 인덱스 선택
//! - **교체 가능한 저장 엔진**: 메모리, redb B+tree, sled LSM
//!
//! ## 빠른 시작
//!
//! ```rust
//! use docql_core::{Database, Param};
//!
//! # fn main() -> docql_core::DocqlResult<()> {
//! // 데이터베이스 열기
//! let db = Database::open_in_memory()?;
//!
//! db.exec("CREATE TABLE users (id INT PRIMARY KEY, name TEXT, tags ARRAY)", &[])?;
//! db.exec(
//!     "INSERT INTO users (id, name, tags) VALUES (?, ?, ['admin'])",
//!     &[Param::positional(1), Param::positional("Alice")],
//! )?;
//!
//! let doc = db.query_document("SELECT name, tags[0] AS tag FROM users", &[])?;
//! assert_eq!(doc.get("tag").and_then(|v| v.as_str()), Some("admin"));
//! # Ok(())
//! # }
//! ```
//!
//! ### 트랜잭션
//!
//! ```rust
//! use docql_core::Database;
//!
//! # fn main() -> docql_core::DocqlResult<()> {
//! let db = Database::open_in_memory()?;
//! db.exec("CREATE TABLE t (a INT)", &[])?;
//!
//! let tx = db.begin(true)?;
//! tx.exec("INSERT INTO t (a) VALUES (1)", &[])?;
//! tx.commit()?;
//!
//! // SQL로도 가능
//! db.exec("BEGIN; INSERT INTO t (a) VALUES (2); COMMIT", &[])?;
//! assert_eq!(db.query("SELECT * FROM t", &[])?.count()?, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## 아키텍처
//!
//! ### SQL 실행 파이프라인
//!
//! ```text
//! SQL 문자열 → Parser → Statement → LogicalPlanner → Stream
//!          → Optimizer → Stream → Executor (Volcano) → Document
//! ```
//!
//! ## 모듈 구조
//!
//! - [`engine`] — 데이터베이스 엔진 ([`Database`], [`Transaction`])
//! - [`sql`] — SQL 파서, 플래너, 최적화기, 실행기
//! - [`catalog`] — 테이블, 인덱스, 시퀀스 정의
//! - [`table`] / [`index`] — 문서 저장과 보조 인덱스
//! - [`encoding`] — 순서를 보존하는 키 인코딩
//! - [`storage`] — 키-값 저장 엔진
//! - [`value`] — 값, 문서, 경로

pub mod catalog;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod index;
pub mod sql;
pub mod storage;
pub mod table;
pub mod value;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use engine::{
    Database, EngineKind, Options, Param, PreparedStatement, QueryResult, Transaction,
};
pub use error::{DocqlError, DocqlResult};
pub use value::{Document, Path, Value, ValueType};
