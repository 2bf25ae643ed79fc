//! Error types for the docql database engine.
//!
//! All public APIs return `DocqlResult<T>` — no panics in library code.

use thiserror::Error;

/// Unified error type for all docql operations.
#[derive(Debug, Error)]
pub enum DocqlError {
    // ════════════════════════════════════════
    // Transaction errors
    // ════════════════════════════════════════
    /// Write attempted through a read-only transaction
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// Transaction already committed or rolled back
    #[error("transaction discarded")]
    TransactionDiscarded,

    /// Misuse of BEGIN / COMMIT / ROLLBACK
    #[error("transaction control error: {0}")]
    TransactionControl(String),

    /// Operation cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Database used after `close`
    #[error("database is closed")]
    Closed,

    // ════════════════════════════════════════
    // Storage errors
    // ════════════════════════════════════════
    #[error("store '{0}' not found")]
    StoreNotFound(String),

    #[error("store '{0}' already exists")]
    StoreAlreadyExists(String),

    /// Requested key does not exist
    #[error("key not found")]
    KeyNotFound,

    #[error("empty keys are not allowed")]
    EmptyKey,

    #[error("empty values are not allowed")]
    EmptyValue,

    /// Corrupt or truncated encoded bytes
    #[error("encoding error: {0}")]
    Encoding(String),

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// redb embedded database error
    #[error("redb error: {source}")]
    Redb {
        #[from]
        source: redb::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON mapping error
    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    // ════════════════════════════════════════
    // Catalog errors
    // ════════════════════════════════════════
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("index '{0}' not found")]
    IndexNotFound(String),

    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    #[error("sequence '{0}' not found")]
    SequenceNotFound(String),

    #[error("sequence '{0}' already exists")]
    SequenceAlreadyExists(String),

    /// Name already taken by an object of another kind
    #[error("name '{0}' already exists")]
    AlreadyExists(String),

    // ════════════════════════════════════════
    // Constraint errors
    // ════════════════════════════════════════
    #[error("field '{path}' is required and must be not null")]
    NotNullViolation { path: String },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("duplicate primary key in table '{table}'")]
    DuplicateKey { table: String },

    #[error("unique constraint violated on index '{index}'")]
    UniqueViolation { index: String },

    #[error("check constraint failed on table '{table}': {check}")]
    CheckViolation { table: String, check: String },

    /// System tables reject all mutations
    #[error("table '{0}' is read-only")]
    ReadOnlyTable(String),

    #[error("sequence '{name}' reached its {bound} value ({value})")]
    SequenceExhausted {
        name: String,
        bound: &'static str,
        value: i64,
    },

    // ════════════════════════════════════════
    // Query errors
    // ════════════════════════════════════════
    /// SQL parsing error
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Missing positional or named parameter
    #[error("parameter {0} not found")]
    ParamNotFound(String),

    /// Query returned no rows where one was required
    #[error("no rows in result")]
    NotFound,

    /// Invalid operation
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },
}

impl DocqlError {
    pub(crate) fn invalid(message: impl Into<String>, context: impl Into<String>) -> Self {
        DocqlError::InvalidOperation {
            message: message.into(),
            context: context.into(),
        }
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        DocqlError::Encoding(message.into())
    }

    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        DocqlError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// `IF EXISTS` 변환 대상인지 확인
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DocqlError::TableNotFound(_)
                | DocqlError::IndexNotFound(_)
                | DocqlError::SequenceNotFound(_)
                | DocqlError::StoreNotFound(_)
        )
    }

    /// `IF NOT EXISTS` 변환 대상인지 확인
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            DocqlError::TableAlreadyExists(_)
                | DocqlError::IndexAlreadyExists(_)
                | DocqlError::SequenceAlreadyExists(_)
                | DocqlError::AlreadyExists(_)
                | DocqlError::StoreAlreadyExists(_)
        )
    }

    /// Cancellation always rolls back the owning transaction.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DocqlError::Cancelled | DocqlError::DeadlineExceeded)
    }
}

/// Result type alias for all docql operations.
pub type DocqlResult<T> = Result<T, DocqlError>;

// redb 세부 에러 타입들은 redb::Error 로 합쳐서 보관
macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for DocqlError {
                fn from(err: $ty) -> Self {
                    DocqlError::Redb {
                        source: redb::Error::from(err),
                    }
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_table_not_found() {
        let err = DocqlError::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "table 'users' not found");
    }

    #[test]
    fn error_display_type_mismatch() {
        let err = DocqlError::type_mismatch("integer", "text");
        assert_eq!(err.to_string(), "type mismatch: expected integer, got text");
    }

    #[test]
    fn error_display_not_null() {
        let err = DocqlError::NotNullViolation {
            path: "a.b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "field 'a.b' is required and must be not null"
        );
    }

    #[test]
    fn error_display_sql_parse() {
        let err = DocqlError::SqlParse {
            message: "unexpected token".to_string(),
            sql: "SELECT * FORM users".to_string(),
        };
        assert!(err.to_string().contains("SQL parse error"));
        assert!(err.to_string().contains("FORM users"));
    }

    #[test]
    fn not_found_classification() {
        assert!(DocqlError::TableNotFound("t".into()).is_not_found());
        assert!(DocqlError::IndexNotFound("i".into()).is_not_found());
        assert!(!DocqlError::KeyNotFound.is_not_found());
        assert!(DocqlError::SequenceAlreadyExists("s".into()).is_already_exists());
        assert!(!DocqlError::TableNotFound("t".into()).is_already_exists());
    }

    #[test]
    fn cancellation_classification() {
        assert!(DocqlError::Cancelled.is_cancellation());
        assert!(DocqlError::DeadlineExceeded.is_cancellation());
        assert!(!DocqlError::KeyNotFound.is_cancellation());
    }

    #[test]
    fn docql_result_err() {
        let result: DocqlResult<i32> = Err(DocqlError::KeyNotFound);
        assert!(result.is_err());
    }
}
