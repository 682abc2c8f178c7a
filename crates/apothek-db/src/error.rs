//! # Database Error Types
//!
//! Error types for the dual-backend storage layer.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  Driver Error (sqlx::Error, either backend)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError / shell API error ← surfaced to callers                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Connect Error
// =============================================================================

/// Why a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// TCP connection refused (server down, wrong port).
    Refused,
    /// Authentication rejected by the server.
    AuthFailed,
    /// The named database (or the database file's directory) does not exist.
    DatabaseMissing,
    /// Hostname did not resolve.
    HostNotFound,
    /// Connection attempt timed out.
    Timeout,
    /// Anything the classifier could not place.
    Other,
}

/// A classified connection failure.
///
/// `connect` is never retried internally; callers decide whether and when to
/// retry, using [`ConnectKind`] to pick a strategy and [`ConnectError::hint`]
/// for the operator-facing message.
#[derive(Debug, Clone, Error)]
#[error("connection failed: {message}")]
pub struct ConnectError {
    pub kind: ConnectKind,
    pub message: String,
}

impl ConnectError {
    pub fn new(kind: ConnectKind, message: impl Into<String>) -> Self {
        ConnectError {
            kind,
            message: message.into(),
        }
    }

    /// Human-readable remediation hint for the given failure class.
    pub fn hint(&self) -> &'static str {
        match self.kind {
            ConnectKind::Refused => {
                "The database server refused the connection. Check that it is running and the port is correct."
            }
            ConnectKind::AuthFailed => {
                "The server rejected the credentials. Check the username and password in the connection string."
            }
            ConnectKind::DatabaseMissing => {
                "The database does not exist. Create it on the server, or check the database name / file path."
            }
            ConnectKind::HostNotFound => {
                "The host name could not be resolved. Check the server address and your network connection."
            }
            ConnectKind::Timeout => {
                "The connection attempt timed out. The server may be unreachable or overloaded."
            }
            ConnectKind::Other => "Could not connect to the database.",
        }
    }

    /// True for failures that a plain retry can fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ConnectKind::Refused | ConnectKind::Timeout | ConnectKind::HostNotFound
        )
    }
}

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    // =========================================================================
    // Connection / Lifecycle
    // =========================================================================
    /// Connection attempt failed (classified).
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Operation attempted before `connect` (or after `disconnect`).
    #[error("database is not connected")]
    NotConnected,

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    // =========================================================================
    // Schema / Seed
    // =========================================================================
    /// Bootstrap failed. Fatal for this adapter instance: no business
    /// operation may proceed on a half-created schema.
    #[error("schema bootstrap failed: {0}")]
    Schema(String),

    /// Seeding the default admin/branch/settings failed.
    #[error("seed failed: {0}")]
    Seed(String),

    // =========================================================================
    // Query Construction
    // =========================================================================
    /// Table or column name failed identifier validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Insert with no column/value pairs.
    #[error("insert into {table} has no values")]
    EmptyInsert { table: String },

    /// Update with no assignments.
    #[error("update of {table} has no assignments")]
    EmptyUpdate { table: String },

    /// Insert did not include its primary-key column (needed for RETURNING
    /// emulation on the embedded backend).
    #[error("insert into {table} is missing primary key column {column}")]
    MissingPrimaryKey { table: String, column: String },

    // =========================================================================
    // Row Decoding
    // =========================================================================
    /// Requested column is not in the result row.
    #[error("column {0} not present in result row")]
    MissingColumn(String),

    /// Column value had an unexpected type.
    #[error("column {column}: expected {expected}, got {actual}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A stored enum/timestamp string failed to parse back into its type.
    #[error("corrupt value in column {column}: {value:?}")]
    CorruptValue { column: String, value: String },

    // =========================================================================
    // Execution
    // =========================================================================
    /// A field failed domain validation before reaching the engine.
    #[error(transparent)]
    Validation(#[from] apothek_core::ValidationError),

    /// Entity not found where one was required.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit/rollback failed, or a callback error forced
    /// a rollback.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    // =========================================================================
    // Configuration
    // =========================================================================
    /// Database config file could not be read or written.
    #[error("database config error: {0}")]
    Config(String),

    /// Internal database error.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True for transient failures worth retrying at a higher level.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Connect(e) => e.is_retryable(),
            DbError::PoolExhausted => true,
            _ => false,
        }
    }
}

/// Convert driver errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → analyze constraint kind / SQLSTATE
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                let msg = db_err.message().to_string();

                // SQLite spells it "UNIQUE constraint failed: table.column";
                // Postgres raises SQLSTATE 23505 / 23503.
                if code == "23505" || msg.contains("UNIQUE constraint failed") {
                    let constraint = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or(&msg)
                        .to_string();
                    DbError::UniqueViolation { constraint }
                } else if code == "23503" || msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation(msg)
                } else {
                    DbError::QueryFailed(msg)
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::NotConnected,

            sqlx::Error::ColumnDecode { index, source } => {
                DbError::QueryFailed(format!("decode of column {index} failed: {source}"))
            }

            other => DbError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_hints_are_specific() {
        let e = ConnectError::new(ConnectKind::AuthFailed, "password authentication failed");
        assert!(e.hint().contains("credentials"));
        assert!(!e.is_retryable());

        let e = ConnectError::new(ConnectKind::Refused, "connection refused");
        assert!(e.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(DbError::PoolExhausted.is_retryable());
        assert!(!DbError::Schema("boom".into()).is_retryable());
        assert!(!DbError::InvalidIdentifier("x; DROP".into()).is_retryable());
    }
}
