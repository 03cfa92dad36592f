//! Store error model and sqlx error mapping.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database | `23505` | `UniqueViolation` | duplicate key (customer email, order/product line pair) |
//! | Database | `23503` | `ForeignKeyViolation` | referenced rows exist (deleting a product with order lines) |
//! | Database | `23514` | `CheckViolation` | stock/price/quantity constraint tripped |
//! | Database | `55P03` | `LockTimeout` | `lock_timeout` expired waiting for a row lock |
//! | Database | `40P01` | `LockTimeout` | deadlock detected (victim rolled back) |
//! | Database | `40001` | `LockTimeout` | serialization failure |
//! | Database (other) | any other | `Query` | other database errors |
//! | PoolClosed / PoolTimedOut | n/a | `Unavailable` | the store cannot be reached |
//! | Decode errors | n/a | `Decode` | a row did not match the expected shape |

use thiserror::Error;

/// Result type used across the store layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure-level error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached at all (pool closed, connect failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unique constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A foreign-key constraint rejected the write.
    #[error("referential constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// A CHECK constraint rejected the write.
    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    /// A row lock could not be acquired in time (also covers deadlock
    /// victims and serialization failures — all safe to retry).
    #[error("timed out waiting for a row lock: {0}")]
    LockTimeout(String),

    /// The referenced row does not exist.
    #[error("not found")]
    NotFound,

    /// Any other query failure.
    #[error("query failed: {0}")]
    Query(String),

    /// A fetched row did not decode into the expected shape.
    #[error("row decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    /// Transient errors may succeed on retry without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Unavailable(_))
    }
}

/// Map a sqlx error surfaced by `operation` to a `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            let msg = format!("{operation}: {}", db.message());
            match db.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23503") => StoreError::ForeignKeyViolation(msg),
                Some("23514") => StoreError::CheckViolation(msg),
                Some("55P03") | Some("40P01") | Some("40001") => StoreError::LockTimeout(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::Query(format!("{operation}: {err}")),
    }
}

/// Decode-failure helper for manual row mapping.
pub(crate) fn decode_err(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Decode(format!("{column}: {err}"))
}
