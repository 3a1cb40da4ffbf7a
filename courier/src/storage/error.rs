use crate::core::CoreError;
use thiserror::Error;

/// Storage layer error type for the courier engine.
///
/// This error type wraps underlying database and serialization errors
/// while preserving the full error chain for debugging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A database operation failed.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),

    /// A core serialization or deserialization error occurred.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Failed to connect to the backing store.
    #[error("connection error: {0}")]
    Connection(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// A caller supplied an invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested task was not found in storage.
    #[error("task not found: id={0}")]
    TaskNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StorageError>;
