use crate::core::CoreError;
use crate::storage::StorageError;
use thiserror::Error;

/// Error raised by a supervisor run or a fact-recording handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The store could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The task payload or a stored fact could not be interpreted.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The payload's `send_at` is not an RFC 3339 timestamp.
    #[error("invalid send_at: {0}")]
    InvalidSendAt(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
