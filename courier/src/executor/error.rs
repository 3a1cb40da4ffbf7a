use crate::core::CoreError;
use crate::provider::ProviderError;
use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Error raised while processing a claimed task.
///
/// None of these are retried by the worker: the task is completed and the
/// error is recorded in the operational error log. Variants carry strings so
/// the error stays `Clone` and can be recorded after it is logged.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProcessError {
    /// No processor is registered for the task type.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// The payload does not name a handler this processor requires.
    #[error("payload is missing `{0}`")]
    MissingHandlerName(&'static str),

    /// The payload names a handler that is not registered.
    #[error("handler not registered: {0}")]
    HandlerNotRegistered(String),

    /// A handler returned an error instead of an envelope.
    #[error("handler `{name}` failed: {message}")]
    Handler { name: String, message: String },

    /// The payload could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The provider call failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider call did not finish in time.
    #[error("provider timed out after {0:?}")]
    ProviderTimeout(Duration),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for ProcessError {
    fn from(err: StorageError) -> Self {
        ProcessError::Storage(err.to_string())
    }
}

impl From<CoreError> for ProcessError {
    fn from(err: CoreError) -> Self {
        ProcessError::InvalidPayload(err.to_string())
    }
}

impl From<ProviderError> for ProcessError {
    fn from(err: ProviderError) -> Self {
        ProcessError::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
