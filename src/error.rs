use std::{array::TryFromSliceError, fmt::Display, string::FromUtf8Error, sync::PoisonError};

use bincode::ErrorKind;
use serde::{de, ser};
use thiserror::Error;

use crate::transaction::TransactionState;

/// Custom Result type for spandb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for spandb
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Caller bug: unbound parameter, batch used in the wrong state
    #[error("construction error: {0}")]
    Construction(String),
    /// Codec shape or type mismatch
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Commit-time optimistic concurrency failure, replay the transaction
    #[error("transaction aborted by a concurrent modification, retry the transaction")]
    ConflictAborted,
    /// A statement or batch failed in the executor
    #[error("{}", fmt_execution_failed(.index, .message))]
    ExecutionFailed {
        index: Option<usize>,
        message: String,
    },
    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
    /// The transaction has already committed or aborted
    #[error("transaction is already {0}")]
    AlreadyTerminal(TransactionState),
    /// A batch changed a different number of rows than the caller expected
    #[error("unexpected number of rows affected: expected {expected}, got {actual}")]
    RowCountMismatch { expected: i64, actual: i64 },
    /// Internal error (storage, serialization, etc.)
    #[error("internal error {0}")]
    Internal(String),
}

fn fmt_execution_failed(index: &Option<usize>, message: &str) -> String {
    match index {
        Some(index) => format!("statement {} failed: {}", index, message),
        None => format!("execution failed: {}", message),
    }
}

impl Error {
    /// Only commit conflicts are worth replaying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConflictAborted)
    }

    pub(crate) fn execution(message: impl Into<String>) -> Self {
        Error::ExecutionFailed {
            index: None,
            message: message.into(),
        }
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch(message.into())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::TypeMismatch(format!("invalid json: {}", value))
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}
