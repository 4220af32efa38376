//! Error types for SyncLiteDB core.

use crate::types::{DbType, StatementKind};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while operating on registered databases.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The database path is not registered (or was closed).
    #[error("database not found: {}", path.display())]
    NotFound {
        /// Normalized path that was looked up.
        path: PathBuf,
    },

    /// The database path is already registered and open.
    #[error("database already open: {}", path.display())]
    AlreadyOpen {
        /// Normalized path of the open database.
        path: PathBuf,
    },

    /// A transaction is already open on the database.
    #[error("a transaction is already open on {}", path.display())]
    TxnAlreadyOpen {
        /// Normalized path of the database.
        path: PathBuf,
    },

    /// The supplied transaction handle does not match the open transaction.
    #[error("invalid transaction handle: {message}")]
    InvalidTxnHandle {
        /// Description of the mismatch.
        message: String,
    },

    /// The statement kind is not permitted for the backend type.
    #[error("{kind} statements are not supported by {backend} databases")]
    UnsupportedOperation {
        /// Backend type of the database.
        backend: DbType,
        /// Statement kind that was rejected.
        kind: StatementKind,
    },

    /// The backend rejected a statement.
    #[error("{message}")]
    Execution {
        /// Backend-supplied cause.
        message: String,
    },

    /// Native SQLite error.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A batch was aborted at a specific argument tuple.
    #[error("batch failed at index {index}: {cause}")]
    PartialBatchFailure {
        /// Zero-based index of the first failing tuple.
        index: usize,
        /// Underlying cause.
        cause: String,
    },

    /// One or more databases failed to close during a close-all.
    #[error("failed to close {} database(s): {}", failures.len(), failures.join("; "))]
    CloseAllFailed {
        /// One entry per failed path.
        failures: Vec<String>,
    },

    /// Invalid caller-supplied argument (e.g. an empty path).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Logger configuration could not be loaded.
    #[error("logger config error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Commit log serialization error.
    #[error("commit log encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a not-found error.
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound {
            path: path.to_path_buf(),
        }
    }

    /// Creates an invalid transaction handle error.
    pub fn invalid_txn_handle(message: impl Into<String>) -> Self {
        Self::InvalidTxnHandle {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates a partial batch failure.
    pub fn batch_failure(index: usize, cause: impl ToString) -> Self {
        Self::PartialBatchFailure {
            index,
            cause: cause.to_string(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the stable error kind name reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyOpen { .. } => "AlreadyOpen",
            Self::TxnAlreadyOpen { .. } => "TxnAlreadyOpen",
            Self::InvalidTxnHandle { .. } => "InvalidTxnHandle",
            Self::UnsupportedOperation { .. } => "UnsupportedOperation",
            Self::PartialBatchFailure { .. } => "PartialBatchFailure",
            Self::InvalidArgument { .. } => "MalformedRequest",
            Self::Config { .. } => "ConfigError",
            Self::Execution { .. }
            | Self::Sqlite(_)
            | Self::CloseAllFailed { .. }
            | Self::Serialization(_)
            | Self::Io(_) => "ExecutionError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CoreError::not_found(Path::new("/a")).kind(), "NotFound");
        assert_eq!(CoreError::batch_failure(3, "x").kind(), "PartialBatchFailure");
        assert_eq!(CoreError::execution("boom").kind(), "ExecutionError");
        let err = CoreError::UnsupportedOperation {
            backend: DbType::SqliteAppender,
            kind: StatementKind::UpdateDelete,
        };
        assert_eq!(err.kind(), "UnsupportedOperation");
    }

    #[test]
    fn unsupported_names_backend_and_kind() {
        let err = CoreError::UnsupportedOperation {
            backend: DbType::Streaming,
            kind: StatementKind::Select,
        };
        let msg = err.to_string();
        assert!(msg.contains("STREAMING"));
        assert!(msg.contains("SELECT"));
    }

    #[test]
    fn batch_failure_reports_index() {
        let msg = CoreError::batch_failure(7, "UNIQUE constraint failed").to_string();
        assert!(msg.contains("index 7"));
        assert!(msg.contains("UNIQUE"));
    }

    #[test]
    fn close_all_joins_failures() {
        let err = CoreError::CloseAllFailed {
            failures: vec!["/a: x".into(), "/b: y".into()],
        };
        assert_eq!(err.to_string(), "failed to close 2 database(s): /a: x; /b: y");
    }
}
