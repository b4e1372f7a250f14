//! Failure type shared by session store implementations.

use std::error::Error;
use thiserror::Error;

/// Result alias for session store operations.
pub type StorageResult<T> = Result<T, StorageError>;

type BackendError = Box<dyn Error + Send + Sync>;

/// Failure reported by a session store.
///
/// The in-memory store never produces one; remote stores report outages through it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the named store operation.
    #[error("session store could not {operation}")]
    Unavailable {
        /// Store operation that failed, e.g. `"find session"`.
        operation: &'static str,
        /// Backend failure behind it.
        #[source]
        source: BackendError,
    },
}

impl StorageError {
    /// Wrap a backend failure raised while serving `operation`.
    pub fn unavailable(operation: &'static str, source: impl Into<BackendError>) -> Self {
        StorageError::Unavailable {
            operation,
            source: source.into(),
        }
    }

    /// Store operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            StorageError::Unavailable { operation, .. } => operation,
        }
    }
}
