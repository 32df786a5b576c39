use std::{error::Error, fmt::Display};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by collaborators regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend answered but refused the request.
    #[error("request rejected: {message}")]
    Rejected {
        /// Reason given by the backend.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// The collaborator answered but refused the request.
    pub fn rejected(context: &str, reason: impl Display) -> Self {
        StorageError::Rejected {
            message: format!("{context}: {reason}"),
        }
    }
}
