//! Error types shared by the HTTP collaborator clients.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`HttpDaoError`] failures.
pub type HttpResult<T> = Result<T, HttpDaoError>;

/// Failures that can occur while talking to the catalog or score service.
#[derive(Debug, Error)]
pub enum HttpDaoError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        /// Endpoint path.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with an unexpected status code.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus {
        /// Endpoint path.
        path: String,
        /// Status returned by the service.
        status: StatusCode,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        /// Endpoint path.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<HttpDaoError> for StorageError {
    fn from(err: HttpDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
