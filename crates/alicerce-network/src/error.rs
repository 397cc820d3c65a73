//! Network error types

use crate::traits::HttpResponse;
use alicerce_core::retry::{RetryError, RetryState, SharedError};
use thiserror::Error;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors produced by a network stack fetch.
///
/// Every variant is cheap to clone, so the same error can be handed to the
/// retry state and to the caller.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// The resource could not be turned into a request.
    #[error("failed to build request: {0}")]
    NoRequest(#[source] SharedError),

    /// The stack's authenticator failed to authenticate the request.
    #[error("failed to authenticate request: {0}")]
    Authentication(#[source] SharedError),

    /// The server answered with a non-successful status code.
    ///
    /// `api_error` holds the domain error extracted from the response body,
    /// when the resource's error decoding could make one.
    #[error("HTTP error status {status}")]
    Http {
        /// The response status code
        status: u16,
        /// The decoded API error, if any
        #[source]
        api_error: Option<SharedError>,
        /// The full response
        response: HttpResponse,
    },

    /// The server answered successfully but without the expected payload.
    #[error("successful response without data (status {})", .response.status)]
    NoData {
        /// The full response
        response: HttpResponse,
    },

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A retry policy refused to retry a failed request.
    #[error("request not retried: {error}")]
    Retry {
        /// Why the retry was refused
        #[source]
        error: RetryError,
        /// The errors and delay accumulated by the failed attempts
        state: RetryState,
    },

    /// The fetch was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl NetworkError {
    /// The response status code, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NoData { response } => Some(response.status),
            _ => None,
        }
    }

    /// Whether the fetch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised by an [`HttpClient`](crate::traits::HttpClient) before a
/// response could be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request timed out
    #[error("timeout")]
    Timeout,

    /// The connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other failure while sending the request or reading the response
    #[error("HTTP transport error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_status_is_exposed() {
        let response = HttpResponse::new(503, HashMap::new(), Vec::new());
        let error = NetworkError::Http {
            status: 503,
            api_error: None,
            response,
        };

        assert_eq!(error.status(), Some(503));
        assert_eq!(NetworkError::Cancelled.status(), None);
        assert_eq!(error.to_string(), "HTTP error status 503");
    }

    #[test]
    fn test_transport_error_converts() {
        let error: NetworkError = TransportError::Timeout.into();

        assert!(matches!(error, NetworkError::Transport(TransportError::Timeout)));
        assert_eq!(error.to_string(), "timeout");
    }
}
