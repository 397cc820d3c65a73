//! Error types shared across the Alicerce crates.

mod boundary;

use thiserror::Error;

/// A boxed error for heterogeneous sources (transports, stores, decoders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A payload could not be converted into a model.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON for the target type.
    #[error("invalid JSON payload: {0}")]
    Json(#[source] serde_json::Error),

    /// The payload is empty.
    #[error("empty payload")]
    EmptyPayload,

    /// A custom decoder rejected the payload.
    #[error("{0}")]
    Custom(#[source] BoxError),
}

impl DecodeError {
    /// Creates a custom decode error from any error value.
    pub fn custom<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Custom(error.into())
    }
}

crate::error_boundary!(serde_json::Error => DecodeError, |e| DecodeError::Json(e));
