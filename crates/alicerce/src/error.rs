//! Fetch error types

use alicerce_core::BoxError;
use thiserror::Error;

/// Errors reported by a [`Store`](crate::Store) fetch.
///
/// Each variant tells which source failed. Network and persistence failures
/// are usually worth fetching again; decode failures point to a payload that
/// doesn't match the model and usually aren't.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The network failed and no cached payload could stand in for it.
    #[error("network fetch failed: {0}")]
    Network(#[source] BoxError),

    /// The persistence stack failed.
    #[error("persistence failed: {0}")]
    Persistence(#[source] BoxError),

    /// The fetch was cancelled, carrying the last error seen if any.
    #[error("fetch cancelled")]
    Cancelled(#[source] Option<BoxError>),

    /// Both sources failed, in the order they were attempted.
    #[error("multiple failures: {}", join(.0))]
    Multiple(Vec<BoxError>),

    /// A payload was retrieved but couldn't be decoded into the model.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] BoxError),
}

impl FetchError {
    /// Whether the fetch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The errors this error was made of, in order.
    ///
    /// Single-source variants yield their own source; a cancellation
    /// without a known cause yields nothing.
    pub fn errors(&self) -> Vec<&BoxError> {
        match self {
            Self::Network(e) | Self::Persistence(e) | Self::Decode(e) => vec![e],
            Self::Cancelled(e) => e.iter().collect(),
            Self::Multiple(errors) => errors.iter().collect(),
        }
    }
}

fn join(errors: &[BoxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
