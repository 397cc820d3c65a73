//! Fetchable, cacheable resources.

use alicerce_core::decoding::{ErrorDecoding, ModelDecoding};
use alicerce_core::retry::{RetryState, RetryableResource};
use alicerce_network::NetworkStack;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::fmt;

/// How a [`Store`](crate::Store) combines the network and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Fetch from the network, falling back to the persisted payload when the
    /// network fails.
    #[default]
    NetworkThenPersistence,

    /// Serve the persisted payload when there is one (and refresh it from the
    /// network in the background), fetching from the network otherwise.
    PersistenceThenNetwork,
}

/// One fetchable, cacheable entity.
///
/// Bundles the network stack's own resource description with what the
/// store needs around it: the strategy, the key its payload is persisted
/// under, how to decode a payload into a `T`, and how to recover a domain
/// error `E` when a network payload can't be decoded.
pub struct Resource<N: NetworkStack, T, E = Infallible> {
    /// Which source is tried first
    pub strategy: FetchStrategy,

    /// What the network stack fetches
    pub network_resource: N::Resource,

    /// Key of the persisted payload. Equivalent resources must share a key.
    pub persistence_key: String,

    /// Turns a payload into the model
    pub decode: ModelDecoding<T, Bytes>,

    /// Recovers a domain error from a network payload that failed to decode
    pub decode_error: ErrorDecoding<E, Bytes, N::Response>,
}

impl<N: NetworkStack, T, E> Resource<N, T, E> {
    /// Creates a resource with the default strategy and no error decoding.
    pub fn new(
        network_resource: N::Resource,
        persistence_key: impl Into<String>,
        decode: ModelDecoding<T, Bytes>,
    ) -> Self {
        Self {
            strategy: FetchStrategy::default(),
            network_resource,
            persistence_key: persistence_key.into(),
            decode,
            decode_error: ErrorDecoding::none(),
        }
    }

    /// Set the fetch strategy
    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the error decoding, possibly changing the domain error type
    pub fn with_decode_error<F>(
        self,
        decode_error: ErrorDecoding<F, Bytes, N::Response>,
    ) -> Resource<N, T, F> {
        Resource {
            strategy: self.strategy,
            network_resource: self.network_resource,
            persistence_key: self.persistence_key,
            decode: self.decode,
            decode_error,
        }
    }
}

impl<N: NetworkStack, T: DeserializeOwned> Resource<N, T> {
    /// Creates a resource whose payloads are JSON documents.
    pub fn json(network_resource: N::Resource, persistence_key: impl Into<String>) -> Self {
        Self::new(network_resource, persistence_key, ModelDecoding::json())
    }
}

impl<N: NetworkStack> Resource<N, Bytes> {
    /// Creates a resource handing out raw payloads.
    pub fn raw(network_resource: N::Resource, persistence_key: impl Into<String>) -> Self {
        Self::new(
            network_resource,
            persistence_key,
            ModelDecoding::infallible(|payload: &Bytes, _: &()| payload.clone()),
        )
    }
}

impl<N, T, E> Resource<N, T, E>
where
    N: NetworkStack,
    N::Resource: RetryableResource,
{
    /// The retry state of the network resource.
    pub fn retry_state(&self) -> &RetryState {
        self.network_resource.retry_state()
    }

    /// The number of times the network resource has been retried.
    pub fn retry_count(&self) -> usize {
        self.network_resource.retry_count()
    }
}

impl<N: NetworkStack, T, E> Clone for Resource<N, T, E> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            network_resource: self.network_resource.clone(),
            persistence_key: self.persistence_key.clone(),
            decode: self.decode.clone(),
            decode_error: self.decode_error.clone(),
        }
    }
}

impl<N, T, E> fmt::Debug for Resource<N, T, E>
where
    N: NetworkStack,
    N::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("strategy", &self.strategy)
            .field("network_resource", &self.network_resource)
            .field("persistence_key", &self.persistence_key)
            .field("decode", &self.decode)
            .finish_non_exhaustive()
    }
}
