//! The network stack contract.

use alicerce_core::Cancelable;
use std::error::Error;
use std::sync::Arc;

/// A fetched remote value together with the response that carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkValue<V, R> {
    /// The remote payload
    pub value: V,
    /// The transport response (e.g. status and headers)
    pub response: R,
}

/// Completion closure of a network fetch.
pub type NetworkCompletion<V, R, E> =
    Box<dyn FnOnce(std::result::Result<NetworkValue<V, R>, E>) + Send + 'static>;

/// Fetches remote payloads for resources.
///
/// `fetch` returns immediately. The completion is invoked exactly once, on
/// any thread, with the payload or an error. Cancelling the returned handle
/// makes the fetch finish with the stack's cancellation error, unless it has
/// already completed.
pub trait NetworkStack: Send + Sync + 'static {
    /// The resource description this stack knows how to fetch.
    type Resource: Clone + Send + Sync + 'static;

    /// The raw remote payload type.
    type Remote: Send + 'static;

    /// The transport response type.
    type Response: Send + 'static;

    /// The stack's error type.
    type Error: Error + Send + Sync + 'static;

    /// Starts fetching `resource`.
    fn fetch(
        &self,
        resource: Self::Resource,
        completion: NetworkCompletion<Self::Remote, Self::Response, Self::Error>,
    ) -> Box<dyn Cancelable>;
}

impl<T: NetworkStack + ?Sized> NetworkStack for Arc<T> {
    type Resource = T::Resource;
    type Remote = T::Remote;
    type Response = T::Response;
    type Error = T::Error;

    fn fetch(
        &self,
        resource: Self::Resource,
        completion: NetworkCompletion<Self::Remote, Self::Response, Self::Error>,
    ) -> Box<dyn Cancelable> {
        (**self).fetch(resource, completion)
    }
}
