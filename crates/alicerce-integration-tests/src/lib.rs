//! Integration tests for the Alicerce workspace
//!
//! The tests in this crate run a [`Store`](alicerce::Store) over the real
//! HTTP network stack and the disk-backed persistence stack, against a
//! mock HTTP server.

use alicerce::{FetchResult, Resource, Store};
use alicerce_network::{HttpNetworkStack, HttpResponse};
use alicerce_persistence::DiskMemoryPersistenceStack;
use tokio::sync::oneshot;

/// The store assembled from the production stacks.
pub type HttpStore = Store<HttpNetworkStack, DiskMemoryPersistenceStack>;

/// Fetches `resource`, waiting for its completion.
///
/// # Panics
///
/// Panics if the completion is dropped without being invoked.
pub async fn fetch<T: Send + 'static>(
    store: &HttpStore,
    resource: Resource<HttpNetworkStack, T>,
) -> FetchResult<T, HttpResponse> {
    let (tx, rx) = oneshot::channel();
    let _bag = store.fetch(resource, move |result| {
        let _ = tx.send(result);
    });
    rx.await.expect("fetch completion dropped")
}
