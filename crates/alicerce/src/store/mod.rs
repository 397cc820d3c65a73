//! The fetch orchestrator.
//!
//! A [`Store`] answers fetches for [`Resource`]s by combining a network stack
//! and a persistence stack according to each resource's [`FetchStrategy`]:
//!
//! - `NetworkThenPersistence`: network first, persisting successful payloads.
//!   When the network fails, the persisted payload stands in for it.
//! - `PersistenceThenNetwork`: the persisted payload first, refreshed from the
//!   network in the background. On a cache miss the network is fetched.
//!
//! Every fetch invokes its completion at most once, and reports a
//! cancellation instead of any result that arrives after it was cancelled.

mod state;

pub use state::FetchResult;

use crate::config::StoreConfig;
use crate::error::FetchError;
use crate::resource::{FetchStrategy, Resource};
use crate::value::FetchValue;
use alicerce_core::metrics::{DecodePerformanceTracker, MeasureExt};
use alicerce_core::{BoxError, CancelableBag};
use alicerce_network::{NetworkStack, NetworkValue};
use alicerce_persistence::PersistenceStack;
use bytes::Bytes;
use state::{FetchOperation, FetchState};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches resources from a network stack, backed by a persistence stack.
///
/// Cloning a store is cheap: clones share both stacks.
///
/// # Examples
///
/// ```rust
/// use alicerce::{Resource, Store};
/// use alicerce_core::{Cancelable, DummyCancelable};
/// use alicerce_network::{NetworkCompletion, NetworkStack, NetworkValue};
/// use alicerce_persistence::MemoryPersistenceStack;
/// use bytes::Bytes;
///
/// /// A network stack that always answers with the same payload.
/// struct Fixed(&'static str);
///
/// impl NetworkStack for Fixed {
///     type Resource = ();
///     type Remote = Bytes;
///     type Response = u16;
///     type Error = std::io::Error;
///
///     fn fetch(
///         &self,
///         _: (),
///         completion: NetworkCompletion<Bytes, u16, std::io::Error>,
///     ) -> Box<dyn Cancelable> {
///         let value = Bytes::from_static(self.0.as_bytes());
///         completion(Ok(NetworkValue { value, response: 200 }));
///         Box::new(DummyCancelable)
///     }
/// }
///
/// #[derive(Debug, PartialEq, serde::Deserialize)]
/// struct Item {
///     data: String,
/// }
///
/// let store = Store::new(Fixed(r#"{"data":"x"}"#), MemoryPersistenceStack::default());
/// let resource: Resource<Fixed, Item> = Resource::json((), "item");
///
/// store.fetch(resource, |result| {
///     let value = result.unwrap();
///     assert!(value.is_network());
///     assert_eq!(value.value(), &Item { data: "x".into() });
/// });
///
/// // the payload was persisted for later fetches
/// assert!(store.persistence().get("item").is_some());
/// ```
pub struct Store<N, P> {
    network: Arc<N>,
    persistence: Arc<P>,
    config: StoreConfig,
    performance: Option<Arc<dyn DecodePerformanceTracker>>,
}

impl<N, P> Clone for Store<N, P> {
    fn clone(&self) -> Self {
        Self {
            network: Arc::clone(&self.network),
            persistence: Arc::clone(&self.persistence),
            config: self.config,
            performance: self.performance.clone(),
        }
    }
}

impl<N, P> Store<N, P>
where
    N: NetworkStack<Remote = Bytes>,
    P: PersistenceStack,
{
    /// Creates a store with the default configuration.
    pub fn new(network: N, persistence: P) -> Self {
        Self {
            network: Arc::new(network),
            persistence: Arc::new(persistence),
            config: StoreConfig::default(),
            performance: None,
        }
    }

    /// Set the store configuration
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Measure every decode with `tracker`
    pub fn with_performance_tracker(mut self, tracker: Arc<dyn DecodePerformanceTracker>) -> Self {
        self.performance = Some(tracker);
        self
    }

    /// The network stack
    pub fn network(&self) -> &N {
        &self.network
    }

    /// The persistence stack
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// The store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fetches `resource` according to its strategy.
    ///
    /// `completion` is invoked at most once, on whichever thread the stacks
    /// call back on (possibly before this method returns). Cancelling the
    /// returned bag cancels the operations in flight and turns any later
    /// result into [`FetchError::Cancelled`].
    pub fn fetch<T, E, F>(&self, resource: Resource<N, T, E>, completion: F) -> Arc<CancelableBag>
    where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
        F: FnOnce(FetchResult<T, N::Response>) + Send + 'static,
    {
        let operation = Arc::new(FetchOperation::new(
            &resource.persistence_key,
            Box::new(completion),
        ));
        let bag = Arc::clone(operation.bag());
        let resource = Arc::new(resource);

        debug!(
            key = %resource.persistence_key,
            strategy = ?resource.strategy,
            "Starting fetch"
        );

        match resource.strategy {
            FetchStrategy::NetworkThenPersistence => {
                self.network_then_persistence(resource, operation)
            }
            FetchStrategy::PersistenceThenNetwork => {
                self.persistence_then_network(resource, operation)
            }
        }

        bag
    }

    /// Fetches raw payloads, without decoding them.
    pub fn fetch_payload<F>(
        &self,
        network_resource: N::Resource,
        persistence_key: impl Into<String>,
        strategy: FetchStrategy,
        completion: F,
    ) -> Arc<CancelableBag>
    where
        F: FnOnce(FetchResult<Bytes, N::Response>) + Send + 'static,
    {
        let resource = Resource::raw(network_resource, persistence_key).with_strategy(strategy);
        self.fetch(resource, completion)
    }

    /// Removes every persisted payload.
    pub fn clear_persistence<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), FetchError>) + Send + 'static,
    {
        self.persistence.remove_all(Box::new(move |result| {
            completion(result.map_err(|e| FetchError::Persistence(Box::new(e))))
        }));
    }

    fn network_then_persistence<T, E>(
        &self,
        resource: Arc<Resource<N, T, E>>,
        operation: Arc<FetchOperation<T, N::Response>>,
    ) where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let store = self.clone();
        let network_resource = resource.network_resource.clone();
        let pending = Arc::clone(&operation);

        let cancelable = self.network.fetch(
            network_resource,
            Box::new(move |result| match result {
                Ok(NetworkValue { value, response }) => {
                    store.process_network_value(&resource, &pending, value, response)
                }
                Err(error) if pending.is_cancelled() => {
                    pending.finish_cancelled(Some(Box::new(error)))
                }
                Err(error) => store.fall_back_to_cache(resource, pending, error),
            }),
        );

        operation.bag().add(cancelable);
    }

    fn fall_back_to_cache<T, E>(
        &self,
        resource: Arc<Resource<N, T, E>>,
        operation: Arc<FetchOperation<T, N::Response>>,
        network_error: N::Error,
    ) where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        operation.transition(FetchState::FellBackToCache);
        debug!(
            key = %resource.persistence_key,
            error = %network_error,
            "Network fetch failed, reading persisted payload"
        );

        let store = self.clone();
        let key = resource.persistence_key.clone();

        self.persistence.object(
            &key,
            Box::new(move |result| match result {
                Ok(Some(payload)) => store.process_persisted_value(&resource, &operation, payload),
                Ok(None) => operation.finish(Err(FetchError::Network(Box::new(network_error)))),
                Err(error) => operation.finish(Err(FetchError::Multiple(vec![
                    Box::new(network_error) as BoxError,
                    Box::new(error),
                ]))),
            }),
        );
    }

    fn persistence_then_network<T, E>(
        &self,
        resource: Arc<Resource<N, T, E>>,
        operation: Arc<FetchOperation<T, N::Response>>,
    ) where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let store = self.clone();
        let key = resource.persistence_key.clone();

        self.persistence.object(
            &key,
            Box::new(move |result| {
                if operation.is_cancelled() {
                    let error = result.err().map(|e| Box::new(e) as BoxError);
                    return operation.finish_cancelled(error);
                }

                match result {
                    Ok(Some(payload)) => {
                        store.process_persisted_value(&resource, &operation, payload);

                        if store.config.refresh_in_background && !operation.is_cancelled() {
                            store.refresh_in_background(&resource, operation.bag());
                        }
                    }
                    Ok(None) => store.fetch_network(resource, operation, None),
                    Err(error) => {
                        warn!(
                            key = %resource.persistence_key,
                            error = %error,
                            "Failed to read persisted payload, fetching from network"
                        );
                        store.fetch_network(resource, operation, Some(Box::new(error)))
                    }
                }
            }),
        );
    }

    /// Fetches from the network after the persisted payload was missing
    /// (`persistence_error` is `None`) or couldn't be read.
    fn fetch_network<T, E>(
        &self,
        resource: Arc<Resource<N, T, E>>,
        operation: Arc<FetchOperation<T, N::Response>>,
        persistence_error: Option<BoxError>,
    ) where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let store = self.clone();
        let network_resource = resource.network_resource.clone();
        let pending = Arc::clone(&operation);

        let cancelable = self.network.fetch(
            network_resource,
            Box::new(move |result| match result {
                Ok(NetworkValue { value, response }) => {
                    store.process_network_value(&resource, &pending, value, response)
                }
                Err(error) if pending.is_cancelled() => {
                    pending.finish_cancelled(Some(Box::new(error)))
                }
                Err(error) => match persistence_error {
                    None => pending.finish(Err(FetchError::Network(Box::new(error)))),
                    Some(persistence_error) => pending.finish(Err(FetchError::Multiple(vec![
                        persistence_error,
                        Box::new(error) as BoxError,
                    ]))),
                },
            }),
        );

        operation.bag().add(cancelable);
    }

    /// Refreshes the persisted payload of a resource that was just served
    /// from persistence. Failures are only logged.
    fn refresh_in_background<T, E>(&self, resource: &Arc<Resource<N, T, E>>, bag: &CancelableBag)
    where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        debug!(key = %resource.persistence_key, "Refreshing persisted payload in background");

        let store = self.clone();
        let refreshed = Arc::clone(resource);

        let cancelable = self.network.fetch(
            resource.network_resource.clone(),
            Box::new(move |result| match result {
                Ok(NetworkValue { value, .. }) => match store.decode(&refreshed, &value) {
                    Ok(_) => store.persist(&refreshed.persistence_key, value),
                    Err(error) => warn!(
                        key = %refreshed.persistence_key,
                        error = %error,
                        "Background refresh payload failed to decode, not persisting"
                    ),
                },
                Err(error) => warn!(
                    key = %refreshed.persistence_key,
                    error = %error,
                    "Background refresh failed"
                ),
            }),
        );

        bag.add(cancelable);
    }

    fn process_network_value<T, E>(
        &self,
        resource: &Resource<N, T, E>,
        operation: &FetchOperation<T, N::Response>,
        payload: Bytes,
        response: N::Response,
    ) where
        E: Error + Send + Sync + 'static,
    {
        if operation.is_cancelled() {
            return operation.finish_cancelled(None);
        }

        match self.decode(resource, &payload) {
            Ok(value) => {
                operation.finish(Ok(FetchValue::Network(value, response)));
                self.persist(&resource.persistence_key, payload);
            }
            Err(error) => {
                // a domain error explains the failure better than the decoder
                let error = resource
                    .decode_error
                    .decode(Some(&payload), &response)
                    .map_or(error, |api_error| Box::new(api_error) as BoxError);

                operation.finish(Err(FetchError::Decode(error)));
                self.evict_if_needed(&resource.persistence_key);
            }
        }
    }

    fn process_persisted_value<T, E>(
        &self,
        resource: &Resource<N, T, E>,
        operation: &FetchOperation<T, N::Response>,
        payload: Bytes,
    ) {
        match self.decode(resource, &payload) {
            Ok(value) => operation.finish(Ok(FetchValue::Persistence(value))),
            Err(error) => {
                operation.finish(Err(FetchError::Decode(error)));
                self.evict_if_needed(&resource.persistence_key);
            }
        }
    }

    fn decode<T, E>(&self, resource: &Resource<N, T, E>, payload: &Bytes) -> Result<T, BoxError> {
        match &self.performance {
            Some(tracker) => {
                tracker.measure_decode(payload.len(), || resource.decode.decode(payload, &()))
            }
            None => resource.decode.decode(payload, &()),
        }
    }

    /// Best-effort write of a payload. Failures are only logged.
    fn persist(&self, key: &str, payload: Bytes) {
        let size = payload.len();
        let logged_key = key.to_string();

        self.persistence.set_object(
            payload,
            key,
            Box::new(move |result| match result {
                Ok(()) => debug!(key = %logged_key, size, "Persisted payload"),
                Err(error) => warn!(key = %logged_key, error = %error, "Failed to persist payload"),
            }),
        );
    }

    /// Best-effort removal of a payload that failed to decode.
    fn evict_if_needed(&self, key: &str) {
        if !self.config.evict_on_decode_failure {
            return;
        }

        let logged_key = key.to_string();
        self.persistence.remove_object(
            key,
            Box::new(move |result| match result {
                Ok(()) => debug!(key = %logged_key, "Evicted undecodable payload"),
                Err(error) => {
                    warn!(key = %logged_key, error = %error, "Failed to evict undecodable payload")
                }
            }),
        );
    }
}
