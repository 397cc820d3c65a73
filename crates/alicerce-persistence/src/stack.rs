//! The persistence stack contract.

use bytes::Bytes;
use std::error::Error;
use std::sync::Arc;

/// Completion closure of a persistence operation.
pub type PersistenceCompletion<T, E> = Box<dyn FnOnce(std::result::Result<T, E>) + Send + 'static>;

/// A key-value blob store.
///
/// Every operation invokes its completion exactly once, on any thread the
/// implementation chooses (possibly inline, before the call returns).
pub trait PersistenceStack: Send + Sync + 'static {
    /// The store's error type.
    type Error: Error + Send + Sync + 'static;

    /// Reads the payload stored under `key`. `Ok(None)` denotes a cache miss.
    fn object(&self, key: &str, completion: PersistenceCompletion<Option<Bytes>, Self::Error>);

    /// Stores `payload` under `key`, replacing any previous payload.
    fn set_object(
        &self,
        payload: Bytes,
        key: &str,
        completion: PersistenceCompletion<(), Self::Error>,
    );

    /// Removes the payload stored under `key`. Removing a missing key succeeds.
    fn remove_object(&self, key: &str, completion: PersistenceCompletion<(), Self::Error>);

    /// Removes every stored payload.
    fn remove_all(&self, completion: PersistenceCompletion<(), Self::Error>);
}

impl<T: PersistenceStack + ?Sized> PersistenceStack for Arc<T> {
    type Error = T::Error;

    fn object(&self, key: &str, completion: PersistenceCompletion<Option<Bytes>, Self::Error>) {
        (**self).object(key, completion)
    }

    fn set_object(
        &self,
        payload: Bytes,
        key: &str,
        completion: PersistenceCompletion<(), Self::Error>,
    ) {
        (**self).set_object(payload, key, completion)
    }

    fn remove_object(&self, key: &str, completion: PersistenceCompletion<(), Self::Error>) {
        (**self).remove_object(key, completion)
    }

    fn remove_all(&self, completion: PersistenceCompletion<(), Self::Error>) {
        (**self).remove_all(completion)
    }
}
