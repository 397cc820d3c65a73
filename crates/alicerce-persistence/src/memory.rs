//! In-memory persistence bounded by total payload size.

use crate::error::PersistenceError;
use crate::stack::{PersistenceCompletion, PersistenceStack};
use alicerce_core::Atomic;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// A byte-bounded map that evicts its oldest entries first.
#[derive(Debug)]
pub(crate) struct MemoryCache {
    entries: HashMap<String, Bytes>,
    order: VecDeque<String>,
    used: usize,
    limit: usize,
}

impl MemoryCache {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            used: 0,
            limit,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    /// Inserts a payload, evicting the oldest entries until it fits.
    ///
    /// A payload larger than the whole limit is not kept.
    pub(crate) fn insert(&mut self, key: &str, payload: Bytes) {
        self.remove(key);

        if payload.len() > self.limit {
            debug!(
                key = %key,
                size = payload.len(),
                limit = self.limit,
                "Payload exceeds memory limit"
            );
            return;
        }

        self.used += payload.len();
        self.entries.insert(key.to_string(), payload);
        self.order.push_back(key.to_string());

        while self.used > self.limit {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used -= evicted.len();
                debug!(key = %oldest, size = evicted.len(), "Evicted from memory");
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(previous) = self.entries.remove(key) {
            self.used -= previous.len();
            self.order.retain(|k| k != key);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used = 0;
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }
}

/// An in-memory persistence stack.
///
/// Payloads live as long as the stack does, up to `limit` bytes in total.
/// When a new payload doesn't fit, the payloads stored the longest are
/// evicted first. Completions are invoked inline.
#[derive(Debug)]
pub struct MemoryPersistenceStack {
    cache: Atomic<MemoryCache>,
}

impl MemoryPersistenceStack {
    /// Creates a stack holding at most `limit` bytes of payloads.
    pub fn new(limit: usize) -> Self {
        Self {
            cache: Atomic::new(MemoryCache::new(limit)),
        }
    }

    /// Total size of the stored payloads, in bytes.
    pub fn used_size(&self) -> usize {
        self.cache.with_value(MemoryCache::used)
    }

    /// Reads a payload synchronously.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.with_value(|cache| cache.get(key))
    }
}

impl Default for MemoryPersistenceStack {
    fn default() -> Self {
        Self::new(10 * 1024 * 1024)
    }
}

impl PersistenceStack for MemoryPersistenceStack {
    type Error = PersistenceError;

    fn object(&self, key: &str, completion: PersistenceCompletion<Option<Bytes>, Self::Error>) {
        completion(Ok(self.get(key)))
    }

    fn set_object(
        &self,
        payload: Bytes,
        key: &str,
        completion: PersistenceCompletion<(), Self::Error>,
    ) {
        self.cache.modify(|cache| cache.insert(key, payload));
        completion(Ok(()))
    }

    fn remove_object(&self, key: &str, completion: PersistenceCompletion<(), Self::Error>) {
        self.cache.modify(|cache| cache.remove(key));
        completion(Ok(()))
    }

    fn remove_all(&self, completion: PersistenceCompletion<(), Self::Error>) {
        self.cache.modify(MemoryCache::clear);
        completion(Ok(()))
    }
}
