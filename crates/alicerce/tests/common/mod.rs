//! Common test utilities and helpers

#![allow(dead_code)]

use alicerce::{FetchResult, Resource};
use alicerce_core::{Cancelable, CancelableFn};
use alicerce_network::{NetworkCompletion, NetworkStack, NetworkValue};
use alicerce_persistence::{MemoryPersistenceStack, PersistenceCompletion, PersistenceStack};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Ordered log of observable events shared by the mocks and the test.
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// What the mock network does with the next fetch.
pub enum Reply {
    /// Completes inline with the payload and a 200 response
    Payload(&'static str),
    /// Completes inline with an error
    Fail(&'static str),
    /// Keeps the completion until [`MockNetwork::complete`] is called
    Defer,
}

type Completion = NetworkCompletion<Bytes, u16, MockError>;

/// A network stack replying from a script.
#[derive(Default)]
pub struct MockNetwork {
    replies: Mutex<VecDeque<Reply>>,
    deferred: Mutex<VecDeque<Completion>>,
    fetches: AtomicUsize,
    cancels: Arc<AtomicUsize>,
}

impl MockNetwork {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Completes the oldest deferred fetch.
    pub fn complete(&self, result: Result<&'static str, &'static str>) {
        let completion = self
            .deferred
            .lock()
            .unwrap()
            .pop_front()
            .expect("no deferred fetch");
        completion(reply(result));
    }
}

fn reply(
    result: Result<&'static str, &'static str>,
) -> Result<NetworkValue<Bytes, u16>, MockError> {
    result
        .map(|payload| NetworkValue {
            value: Bytes::from_static(payload.as_bytes()),
            response: 200,
        })
        .map_err(|message| MockError(message.to_string()))
}

impl NetworkStack for MockNetwork {
    type Resource = &'static str;
    type Remote = Bytes;
    type Response = u16;
    type Error = MockError;

    fn fetch(&self, _: &'static str, completion: Completion) -> Box<dyn Cancelable> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let next = self.replies.lock().unwrap().pop_front();
        match next.expect("unexpected network fetch") {
            Reply::Payload(payload) => completion(reply(Ok(payload))),
            Reply::Fail(message) => completion(reply(Err(message))),
            Reply::Defer => self.deferred.lock().unwrap().push_back(completion),
        }

        let cancels = self.cancels.clone();
        Box::new(CancelableFn::new(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

type ReadCompletion = PersistenceCompletion<Option<Bytes>, MockError>;

/// A memory persistence stack that can be made to fail, logging its writes.
#[derive(Default)]
pub struct MockPersistence {
    memory: MemoryPersistenceStack,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    defer_reads: AtomicBool,
    deferred_reads: Mutex<VecDeque<(String, ReadCompletion)>>,
    removed: Mutex<Vec<String>>,
    log: EventLog,
}

impl MockPersistence {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn preload(self, key: &str, payload: &'static str) -> Self {
        self.memory
            .set_object(Bytes::from_static(payload.as_bytes()), key, Box::new(|_| {}));
        self
    }

    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    /// Keeps read completions until [`MockPersistence::complete_read`] is called.
    pub fn deferring_reads(self) -> Self {
        self.defer_reads.store(true, Ordering::SeqCst);
        self
    }

    /// Completes the oldest deferred read.
    pub fn complete_read(&self) {
        let (key, completion) = self
            .deferred_reads
            .lock()
            .unwrap()
            .pop_front()
            .expect("no deferred read");
        completion(self.read(&key));
    }

    fn read(&self, key: &str) -> Result<Option<Bytes>, MockError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MockError("disk read failed".into()));
        }
        Ok(self.memory.get(key))
    }

    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.memory
            .get(key)
            .map(|payload| String::from_utf8_lossy(&payload).into_owned())
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

impl PersistenceStack for MockPersistence {
    type Error = MockError;

    fn object(&self, key: &str, completion: ReadCompletion) {
        if self.defer_reads.load(Ordering::SeqCst) {
            self.deferred_reads
                .lock()
                .unwrap()
                .push_back((key.to_string(), completion));
            return;
        }
        completion(self.read(key))
    }

    fn set_object(
        &self,
        payload: Bytes,
        key: &str,
        completion: PersistenceCompletion<(), MockError>,
    ) {
        if self.fail_writes.load(Ordering::SeqCst) {
            return completion(Err(MockError("disk full".into())));
        }
        self.log.lock().unwrap().push(format!("persisted {key}"));
        self.memory.set_object(payload, key, Box::new(|_| {}));
        completion(Ok(()))
    }

    fn remove_object(&self, key: &str, completion: PersistenceCompletion<(), MockError>) {
        self.removed.lock().unwrap().push(key.to_string());
        self.memory.remove_object(key, Box::new(|_| {}));
        completion(Ok(()))
    }

    fn remove_all(&self, completion: PersistenceCompletion<(), MockError>) {
        if self.fail_writes.load(Ordering::SeqCst) {
            return completion(Err(MockError("disk full".into())));
        }
        self.memory.remove_all(Box::new(|_| {}));
        completion(Ok(()))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Item {
    pub data: String,
}

pub fn item(data: &str) -> Item {
    Item {
        data: data.to_string(),
    }
}

pub fn json_resource(key: &str) -> Resource<MockNetwork, Item> {
    Resource::json("items/1", key)
}

/// Captures the result of a fetch whose completion runs inline.
pub fn capture<T: Send + 'static>() -> (
    Arc<Mutex<Option<FetchResult<T, u16>>>>,
    impl FnOnce(FetchResult<T, u16>) + Send + 'static,
) {
    let slot = Arc::new(Mutex::new(None::<FetchResult<T, u16>>));
    let filled = slot.clone();
    let completion = move |result: FetchResult<T, u16>| {
        let previous = filled.lock().unwrap().replace(result);
        assert!(previous.is_none(), "completion invoked twice");
    };
    (slot, completion)
}
