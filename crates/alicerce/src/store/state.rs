//! Per-fetch state machine.

use crate::error::FetchError;
use crate::value::FetchValue;
use alicerce_core::{Atomic, BoxError, CancelableBag};
use std::sync::Arc;
use tracing::debug;

/// The result of a fetch.
pub type FetchResult<T, R> = Result<FetchValue<T, R>, FetchError>;

pub(crate) type FetchCompletion<T, R> = Box<dyn FnOnce(FetchResult<T, R>) + Send + 'static>;

/// The states a fetch goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchState {
    /// The first source (or the network, after a cache miss) is in flight.
    Fetching,
    /// The network failed and the persisted payload is being read instead.
    FellBackToCache,
    /// The completion was invoked with a result.
    Completed,
    /// The completion was invoked with a cancellation.
    Cancelled,
}

impl FetchState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One in-flight fetch, shared by the callbacks of its network and
/// persistence operations.
///
/// The completion is taken out on first use, so it runs at most once no
/// matter how many callbacks race to finish the fetch.
pub(crate) struct FetchOperation<T, R> {
    key: String,
    bag: Arc<CancelableBag>,
    state: Atomic<FetchState>,
    completion: Atomic<Option<FetchCompletion<T, R>>>,
}

impl<T, R> FetchOperation<T, R> {
    pub(crate) fn new(key: &str, completion: FetchCompletion<T, R>) -> Self {
        Self {
            key: key.to_string(),
            bag: Arc::new(CancelableBag::new()),
            state: Atomic::new(FetchState::Fetching),
            completion: Atomic::new(Some(completion)),
        }
    }

    pub(crate) fn bag(&self) -> &Arc<CancelableBag> {
        &self.bag
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.bag.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> FetchState {
        self.state.value()
    }

    /// Moves to a non-terminal state. Ignored once the fetch finished.
    pub(crate) fn transition(&self, to: FetchState) {
        let from = self.state.modify(|state| {
            let from = *state;
            if !from.is_terminal() {
                *state = to;
            }
            from
        });

        if !from.is_terminal() {
            debug!(key = %self.key, from = ?from, to = ?to, "Fetch state changed");
        }
    }

    /// Invokes the completion with `result`, unless it already ran.
    ///
    /// If the fetch was cancelled in the meantime, the result is replaced
    /// by [`FetchError::Cancelled`], carrying the error if there was one.
    pub(crate) fn finish(&self, result: FetchResult<T, R>) {
        let Some(completion) = self.completion.modify(Option::take) else {
            debug!(key = %self.key, "Fetch already finished, dropping result");
            return;
        };

        let result = if self.is_cancelled() {
            Err(match result {
                Err(error @ FetchError::Cancelled(_)) => error,
                Err(error) => FetchError::Cancelled(Some(BoxError::from(error))),
                Ok(_) => FetchError::Cancelled(None),
            })
        } else {
            result
        };

        let state = if matches!(result, Err(FetchError::Cancelled(_))) {
            FetchState::Cancelled
        } else {
            FetchState::Completed
        };
        self.state.swap(state);
        debug!(key = %self.key, state = ?state, "Fetch finished");

        completion(result);
    }

    /// Finishes with a cancellation, carrying `error` if any.
    pub(crate) fn finish_cancelled(&self, error: Option<BoxError>) {
        self.finish(Err(FetchError::Cancelled(error)));
    }
}
