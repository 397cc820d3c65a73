//! Accumulated retry bookkeeping.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An error recorded in a [`RetryState`].
///
/// Errors are reference counted so that a state can be cloned and inspected
/// by custom rules and error reports without taking ownership of it.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// The retry state of an arbitrary operation.
///
/// A state starts empty at the beginning of an operation and only ever grows:
/// every failed attempt appends its error and, when a retry was scheduled with
/// a delay, adds that delay to `total_delay`.
#[derive(Clone, Default)]
pub struct RetryState {
    /// The errors that have occurred on each failed attempt, oldest first.
    pub errors: Vec<SharedError>,

    /// The total amount of delay used by scheduled retries.
    pub total_delay: Duration,
}

impl RetryState {
    /// An empty (initial) state.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The total number of attempts made, including the one in flight.
    pub fn attempt_count(&self) -> usize {
        self.errors.len() + 1
    }

    /// The total number of retries made.
    pub fn retry_count(&self) -> usize {
        self.errors.len()
    }

    /// Records a failed attempt and the delay scheduled before the next one, if any.
    pub fn record(&mut self, error: SharedError, scheduled_delay: Option<Duration>) {
        self.errors.push(error);

        if let Some(delay) = scheduled_delay {
            self.total_delay = self.total_delay.saturating_add(delay);
        }
    }

    /// The most recently recorded error.
    pub fn last_error(&self) -> Option<&SharedError> {
        self.errors.last()
    }
}

impl fmt::Debug for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();

        f.debug_struct("RetryState")
            .field("errors", &errors)
            .field("total_delay", &self.total_delay)
            .finish()
    }
}
