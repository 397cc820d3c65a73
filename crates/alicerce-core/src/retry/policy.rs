//! Retry policy types and their evaluation.

use super::action::{Action, RetryError};
use super::state::RetryState;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A custom retry rule.
///
/// The rule receives the error that just occurred, the retry state (which
/// excludes that error) and the error event metadata (e.g. request, payload,
/// response), and returns the action to take verbatim.
pub type Rule<M> =
    Arc<dyn Fn(&(dyn Error + Send + Sync + 'static), &RetryState, &M) -> Action + Send + Sync>;

/// A backoff scaling function.
///
/// Takes the base delay and the number of retries made so far and returns the
/// delay to use for the next retry.
pub type Scale = Arc<dyn Fn(Duration, usize) -> Duration + Send + Sync>;

/// A retry policy.
///
/// Policies are pure data: they describe retry behavior but hold no state of
/// their own. The same policy value is evaluated against a growing
/// [`RetryState`] on every failed attempt.
pub enum RetryPolicy<M> {
    /// Limits the total number of retries.
    MaxRetries(usize),

    /// Delays and limits retries according to a backoff strategy.
    Backoff(Backoff),

    /// Applies a custom rule.
    Custom(Rule<M>),
}

/// A backoff strategy that defines a delay for each retry, together with a
/// truncation rule that limits retries.
#[derive(Clone)]
pub enum Backoff {
    /// Delays each retry by a constant amount of time while the truncation allows it.
    Constant(Duration, Truncation),

    /// Delays each retry by a scaled (typically exponential) amount of time,
    /// computed from a base delay, while the truncation allows it.
    Exponential(Duration, Scale, Truncation),
}

/// A truncation rule for backoff strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// Limits the total number of retries.
    MaxRetries(usize),

    /// Limits the total amount of *scheduled* delay time used by retries.
    ///
    /// For exponential backoff the delay of each retry is additionally capped
    /// to this value.
    MaxDelay(Duration),
}

impl<M> RetryPolicy<M> {
    /// Creates a custom policy from a rule closure.
    pub fn custom<F>(rule: F) -> Self
    where
        F: Fn(&(dyn Error + Send + Sync + 'static), &RetryState, &M) -> Action
            + Send
            + Sync
            + 'static,
    {
        Self::Custom(Arc::new(rule))
    }

    /// Evaluates the policy to determine if a retry should be made.
    ///
    /// # Parameters
    /// - `error`: The error that occurred
    /// - `state`: The errors and scheduled delay accumulated so far, excluding `error`
    /// - `metadata`: The error event metadata
    ///
    /// # Examples
    ///
    /// ```rust
    /// use alicerce_core::retry::{Action, RetryError, RetryPolicy, RetryState};
    /// use std::sync::Arc;
    ///
    /// let policy: RetryPolicy<()> = RetryPolicy::MaxRetries(3);
    /// let error = std::io::Error::other("boom");
    ///
    /// let mut state = RetryState::empty();
    /// assert_eq!(policy.should_retry(&error, &state, &()), Action::Retry);
    ///
    /// for _ in 0..3 {
    ///     state.record(Arc::new(std::io::Error::other("boom")), None);
    /// }
    /// assert_eq!(
    ///     policy.should_retry(&error, &state, &()),
    ///     Action::NoRetry(RetryError::Retries(3))
    /// );
    /// ```
    pub fn should_retry(
        &self,
        error: &(dyn Error + Send + Sync + 'static),
        state: &RetryState,
        metadata: &M,
    ) -> Action {
        let retry_count = state.retry_count();

        match self {
            RetryPolicy::MaxRetries(max) if retry_count >= *max => {
                Action::NoRetry(RetryError::Retries(*max))
            }
            RetryPolicy::MaxRetries(_) => Action::Retry,

            RetryPolicy::Backoff(backoff) => backoff.evaluate(state),

            RetryPolicy::Custom(rule) => rule(error, state, metadata),
        }
    }
}

impl Backoff {
    /// Creates a constant backoff.
    pub fn constant(delay: Duration, until: Truncation) -> Self {
        Self::Constant(delay, until)
    }

    /// Creates a scaled backoff from a base delay and a scaling function.
    pub fn exponential<F>(base: Duration, scale: F, until: Truncation) -> Self
    where
        F: Fn(Duration, usize) -> Duration + Send + Sync + 'static,
    {
        Self::Exponential(base, Arc::new(scale), until)
    }

    /// The strategy's truncation rule.
    pub fn truncation(&self) -> Truncation {
        match self {
            Backoff::Constant(_, truncation) | Backoff::Exponential(_, _, truncation) => {
                *truncation
            }
        }
    }

    fn evaluate(&self, state: &RetryState) -> Action {
        let retry_count = state.retry_count();

        // truncation is always checked before a delay is computed
        match self.truncation() {
            Truncation::MaxRetries(max) if retry_count >= max => {
                return Action::NoRetry(RetryError::Retries(max));
            }
            Truncation::MaxDelay(max) if state.total_delay >= max => {
                return Action::NoRetry(RetryError::Delay(max));
            }
            _ => {}
        }

        match self {
            Backoff::Constant(delay, _) => Action::RetryAfter(*delay),
            Backoff::Exponential(base, scale, Truncation::MaxDelay(max)) => {
                Action::RetryAfter(scale(*base, retry_count).min(*max))
            }
            Backoff::Exponential(base, scale, Truncation::MaxRetries(_)) => {
                Action::RetryAfter(scale(*base, retry_count))
            }
        }
    }
}

impl<M> Clone for RetryPolicy<M> {
    fn clone(&self) -> Self {
        match self {
            RetryPolicy::MaxRetries(max) => RetryPolicy::MaxRetries(*max),
            RetryPolicy::Backoff(backoff) => RetryPolicy::Backoff(backoff.clone()),
            RetryPolicy::Custom(rule) => RetryPolicy::Custom(Arc::clone(rule)),
        }
    }
}

impl<M> fmt::Debug for RetryPolicy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::MaxRetries(max) => f.debug_tuple("MaxRetries").field(max).finish(),
            RetryPolicy::Backoff(backoff) => f.debug_tuple("Backoff").field(backoff).finish(),
            RetryPolicy::Custom(_) => f.write_str("Custom(<rule>)"),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Constant(delay, truncation) => f
                .debug_tuple("Constant")
                .field(delay)
                .field(truncation)
                .finish(),
            Backoff::Exponential(base, _, truncation) => f
                .debug_tuple("Exponential")
                .field(base)
                .field(&"<scale>")
                .field(truncation)
                .finish(),
        }
    }
}
