//! Retry actions and their priority rules.

use super::state::SharedError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The reason a retry was refused (carried by [`Action::NoRetry`]).
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// The maximum number of retries of a policy has been reached.
    #[error("maximum retries reached ({0})")]
    Retries(usize),

    /// The maximum scheduled delay of a policy has been reached.
    #[error("maximum retry delay reached ({0:?})")]
    Delay(Duration),

    /// An arbitrary error prevented the operation from being retried.
    #[error("retry prevented: {0}")]
    Custom(SharedError),
}

impl RetryError {
    /// Creates a custom retry error from any error value.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(error))
    }
}

impl PartialEq for RetryError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Retries(lhs), Self::Retries(rhs)) => lhs == rhs,
            (Self::Delay(lhs), Self::Delay(rhs)) => lhs == rhs,
            (Self::Custom(lhs), Self::Custom(rhs)) => Arc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

/// An action to take after evaluating a retry policy.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Action {
    /// The policy has no opinion; normal error handling should be made.
    #[default]
    None,

    /// The operation must not be retried.
    NoRetry(RetryError),

    /// The operation should be retried immediately.
    Retry,

    /// The operation should be retried after the given delay.
    RetryAfter(Duration),
}

/// A function that picks the prevailing action out of two candidates.
pub type ActionPriority = fn(Action, Action) -> Action;

impl Action {
    /// Returns the most prioritary of two actions.
    ///
    /// The priorities are:
    /// - `NoRetry` prevails over any other action.
    /// - `Retry` and `RetryAfter` prevail over `None`.
    /// - `RetryAfter` prevails over `Retry`.
    /// - Between two `RetryAfter`, the longer delay prevails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use alicerce_core::retry::Action;
    /// use std::time::Duration;
    ///
    /// let short = Action::RetryAfter(Duration::from_secs(1));
    /// let long = Action::RetryAfter(Duration::from_secs(5));
    ///
    /// assert_eq!(Action::most_prioritary(short, long.clone()), long);
    /// assert_eq!(Action::most_prioritary(Action::None, Action::Retry), Action::Retry);
    /// ```
    pub fn most_prioritary(lhs: Action, rhs: Action) -> Action {
        match (lhs, rhs) {
            (lhs @ Action::NoRetry(_), _) => lhs,
            (_, rhs @ Action::NoRetry(_)) => rhs,

            (lhs @ Action::Retry, Action::None)
            | (lhs @ Action::RetryAfter(_), Action::None)
            | (lhs @ Action::RetryAfter(_), Action::Retry) => lhs,

            (Action::None, rhs @ Action::Retry)
            | (Action::None, rhs @ Action::RetryAfter(_))
            | (Action::Retry, rhs @ Action::RetryAfter(_)) => rhs,

            (Action::RetryAfter(lhs), Action::RetryAfter(rhs)) => Action::RetryAfter(lhs.max(rhs)),

            (Action::None, Action::None) => Action::None,
            (Action::Retry, Action::Retry) => Action::Retry,
        }
    }

    /// Folds a sequence of actions into the prevailing one, starting from `None`.
    pub fn fold<I>(actions: I) -> Action
    where
        I: IntoIterator<Item = Action>,
    {
        actions.into_iter().fold(Action::None, Action::most_prioritary)
    }

    /// Whether the action allows the operation to be attempted again.
    pub fn allows_retry(&self) -> bool {
        matches!(self, Action::Retry | Action::RetryAfter(_))
    }
}
