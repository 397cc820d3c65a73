//! Resources that carry their own retry policies and bookkeeping.

use super::action::{Action, ActionPriority};
use super::policy::RetryPolicy;
use super::state::RetryState;
use std::error::Error;

/// A resource whose operation can be retried after failing.
///
/// Implementations expose a list of policies plus the mutable [`RetryState`]
/// that the executor (typically a network stack) grows between attempts.
/// [`should_retry`](RetryableResource::should_retry) evaluates every policy
/// and folds the resulting actions into the prevailing one.
///
/// # Examples
///
/// ```rust
/// use alicerce_core::retry::{Action, RetryPolicy, RetryState, RetryableResource};
///
/// struct Download {
///     policies: Vec<RetryPolicy<()>>,
///     state: RetryState,
/// }
///
/// impl RetryableResource for Download {
///     type RetryMetadata = ();
///
///     fn retry_policies(&self) -> &[RetryPolicy<()>] {
///         &self.policies
///     }
///
///     fn retry_state(&self) -> &RetryState {
///         &self.state
///     }
///
///     fn retry_state_mut(&mut self) -> &mut RetryState {
///         &mut self.state
///     }
/// }
///
/// let download = Download {
///     policies: vec![RetryPolicy::MaxRetries(1)],
///     state: RetryState::empty(),
/// };
/// let error = std::io::Error::other("reset by peer");
///
/// assert_eq!(download.should_retry(&error, &()), Action::Retry);
/// ```
pub trait RetryableResource {
    /// The retry event metadata (e.g. request, payload, response).
    type RetryMetadata;

    /// The policies used to evaluate which action to take when an error occurs.
    fn retry_policies(&self) -> &[RetryPolicy<Self::RetryMetadata>];

    /// The retry state accumulated so far.
    fn retry_state(&self) -> &RetryState;

    /// Mutable access to the retry state, used by executors between attempts.
    fn retry_state_mut(&mut self) -> &mut RetryState;

    /// The function used to pick the prevailing action among policies.
    ///
    /// Default implementation uses [`Action::most_prioritary`].
    fn retry_action_priority(&self) -> ActionPriority {
        Action::most_prioritary
    }

    /// The number of times the resource has been retried.
    fn retry_count(&self) -> usize {
        self.retry_state().retry_count()
    }

    /// Evaluates every retry policy and returns the prevailing action.
    ///
    /// Returns [`Action::None`] when the resource has no policies.
    fn should_retry(
        &self,
        error: &(dyn Error + Send + Sync + 'static),
        metadata: &Self::RetryMetadata,
    ) -> Action {
        let priority = self.retry_action_priority();
        let state = self.retry_state();

        self.retry_policies()
            .iter()
            .map(|policy| policy.should_retry(error, state, metadata))
            .fold(Action::None, priority)
    }
}
