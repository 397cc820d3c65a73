//! Retry policy evaluation.
//!
//! This module provides a declarative, side-effect free engine that decides
//! whether (and when) a failed operation should be attempted again. Policies
//! are immutable values; all the mutable bookkeeping lives in a [`RetryState`]
//! that the caller owns and grows after each failed attempt.
//!
//! # Key Types
//!
//! - [`RetryPolicy`] - A max retries limit, a backoff strategy or a custom rule
//! - [`Action`] - The outcome of evaluating a policy
//! - [`RetryState`] - Errors and scheduled delay accumulated so far
//! - [`RetryableResource`] - A resource that folds several policies into one action
//!
//! # Examples
//!
//! ```rust
//! use alicerce_core::retry::{Action, Backoff, RetryError, RetryPolicy, RetryState, Truncation};
//! use std::time::Duration;
//!
//! let policy: RetryPolicy<()> = RetryPolicy::Backoff(Backoff::Constant(
//!     Duration::from_secs(1),
//!     Truncation::MaxDelay(Duration::from_millis(2500)),
//! ));
//!
//! let error = std::io::Error::other("timeout");
//! let mut state = RetryState::empty();
//!
//! assert_eq!(
//!     policy.should_retry(&error, &state, &()),
//!     Action::RetryAfter(Duration::from_secs(1))
//! );
//!
//! state.total_delay = Duration::from_secs(3);
//! assert_eq!(
//!     policy.should_retry(&error, &state, &()),
//!     Action::NoRetry(RetryError::Delay(Duration::from_millis(2500)))
//! );
//! ```

mod action;
mod policy;
pub mod scale;
mod state;
mod strategy;

pub use action::{Action, ActionPriority, RetryError};
pub use policy::{Backoff, RetryPolicy, Rule, Scale, Truncation};
pub use state::{RetryState, SharedError};
pub use strategy::RetryableResource;
