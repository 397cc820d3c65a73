#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the Alicerce crates.
//!
//! This crate provides the deterministic building blocks that the network,
//! persistence and orchestration layers are assembled from:
//!
//! - **Retry policy evaluation** via [`retry::RetryPolicy`] and [`retry::Action`]
//!   - Constant and exponential backoff with retry or delay truncation
//!   - Custom rules with access to the accumulated [`retry::RetryState`]
//!   - Priority folding of the actions produced by several policies
//! - **Cooperative cancelation** via [`Cancelable`] and [`CancelableBag`]
//! - **Lock-protected shared values** via [`Atomic`]
//! - **Payload decoding** via [`decoding::ModelDecoding`] and [`decoding::ErrorDecoding`]
//! - **Decode instrumentation** via [`metrics::PerformanceMetricsTracker`]
//! - **Declarative error boundaries** via the `error_boundary!` macro
//!
//! # Examples
//!
//! ```rust
//! use alicerce_core::prelude::*;
//!
//! let policy: RetryPolicy<()> = RetryPolicy::MaxRetries(3);
//! let state = RetryState::empty();
//! let error = std::io::Error::other("boom");
//!
//! assert_eq!(policy.should_retry(&error, &state, &()), Action::Retry);
//! ```

pub mod atomic;
pub mod cancelable;
pub mod decoding;
pub mod error;
pub mod metrics;
pub mod retry;

pub use atomic::Atomic;
pub use cancelable::{Cancelable, CancelableBag, CancelableFn, DummyCancelable, WeakCancelable};
pub use error::BoxError;

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use alicerce_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::atomic::Atomic;
    pub use crate::cancelable::{Cancelable, CancelableBag, DummyCancelable};
    pub use crate::decoding::{ErrorDecoding, ModelDecoding};
    pub use crate::error::BoxError;
    pub use crate::error_boundary;
    pub use crate::metrics::{DecodePerformanceTracker, MeasureExt, PerformanceMetricsTracker};
    pub use crate::retry::{
        Action, Backoff, RetryError, RetryPolicy, RetryState, RetryableResource, Truncation,
    };
}
