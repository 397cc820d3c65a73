//! A lock-protected value.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A value whose reads and mutations all happen while holding a lock.
///
/// Every operation acquires the same lock, so a `modify` is never
/// interleaved with another `modify`, `value` or `swap`. A poisoned lock is
/// recovered: the value is still handed out as it was left by the panicking
/// thread.
///
/// # Examples
///
/// ```rust
/// use alicerce_core::Atomic;
///
/// let counter = Atomic::new(0);
///
/// let after = counter.modify(|value| {
///     *value += 1;
///     *value
/// });
///
/// assert_eq!(after, 1);
/// assert_eq!(counter.swap(10), 1);
/// assert_eq!(counter.value(), 10);
/// ```
#[derive(Default)]
pub struct Atomic<T> {
    inner: Mutex<T>,
}

impl<T> Atomic<T> {
    /// Creates a new atomic value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Mutates the value in place and returns the closure's result.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Reads the value without cloning it and returns the closure's result.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Replaces the value and returns the previous one.
    pub fn swap(&self, new: T) -> T {
        std::mem::replace(&mut *self.lock(), new)
    }

    /// Consumes the wrapper and returns the value.
    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Atomic<T> {
    /// Returns a copy of the current value.
    pub fn value(&self) -> T {
        self.lock().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic").field(&*self.lock()).finish()
    }
}
