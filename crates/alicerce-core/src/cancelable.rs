//! Cooperative cancelation handles.
//!
//! A [`Cancelable`] is anything that can be asked to stop: an in-flight
//! network request, a spawned task, a pending disk read. Cancelation is
//! best-effort; work already past its point of no return is allowed to
//! finish, and its result is expected to be discarded by whoever checks
//! [`CancelableBag::is_cancelled`].

use crate::atomic::Atomic;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A handle to an operation that can be cancelled.
pub trait Cancelable: Send + Sync {
    /// Requests cancelation of the operation.
    fn cancel(&self);
}

impl<T: Cancelable + ?Sized> Cancelable for Arc<T> {
    fn cancel(&self) {
        (**self).cancel()
    }
}

impl<T: Cancelable + ?Sized> Cancelable for Box<T> {
    fn cancel(&self) {
        (**self).cancel()
    }
}

impl Cancelable for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort()
    }
}

/// A cancelable that does nothing, for operations that can't be cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyCancelable;

impl Cancelable for DummyCancelable {
    fn cancel(&self) {}
}

/// A cancelable that forwards to another one without keeping it alive.
///
/// Cancelling after the target has been dropped is a no-op.
#[derive(Clone)]
pub struct WeakCancelable {
    target: Weak<dyn Cancelable>,
}

impl WeakCancelable {
    /// Creates a weak handle to `target`.
    pub fn new<C: Cancelable + 'static>(target: &Arc<C>) -> Self {
        let weak: Weak<C> = Arc::downgrade(target);
        let target: Weak<dyn Cancelable> = weak;
        Self { target }
    }
}

impl Cancelable for WeakCancelable {
    fn cancel(&self) {
        if let Some(target) = self.target.upgrade() {
            target.cancel();
        }
    }
}

impl fmt::Debug for WeakCancelable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCancelable")
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

/// A cancelable that runs a closure, at most once.
pub struct CancelableFn {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CancelableFn {
    /// Creates a cancelable that runs `action` on the first `cancel`.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }
}

impl Cancelable for CancelableFn {
    fn cancel(&self) {
        let action = self
            .action
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for CancelableFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelableFn")
    }
}

/// A thread-safe collection of cancelables that are cancelled together.
///
/// Once [`cancel`](CancelableBag::cancel) has been called, the bag stays
/// cancelled: every stored cancelable is cancelled exactly once, and any
/// cancelable added afterwards is cancelled immediately instead of stored.
/// The check-and-store performed by [`add`](CancelableBag::add) happens under
/// the same lock that `cancel` takes, so a cancelable added concurrently
/// with a cancelation is never dropped without being cancelled.
///
/// # Examples
///
/// ```rust
/// use alicerce_core::{Cancelable, CancelableBag, CancelableFn};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let cancelled = Arc::new(AtomicUsize::new(0));
/// let bag = CancelableBag::new();
///
/// let counter = Arc::clone(&cancelled);
/// bag.add(Box::new(CancelableFn::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })));
///
/// bag.cancel();
/// bag.cancel();
///
/// assert!(bag.is_cancelled());
/// assert_eq!(cancelled.load(Ordering::SeqCst), 1);
/// ```
pub struct CancelableBag {
    cancelables: Atomic<Option<Vec<Box<dyn Cancelable>>>>,
    is_cancelled: AtomicBool,
}

impl CancelableBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self {
            cancelables: Atomic::new(Some(Vec::new())),
            is_cancelled: AtomicBool::new(false),
        }
    }

    /// Creates a bag holding the given cancelables.
    pub fn with<I>(cancelables: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Cancelable>>,
    {
        Self {
            cancelables: Atomic::new(Some(cancelables.into_iter().collect())),
            is_cancelled: AtomicBool::new(false),
        }
    }

    /// Adds a cancelable to the bag.
    ///
    /// If the bag has already been cancelled, the cancelable is cancelled
    /// right away and not stored.
    pub fn add(&self, cancelable: Box<dyn Cancelable>) {
        let rejected = self.cancelables.modify(|slot| match slot {
            Some(cancelables) => {
                cancelables.push(cancelable);
                None
            }
            None => Some(cancelable),
        });

        if let Some(cancelable) = rejected {
            cancelable.cancel();
        }
    }

    /// Cancels every stored cancelable. Subsequent calls have no effect.
    pub fn cancel(&self) {
        self.is_cancelled.store(true, Ordering::SeqCst);

        // cancel outside the lock, a cancelable may add to this bag again
        if let Some(cancelables) = self.cancelables.swap(None) {
            for cancelable in cancelables {
                cancelable.cancel();
            }
        }
    }

    /// Whether the bag has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled.load(Ordering::SeqCst)
    }

    /// The number of stored cancelables (always `0` once cancelled).
    pub fn len(&self) -> usize {
        self.cancelables.with_value(|slot| slot.as_ref().map_or(0, Vec::len))
    }

    /// Whether the bag holds no cancelables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CancelableBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancelable for CancelableBag {
    fn cancel(&self) {
        CancelableBag::cancel(self)
    }
}

impl fmt::Debug for CancelableBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelableBag")
            .field("len", &self.len())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}
