#![forbid(unsafe_code)]

//! The subscribe/cancel contract every asynchronous value source implements.
//!
//! A [`Source<T>`] hands values to an [`Observer<T>`] and returns a
//! [`Subscription`] that cancels delivery. Sources carry no state of their own
//! from the binding engine's point of view; they may be backed by a subject, a
//! value cell, a channel of an action, or anything else.
//!
//! # Invariants
//!
//! 1. An observer always has all three handlers. Handlers not supplied by the
//!    caller are no-ops, so no signal ever goes unhandled.
//! 2. `Subscription::dispose()` is idempotent; the cancel hook runs at most once.
//! 3. Dropping a [`Subscription`] disposes it.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Double dispose | Redundant teardown paths | Second call is a no-op |
//! | Signal after dispose | Source races with cancel | Source decides; subjects drop it |

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Error;

/// Bound shared by every value that travels through a source.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

type NextFn<T> = Arc<dyn Fn(T) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(Error) + Send + Sync>;
type CompleteFn = Arc<dyn Fn() + Send + Sync>;

/// The receiving end of a subscription: handlers for values, failure, and
/// completion.
pub struct Observer<T> {
    next: NextFn<T>,
    error: ErrorFn,
    complete: CompleteFn,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            next: Arc::clone(&self.next),
            error: Arc::clone(&self.error),
            complete: Arc::clone(&self.complete),
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

impl<T: 'static> Observer<T> {
    /// Observer that handles values and ignores failure and completion.
    pub fn new(on_next: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            next: Arc::new(on_next),
            error: Arc::new(|_| {}),
            complete: Arc::new(|| {}),
        }
    }

    /// Replace the failure handler.
    #[must_use]
    pub fn on_error(mut self, on_error: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.error = Arc::new(on_error);
        self
    }

    /// Replace the completion handler.
    #[must_use]
    pub fn on_complete(mut self, on_complete: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Arc::new(on_complete);
        self
    }

    /// Observer of another value type whose failure and completion are
    /// forwarded to `self`, and whose values go through `on_next`.
    ///
    /// This is the building block for operators.
    pub fn relay<U: 'static>(&self, on_next: impl Fn(U) + Send + Sync + 'static) -> Observer<U> {
        Observer {
            next: Arc::new(on_next),
            error: Arc::clone(&self.error),
            complete: Arc::clone(&self.complete),
        }
    }

    /// Deliver a value.
    pub fn next(&self, value: T) {
        (self.next)(value);
    }

    /// Deliver a failure.
    pub fn error(&self, err: Error) {
        (self.error)(err);
    }

    /// Deliver completion.
    pub fn complete(&self) {
        (self.complete)();
    }
}

/// Cancellation handle returned by [`Source::subscribe`].
///
/// Disposing runs the source's cancel hook once. Dropping the handle disposes
/// it, so a caller must keep the subscription alive for as long as it wants
/// values.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    disposed: AtomicBool,
}

impl Subscription {
    /// Subscription whose disposal runs `cancel`.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
            disposed: AtomicBool::new(false),
        }
    }

    /// Subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self {
            cancel: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Combine several subscriptions; disposing the result disposes them all
    /// in order.
    pub fn all(parts: Vec<Subscription>) -> Self {
        Self::new(move || {
            for part in parts {
                part.dispose();
            }
        })
    }

    /// Cancel delivery. Safe to call repeatedly.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A subscribable asynchronous sequence of values.
pub trait Source<T>: Send + Sync {
    /// Start delivering to `observer` until the returned subscription is
    /// disposed or the source terminates.
    fn subscribe(&self, observer: Observer<T>) -> Subscription;
}

impl<T, S: Source<T> + ?Sized> Source<T> for Arc<S> {
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        (**self).subscribe(observer)
    }
}

/// Type-erased, shareable source.
pub type SharedSource<T> = Arc<dyn Source<T>>;
