#![forbid(unsafe_code)]

//! A shared, version-tracked value cell with change notification.
//!
//! [`Observable<T>`] is the mutable holder application glue keeps behind a
//! bound element (a label's text, a button's enabled flag). A binder writes to
//! it; view code reads it or subscribes to it. It is also a [`Source<T>`]: a
//! subscriber first receives the current value, then every change.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Callbacks run outside the internal lock.
//! 6. A [`Source`] subscriber sees the replay first and then only newer
//!    versions, even when a change races the subscription.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::gate::ReplayGate;
use crate::source::{Observer, Source, Subscription, Value};

/// Receives the new value and its version.
type Callback<T> = Arc<dyn Fn(&T, u64) + Send + Sync>;

struct Inner<T> {
    value: T,
    version: u64,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

/// Shared value cell. Cloning shares the cell.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Default + Value + PartialEq> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Value + PartialEq> Observable<T> {
    /// Create a cell holding `value` at version 0.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                version: 0,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock().value)
    }

    /// Replace the value and notify subscribers, unless it is unchanged.
    pub fn set(&self, value: T) {
        let (callbacks, version) = {
            let mut inner = self.lock();
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            inner.version += 1;
            let callbacks = inner
                .subscribers
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect::<Vec<_>>();
            (callbacks, inner.version)
        };
        for cb in callbacks {
            cb(&value, version);
        }
    }

    /// Modify the value in place through `f`, then notify as [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Call `callback` on every change until the subscription is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.register(Arc::new(move |value: &T, _: u64| callback(value))).0
    }

    /// Register a callback and read the current value and version under one
    /// lock. The version orders a replay against changes that race it.
    fn register(&self, callback: Callback<T>) -> (Subscription, T, u64) {
        let (id, current, version) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, callback));
            (id, inner.value.clone(), inner.version)
        };
        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        let sub = Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(i, _)| *i != id);
            }
        });
        (sub, current, version)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Value + PartialEq> Source<T> for Observable<T> {
    /// Replays the current value, then forwards every change. Never completes.
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let gate = Arc::new(ReplayGate::new(move |value: T| observer.next(value)));
        let changes = Arc::clone(&gate);
        let (sub, current, version) = self.register(Arc::new(move |value: &T, version: u64| {
            changes.offer(version, value.clone());
        }));
        gate.open(version, Some(current));
        sub
    }
}
