#![forbid(unsafe_code)]

//! Concrete sources: a hot multicast [`Subject`] and immediate sources.
//!
//! A `Subject` is what application code pushes values into; the immediate
//! sources ([`just`], [`from_values`], [`fail`], [`empty`], [`never`]) finish
//! their whole sequence inside `subscribe`.
//!
//! # Invariants
//!
//! 1. Observers are notified in subscription order.
//! 2. A subject terminates at most once; later `emit`/`fail`/`complete` calls
//!    are ignored.
//! 3. Subscribing to a terminated subject delivers the terminal signal
//!    immediately.
//! 4. Observer callbacks run outside the subject's lock, so an observer may
//!    dispose its own subscription while being notified.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::error::Error;
use crate::source::{Observer, Source, Subscription, Value};

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(Error),
}

struct SubjectState<T> {
    observers: Vec<(u64, Observer<T>)>,
    next_id: u64,
    terminal: Option<Terminal>,
}

/// Hot multicast source. Cloning shares the subject.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Value> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Subject")
            .field("observers", &state.observers.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

impl<T: Value> Subject<T> {
    /// Create a subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Deliver `value` to every current observer.
    pub fn emit(&self, value: T) {
        let observers = {
            let state = self.lock();
            if state.terminal.is_some() {
                return;
            }
            snapshot(&state.observers)
        };
        for observer in observers {
            observer.next(value.clone());
        }
    }

    /// Terminate with a failure.
    pub fn fail(&self, err: Error) {
        for observer in self.terminate(Terminal::Failed(err.clone())) {
            observer.error(err.clone());
        }
    }

    /// Terminate normally.
    pub fn complete(&self) {
        for observer in self.terminate(Terminal::Completed) {
            observer.complete();
        }
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Whether the subject has completed or failed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lock().terminal.is_some()
    }

    fn terminate(&self, terminal: Terminal) -> Vec<Observer<T>> {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return Vec::new();
        }
        state.terminal = Some(terminal);
        std::mem::take(&mut state.observers)
            .into_iter()
            .map(|(_, o)| o)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubjectState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn snapshot<T>(observers: &[(u64, Observer<T>)]) -> Vec<Observer<T>> {
    observers.iter().map(|(_, o)| o.clone()).collect()
}

impl<T: Value> Source<T> for Subject<T> {
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let id = {
            let mut state = self.lock();
            match state.terminal.clone() {
                Some(terminal) => {
                    drop(state);
                    match terminal {
                        Terminal::Completed => observer.complete(),
                        Terminal::Failed(err) => observer.error(err),
                    }
                    return Subscription::empty();
                }
                None => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.observers.push((id, observer));
                    id
                }
            }
        };

        let weak: Weak<Mutex<SubjectState<T>>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.observers.retain(|(i, _)| *i != id);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Immediate sources
// ---------------------------------------------------------------------------

/// Source that emits a fixed sequence and completes inside `subscribe`.
#[derive(Debug, Clone)]
pub struct Values<T> {
    values: Arc<[T]>,
}

impl<T: Value> Source<T> for Values<T> {
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        for value in self.values.iter() {
            observer.next(value.clone());
        }
        observer.complete();
        Subscription::empty()
    }
}

/// Single value, then completion.
pub fn just<T: Value>(value: T) -> Values<T> {
    from_values(vec![value])
}

/// Every value in order, then completion.
pub fn from_values<T: Value>(values: Vec<T>) -> Values<T> {
    Values {
        values: values.into(),
    }
}

/// Completion without values.
pub fn empty<T: Value>() -> Values<T> {
    from_values(Vec::new())
}

/// Source that fails immediately.
#[derive(Debug, Clone)]
pub struct Failing {
    err: Error,
}

impl<T: 'static> Source<T> for Failing {
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        observer.error(self.err.clone());
        Subscription::empty()
    }
}

/// Immediate failure with `err`.
pub fn fail(err: Error) -> Failing {
    Failing { err }
}

/// Source that never signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl<T: 'static> Source<T> for Never {
    fn subscribe(&self, _observer: Observer<T>) -> Subscription {
        Subscription::empty()
    }
}

/// A source that never emits, fails, or completes.
pub fn never() -> Never {
    Never
}
