#![forbid(unsafe_code)]

//! Composition over any [`Source`].
//!
//! [`SourceExt`] is implemented for every source. Operators are plain structs
//! that wrap their upstream; subscribing to one subscribes upstream and relays
//! signals through the operator's logic.
//!
//! # Invariants
//!
//! 1. Failure and completion pass through unchanged unless the operator exists
//!    to change them (`on_error_return`, `combine_latest`).
//! 2. `observe_on` delivers every signal through its context, in upstream
//!    order, and drops signals still queued when its subscription is disposed.
//! 3. `combine_latest` emits only once both sides have produced a value, fails
//!    at most once, and completes when both sides have completed.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::scheduler::DeliveryContext;
use crate::source::{Observer, SharedSource, Source, Subscription, Value};
use crate::tristate::Presence;

/// Operators available on every [`Source`].
pub trait SourceExt<T: Value>: Source<T> {
    /// Transform every value.
    fn map<U, F>(self, f: F) -> Map<Self, F, T>
    where
        Self: Sized,
        U: Value,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Map {
            source: self,
            f: Arc::new(f),
            _in: PhantomData,
        }
    }

    /// Keep only values matching `predicate`.
    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        Self: Sized,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Filter {
            source: self,
            predicate: Arc::new(predicate),
        }
    }

    /// Transform and drop in one step.
    fn filter_map<U, F>(self, f: F) -> FilterMap<Self, F, T>
    where
        Self: Sized,
        U: Value,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        FilterMap {
            source: self,
            f: Arc::new(f),
            _in: PhantomData,
        }
    }

    /// Unwrap `Some`/`Set` values and drop empty ones.
    fn skip_unset(self) -> FilterMap<Self, fn(T) -> Option<T::Inner>, T>
    where
        Self: Sized,
        T: Presence,
        T::Inner: Value,
    {
        self.filter_map(Presence::present as fn(T) -> Option<T::Inner>)
    }

    /// Replace an upstream failure with one emission of `value`, then complete.
    fn on_error_return(self, value: T) -> OnErrorReturn<Self, T>
    where
        Self: Sized,
    {
        OnErrorReturn {
            source: self,
            fallback: value,
        }
    }

    /// Deliver every signal through `ctx`.
    fn observe_on(self, ctx: DeliveryContext) -> ObserveOn<Self>
    where
        Self: Sized,
    {
        ObserveOn { source: self, ctx }
    }

    /// Combine the latest values of `self` and `other` through `f`.
    fn combine_latest<U, R, O, F>(self, other: O, f: F) -> CombineLatest<Self, O, F, T, U>
    where
        Self: Sized,
        U: Value,
        R: Value,
        O: Source<U>,
        F: Fn(&T, &U) -> R + Send + Sync + 'static,
    {
        CombineLatest {
            left: self,
            right: other,
            f: Arc::new(f),
            _in: PhantomData,
        }
    }

    /// Erase the concrete type.
    fn boxed(self) -> SharedSource<T>
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }

    /// Subscribe with only a value handler.
    fn subscribe_next(&self, on_next: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        self.subscribe(Observer::new(on_next))
    }
}

impl<T: Value, S: Source<T> + ?Sized> SourceExt<T> for S {}

// ---------------------------------------------------------------------------
// map / filter / filter_map
// ---------------------------------------------------------------------------

/// See [`SourceExt::map`].
pub struct Map<S, F, T> {
    source: S,
    f: Arc<F>,
    _in: PhantomData<fn(T)>,
}

impl<S, F, T, U> Source<U> for Map<S, F, T>
where
    S: Source<T>,
    T: Value,
    U: Value,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    fn subscribe(&self, observer: Observer<U>) -> Subscription {
        let f = Arc::clone(&self.f);
        let down = observer.clone();
        self.source
            .subscribe(observer.relay(move |value| down.next(f(value))))
    }
}

/// See [`SourceExt::filter`].
pub struct Filter<S, P> {
    source: S,
    predicate: Arc<P>,
}

impl<S, P, T> Source<T> for Filter<S, P>
where
    S: Source<T>,
    T: Value,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let predicate = Arc::clone(&self.predicate);
        let down = observer.clone();
        self.source.subscribe(observer.relay(move |value| {
            if predicate(&value) {
                down.next(value);
            }
        }))
    }
}

/// See [`SourceExt::filter_map`].
pub struct FilterMap<S, F, T> {
    source: S,
    f: Arc<F>,
    _in: PhantomData<fn(T)>,
}

impl<S, F, T, U> Source<U> for FilterMap<S, F, T>
where
    S: Source<T>,
    T: Value,
    U: Value,
    F: Fn(T) -> Option<U> + Send + Sync + 'static,
{
    fn subscribe(&self, observer: Observer<U>) -> Subscription {
        let f = Arc::clone(&self.f);
        let down = observer.clone();
        self.source.subscribe(observer.relay(move |value| {
            if let Some(mapped) = f(value) {
                down.next(mapped);
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// on_error_return
// ---------------------------------------------------------------------------

/// See [`SourceExt::on_error_return`].
pub struct OnErrorReturn<S, T> {
    source: S,
    fallback: T,
}

impl<S, T> Source<T> for OnErrorReturn<S, T>
where
    S: Source<T>,
    T: Value,
{
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let next = observer.clone();
        let recover = observer.clone();
        let fallback = self.fallback.clone();
        self.source.subscribe(
            Observer::new(move |value| next.next(value))
                .on_error(move |err| {
                    tracing::debug!(%err, "upstream failed; substituting fallback value");
                    recover.next(fallback.clone());
                    recover.complete();
                })
                .on_complete(move || observer.complete()),
        )
    }
}

// ---------------------------------------------------------------------------
// observe_on
// ---------------------------------------------------------------------------

/// See [`SourceExt::observe_on`].
pub struct ObserveOn<S> {
    source: S,
    ctx: DeliveryContext,
}

impl<S, T> Source<T> for ObserveOn<S>
where
    S: Source<T>,
    T: Value,
{
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let cancelled = Arc::new(AtomicBool::new(false));

        let upstream = {
            let (ctx_n, ctx_e, ctx_c) = (self.ctx.clone(), self.ctx.clone(), self.ctx.clone());
            let (live_n, live_e, live_c) = (
                Arc::clone(&cancelled),
                Arc::clone(&cancelled),
                Arc::clone(&cancelled),
            );
            let (obs_n, obs_e, obs_c) = (observer.clone(), observer.clone(), observer);

            self.source.subscribe(
                Observer::new(move |value: T| {
                    let (live, obs) = (Arc::clone(&live_n), obs_n.clone());
                    ctx_n.schedule(move || {
                        if !live.load(Ordering::Acquire) {
                            obs.next(value);
                        }
                    });
                })
                .on_error(move |err| {
                    let (live, obs) = (Arc::clone(&live_e), obs_e.clone());
                    ctx_e.schedule(move || {
                        if !live.load(Ordering::Acquire) {
                            obs.error(err);
                        }
                    });
                })
                .on_complete(move || {
                    let (live, obs) = (Arc::clone(&live_c), obs_c.clone());
                    ctx_c.schedule(move || {
                        if !live.load(Ordering::Acquire) {
                            obs.complete();
                        }
                    });
                }),
            )
        };

        Subscription::new(move || {
            cancelled.store(true, Ordering::Release);
            upstream.dispose();
        })
    }
}

// ---------------------------------------------------------------------------
// combine_latest
// ---------------------------------------------------------------------------

/// See [`SourceExt::combine_latest`].
pub struct CombineLatest<A, B, F, T, U> {
    left: A,
    right: B,
    f: Arc<F>,
    _in: PhantomData<fn(T, U)>,
}

struct Latest<T, U> {
    left: Option<T>,
    right: Option<U>,
    completed: u8,
    terminated: bool,
}

impl<A, B, F, T, U, R> Source<R> for CombineLatest<A, B, F, T, U>
where
    A: Source<T>,
    B: Source<U>,
    T: Value,
    U: Value,
    R: Value,
    F: Fn(&T, &U) -> R + Send + Sync + 'static,
{
    fn subscribe(&self, observer: Observer<R>) -> Subscription {
        let latest = Arc::new(Mutex::new(Latest {
            left: None,
            right: None,
            completed: 0,
            terminated: false,
        }));

        let left = {
            let (latest, f, down) = (Arc::clone(&latest), Arc::clone(&self.f), observer.clone());
            Observer::new(move |value: T| {
                let pair = {
                    let mut state = latest.lock().unwrap_or_else(PoisonError::into_inner);
                    state.left = Some(value);
                    pair_of(&state)
                };
                if let Some((l, r)) = pair {
                    down.next(f(&l, &r));
                }
            })
        };
        let right = {
            let (latest, f, down) = (Arc::clone(&latest), Arc::clone(&self.f), observer.clone());
            Observer::new(move |value: U| {
                let pair = {
                    let mut state = latest.lock().unwrap_or_else(PoisonError::into_inner);
                    state.right = Some(value);
                    pair_of(&state)
                };
                if let Some((l, r)) = pair {
                    down.next(f(&l, &r));
                }
            })
        };

        let left = with_terminals(left, &latest, &observer);
        let right = with_terminals(right, &latest, &observer);

        let left_sub = self.left.subscribe(left);
        let right_sub = self.right.subscribe(right);
        Subscription::all(vec![left_sub, right_sub])
    }
}

fn pair_of<T: Clone, U: Clone>(state: &Latest<T, U>) -> Option<(T, U)> {
    match (&state.left, &state.right) {
        (Some(l), Some(r)) if !state.terminated => Some((l.clone(), r.clone())),
        _ => None,
    }
}

fn with_terminals<V: 'static, T, U, R>(
    side: Observer<V>,
    latest: &Arc<Mutex<Latest<T, U>>>,
    down: &Observer<R>,
) -> Observer<V>
where
    T: Send + 'static,
    U: Send + 'static,
    R: 'static,
{
    let (on_err_state, on_err_down) = (Arc::clone(latest), down.clone());
    let (on_done_state, on_done_down) = (Arc::clone(latest), down.clone());
    side.on_error(move |err| {
        let first = {
            let mut state = on_err_state.lock().unwrap_or_else(PoisonError::into_inner);
            !std::mem::replace(&mut state.terminated, true)
        };
        if first {
            on_err_down.error(err);
        }
    })
    .on_complete(move || {
        let finished = {
            let mut state = on_done_state.lock().unwrap_or_else(PoisonError::into_inner);
            state.completed += 1;
            if state.completed == 2 && !state.terminated {
                state.terminated = true;
                true
            } else {
                false
            }
        };
        if finished {
            on_done_down.complete();
        }
    })
}
