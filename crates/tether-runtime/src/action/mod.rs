#![forbid(unsafe_code)]

//! [`Action<I, O>`]: the execution state of one asynchronous operation,
//! projected onto four [`Channel`]s.
//!
//! | Channel     | Meaning                                                    |
//! |-------------|------------------------------------------------------------|
//! | `output`    | Last emitted value. Unset until the first emission.        |
//! | `error`     | Failure of the current run. Cleared when a run starts.     |
//! | `executing` | `true` while running, then `false`, then cleared.          |
//! | `completed` | Set then cleared once per successful run (one-shot only).  |
//!
//! Two modes, fixed at construction:
//!
//! - **One-shot** ([`Action::new`]): supply [`input`](Action::input), then
//!   [`start`](Action::start). A run subscribes to `execute(input)` and ends at
//!   its first terminal signal.
//! - **Triggered** ([`Action::triggered`]): every value of a trigger driver
//!   starts a run of `transform(value)`. A newer trigger supersedes the run in
//!   flight; only the newest run may deliver.
//!
//! ```ignore
//! let search = Action::new(|q: String| service.search(q));
//! search.observe(&owner, ActionCallbacks::new()
//!     .on_executing(|busy| spinner.set(busy == Some(true)))
//!     .on_output(|hits| list.set(hits.cloned().unwrap_or_default())));
//! search.input("rust".into()).start();
//! ```
//!
//! # Invariants
//!
//! 1. `executing` is `Set(true)` exactly between the start of a run and that
//!    run's first terminal signal (one-shot) or first emission (triggered).
//! 2. One-shot: `completed` fires once per successful run, never on failure.
//! 3. Triggered: signals are applied only when their generation is the current
//!    one. Superseded runs are disposed and anything they still deliver is
//!    dropped.
//! 4. `start()` while a run is active does nothing.
//! 5. No failure escapes: run failures land on `error`.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `start()` without input | Caller skipped `input` | `error = MissingInput`; `executing` goes `false`, then cleared |
//! | Last observer leaves mid-run | Scope torn down | Run disposed; synthetic completion |
//! | Owner destroyed | Triggered scope ended | Trigger and run disposed; action inert |

mod channel;

pub use channel::{Channel, Slots};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::ArcSwapOption;
use tether_core::{
    DeliveryContext, Error, LifecycleEvent, LifecycleOwner, Observer, SharedSource, Source,
    SourceExt, Subscription, Tristate, Value,
};

use crate::driver::Driver;

type ExecuteFn<I, O> = Arc<dyn Fn(I) -> SharedSource<O> + Send + Sync>;
type OwnerCleanup = Box<dyn FnOnce() + Send>;

enum Mode<I, O> {
    OneShot(ExecuteFn<I, O>),
    Triggered,
}

struct RunState<I> {
    input: Option<I>,
    generation: u64,
    /// Generation of the run allowed to deliver.
    active: Option<u64>,
    subscription: Option<Subscription>,
    trigger: Option<Subscription>,
    owner_cleanup: Option<OwnerCleanup>,
    destroyed: bool,
}

struct ActionInner<I, O> {
    mode: Mode<I, O>,
    output: Channel<O>,
    error: Channel<Error>,
    executing: Channel<bool>,
    completed: Channel<()>,
    run: Mutex<RunState<I>>,
    delivery: ArcSwapOption<DeliveryContext>,
    observers: AtomicUsize,
}

/// Observable execution state of an asynchronous operation. Cloning shares
/// the action.
pub struct Action<I, O> {
    inner: Arc<ActionInner<I, O>>,
}

impl<I, O> Clone for Action<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: Value, O: Value> Action<I, O> {
    /// One-shot action running `execute(input)` on every [`start`](Self::start).
    pub fn new<S, F>(execute: F) -> Self
    where
        S: Source<O> + 'static,
        F: Fn(I) -> S + Send + Sync + 'static,
    {
        let execute: ExecuteFn<I, O> = Arc::new(move |input| execute(input).boxed());
        Self::with_mode(Mode::OneShot(execute))
    }

    /// Triggered action: each value of `trigger` runs `transform(value)` for
    /// as long as `owner` lives, superseding the previous run.
    ///
    /// Runs deliver on the trigger's delivery context.
    pub fn triggered<Own, S, F>(owner: &Arc<Own>, trigger: Driver<I>, transform: F) -> Self
    where
        Own: LifecycleOwner + ?Sized + 'static,
        S: Source<O> + 'static,
        F: Fn(I) -> S + Send + Sync + 'static,
    {
        let action = Self::with_mode(Mode::Triggered);
        action.deliver_on(trigger.delivery());
        let inner = &action.inner;

        let weak = Arc::downgrade(inner);
        let token = owner.on_transition(Arc::new(move |event| {
            if event == LifecycleEvent::Destroy {
                if let Some(inner) = weak.upgrade() {
                    inner.destroy("owner destroyed");
                }
            }
        }));
        let owner_ref: Weak<Own> = Arc::downgrade(owner);
        let cleanup: OwnerCleanup = Box::new(move || {
            if let Some(owner) = owner_ref.upgrade() {
                owner.remove_transition(token);
            }
        });
        {
            let mut run = inner.lock_run();
            if run.destroyed {
                drop(run);
                cleanup();
                return action;
            }
            run.owner_cleanup = Some(cleanup);
        }

        let weak = Arc::downgrade(inner);
        let transform = Arc::new(transform);
        let subscription = trigger.subscribe(Observer::new(move |input: I| {
            if let Some(inner) = weak.upgrade() {
                let transform = Arc::clone(&transform);
                inner.on_trigger(move || transform(input).boxed());
            }
        }));

        let mut run = inner.lock_run();
        if run.destroyed {
            drop(run);
            subscription.dispose();
        } else {
            run.trigger = Some(subscription);
            drop(run);
        }
        action
    }

    fn with_mode(mode: Mode<I, O>) -> Self {
        let inner = Arc::new(ActionInner {
            mode,
            output: Channel::new(),
            error: Channel::new(),
            executing: Channel::new(),
            completed: Channel::new(),
            run: Mutex::new(RunState {
                input: None,
                generation: 0,
                active: None,
                subscription: None,
                trigger: None,
                owner_cleanup: None,
                destroyed: false,
            }),
            delivery: ArcSwapOption::empty(),
            observers: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&inner);
        let hook: channel::ObserverHook = Arc::new(move |added| {
            if let Some(inner) = weak.upgrade() {
                inner.observer_changed(added);
            }
        });
        inner.output.set_observer_hook(Arc::clone(&hook));
        inner.error.set_observer_hook(Arc::clone(&hook));
        inner.executing.set_observer_hook(Arc::clone(&hook));
        inner.completed.set_observer_hook(hook);

        Self { inner }
    }

    /// Deliver run signals on `ctx` instead of the process default.
    pub fn deliver_on(&self, ctx: DeliveryContext) -> &Self {
        self.inner.delivery.store(Some(Arc::new(ctx)));
        self
    }

    /// Set the input for the next [`start`](Self::start).
    pub fn input(&self, input: I) -> &Self {
        self.inner.lock_run().input = Some(input);
        self
    }

    /// Run the operation with the current input. Does nothing while a run is
    /// active or on a triggered action.
    pub fn start(&self) {
        let Mode::OneShot(execute) = &self.inner.mode else {
            tracing::debug!("start ignored on a triggered action");
            return;
        };

        let (generation, input) = {
            let mut run = self.inner.lock_run();
            if run.active.is_some() {
                tracing::trace!(generation = run.generation, "start ignored: already executing");
                return;
            }
            let Some(input) = run.input.clone() else {
                drop(run);
                tracing::debug!("start without input");
                self.inner.error.set_value(Error::MissingInput);
                self.inner.finish_executing();
                return;
            };
            run.generation += 1;
            run.active = Some(run.generation);
            (run.generation, input)
        };

        self.inner.error.clear();
        self.inner.executing.set_value(true);
        tracing::debug!(generation, "action run started");

        let source = execute(input).observe_on(self.inner.delivery());
        let subscription = source.subscribe(self.inner.one_shot_observer(generation));
        self.inner.store_run(generation, subscription);
    }

    /// Wire callbacks for all four channels for the lifetime of `owner`.
    pub fn observe<Own>(&self, owner: &Arc<Own>, callbacks: ActionCallbacks<O>) -> &Self
    where
        Own: LifecycleOwner + ?Sized + 'static,
    {
        let ActionCallbacks {
            on_executing,
            on_output,
            on_error,
            on_completed,
        } = callbacks;
        self.inner
            .executing
            .observe(owner, move |slot| on_executing(slot.get().copied()));
        self.inner
            .output
            .observe(owner, move |slot| on_output(slot.get()));
        self.inner
            .error
            .observe(owner, move |slot| on_error(slot.get()));
        self.inner.completed.observe(owner, move |slot| {
            if slot.is_set() {
                on_completed();
            }
        });
        self
    }

    #[must_use]
    pub fn output(&self) -> &Channel<O> {
        &self.inner.output
    }

    #[must_use]
    pub fn error(&self) -> &Channel<Error> {
        &self.inner.error
    }

    #[must_use]
    pub fn executing(&self) -> &Channel<bool> {
        &self.inner.executing
    }

    #[must_use]
    pub fn completed(&self) -> &Channel<()> {
        &self.inner.completed
    }

    /// Last output, if any.
    #[must_use]
    pub fn value(&self) -> Option<O> {
        self.inner.output.get()
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.inner.executing.get() == Some(true)
    }

    /// Whether a triggered action's owner has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock_run().destroyed
    }

    /// Output as a driver on this action's delivery context.
    #[must_use]
    pub fn output_driver(&self, default_value: O) -> Driver<O> {
        Driver::new(self.inner.output.clone(), default_value).deliver_on(self.inner.delivery())
    }

    /// `executing` as a driver; cleared reads as `false`.
    #[must_use]
    pub fn executing_driver(&self) -> Driver<bool> {
        let busy = self
            .inner
            .executing
            .slots()
            .map(|slot: Tristate<bool>| slot.get() == Some(&true));
        Driver::new(busy, false).deliver_on(self.inner.delivery())
    }
}

impl<I: Value, O: Value> ActionInner<I, O> {
    fn delivery(&self) -> DeliveryContext {
        self.delivery
            .load_full()
            .map(|ctx| (*ctx).clone())
            .unwrap_or_else(DeliveryContext::current)
    }

    fn lock_run(&self) -> MutexGuard<'_, RunState<I>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_run().active == Some(generation)
    }

    /// Keep `subscription` if its run is still active; otherwise it already
    /// finished inside `subscribe` and is disposed.
    fn store_run(&self, generation: u64, subscription: Subscription) {
        let mut run = self.lock_run();
        if run.active == Some(generation) {
            run.subscription = Some(subscription);
        } else {
            drop(run);
            subscription.dispose();
        }
    }

    /// End run `generation`. Returns `false` if it was not the active run.
    fn end_run(&self, generation: u64) -> bool {
        let subscription = {
            let mut run = self.lock_run();
            if run.active != Some(generation) {
                return false;
            }
            run.active = None;
            run.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        true
    }

    fn finish_executing(&self) {
        self.executing.set_value(false);
        self.executing.clear();
    }

    fn pulse_completed(&self) {
        self.completed.set_value(());
        self.completed.clear();
    }

    fn one_shot_observer(self: &Arc<Self>, generation: u64) -> Observer<O> {
        let (on_next, on_error, on_complete) = (
            Arc::downgrade(self),
            Arc::downgrade(self),
            Arc::downgrade(self),
        );
        Observer::new(move |value: O| {
            if let Some(inner) = on_next.upgrade() {
                if inner.is_current(generation) {
                    inner.output.set_value(value);
                }
            }
        })
        .on_error(move |err| {
            if let Some(inner) = on_error.upgrade() {
                if inner.end_run(generation) {
                    tracing::debug!(generation, %err, "action run failed");
                    inner.error.set_value(err);
                    inner.finish_executing();
                }
            }
        })
        .on_complete(move || {
            if let Some(inner) = on_complete.upgrade() {
                if inner.end_run(generation) {
                    tracing::debug!(generation, "action run completed");
                    inner.finish_executing();
                    inner.pulse_completed();
                }
            }
        })
    }

    fn on_trigger(self: &Arc<Self>, make_source: impl FnOnce() -> SharedSource<O>) {
        let (generation, superseded) = {
            let mut run = self.lock_run();
            if run.destroyed {
                return;
            }
            run.generation += 1;
            run.active = Some(run.generation);
            (run.generation, run.subscription.take())
        };
        if let Some(superseded) = superseded {
            tracing::trace!(generation, "superseding in-flight run");
            superseded.dispose();
        }

        self.error.clear();
        self.executing.set_value(true);

        let (on_next, on_error, on_complete) = (
            Arc::downgrade(self),
            Arc::downgrade(self),
            Arc::downgrade(self),
        );
        let observer = Observer::new(move |value: O| {
            if let Some(inner) = on_next.upgrade() {
                if inner.is_current(generation) {
                    if inner.executing.get() == Some(true) {
                        inner.executing.set_value(false);
                    }
                    inner.output.set_value(value);
                }
            }
        })
        .on_error(move |err| {
            if let Some(inner) = on_error.upgrade() {
                if inner.end_run(generation) {
                    tracing::debug!(generation, %err, "triggered run failed");
                    inner.error.set_value(err);
                    if inner.executing.get() == Some(true) {
                        inner.executing.set_value(false);
                    }
                }
            }
        })
        .on_complete(move || {
            if let Some(inner) = on_complete.upgrade() {
                if inner.end_run(generation) && inner.executing.get() == Some(true) {
                    inner.executing.set_value(false);
                }
            }
        });

        let source = make_source().observe_on(self.delivery());
        let subscription = source.subscribe(observer);
        self.store_run(generation, subscription);
    }

    fn observer_changed(&self, added: bool) {
        if added {
            self.observers.fetch_add(1, Ordering::AcqRel);
            return;
        }
        let previous = self.observers.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 && matches!(self.mode, Mode::OneShot(_)) {
            self.abandon();
        }
    }

    /// The last observer left. Drop an in-flight one-shot run so nothing
    /// stays subscribed on behalf of a scope that is gone.
    fn abandon(&self) {
        let in_flight = {
            let mut run = self.lock_run();
            run.active.take().map(|_| run.subscription.take())
        };
        match in_flight {
            Some(subscription) => {
                if let Some(subscription) = subscription {
                    subscription.dispose();
                }
                tracing::debug!("abandoning in-flight run: no observers left");
                self.finish_executing();
                self.pulse_completed();
            }
            None => self.completed.clear(),
        }
    }

    fn destroy(&self, reason: &'static str) {
        let (trigger, subscription, cleanup) = {
            let mut run = self.lock_run();
            if run.destroyed {
                return;
            }
            run.destroyed = true;
            run.active = None;
            (
                run.trigger.take(),
                run.subscription.take(),
                run.owner_cleanup.take(),
            )
        };
        if let Some(trigger) = trigger {
            trigger.dispose();
        }
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        if self.executing.get() == Some(true) {
            self.finish_executing();
        }
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        tracing::debug!(reason, "action destroyed");
    }
}

impl<I, O> fmt::Debug for Action<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.inner.run.lock().unwrap_or_else(PoisonError::into_inner);
        let mode = match self.inner.mode {
            Mode::OneShot(_) => "one-shot",
            Mode::Triggered => "triggered",
        };
        f.debug_struct("Action")
            .field("mode", &mode)
            .field("generation", &run.generation)
            .field("active", &run.active.is_some())
            .field("destroyed", &run.destroyed)
            .finish()
    }
}

type OptionCallback<V> = Box<dyn Fn(Option<&V>) + Send + Sync>;

/// Callbacks for [`Action::observe`]. Unset callbacks are no-ops.
pub struct ActionCallbacks<O> {
    on_executing: Box<dyn Fn(Option<bool>) + Send + Sync>,
    on_output: OptionCallback<O>,
    on_error: OptionCallback<Error>,
    on_completed: Box<dyn Fn() + Send + Sync>,
}

impl<O> Default for ActionCallbacks<O> {
    fn default() -> Self {
        Self {
            on_executing: Box::new(|_| {}),
            on_output: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            on_completed: Box::new(|| {}),
        }
    }
}

impl<O> ActionCallbacks<O> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(true)` when a run starts, `Some(false)` when it ends, then `None`.
    #[must_use]
    pub fn on_executing(mut self, f: impl Fn(Option<bool>) + Send + Sync + 'static) -> Self {
        self.on_executing = Box::new(f);
        self
    }

    #[must_use]
    pub fn on_output(mut self, f: impl Fn(Option<&O>) + Send + Sync + 'static) -> Self {
        self.on_output = Box::new(f);
        self
    }

    /// `Some` on failure, `None` when a later run clears it.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(Option<&Error>) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }

    /// Once per successful one-shot run.
    #[must_use]
    pub fn on_completed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_completed = Box::new(f);
        self
    }
}

impl<O> fmt::Debug for ActionCallbacks<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCallbacks").finish_non_exhaustive()
    }
}
