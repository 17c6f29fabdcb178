#![forbid(unsafe_code)]

//! [`Channel<T>`]: an observable tri-state slot.
//!
//! An action reports progress through four channels. A channel starts
//! [`Unset`](Tristate::Unset); writing it notifies every observer, even when the
//! value is unchanged, since a repeated `executing = false` or a second
//! identical output is still an event.
//!
//! Observers attach either for the lifetime of an owner ([`Channel::observe`])
//! or until a [`Subscription`] is dropped ([`Channel::observe_forever`]). A new
//! observer immediately receives the current value unless the slot has never
//! been written. That replay always precedes any write racing the
//! registration, and an owner-scoped observer's handler leaves its owner when
//! the channel is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tether_core::{
    LifecycleEvent, LifecycleOwner, Observer, ReplayGate, Source, Subscription, Tristate, Value,
};

/// Receives the written slot and its version.
type Callback<T> = Arc<dyn Fn(&Tristate<T>, u64) + Send + Sync>;

/// Removes an owner-scoped observer's transition handler from its owner.
type OwnerCleanup = Box<dyn FnOnce() + Send>;

/// Called with `true` when an observer is added and `false` when one is
/// removed.
pub(crate) type ObserverHook = Arc<dyn Fn(bool) + Send + Sync>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
    cleanup: Option<OwnerCleanup>,
}

struct ChannelState<T> {
    value: Tristate<T>,
    version: u64,
    observers: Vec<Entry<T>>,
    next_id: u64,
    hook: Option<ObserverHook>,
}

impl<T> Drop for ChannelState<T> {
    fn drop(&mut self) {
        for entry in &mut self.observers {
            if let Some(cleanup) = entry.cleanup.take() {
                cleanup();
            }
        }
    }
}

/// Observable tri-state slot. Cloning shares the slot.
pub struct Channel<T> {
    state: Arc<Mutex<ChannelState<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Channel")
            .field("value", &state.value)
            .field("version", &state.version)
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl<T: Value> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> Channel<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                value: Tristate::Unset,
                version: 0,
                observers: Vec::new(),
                next_id: 0,
                hook: None,
            })),
        }
    }

    /// Current slot.
    #[must_use]
    pub fn value(&self) -> Tristate<T> {
        self.lock().value.clone()
    }

    /// Current value if set.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.lock().value.get().cloned()
    }

    /// Number of writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Observe until `owner` is destroyed. Observing through an owner that is
    /// already destroyed does nothing. If the channel goes away first, its
    /// handler is removed from `owner`.
    pub fn observe<O>(
        &self,
        owner: &Arc<O>,
        callback: impl Fn(&Tristate<T>) + Send + Sync + 'static,
    ) where
        O: LifecycleOwner + ?Sized + 'static,
    {
        if owner.is_destroyed() {
            return;
        }
        let id = self.register(callback);
        let weak = Arc::downgrade(&self.state);
        // A destroy that raced the check above fires this handler inline.
        let token = owner.on_transition(Arc::new(move |event| {
            if event == LifecycleEvent::Destroy {
                unregister(&weak, id);
            }
        }));
        if token.is_inert() {
            return;
        }

        let owner: Weak<O> = Arc::downgrade(owner);
        let cleanup: OwnerCleanup = Box::new(move || {
            if let Some(owner) = owner.upgrade() {
                owner.remove_transition(token);
            }
        });
        // A missing entry means the owner was destroyed in between and has
        // already released the handler.
        if let Some(entry) = self.lock().observers.iter_mut().find(|entry| entry.id == id) {
            entry.cleanup = Some(cleanup);
        }
    }

    /// Observe until the returned subscription is disposed or dropped.
    pub fn observe_forever(
        &self,
        callback: impl Fn(&Tristate<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.register(callback);
        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || unregister(&weak, id))
    }

    /// Write `value` and notify every observer.
    pub(crate) fn set(&self, value: Tristate<T>) {
        let (callbacks, version) = {
            let mut state = self.lock();
            state.value = value.clone();
            state.version += 1;
            let callbacks: Vec<_> = state
                .observers
                .iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect();
            (callbacks, state.version)
        };
        for callback in callbacks {
            callback(&value, version);
        }
    }

    pub(crate) fn set_value(&self, value: T) {
        self.set(Tristate::Set(value));
    }

    /// Clear a set slot. Unset and already cleared slots stay quiet.
    pub(crate) fn clear(&self) {
        if self.lock().value.is_set() {
            self.set(Tristate::Cleared);
        }
    }

    pub(crate) fn set_observer_hook(&self, hook: ObserverHook) {
        self.lock().hook = Some(hook);
    }

    /// Add an observer behind a replay gate. The current slot, if written,
    /// reaches it before any write that races the registration.
    fn register(&self, callback: impl Fn(&Tristate<T>) + Send + Sync + 'static) -> u64 {
        let gate = Arc::new(ReplayGate::new(move |slot: Tristate<T>| callback(&slot)));
        let changes = Arc::clone(&gate);
        let entry: Callback<T> = Arc::new(move |slot: &Tristate<T>, version: u64| {
            changes.offer(version, slot.clone());
        });

        let (id, current, version, hook) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.observers.push(Entry {
                id,
                callback: entry,
                cleanup: None,
            });
            (id, state.value.clone(), state.version, state.hook.clone())
        };
        if let Some(hook) = hook {
            hook(true);
        }
        let replay = current.has_been_set().then_some(current);
        gate.open(version, replay);
        id
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unregister<T>(state: &Weak<Mutex<ChannelState<T>>>, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let (removed, hook) = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = state.observers.iter().position(|entry| entry.id == id) else {
            return;
        };
        (state.observers.remove(index), state.hook.clone())
    };
    // The owner handler that led here is already gone or going.
    drop(removed);
    if let Some(hook) = hook {
        hook(false);
    }
}

/// Every written slot of a channel, cleared ones included. See
/// [`Channel::slots`].
pub struct Slots<T> {
    channel: Channel<T>,
}

impl<T: Value> Channel<T> {
    /// Source of every write, starting with the current slot if it has been
    /// written.
    #[must_use]
    pub fn slots(&self) -> Slots<T> {
        Slots {
            channel: self.clone(),
        }
    }
}

impl<T: Value> Source<Tristate<T>> for Slots<T> {
    fn subscribe(&self, observer: Observer<Tristate<T>>) -> Subscription {
        self.channel
            .observe_forever(move |slot| observer.next(slot.clone()))
    }
}

impl<T: Value> Source<T> for Channel<T> {
    /// Emits every set value, starting with the current one. Never completes.
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.observe_forever(move |slot| {
            if let Tristate::Set(value) = slot {
                observer.next(value.clone());
            }
        })
    }
}
