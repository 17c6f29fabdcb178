#![forbid(unsafe_code)]

//! Per-binding controller: one source piped into one sink for the lifetime of
//! one owner.
//!
//! A binder registers a transition handler on its owner and subscribes
//! immediately. Every delivered value is written to the sink on whatever
//! context it arrives on, which is the driver's delivery context when the
//! source is a [`Driver`](crate::Driver).
//!
//! | Owner event      | `Retain` (default)          | `Release`              |
//! |------------------|-----------------------------|------------------------|
//! | `Start`/`Resume` | subscribe if not subscribed | same                   |
//! | `Pause`/`Stop`   | nothing                     | drop the subscription  |
//! | `Destroy`        | tear down                   | tear down              |
//!
//! Source completion and source failure tear down exactly like `Destroy`.
//!
//! # Invariants
//!
//! 1. At most one live subscription. It is present only between subscribe and
//!    release/teardown.
//! 2. After teardown the binder never subscribes again.
//! 3. Teardown runs once: the subscription is disposed, the destroyed hook
//!    fires, and the owner handler is removed. Repeated teardown is a no-op.
//! 4. Signals from a released subscription (an older epoch) are ignored.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Owner dropped before attach | Owner's last `Arc` gone | Immediate teardown |
//! | Owner already destroyed | Bound too late | Handler fires `Destroy` at once; teardown |
//! | Source completes inside `subscribe` | Immediate source | Teardown; the returned handle is disposed |

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tether_core::{
    LifecycleEvent, LifecycleOwner, Observer, SharedSource, Subscription, TransitionToken, Value,
};

use crate::bindable::Bindable;
use crate::config::{BinderConfig, PausePolicy};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique binding identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    fn next() -> Self {
        Self(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

pub(crate) type DestroyedHook = Box<dyn FnOnce(BindingId) + Send>;

/// Type-erased view of a binder, as held by the manager.
pub(crate) trait ManagedBinding: Send + Sync {
    fn id(&self) -> BindingId;
    fn is_destroyed(&self) -> bool;
    fn is_subscribed(&self) -> bool;
    /// Explicit teardown.
    fn dispose(&self);
    /// Install the one-shot destroyed hook. Fires at once if already torn
    /// down.
    fn set_on_destroyed(&self, hook: DestroyedHook);
}

#[derive(Default)]
struct BinderState {
    subscription: Option<Subscription>,
    /// Epoch of the live subscription, if any.
    active: Option<u64>,
    epoch: u64,
    token: Option<TransitionToken>,
    destroyed: bool,
}

pub(crate) struct Binder<T, O: ?Sized> {
    id: BindingId,
    this: Weak<Self>,
    owner: Weak<O>,
    sink: Arc<dyn Bindable<T>>,
    source: SharedSource<T>,
    policy: PausePolicy,
    state: Mutex<BinderState>,
    on_destroyed: Mutex<Option<DestroyedHook>>,
}

impl<T, O> Binder<T, O>
where
    T: Value,
    O: LifecycleOwner + ?Sized + 'static,
{
    /// Build a detached binder. Nothing happens until [`attach`](Self::attach).
    pub(crate) fn new(
        owner: &Arc<O>,
        sink: Arc<dyn Bindable<T>>,
        source: SharedSource<T>,
        config: BinderConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: BindingId::next(),
            this: this.clone(),
            owner: Arc::downgrade(owner),
            sink,
            source,
            policy: config.pause_policy,
            state: Mutex::new(BinderState::default()),
            on_destroyed: Mutex::new(None),
        })
    }

    /// Register with the owner, then subscribe.
    pub(crate) fn attach(&self) {
        let Some(owner) = self.owner.upgrade() else {
            self.teardown("owner dropped");
            return;
        };

        let this = self.this.clone();
        let token = owner.on_transition(Arc::new(move |event| {
            if let Some(binder) = this.upgrade() {
                binder.on_event(event);
            }
        }));

        {
            let mut state = self.lock();
            if !state.destroyed {
                state.token = Some(token);
            } else {
                drop(state);
                owner.remove_transition(token);
                return;
            }
        }

        tracing::debug!(
            binding_id = self.id.get(),
            owner_state = ?owner.lifecycle_state(),
            policy = %self.policy,
            "binding attached"
        );
        self.subscribe();
    }

    fn on_event(&self, event: LifecycleEvent) {
        tracing::trace!(binding_id = self.id.get(), %event, "binding saw transition");
        match event {
            LifecycleEvent::Start | LifecycleEvent::Resume => self.subscribe(),
            LifecycleEvent::Pause | LifecycleEvent::Stop => {
                if self.policy == PausePolicy::Release {
                    self.release();
                }
            }
            LifecycleEvent::Destroy => self.teardown("owner destroyed"),
            LifecycleEvent::Create => {}
        }
    }

    fn subscribe(&self) {
        let epoch = {
            let mut state = self.lock();
            if state.destroyed || state.active.is_some() {
                return;
            }
            state.epoch += 1;
            state.active = Some(state.epoch);
            state.epoch
        };

        let (on_next, on_error, on_complete) =
            (self.this.clone(), self.this.clone(), self.this.clone());
        let observer = Observer::new(move |value: T| {
            if let Some(binder) = on_next.upgrade() {
                if binder.is_current(epoch) {
                    binder.sink.set_bind_value(value);
                }
            }
        })
        .on_error(move |err| {
            if let Some(binder) = on_error.upgrade() {
                tracing::debug!(binding_id = binder.id.get(), %err, "bound source failed");
                binder.terminated(epoch, "source failed");
            }
        })
        .on_complete(move || {
            if let Some(binder) = on_complete.upgrade() {
                binder.terminated(epoch, "source completed");
            }
        });

        let subscription = self.source.subscribe(observer);

        let mut state = self.lock();
        if state.active == Some(epoch) && !state.destroyed {
            state.subscription = Some(subscription);
            drop(state);
            tracing::trace!(binding_id = self.id.get(), epoch, "binding subscribed");
        } else {
            drop(state);
            subscription.dispose();
        }
    }

    /// Drop the live subscription without tearing down.
    fn release(&self) {
        let subscription = {
            let mut state = self.lock();
            state.active = None;
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.dispose();
            tracing::trace!(binding_id = self.id.get(), "binding released on pause");
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        let state = self.lock();
        !state.destroyed && state.active == Some(epoch)
    }

    fn terminated(&self, epoch: u64, reason: &'static str) {
        if self.is_current(epoch) {
            self.teardown(reason);
        }
    }

    fn teardown(&self, reason: &'static str) {
        let (subscription, token) = {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.active = None;
            (state.subscription.take(), state.token.take())
        };

        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        tracing::debug!(binding_id = self.id.get(), reason, "binding torn down");

        let hook = self
            .on_destroyed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook(self.id);
        }

        if let (Some(token), Some(owner)) = (token, self.owner.upgrade()) {
            owner.remove_transition(token);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BinderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, O> ManagedBinding for Binder<T, O>
where
    T: Value,
    O: LifecycleOwner + ?Sized + 'static,
{
    fn id(&self) -> BindingId {
        self.id
    }

    fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    fn dispose(&self) {
        self.teardown("unbound");
    }

    fn set_on_destroyed(&self, hook: DestroyedHook) {
        if self.is_destroyed() {
            hook(self.id);
            return;
        }
        *self
            .on_destroyed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
        // Teardown may have raced the install.
        if self.is_destroyed() {
            let hook = self
                .on_destroyed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(hook) = hook {
                hook(self.id);
            }
        }
    }
}

impl<T, O: ?Sized> fmt::Debug for Binder<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Binder")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("subscribed", &state.subscription.is_some())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tether_core::{
        DeliveryContext, LifecycleRegistry, LifecycleState, Observable, SourceExt, Subject,
    };
    use tracing_test::traced_test;

    use crate::driver::Driver;

    fn binder_over(
        owner: &Arc<LifecycleRegistry>,
        subject: &Subject<i32>,
        sink: &Observable<i32>,
        policy: PausePolicy,
    ) -> Arc<Binder<i32, LifecycleRegistry>> {
        let driver = Driver::new(subject.clone(), -1).deliver_on(DeliveryContext::immediate());
        Binder::new(
            owner,
            Arc::new(sink.clone()),
            driver.boxed(),
            BinderConfig::new().pause_policy(policy),
        )
    }

    fn counting_hook(binder: &Arc<Binder<i32, LifecycleRegistry>>) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        binder.set_on_destroyed(Box::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        fired
    }

    #[test]
    fn pipes_values_into_sink() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();

        subject.emit(3);
        subject.emit(4);
        assert_eq!(sink.get(), 4);
        assert!(binder.is_subscribed());
        assert_eq!(owner.handler_count(), 1);
    }

    #[test]
    fn owner_destroy_tears_down_once() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        let fired = counting_hook(&binder);
        binder.attach();

        owner.destroy();
        binder.dispose();
        owner.destroy();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(binder.is_destroyed());
        assert_eq!(subject.observer_count(), 0);
        assert_eq!(owner.handler_count(), 0);

        subject.emit(9);
        assert_eq!(sink.get(), 0);
    }

    #[test]
    fn retain_keeps_subscription_through_pause() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();

        owner.move_to(LifecycleState::Stopped);
        subject.emit(5);
        assert_eq!(sink.get(), 5);
        assert_eq!(subject.observer_count(), 1);
    }

    #[test]
    fn release_drops_and_resubscribes() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Release);
        binder.attach();

        owner.move_to(LifecycleState::Stopped);
        assert!(!binder.is_subscribed());
        assert_eq!(subject.observer_count(), 0);
        subject.emit(5);
        assert_eq!(sink.get(), 0);

        owner.move_to(LifecycleState::Resumed);
        assert!(binder.is_subscribed());
        assert_eq!(subject.observer_count(), 1);
        subject.emit(6);
        assert_eq!(sink.get(), 6);
    }

    #[test]
    fn completion_tears_down_and_unregisters() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        let fired = counting_hook(&binder);
        binder.attach();

        subject.complete();
        assert!(binder.is_destroyed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(owner.handler_count(), 0);

        owner.move_to(LifecycleState::Started);
        assert!(!binder.is_subscribed());
    }

    #[test]
    fn failure_writes_default_then_tears_down() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();

        subject.fail(tether_core::Error::msg("lost"));
        assert_eq!(sink.get(), -1);
        assert!(binder.is_destroyed());
    }

    #[test]
    fn immediate_source_finishes_inside_attach() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let sink = Observable::new(String::new());
        let driver = Driver::just("ready".to_string()).deliver_on(DeliveryContext::immediate());
        let binder = Binder::new(
            &owner,
            Arc::new(sink.clone()),
            driver.boxed(),
            BinderConfig::default(),
        );
        binder.attach();

        assert_eq!(sink.get(), "ready");
        assert!(binder.is_destroyed());
        assert!(!binder.is_subscribed());
        assert_eq!(owner.handler_count(), 0);
    }

    #[test]
    fn attach_to_destroyed_owner_never_subscribes() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        owner.destroy();
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();

        assert!(binder.is_destroyed());
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn hook_installed_after_teardown_fires_immediately() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();
        binder.dispose();

        let fired = counting_hook(&binder);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn teardown_is_logged_with_reason() {
        let owner = Arc::new(LifecycleRegistry::resumed());
        let subject = Subject::new();
        let sink = Observable::new(0);
        let binder = binder_over(&owner, &subject, &sink, PausePolicy::Retain);
        binder.attach();
        owner.destroy();

        assert!(logs_contain("binding torn down"));
        assert!(logs_contain("owner destroyed"));
    }
}
