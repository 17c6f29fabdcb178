#![forbid(unsafe_code)]

//! Scoped owners: entities with an observable lifecycle.
//!
//! Bindings attach to a [`LifecycleOwner`] and tear themselves down when it
//! reaches [`LifecycleState::Destroyed`]. The core never creates or destroys an
//! owner; it only registers transition handlers on one.
//!
//! [`LifecycleRegistry`] is the stock owner implementation. Hosts drive it with
//! [`handle_event`](LifecycleRegistry::handle_event) or
//! [`move_to`](LifecycleRegistry::move_to).
//!
//! # Invariants
//!
//! 1. `Destroy` is dispatched at most once and is terminal. Events after it are
//!    ignored.
//! 2. After `Destroy` has been dispatched every handler is released.
//! 3. Handlers run outside the registry lock, in registration order, from a
//!    snapshot. A handler removed during dispatch is not called afterwards.
//! 4. Registering a handler on a destroyed owner calls it with `Destroy`
//!    immediately and yields an inert token.
//! 5. Dropping a registry that was never destroyed destroys it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Where an owner is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl LifecycleState {
    /// Position on the create/start/resume ladder. `Paused` sits with
    /// `Started`, `Stopped` with `Created`, and `Destroyed` below everything.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Destroyed => 0,
            Self::Created | Self::Stopped => 1,
            Self::Started | Self::Paused => 2,
            Self::Resumed => 3,
        }
    }

    /// Whether the owner is at least started (started, resumed, or paused).
    #[must_use]
    pub fn is_at_least_started(self) -> bool {
        self.level() >= 2
    }

    #[must_use]
    pub fn is_destroyed(self) -> bool {
        self == Self::Destroyed
    }
}

/// Transition notification delivered to handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
}

impl LifecycleEvent {
    /// The state an owner is in after this event.
    #[must_use]
    pub fn target(self) -> LifecycleState {
        match self {
            Self::Create => LifecycleState::Created,
            Self::Start => LifecycleState::Started,
            Self::Resume => LifecycleState::Resumed,
            Self::Pause => LifecycleState::Paused,
            Self::Stop => LifecycleState::Stopped,
            Self::Destroy => LifecycleState::Destroyed,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Callback invoked on every transition.
pub type TransitionHandler = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Identifies a registered handler for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransitionToken(u64);

impl TransitionToken {
    /// Token that refers to no handler. Removing it is a no-op.
    pub const INERT: Self = Self(u64::MAX);

    #[must_use]
    pub fn is_inert(self) -> bool {
        self == Self::INERT
    }
}

/// An entity with an observable lifecycle.
pub trait LifecycleOwner: Send + Sync {
    /// Current state.
    fn lifecycle_state(&self) -> LifecycleState;

    /// Register `handler` for every future transition.
    fn on_transition(&self, handler: TransitionHandler) -> TransitionToken;

    /// Unregister a handler. Unknown or already removed tokens are ignored.
    fn remove_transition(&self, token: TransitionToken);

    fn is_destroyed(&self) -> bool {
        self.lifecycle_state().is_destroyed()
    }
}

struct RegistryState {
    state: LifecycleState,
    handlers: Vec<(u64, TransitionHandler)>,
    next_id: u64,
}

/// Stock [`LifecycleOwner`] driven by its host.
pub struct LifecycleRegistry {
    inner: Mutex<RegistryState>,
}

impl LifecycleRegistry {
    /// Registry in [`LifecycleState::Created`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(LifecycleState::Created)
    }

    /// Registry that is already resumed: the shape of a view-model scope that
    /// is live from construction until it is cleared.
    #[must_use]
    pub fn resumed() -> Self {
        Self::with_state(LifecycleState::Resumed)
    }

    fn with_state(state: LifecycleState) -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                state,
                handlers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Apply `event` and dispatch it. Returns `false` if the owner was already
    /// destroyed and the event was ignored.
    pub fn handle_event(&self, event: LifecycleEvent) -> bool {
        let snapshot = {
            let mut inner = self.lock();
            if inner.state.is_destroyed() {
                return false;
            }
            inner.state = event.target();
            if event == LifecycleEvent::Destroy {
                std::mem::take(&mut inner.handlers)
            } else {
                inner.handlers.clone()
            }
        };

        tracing::trace!(%event, handlers = snapshot.len(), "lifecycle transition");

        let destroying = event == LifecycleEvent::Destroy;
        for (id, handler) in snapshot {
            // Handlers may remove each other mid-dispatch.
            if !destroying && !self.is_registered(id) {
                continue;
            }
            handler(event);
        }
        true
    }

    /// Walk the ladder to `target`, dispatching each intermediate event.
    ///
    /// States on the same level (`Started`/`Paused`, `Created`/`Stopped`) are
    /// treated as equivalent.
    pub fn move_to(&self, target: LifecycleState) {
        while let Some(event) = next_event(self.lifecycle_state(), target) {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    /// Shorthand for `move_to(Destroyed)`.
    pub fn destroy(&self) {
        self.move_to(LifecycleState::Destroyed);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.lock().handlers.iter().any(|(i, _)| *i == id)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_event(current: LifecycleState, target: LifecycleState) -> Option<LifecycleEvent> {
    if current.is_destroyed() || current == target {
        return None;
    }
    if target.is_destroyed() {
        return Some(match current.level() {
            3 => LifecycleEvent::Pause,
            2 => LifecycleEvent::Stop,
            _ => LifecycleEvent::Destroy,
        });
    }
    let (from, to) = (current.level(), target.level());
    if to > from {
        Some(if from == 1 {
            LifecycleEvent::Start
        } else {
            LifecycleEvent::Resume
        })
    } else if to < from {
        Some(if from == 3 {
            LifecycleEvent::Pause
        } else {
            LifecycleEvent::Stop
        })
    } else {
        None
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleOwner for LifecycleRegistry {
    fn lifecycle_state(&self) -> LifecycleState {
        self.lock().state
    }

    fn on_transition(&self, handler: TransitionHandler) -> TransitionToken {
        let mut inner = self.lock();
        if inner.state.is_destroyed() {
            drop(inner);
            handler(LifecycleEvent::Destroy);
            return TransitionToken::INERT;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, handler));
        TransitionToken(id)
    }

    fn remove_transition(&self, token: TransitionToken) {
        if token.is_inert() {
            return;
        }
        self.lock().handlers.retain(|(id, _)| *id != token.0);
    }
}

impl Drop for LifecycleRegistry {
    fn drop(&mut self) {
        if !self.lifecycle_state().is_destroyed() {
            self.destroy();
        }
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("LifecycleRegistry")
            .field("state", &inner.state)
            .field("handlers", &inner.handlers.len())
            .finish()
    }
}
