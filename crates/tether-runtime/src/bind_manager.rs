#![forbid(unsafe_code)]

//! Registry that keeps live bindings referenced until they tear down.
//!
//! Nothing else holds a binder strongly: the owner only has a weak handler and
//! the caller only gets a [`BindingHandle`]. The manager holds each binder from
//! [`bind`](BindManager::bind) until its teardown hook removes it.
//!
//! Construct one manager at startup and pass it to every bind site. Clones
//! share the same registry.
//!
//! # Invariants
//!
//! 1. Every binder produced by `bind` is registered exactly once and removed
//!    exactly once, whichever path tears it down (owner destroy, source
//!    termination, explicit unbind, [`dispose_all`](BindManager::dispose_all)).
//! 2. All registry mutations happen under one mutex.
//! 3. Teardown and binder drop never run while that mutex is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tether_core::{LifecycleOwner, SourceExt, Value};

use crate::bindable::Bindable;
use crate::binder::{Binder, BindingId, ManagedBinding};
use crate::config::BinderConfig;
use crate::driver::Driver;

/// Registry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindStats {
    /// Bindings currently registered.
    pub live: usize,
    /// Bindings ever registered.
    pub registered: u64,
    /// Bindings removed after teardown.
    pub reaped: u64,
}

#[derive(Default)]
struct Registry {
    live: HashMap<BindingId, Arc<dyn ManagedBinding>>,
    registered: u64,
    reaped: u64,
}

/// Shared registry of live bindings.
#[derive(Clone, Default)]
pub struct BindManager {
    registry: Arc<Mutex<Registry>>,
    config: BinderConfig,
}

impl BindManager {
    /// Manager whose bindings use [`BinderConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager whose bindings use `config` unless overridden per call.
    #[must_use]
    pub fn with_config(config: BinderConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    /// The config `bind` applies.
    #[must_use]
    pub fn config(&self) -> BinderConfig {
        self.config
    }

    /// Bind `driver` into `sink` for the lifetime of `owner`.
    pub fn bind<T, O>(
        &self,
        owner: &Arc<O>,
        sink: impl Bindable<T> + 'static,
        driver: Driver<T>,
    ) -> BindingHandle
    where
        T: Value,
        O: LifecycleOwner + ?Sized + 'static,
    {
        self.bind_with(owner, sink, driver, self.config)
    }

    /// [`bind`](Self::bind) with an explicit config.
    pub fn bind_with<T, O>(
        &self,
        owner: &Arc<O>,
        sink: impl Bindable<T> + 'static,
        driver: Driver<T>,
        config: BinderConfig,
    ) -> BindingHandle
    where
        T: Value,
        O: LifecycleOwner + ?Sized + 'static,
    {
        let binder = Binder::new(owner, Arc::new(sink), driver.boxed(), config);
        let managed: Arc<dyn ManagedBinding> = binder.clone();
        let handle = BindingHandle {
            id: managed.id(),
            binding: Arc::downgrade(&managed),
        };

        // Register before attaching: an immediate source tears the binder
        // down inside `attach`, and that removal must find the entry.
        self.add(managed);
        binder.attach();
        handle
    }

    fn add(&self, binding: Arc<dyn ManagedBinding>) {
        let id = binding.id();
        {
            let mut registry = self.lock();
            if binding.is_destroyed() || registry.live.contains_key(&id) {
                return;
            }
            registry.live.insert(id, Arc::clone(&binding));
            registry.registered += 1;
        }
        tracing::trace!(binding_id = id.get(), "binding registered");

        let registry = Arc::downgrade(&self.registry);
        binding.set_on_destroyed(Box::new(move |id| remove(&registry, id)));
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: BindingId) -> bool {
        self.lock().live.contains_key(&id)
    }

    #[must_use]
    pub fn stats(&self) -> BindStats {
        let registry = self.lock();
        BindStats {
            live: registry.live.len(),
            registered: registry.registered,
            reaped: registry.reaped,
        }
    }

    /// Tear down every live binding. Returns how many were torn down.
    pub fn dispose_all(&self) -> usize {
        let bindings: Vec<_> = self.lock().live.values().cloned().collect();
        let count = bindings.len();
        for binding in bindings {
            binding.dispose();
        }
        if count > 0 {
            tracing::debug!(count, "disposed all bindings");
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove(registry: &Weak<Mutex<Registry>>, id: BindingId) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let removed = {
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = registry.live.remove(&id);
        if removed.is_some() {
            registry.reaped += 1;
        }
        removed
    };
    if removed.is_some() {
        tracing::trace!(binding_id = id.get(), "binding reaped");
    }
    drop(removed);
}

impl fmt::Debug for BindManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindManager")
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish()
    }
}

/// Caller's view of one binding.
///
/// Dropping the handle does not unbind; the binding lives until its owner is
/// destroyed or its source terminates.
#[derive(Clone)]
pub struct BindingHandle {
    id: BindingId,
    binding: Weak<dyn ManagedBinding>,
}

impl BindingHandle {
    #[must_use]
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Whether the binding has not been torn down yet.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding
            .upgrade()
            .is_some_and(|binding| !binding.is_destroyed())
    }

    /// Whether the binding currently holds a live subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.binding
            .upgrade()
            .is_some_and(|binding| binding.is_subscribed())
    }

    /// Tear the binding down now. Safe to call repeatedly and after the owner
    /// has been destroyed.
    pub fn unbind(&self) {
        if let Some(binding) = self.binding.upgrade() {
            binding.dispose();
        }
    }
}

impl fmt::Debug for BindingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingHandle")
            .field("id", &self.id)
            .field("bound", &self.is_bound())
            .finish()
    }
}
