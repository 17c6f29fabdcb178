#![forbid(unsafe_code)]

//! [`Driver<T>`]: a source that is safe to bind.
//!
//! A driver pairs an optional upstream source with a default value. Its
//! *guarded* view is what bindings subscribe to: every signal arrives on one
//! delivery context, and an upstream failure is replaced by a single emission
//! of the default followed by completion. Its *raw* view is the upstream
//! untouched, for composing further operators before wrapping the result in a
//! new driver.
//!
//! ```ignore
//! let query = Subject::new();
//! let results = query
//!     .clone()
//!     .map(|q: String| q.len())
//!     .into_driver(0)
//!     .deliver_on(DeliveryContext::immediate());
//! ```
//!
//! # Invariants
//!
//! 1. The guarded view never signals an error.
//! 2. The guarded view never signals off its delivery context.
//! 3. A driver without a source emits its default once, then completes.
//! 4. A present source is always used, whatever the default value is.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Upstream error | Background work failed | One `default_value` emission, then completion |
//! | No delivery context installed | Host never called `install_default` | Falls back to [`main_queue`](tether_core::main_queue) |

use std::fmt;
use std::sync::Arc;

use tether_core::{
    DeliveryContext, Observer, SharedSource, Source, SourceExt, Subscription, Value, just,
};

/// Optional source plus a default, consumed through a guarded view.
pub struct Driver<T> {
    source: Option<SharedSource<T>>,
    default_value: T,
    delivery: Option<DeliveryContext>,
}

impl<T: Clone> Clone for Driver<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            default_value: self.default_value.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Driver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("has_source", &self.source.is_some())
            .field("default_value", &self.default_value)
            .field("delivery", &self.delivery)
            .finish()
    }
}

impl<T: Value> Driver<T> {
    /// Driver over `source`, substituting `default_value` for failures.
    pub fn new(source: impl Source<T> + 'static, default_value: T) -> Self {
        Self::from_parts(Some(source.boxed()), default_value)
    }

    /// Degenerate driver: emits `value` once and completes.
    pub fn just(value: T) -> Self {
        Self::from_parts(None, value)
    }

    /// Driver from an optional, already erased source.
    pub fn from_parts(source: Option<SharedSource<T>>, default_value: T) -> Self {
        Self {
            source,
            default_value,
            delivery: None,
        }
    }

    /// Pin the guarded view to `ctx` instead of the process default.
    #[must_use]
    pub fn deliver_on(mut self, ctx: DeliveryContext) -> Self {
        self.delivery = Some(ctx);
        self
    }

    /// The value substituted for failures, and emitted alone when there is no
    /// source.
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// The context the guarded view delivers on.
    #[must_use]
    pub fn delivery(&self) -> DeliveryContext {
        self.delivery.clone().unwrap_or_else(DeliveryContext::current)
    }

    /// Upstream signals unchanged: no delivery context, failures pass through.
    #[must_use]
    pub fn raw(&self) -> SharedSource<T> {
        match &self.source {
            Some(source) => Arc::clone(source),
            None => just(self.default_value.clone()).boxed(),
        }
    }

    /// Delivery-affine, failure-free view.
    #[must_use]
    pub fn guarded(&self) -> SharedSource<T> {
        let ctx = self.delivery();
        match &self.source {
            Some(source) => Arc::clone(source)
                .on_error_return(self.default_value.clone())
                .observe_on(ctx)
                .boxed(),
            None => just(self.default_value.clone()).observe_on(ctx).boxed(),
        }
    }

    /// Driver over a transformed raw view, keeping this driver's delivery
    /// context.
    pub fn map<U: Value>(
        self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
        default_value: U,
    ) -> Driver<U> {
        let mut mapped = Driver::new(self.raw().map(f), default_value);
        mapped.delivery = self.delivery;
        mapped
    }
}

impl<T: Value + Default> Default for Driver<T> {
    fn default() -> Self {
        Self::just(T::default())
    }
}

impl<T: Value> Source<T> for Driver<T> {
    /// Subscribes to the guarded view.
    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.guarded().subscribe(observer)
    }
}

/// Wrap any source in a [`Driver`].
pub trait DriverExt<T: Value>: Source<T> + Sized + 'static {
    fn into_driver(self, default_value: T) -> Driver<T> {
        Driver::new(self, default_value)
    }

    /// [`into_driver`](Self::into_driver) with `T::default()` as the fallback.
    fn into_driver_or_default(self) -> Driver<T>
    where
        T: Default,
    {
        Driver::new(self, T::default())
    }
}

impl<T: Value, S: Source<T> + 'static> DriverExt<T> for S {}
