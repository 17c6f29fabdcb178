#![forbid(unsafe_code)]

//! Sinks: the write side of a binding.
//!
//! A [`Bindable<T>`] is a settable current-value slot. Only a binding writes to
//! it. View glue implements it for whatever it displays; [`Observable<T>`] and
//! plain closures ([`bindable_fn`]) implement it out of the box.

use std::fmt;
use std::sync::Arc;

use tether_core::{LifecycleOwner, Observable, Value};

use crate::bind_manager::{BindManager, BindingHandle};
use crate::driver::Driver;

/// A settable current-value slot.
pub trait Bindable<T>: Send + Sync {
    /// Store a value delivered by a binding.
    fn set_bind_value(&self, value: T);
}

impl<T, B: Bindable<T> + ?Sized> Bindable<T> for Arc<B> {
    fn set_bind_value(&self, value: T) {
        (**self).set_bind_value(value);
    }
}

impl<T: Value + PartialEq> Bindable<T> for Observable<T> {
    fn set_bind_value(&self, value: T) {
        self.set(value);
    }
}

/// Closure sink. See [`bindable_fn`].
#[derive(Clone)]
pub struct BindableFn<F> {
    f: F,
}

impl<F> fmt::Debug for BindableFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableFn").finish_non_exhaustive()
    }
}

impl<T, F> Bindable<T> for BindableFn<F>
where
    F: Fn(T) + Send + Sync,
{
    fn set_bind_value(&self, value: T) {
        (self.f)(value);
    }
}

/// Sink that calls `f` with every bound value.
pub fn bindable_fn<T, F>(f: F) -> BindableFn<F>
where
    F: Fn(T) + Send + Sync,
{
    BindableFn { f }
}

/// `sink.bind(..)` entry point.
pub trait BindableExt<T: Value>: Bindable<T> + Clone + 'static {
    /// Bind `driver` into this sink for the lifetime of `owner`.
    ///
    /// The binding is registered with `manager` and subscribes immediately.
    fn bind<O>(&self, manager: &BindManager, owner: &Arc<O>, driver: Driver<T>) -> BindingHandle
    where
        O: LifecycleOwner + ?Sized + 'static,
    {
        manager.bind(owner, self.clone(), driver)
    }
}

impl<T: Value, B: Bindable<T> + Clone + 'static> BindableExt<T> for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn observable_sink_stores_value() {
        let label = Observable::new(String::new());
        label.set_bind_value("hello".to_string());
        assert_eq!(label.get(), "hello");
    }

    #[test]
    fn closure_sink_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sink = bindable_fn(move |v: u32| s.lock().unwrap().push(v));
        sink.set_bind_value(1);
        sink.set_bind_value(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn arc_sink_delegates() {
        let inner = Observable::new(0);
        let shared: Arc<dyn Bindable<i32>> = Arc::new(inner.clone());
        shared.set_bind_value(9);
        assert_eq!(inner.get(), 9);
    }
}
