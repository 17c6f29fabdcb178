#![forbid(unsafe_code)]

//! Lifecycle-scoped binding engine.
//!
//! # Role in Tether
//! `tether-runtime` turns asynchronous sources into values that view code can
//! consume safely. A producer wraps a source in a [`Driver`]; a consumer binds
//! the driver into a [`Bindable`] sink for the lifetime of a
//! [`LifecycleOwner`](tether_core::LifecycleOwner). The [`BindManager`] keeps
//! each binding alive until its owner is destroyed or its source terminates.
//! [`Action`] reports the progress of an asynchronous operation through four
//! [`Channel`]s that can themselves be bound.
//!
//! # Key components
//! - [`Driver`]: delivery-affine, failure-free view of a source.
//! - [`Bindable`] / [`BindableExt::bind`]: sinks and the bind entry point.
//! - [`BindManager`]: injectable registry of live bindings.
//! - [`BinderConfig`] / [`PausePolicy`]: what bindings do while paused.
//! - [`Action`] / [`ActionCallbacks`]: one-shot and triggered operations.
//!
//! # How it fits in the system
//! Primitives (owners, sources, subjects, delivery contexts, value types) come
//! from `tether-core`. This crate adds no threads; everything runs on the
//! contexts the host installs.

pub mod action;
pub mod bind_manager;
pub mod bindable;
mod binder;
pub mod config;
pub mod driver;

pub use action::{Action, ActionCallbacks, Channel, Slots};
pub use bind_manager::{BindManager, BindStats, BindingHandle};
pub use bindable::{Bindable, BindableExt, BindableFn, bindable_fn};
pub use binder::BindingId;
pub use config::{BinderConfig, PAUSE_POLICY_ENV, PausePolicy};
pub use driver::{Driver, DriverExt};
