#![forbid(unsafe_code)]

//! Core primitives for Tether.
//!
//! This crate holds the leaf pieces the binding engine layers on:
//!
//! - [`lifecycle`]: scoped owners with ordered states and transition handlers.
//! - [`source`]: the subscribe/cancel contract ([`Source`], [`Observer`],
//!   [`Subscription`]).
//! - [`subject`]: concrete sources (hot [`Subject`], immediate `just`/`fail`).
//! - [`operators`]: composition over any source ([`SourceExt`]).
//! - [`scheduler`]: delivery contexts that pin emissions to one execution
//!   context.
//! - [`observable`]: a version-tracked value cell usable as both sink and source.
//! - [`gate`]: keeps a replay ahead of the changes that race it.
//! - [`tristate`] and [`visibility`]: small value types used by bindings.
//!
//! # Architecture
//!
//! Everything here is `Send + Sync` and built on `Arc` + `Mutex`. Callbacks are
//! always invoked outside of internal locks so a handler may re-enter the
//! object that called it (unsubscribe during emission, remove a lifecycle
//! handler during dispatch).

pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod observable;
pub mod operators;
pub mod scheduler;
pub mod source;
pub mod subject;
pub mod tristate;
pub mod visibility;

pub use error::Error;
pub use gate::ReplayGate;
pub use lifecycle::{
    LifecycleEvent, LifecycleOwner, LifecycleRegistry, LifecycleState, TransitionHandler,
    TransitionToken,
};
pub use observable::Observable;
pub use operators::SourceExt;
pub use scheduler::{DeliveryContext, DeliveryQueue, Scheduler, Task, Trampoline, main_queue};
pub use source::{Observer, SharedSource, Source, Subscription, Value};
pub use subject::{Subject, empty, fail, from_values, just, never};
pub use tristate::{Presence, Tristate};
pub use visibility::Visibility;
