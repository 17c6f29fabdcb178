#![forbid(unsafe_code)]

//! Tether public facade.
//!
//! Re-exports the stable surface of `tether-core` and `tether-runtime`. Most
//! code only needs the [`prelude`]:
//!
//! ```
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! let manager = BindManager::new();
//! let screen = Arc::new(LifecycleRegistry::resumed());
//! let title = Subject::new();
//! let label = Observable::new(String::new());
//!
//! label.bind(
//!     &manager,
//!     &screen,
//!     title
//!         .clone()
//!         .into_driver_or_default()
//!         .deliver_on(DeliveryContext::immediate()),
//! );
//! title.emit("Inbox".to_string());
//! assert_eq!(label.get(), "Inbox");
//!
//! screen.destroy();
//! assert!(manager.is_empty());
//! ```

pub use tether_core::{
    DeliveryContext, DeliveryQueue, Error, LifecycleEvent, LifecycleOwner, LifecycleRegistry,
    LifecycleState, Observable, Observer, Presence, Scheduler, SharedSource, Source, SourceExt,
    Subject, Subscription, Tristate, Value, Visibility, main_queue,
};
pub use tether_runtime::{
    Action, ActionCallbacks, BindManager, BindStats, Bindable, BindableExt, BinderConfig,
    BindingHandle, BindingId, Channel, Driver, DriverExt, PausePolicy, bindable_fn,
};

pub mod prelude {
    //! Everything a view model and its screen need.

    pub use tether_core::{
        DeliveryContext, DeliveryQueue, Error, LifecycleOwner, LifecycleRegistry, LifecycleState,
        Observable, Source, SourceExt, Subject, Subscription, Tristate, Visibility,
    };
    pub use tether_runtime::{
        Action, ActionCallbacks, BindManager, Bindable, BindableExt, Driver, DriverExt,
        bindable_fn,
    };
}
