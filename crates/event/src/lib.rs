//! Event substrate: notification channels, disposable handles, observable values
//! and reactive sets.
//!
//! # Invariants
//! - Single-threaded, synchronous delivery: listeners run on the publishing thread,
//!   in subscription order, before `publish` returns.
//! - Reentrant mutation is legal: a listener may subscribe, unsubscribe, publish or
//!   mutate a reactive set while a dispatch or iteration over it is in flight.
//! - Every subscription is scoped by a handle; dropping or disposing the handle
//!   stops delivery.

pub mod channel;
pub mod disposable;
pub mod error;
pub mod observable;
pub mod set;

pub use channel::Channel;
pub use disposable::{Disposable, DisposableKey, Disposables, OnDispose, Subscription, on_dispose};
pub use error::{BoxError, EventError};
pub use observable::Observable;
pub use set::{Cursor, FilteredView, ReactiveSet};

pub fn crate_info() -> &'static str {
    "tether-event v0.1.0"
}
