#![forbid(unsafe_code)]

//! Reactive value cells for BaseApp view models.
//!
//! This crate provides the change-notification primitives view models use to
//! push state to presentation code:
//!
//! - [`Binder`]: a value with a single listener slot; binding replaces the
//!   previous listener.
//! - [`Observable`]: a value with an ordered table of listeners registered
//!   under [`OwnerId`] tokens.
//! - [`Subscription`]: RAII guard that removes an anonymous listener on drop.
//!
//! # Architecture
//!
//! Both cells use `Rc<RefCell<..>>` for single-threaded shared ownership. They
//! live on the UI thread; background work reaches them only after its
//! results have been marshalled back (see `baseapp-paging`).
//!
//! # Invariants
//!
//! 1. Every assignment notifies synchronously, on the calling thread, even if
//!    the value did not change.
//! 2. Listeners are notified in registration order, exactly once per
//!    assignment.
//! 3. A listener removed mid-notification is not invoked later in that pass.
//! 4. `bind_and_fire` invokes its listener before returning.
//! 5. Listener panics are not caught.

pub mod binder;
pub mod observable;

pub use binder::{Binder, BinderInterface};
pub use observable::{Observable, ObservableInterface, OwnerId, Subscription};
