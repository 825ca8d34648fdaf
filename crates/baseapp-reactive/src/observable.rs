#![forbid(unsafe_code)]

//! Multi-listener observable value with owner-scoped registrations.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). Every assignment notifies all registered
//! listeners in registration order, synchronously, on the calling thread.
//!
//! Listeners are registered either under an explicit [`OwnerId`] (removed in
//! bulk with [`Observable::unbind`]) or through [`Observable::subscribe`],
//! which hands back a [`Subscription`] guard that removes its entry on drop.
//! There are no weak owners: an entry stays registered until its owner
//! unbinds or its guard is dropped.
//!
//! # Performance
//!
//! | Operation     | Complexity                 |
//! |---------------|----------------------------|
//! | `get()`       | O(1) + clone               |
//! | `set()`       | O(L) where L = listeners   |
//! | `bind()`      | O(1) amortized             |
//! | `unbind()`    | O(L)                       |
//!
//! # Failure Modes
//!
//! - **Panicking listener**: the panic is not caught. It unwinds out of
//!   `set()` and the remaining listeners of that assignment are not invoked.
//! - **Re-entrant set**: calling `set()` from inside a listener is allowed; no
//!   borrow is held while listeners run. The nested assignment runs its own
//!   full notification pass before the outer pass resumes.
//! - **Unbind during notification**: a listener removed while a notification
//!   pass is running is not invoked later in that pass.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

type ListenerRc<T> = Rc<dyn Fn(&T)>;

/// Identity token for a party that registers listeners.
///
/// Owners are compared by identity: two tokens are equal only if one is a
/// copy of the other. Allocate one per view (or other listening object) and
/// unbind it on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a fresh, process-unique owner identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric identity, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

struct Entry<T> {
    key: u64,
    owner: OwnerId,
    listener: ListenerRc<T>,
}

/// Shared interior for [`Observable<T>`].
struct ObservableInner<T> {
    value: T,
    version: u64,
    next_key: u64,
    /// Registration table in bind order.
    entries: Vec<Entry<T>>,
}

impl<T> ObservableInner<T> {
    fn push(&mut self, owner: OwnerId, listener: ListenerRc<T>) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.push(Entry {
            key,
            owner,
            listener,
        });
        key
    }

    fn contains_key(&self, key: u64) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }
}

/// A shared value with multi-listener change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** inner state.
///
/// # Invariants
///
/// 1. Every `set()` invokes each listener registered at the start of the
///    pass exactly once, in registration order.
/// 2. `version` increments by exactly 1 per assignment.
/// 3. `unbind(owner)` removes exactly the entries registered under `owner`.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

// Manual Clone: shares the same Rc.
impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("listener_count", &inner.entries.len())
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                next_key: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Store a new value and notify every registered listener with it.
    ///
    /// Notification happens even when the new value equals the old one.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Modify the value in place, then notify listeners.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut inner = self.inner.borrow_mut();
            f(&mut inner.value);
            inner.version += 1;
        }
        self.notify();
    }

    /// Register `listener` under `owner`.
    ///
    /// The same owner may register any number of listeners; they are not
    /// deduplicated.
    pub fn bind(&self, owner: OwnerId, listener: impl Fn(&T) + 'static) {
        self.inner.borrow_mut().push(owner, Rc::new(listener));
        #[cfg(feature = "tracing")]
        tracing::trace!(owner = owner.get(), "observable listener bound");
    }

    /// Register `listener` under `owner`, then invoke it once with the
    /// current value before returning.
    pub fn bind_and_fire(&self, owner: OwnerId, listener: impl Fn(&T) + 'static) {
        let listener: ListenerRc<T> = Rc::new(listener);
        let value = {
            let mut inner = self.inner.borrow_mut();
            inner.push(owner, Rc::clone(&listener));
            inner.value.clone()
        };
        listener(&value);
    }

    /// Remove every listener registered under `owner`.
    ///
    /// Returns the number of entries removed.
    pub fn unbind(&self, owner: OwnerId) -> usize {
        let mut inner = self.inner.borrow_mut();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.owner != owner);
        let removed = before - inner.entries.len();
        #[cfg(feature = "tracing")]
        tracing::trace!(owner = owner.get(), removed, "observable owner unbound");
        removed
    }

    /// Register an anonymous listener whose lifetime is tied to the returned
    /// guard.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let key = self.inner.borrow_mut().push(OwnerId::next(), Rc::new(listener));
        let weak = Rc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().entries.retain(|e| e.key != key);
                }
            })),
        }
    }

    /// True if at least one listener is registered under `owner`.
    #[must_use]
    pub fn is_bound(&self, owner: OwnerId) -> bool {
        self.inner.borrow().entries.iter().any(|e| e.owner == owner)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Number of assignments since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// A read-and-listen handle that cannot assign.
    #[must_use]
    pub fn interface(&self) -> ObservableInterface<T> {
        ObservableInterface { cell: self.clone() }
    }

    fn notify(&self) {
        // Snapshot so no borrow is held while listeners run.
        let (value, listeners): (T, Vec<(u64, ListenerRc<T>)>) = {
            let inner = self.inner.borrow();
            (
                inner.value.clone(),
                inner
                    .entries
                    .iter()
                    .map(|e| (e.key, Rc::clone(&e.listener)))
                    .collect(),
            )
        };

        for (key, listener) in &listeners {
            if !self.inner.borrow().contains_key(*key) {
                continue;
            }
            listener(&value);
        }
    }
}

/// Read-and-listen view of an [`Observable`], handed to presentation code.
pub struct ObservableInterface<T> {
    cell: Observable<T>,
}

impl<T> Clone for ObservableInterface<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableInterface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservableInterface").field(&self.cell).finish()
    }
}

impl<T: Clone + 'static> ObservableInterface<T> {
    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    /// See [`Observable::bind`].
    pub fn bind(&self, owner: OwnerId, listener: impl Fn(&T) + 'static) {
        self.cell.bind(owner, listener);
    }

    /// See [`Observable::bind_and_fire`].
    pub fn bind_and_fire(&self, owner: OwnerId, listener: impl Fn(&T) + 'static) {
        self.cell.bind_and_fire(owner, listener);
    }

    /// See [`Observable::unbind`].
    pub fn unbind(&self, owner: OwnerId) -> usize {
        self.cell.unbind(owner)
    }

    /// See [`Observable::subscribe`].
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        self.cell.subscribe(listener)
    }

    /// See [`Observable::version`].
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cell.version()
    }
}

/// RAII guard for a listener registered with [`Observable::subscribe`].
///
/// Dropping the guard removes the listener from the registration table
/// immediately. If the observable is already gone, dropping is a no-op.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
