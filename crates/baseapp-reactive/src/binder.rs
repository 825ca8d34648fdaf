#![forbid(unsafe_code)]

//! Single-listener value binder.
//!
//! [`Binder<T>`] is the one-slot sibling of
//! [`Observable`](crate::observable::Observable): binding a listener replaces
//! whatever was bound before. View models own the `Binder` and hand its
//! [`BinderInterface`] to the view, which can read and bind but not assign.

use std::cell::RefCell;
use std::rc::Rc;

type ListenerRc<T> = Rc<dyn Fn(&T)>;

struct BinderInner<T> {
    value: T,
    version: u64,
    listener: Option<ListenerRc<T>>,
}

/// A value cell with at most one listener.
///
/// Every `set()` invokes the bound listener (if any) synchronously with the
/// new value. Panics raised by the listener propagate to the caller of `set()`.
pub struct Binder<T> {
    inner: Rc<RefCell<BinderInner<T>>>,
}

impl<T> Clone for Binder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Binder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Binder")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("bound", &inner.listener.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Binder<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BinderInner {
                value,
                version: 0,
                listener: None,
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Store `value` and fire the bound listener with it.
    pub fn set(&self, value: T) {
        let fire = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
            inner
                .listener
                .as_ref()
                .map(|l| (Rc::clone(l), inner.value.clone()))
        };
        if let Some((listener, value)) = fire {
            listener(&value);
        }
    }

    /// Bind `listener`, replacing any previous one.
    pub fn bind(&self, listener: impl Fn(&T) + 'static) {
        self.inner.borrow_mut().listener = Some(Rc::new(listener));
    }

    /// Bind `listener`, then invoke it once with the current value.
    pub fn bind_and_fire(&self, listener: impl Fn(&T) + 'static) {
        let listener: ListenerRc<T> = Rc::new(listener);
        let value = {
            let mut inner = self.inner.borrow_mut();
            inner.listener = Some(Rc::clone(&listener));
            inner.value.clone()
        };
        listener(&value);
    }

    /// Drop the bound listener, if any.
    pub fn unbind(&self) {
        self.inner.borrow_mut().listener = None;
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.borrow().listener.is_some()
    }

    /// Number of assignments since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// A read-and-bind handle that cannot assign.
    #[must_use]
    pub fn interface(&self) -> BinderInterface<T> {
        BinderInterface { cell: self.clone() }
    }
}

/// Read-and-bind view of a [`Binder`].
pub struct BinderInterface<T> {
    cell: Binder<T>,
}

impl<T> Clone for BinderInterface<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BinderInterface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BinderInterface").field(&self.cell).finish()
    }
}

impl<T: Clone + 'static> BinderInterface<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    pub fn bind(&self, listener: impl Fn(&T) + 'static) {
        self.cell.bind(listener);
    }

    pub fn bind_and_fire(&self, listener: impl Fn(&T) + 'static) {
        self.cell.bind_and_fire(listener);
    }

    pub fn unbind(&self) {
        self.cell.unbind();
    }
}
