//! Computed Values
//!
//! A [`Computed`] caches the result of a getter and recomputes it lazily.
//!
//! # How Computed Values Work
//!
//! The getter runs inside a tracked computation whose scheduler does not
//! recompute anything: it only notifies the computed's own readers. The
//! computation is left dirty, and the next `get()` re-runs the getter.
//!
//! ```text
//! source write ──► computed marked dirty ──► readers of computed notified
//!                                                     │
//!                  getter re-runs ◄── reader calls get()
//! ```
//!
//! A computed that nobody reads never recomputes, no matter how often its
//! sources change.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::dep::DepCell;
use super::effect::ReactiveEffect;

struct ComputedInner<T: 'static> {
    effect: ReactiveEffect<T>,
    value: RefCell<Option<T>>,
    dep: DepCell,
    setter: Option<Box<dyn Fn(T)>>,
}

/// A lazily evaluated, cached derived value.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a read-only computed value.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(getter, None)
    }

    /// Create a computed value whose `set` forwards to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(getter, Some(Box::new(setter)))
    }

    fn build<F>(getter: F, setter: Option<Box<dyn Fn(T)>>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let dep = DepCell::default();
        let notify = dep.clone();
        let effect = ReactiveEffect::with_scheduler(getter, move || notify.trigger());
        Self {
            inner: Rc::new(ComputedInner {
                effect,
                value: RefCell::new(None),
                dep,
                setter,
            }),
        }
    }

    /// Get the value, recomputing it first if a source changed.
    pub fn get(&self) -> T {
        let value = self.refresh();
        self.inner.dep.track();
        value
    }

    /// Like [`get`](Self::get), without subscribing the caller.
    pub fn get_untracked(&self) -> T {
        self.refresh()
    }

    fn refresh(&self) -> T {
        let cached = self.inner.value.borrow().clone();
        match cached {
            Some(value) if !self.inner.effect.dirty() => value,
            _ => {
                let value = self.inner.effect.run();
                self.inner.value.replace(Some(value.clone()));
                value
            }
        }
    }

    /// Forward `value` to the setter. Without a setter this does nothing.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => debug!("write to computed value without a setter ignored"),
        }
    }

    /// Whether the next `get` will re-run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.effect.dirty() || self.inner.value.borrow().is_none()
    }

    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &*self.inner.value.borrow())
            .field("dirty", &self.inner.effect.dirty())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
