//! Value boxes.
//!
//! A [`Ref`] is a single reactive cell. It owns its own dependency set,
//! allocated the first time a tracked computation reads it and released once
//! nobody reads it any more.
//!
//! [`ObjectRef`] is a ref-shaped view of one key of a reactive object; it has
//! no storage of its own.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dep::DepCell;
use super::object::Reactive;
use super::value::{Key, Value};
use crate::error::Result;

struct RefInner {
    /// The value as written, with any wrapper stripped.
    raw: RefCell<Value>,
    /// The value as read: containers come back wrapped unless shallow.
    value: RefCell<Value>,
    shallow: bool,
    dep: DepCell,
}

/// A reactive box around one [`Value`].
#[derive(Clone)]
pub struct Ref(Rc<RefInner>);

impl Ref {
    /// Create a box whose containers are read back as deep reactive
    /// wrappers.
    pub fn new(value: impl Into<Value>) -> Self {
        let raw = value.into().to_raw();
        let value = raw.to_reactive();
        Self::build(raw, value, false)
    }

    /// Create a box that stores and returns the value as given.
    pub fn shallow(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::build(value.clone(), value, true)
    }

    fn build(raw: Value, value: Value, shallow: bool) -> Self {
        Self(Rc::new(RefInner {
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            shallow,
            dep: DepCell::default(),
        }))
    }

    pub fn get(&self) -> Value {
        self.0.dep.track();
        self.0.value.borrow().clone()
    }

    pub fn get_untracked(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Store `value`; subscribers are notified only if it differs from the
    /// stored one. Returns whether it did.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let (raw, presented) = if self.0.shallow {
            (value.clone(), value)
        } else {
            let raw = value.to_raw();
            let presented = raw.to_reactive();
            (raw, presented)
        };
        if *self.0.raw.borrow() == raw {
            return false;
        }
        let previous = (
            self.0.raw.replace(raw),
            self.0.value.replace(presented),
        );
        drop(previous);
        self.0.dep.trigger();
        true
    }

    /// Replace the value with `f(current)`, untracked.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.get_untracked());
        self.set(next)
    }

    pub fn is_shallow(&self) -> bool {
        self.0.shallow
    }

    /// Number of computations currently subscribed to this box.
    pub fn subscriber_count(&self) -> usize {
        self.0.dep.subscriber_count()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.0.value.borrow())
            .field("shallow", &self.0.shallow)
            .finish()
    }
}

/// A ref that reads and writes one key of a reactive object.
#[derive(Clone, Debug)]
pub struct ObjectRef {
    target: Reactive,
    key: Key,
}

impl ObjectRef {
    pub fn get(&self) -> Value {
        self.target.get(self.key.clone())
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<bool> {
        self.target.set(self.key.clone(), value)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn target(&self) -> &Reactive {
        &self.target
    }
}

/// A ref bound to `target[key]`.
pub fn to_ref(target: &Reactive, key: impl Into<Key>) -> ObjectRef {
    ObjectRef {
        target: target.clone(),
        key: key.into(),
    }
}

/// One [`ObjectRef`] per key currently present in `target`.
///
/// The key list is read without tracking; keys added later are not
/// included.
pub fn to_refs(target: &Reactive) -> IndexMap<Key, ObjectRef> {
    target
        .raw()
        .keys()
        .into_iter()
        .map(|key| (key.clone(), to_ref(target, key)))
        .collect()
}
