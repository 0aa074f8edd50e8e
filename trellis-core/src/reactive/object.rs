//! Reactive wrappers over raw containers.
//!
//! A [`Reactive`] is an observing view of a [`RawObject`]: reads through it
//! subscribe the running computation, writes through it notify subscribers.
//! Wrapping is identity-stable: wrapping the same raw object twice (while the
//! first wrapper is alive) yields the same wrapper.
//!
//! Dependency sets are keyed by the raw object's id, so a deep wrapper and a
//! shallow wrapper of the same object observe the same reads and writes.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::value::{Container, Key, ObjectId, RawObject, Value, Write};
use crate::error::{Error, Result};

pub(crate) struct ReactiveInner {
    raw: RawObject,
    shallow: bool,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        Runtime::forget_wrapper(self.raw.id(), self.shallow);
    }
}

/// Observing handle to a raw container.
#[derive(Clone)]
pub struct Reactive(Rc<ReactiveInner>);

fn wrap(raw: RawObject, shallow: bool) -> Reactive {
    let id = raw.id();
    if let Some(inner) = Runtime::cached_wrapper(id, shallow) {
        return Reactive(inner);
    }
    let inner = Rc::new(ReactiveInner { raw, shallow });
    Runtime::cache_wrapper(id, shallow, Rc::downgrade(&inner));
    Reactive(inner)
}

/// Return the deep reactive wrapper of `raw`.
///
/// Nested containers read through the wrapper come back wrapped as well.
pub fn reactive(raw: RawObject) -> Reactive {
    wrap(raw, false)
}

/// Return the shallow reactive wrapper of `raw`: only top-level keys are
/// observed and nested containers are returned as they are stored.
pub fn shallow_reactive(raw: RawObject) -> Reactive {
    wrap(raw, true)
}

pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

/// The raw container behind `value`, or the value itself if it is not a
/// wrapper.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

impl Reactive {
    pub fn raw(&self) -> &RawObject {
        &self.0.raw
    }

    pub fn id(&self) -> ObjectId {
        self.0.raw.id()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.shallow
    }

    pub fn is_sequence(&self) -> bool {
        self.0.raw.is_sequence()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn present(&self, value: Value) -> Value {
        if self.0.shallow {
            value
        } else {
            value.to_reactive()
        }
    }

    /// Read `key`, subscribing the running computation to it.
    ///
    /// Missing keys read as `Null` and are still tracked, so adding them
    /// later re-runs the reader.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let value = self.0.raw.peek(&key).unwrap_or_default();
        Runtime::track(self.id(), key);
        self.present(value)
    }

    /// Write `key`, notifying subscribers if the stored value changed.
    ///
    /// Returns whether anything changed. Wrappers are unwrapped before they
    /// are stored.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        let value = value.into().to_raw();
        let id = self.id();
        match self.0.raw.write(&key, value)? {
            Write::Unchanged => Ok(false),
            Write::Replaced(previous) => {
                drop(previous);
                Runtime::trigger(id, &key);
                Ok(true)
            }
            Write::Added => {
                Runtime::trigger(id, &key);
                Runtime::trigger(id, &Key::Iterate);
                if self.0.raw.is_sequence() {
                    Runtime::trigger(id, &Key::Length);
                }
                Ok(true)
            }
        }
    }

    /// Remove a record key. Returns the removed value, if any.
    pub fn delete(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        let removed = self.0.raw.delete(&key)?;
        if removed.is_some() {
            let id = self.id();
            Runtime::trigger(id, &key);
            Runtime::trigger(id, &Key::Iterate);
        }
        Ok(removed)
    }

    /// Whether `key` exists, tracked.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let present = self.0.raw.contains(&key);
        Runtime::track(self.id(), key);
        present
    }

    /// Keys in storage order, tracked against additions and removals.
    pub fn keys(&self) -> Vec<Key> {
        let iterate = if self.is_sequence() {
            Key::Length
        } else {
            Key::Iterate
        };
        Runtime::track(self.id(), iterate);
        self.0.raw.keys()
    }

    /// Number of entries. Sequences track their length, records their key
    /// set.
    pub fn len(&self) -> usize {
        let key = if self.is_sequence() {
            Key::Length
        } else {
            Key::Iterate
        };
        Runtime::track(self.id(), key);
        self.0.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value, each read tracked individually.
    pub fn values(&self) -> Vec<Value> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Append to a sequence. Returns the new element's index.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let index = self.0.raw.push(value.into().to_raw())?;
        let id = self.id();
        Runtime::trigger(id, &Key::Index(index));
        Runtime::trigger(id, &Key::Length);
        Runtime::trigger(id, &Key::Iterate);
        Ok(index)
    }

    /// Remove and return the last element of a sequence.
    pub fn pop(&self) -> Result<Option<Value>> {
        let Some((index, value)) = self.0.raw.pop()? else {
            return Ok(None);
        };
        let id = self.id();
        Runtime::trigger(id, &Key::Index(index));
        Runtime::trigger(id, &Key::Length);
        Runtime::trigger(id, &Key::Iterate);
        Ok(Some(self.present(value)))
    }

    /// Shorten a sequence to `len` elements.
    pub fn truncate(&self, len: usize) -> Result<()> {
        let removed: Vec<Value> = match &mut *self.0.raw.borrow_mut_container() {
            Container::Sequence(items) if items.len() > len => items.split_off(len),
            Container::Sequence(_) => return Ok(()),
            Container::Record(_) => return Err(Error::NotASequence),
        };
        let id = self.id();
        for index in len..len + removed.len() {
            Runtime::trigger(id, &Key::Index(index));
        }
        Runtime::trigger(id, &Key::Length);
        Runtime::trigger(id, &Key::Iterate);
        Ok(())
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("raw", &self.0.raw)
            .field("shallow", &self.0.shallow)
            .finish()
    }
}
