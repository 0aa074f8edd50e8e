//! Dynamic values stored in reactive containers.
//!
//! A [`RawObject`] is the plain, unobserved data container: either a record
//! (insertion-ordered string keys) or a sequence. It carries an [`ObjectId`]
//! so that dependency sets and the wrapper cache can be keyed by the
//! identity of the underlying object rather than by any particular wrapper.
//!
//! Values follow identity semantics for containers and callbacks and value
//! semantics for scalars, which is what the "did this write change
//! anything?" check in the reactive wrapper relies on.

use std::cell::{Ref as CellRef, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::object::{reactive, Reactive};
use crate::error::{Error, Result};

/// Unique identifier for an underlying data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A property key inside a container.
///
/// `Length` and `Iterate` never address stored data. They name the
/// dependency sets for "how long is this sequence" and "which keys does this
/// record have", so that reads of those facts can be invalidated by pushes,
/// pops, additions and deletions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
    Length,
    Iterate,
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Field(name.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "[{index}]"),
            Key::Length => f.write_str("<length>"),
            Key::Iterate => f.write_str("<iterate>"),
        }
    }
}

/// A shared callback stored as a value, typically an event handler prop.
///
/// Two callbacks are equal only if they are the same allocation.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value])>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) {
        (self.0)(args)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.0).cast::<()>() == Rc::as_ptr(&other.0).cast::<()>()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

/// The storage behind a [`RawObject`].
#[derive(Debug, Clone)]
pub enum Container {
    Record(IndexMap<String, Value>),
    Sequence(Vec<Value>),
}

impl Container {
    fn kind_name(&self) -> &'static str {
        match self {
            Container::Record(_) => "record",
            Container::Sequence(_) => "sequence",
        }
    }
}

/// Outcome of a raw write, used by the wrapper to decide what to trigger.
///
/// The replaced value is handed back so it is dropped after the container
/// borrow ends.
pub(crate) enum Write {
    Unchanged,
    Replaced(Value),
    Added,
}

/// A plain, unobserved data container with a stable identity.
#[derive(Clone)]
pub struct RawObject(Rc<RawInner>);

struct RawInner {
    id: ObjectId,
    data: RefCell<Container>,
}

impl RawObject {
    pub fn new(container: Container) -> Self {
        Self(Rc::new(RawInner {
            id: ObjectId::next(),
            data: RefCell::new(container),
        }))
    }

    /// Build a record from `(name, value)` pairs, keeping their order.
    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Container::Record(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Container::Sequence(items.into_iter().collect()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn is_sequence(&self) -> bool {
        matches!(*self.0.data.borrow(), Container::Sequence(_))
    }

    /// Borrow the underlying storage. Reads through this borrow are not
    /// tracked.
    pub fn borrow(&self) -> CellRef<'_, Container> {
        self.0.data.borrow()
    }

    pub(crate) fn borrow_mut_container(&self) -> std::cell::RefMut<'_, Container> {
        self.0.data.borrow_mut()
    }

    /// Read a key without tracking. `Length` reads a sequence's length.
    pub fn peek(&self, key: &Key) -> Option<Value> {
        match (&*self.0.data.borrow(), key) {
            (Container::Record(map), Key::Field(name)) => map.get(name).cloned(),
            (Container::Sequence(items), Key::Index(index)) => items.get(*index).cloned(),
            (Container::Sequence(items), Key::Length) => Some(Value::from(items.len())),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match (&*self.0.data.borrow(), key) {
            (Container::Record(map), Key::Field(name)) => map.contains_key(name),
            (Container::Sequence(items), Key::Index(index)) => *index < items.len(),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            Container::Record(map) => map.len(),
            Container::Sequence(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in storage order, untracked.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.data.borrow() {
            Container::Record(map) => map.keys().cloned().map(Key::Field).collect(),
            Container::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Store `value` at `key`, comparing against the value currently held by
    /// that same key. Writing past the end of a sequence pads with `Null`.
    pub(crate) fn write(&self, key: &Key, value: Value) -> Result<Write> {
        let mut data = self.0.data.borrow_mut();
        let kind = data.kind_name();
        match (&mut *data, key) {
            (Container::Record(map), Key::Field(name)) => match map.get_mut(name) {
                Some(slot) if *slot == value => Ok(Write::Unchanged),
                Some(slot) => Ok(Write::Replaced(std::mem::replace(slot, value))),
                None => {
                    map.insert(name.clone(), value);
                    Ok(Write::Added)
                }
            },
            (Container::Sequence(items), Key::Index(index)) => {
                if let Some(slot) = items.get_mut(*index) {
                    if *slot == value {
                        return Ok(Write::Unchanged);
                    }
                    return Ok(Write::Replaced(std::mem::replace(slot, value)));
                }
                items.resize(*index, Value::Null);
                items.push(value);
                Ok(Write::Added)
            }
            _ => Err(Error::KeyKind {
                key: key.clone(),
                container: kind,
            }),
        }
    }

    pub(crate) fn delete(&self, key: &Key) -> Result<Option<Value>> {
        let mut data = self.0.data.borrow_mut();
        let kind = data.kind_name();
        match (&mut *data, key) {
            (Container::Record(map), Key::Field(name)) => Ok(map.shift_remove(name)),
            _ => Err(Error::KeyKind {
                key: key.clone(),
                container: kind,
            }),
        }
    }

    pub(crate) fn push(&self, value: Value) -> Result<usize> {
        match &mut *self.0.data.borrow_mut() {
            Container::Sequence(items) => {
                items.push(value);
                Ok(items.len() - 1)
            }
            Container::Record(_) => Err(Error::NotASequence),
        }
    }

    pub(crate) fn pop(&self) -> Result<Option<(usize, Value)>> {
        match &mut *self.0.data.borrow_mut() {
            Container::Sequence(items) => Ok(items.pop().map(|v| (items.len(), v))),
            Container::Record(_) => Err(Error::NotASequence),
        }
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> serde_json::Value {
        if !path.insert(self.id()) {
            // Cyclic reference: cut it instead of recursing forever.
            return serde_json::Value::Null;
        }
        let json = match &*self.0.data.borrow() {
            Container::Record(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_inner(path)))
                    .collect(),
            ),
            Container::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json_inner(path)).collect())
            }
        };
        path.remove(&self.id());
        json
    }
}

impl PartialEq for RawObject {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.data.borrow();
        f.debug_struct("RawObject")
            .field("id", &self.0.id)
            .field("kind", &data.kind_name())
            .field("len", &self.len())
            .finish()
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(RawObject),
    Reactive(Reactive),
    Func(Callback),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Callback> {
        match self {
            Value::Func(cb) => Some(cb),
            _ => None,
        }
    }

    /// The underlying container, whether this value is wrapped or not.
    pub fn as_object(&self) -> Option<RawObject> {
        match self {
            Value::Object(raw) => Some(raw.clone()),
            Value::Reactive(r) => Some(r.raw().clone()),
            _ => None,
        }
    }

    /// Wrap a raw container in its (cached) deep reactive wrapper.
    pub fn to_reactive(&self) -> Value {
        match self {
            Value::Object(raw) => Value::Reactive(reactive(raw.clone())),
            other => other.clone(),
        }
    }

    /// Strip a reactive wrapper, leaving the raw container.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Reactive(r) => Value::Object(r.raw().clone()),
            other => other.clone(),
        }
    }

    /// Build a value tree from JSON. Objects and arrays become fresh raw
    /// containers.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                Value::Object(RawObject::sequence(items.into_iter().map(Value::from_json)))
            }
            serde_json::Value::Object(map) => Value::Object(RawObject::record(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value as JSON without tracking. Callbacks become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> serde_json::Value {
        match self {
            Value::Null | Value::Func(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(raw) => raw.to_json_inner(path),
            Value::Reactive(r) => r.raw().to_json_inner(path),
        }
    }
}

/// Identity comparison for floats: every NaN equals every other NaN and the
/// two zeros differ.
fn same_float(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => same_float(*a, *b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a == b,
            (a, b) => match (a.as_object(), b.as_object()) {
                (Some(a), Some(b)) => a.id() == b.id(),
                _ => false,
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<RawObject> for Value {
    fn from(raw: RawObject) -> Self {
        Value::Object(raw)
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Reactive(r)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Func(cb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floats_compare_by_identity() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from(0.0), Value::from(-0.0));
        assert_eq!(Value::from(1.5), Value::from(1.5));
    }

    #[test]
    fn object_ids_are_unique() {
        let a = RawObject::record::<&str, _>([]);
        let b = RawObject::record::<&str, _>([]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a, a.clone());
    }

    #[test]
    fn write_compares_the_same_key() {
        let raw = RawObject::record([("a", Value::from(1)), ("b", Value::from(2))]);

        // Writing b's current value must be a no-op even though a differs.
        assert!(matches!(raw.write(&Key::from("b"), Value::from(2)), Ok(Write::Unchanged)));
        assert!(matches!(raw.write(&Key::from("a"), Value::from(2)), Ok(Write::Replaced(_))));
        assert!(matches!(raw.write(&Key::from("c"), Value::from(3)), Ok(Write::Added)));
        assert_eq!(raw.peek(&Key::from("a")), Some(Value::from(2)));
    }

    #[test]
    fn write_rejects_wrong_key_kind() {
        let raw = RawObject::record([("a", Value::from(1))]);
        let err = raw.write(&Key::Index(0), Value::Null).err();
        assert_eq!(
            err,
            Some(Error::KeyKind {
                key: Key::Index(0),
                container: "record"
            })
        );
    }

    #[test]
    fn sequence_write_past_end_pads() {
        let raw = RawObject::sequence([Value::from(1)]);
        assert!(matches!(raw.write(&Key::Index(2), Value::from(3)), Ok(Write::Added)));
        assert_eq!(raw.len(), 3);
        assert_eq!(raw.peek(&Key::Index(1)), Some(Value::Null));
        assert_eq!(raw.peek(&Key::Length), Some(Value::from(3)));
    }

    #[test]
    fn equality_is_identity_for_containers() {
        let a = RawObject::record([("x", Value::from(1))]);
        let b = RawObject::record([("x", Value::from(1))]);
        assert_ne!(Value::from(a.clone()), Value::from(b));
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()).to_reactive());

        let cb = Callback::new(|_| {});
        assert_eq!(Value::from(cb.clone()), Value::from(cb));
        assert_ne!(Value::from(Callback::new(|_| {})), Value::from(Callback::new(|_| {})));
    }

    #[test]
    fn json_round_trip() {
        let source = json!({"name": "trellis", "tags": ["a", "b"], "depth": 2, "ratio": 0.5});
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json(), source);
        assert_eq!(serde_json::to_value(&value).ok(), Some(source));
    }

    #[test]
    fn cyclic_snapshot_terminates() {
        let raw = RawObject::record([("self", Value::Null)]);
        let _ = raw.write(&Key::from("self"), Value::from(raw.clone()));
        assert_eq!(Value::from(raw).to_json(), json!({"self": null}));
    }
}
