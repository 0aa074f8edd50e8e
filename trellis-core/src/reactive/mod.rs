//! Reactive Primitives
//!
//! This module implements the core reactive system: reactive objects, refs,
//! computed values, effects and watchers. These primitives form the
//! foundation of Trellis's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Reactive Objects
//!
//! A [`Reactive`] wraps a record or sequence. Reading a key within a tracked
//! computation registers that computation as a dependent of the key; writing
//! a different value notifies every dependent.
//!
//! ## Refs
//!
//! A [`Ref`] is a single reactive cell with its own dependency set.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! ## Effects and Watchers
//!
//! A [`ReactiveEffect`] is a tracked computation. [`effect`] re-runs one
//! synchronously on change; [`watch`] calls back with new and old values.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a key is read, we check whether a
//! computation is active and, if so, record the dependency in the runtime's
//! arena.

mod computed;
mod context;
mod dep;
mod effect;
mod object;
mod reference;
mod runtime;
mod subscriber;
mod value;
mod watch;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use dep::DepId;
pub use effect::{effect, DirtyLevel, EffectOptions, EffectRunner, ReactiveEffect, WeakEffect};
pub use object::{is_reactive, reactive, shallow_reactive, to_raw, Reactive};
pub use reference::{to_ref, to_refs, ObjectRef, Ref};
pub use runtime::Runtime;
pub use subscriber::SubscriberId;
pub use value::{Callback, Container, Key, ObjectId, RawObject, Value};
pub use watch::{watch, watch_effect, OnCleanup, WatchHandle, WatchOptions, WatchSource};
