//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (reactive objects, refs, computed values, effects,
//!   watchers) with incremental dependency tracking
//! - A deduplicating job scheduler that batches re-renders into one flush
//!   per tick
//! - Virtual nodes and a reconciler that patches a host tree with a minimal
//!   number of moves, driven by a longest-increasing-subsequence pass
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `scheduler`: Job queue flushed once per tick
//! - `render`: Virtual nodes, the host adapter boundary and the reconciler
//! - `error`: Error taxonomy shared by the layers above
//!
//! Everything runs on one logical thread. Runtime state is thread-local and
//! handles are `Rc`-based.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{effect, reactive, EffectOptions, RawObject, Value};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let state = reactive(RawObject::record([("count", Value::from(0))]));
//! let seen = Rc::new(Cell::new(0));
//!
//! let observed = state.clone();
//! let sink = seen.clone();
//! let _runner = effect(
//!     move || sink.set(observed.get("count").as_int().unwrap_or_default()),
//!     EffectOptions::default(),
//! );
//!
//! state.set("count", 5).unwrap();
//! assert_eq!(seen.get(), 5);
//! ```

pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use error::{Error, Result};
