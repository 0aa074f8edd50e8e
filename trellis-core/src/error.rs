//! Error types shared by the reactive and render layers.
//!
//! Most of the engine is infallible by construction: reading outside a
//! tracking context, writing an unchanged value or writing a computed without
//! a setter are all accepted silently. The variants below cover the cases a
//! caller can actually get wrong.

use thiserror::Error;

use crate::reactive::Key;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by reactive containers, component instances and the
/// job scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A component attempted to write one of its own props.
    ///
    /// Props flow one way, from parent to child. The write is rejected and
    /// the stored value is left untouched.
    #[error("prop `{key}` is readonly; props can only be changed by the parent")]
    ReadonlyProp { key: String },

    /// The key variant does not address this kind of container
    /// (an index into a record, or a field name on a sequence).
    #[error("key {key:?} cannot address a {container}")]
    KeyKind { key: Key, container: &'static str },

    /// A sequence-only operation was applied to a record.
    #[error("operation requires a sequence, found a record")]
    NotASequence,

    /// `flush_all` kept finding new jobs after the configured number of ticks.
    #[error("scheduler did not settle after {ticks} ticks")]
    FlushLimit { ticks: usize },
}
