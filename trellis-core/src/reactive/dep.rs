//! Dependency sets.
//!
//! Every `(object, key)` pair that has been read under a tracked
//! computation, and every ref or computed value that has been read, owns one
//! [`Dep`] in the runtime's arena. Subscribers refer to sets by [`DepId`],
//! never by reference, so unsubscribing is an O(1) arena lookup instead of a
//! scan of the whole target map.

use indexmap::IndexMap;
use std::cell::Cell;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::effect::track_effect;
use super::runtime::Runtime;
use super::subscriber::{SubscriberId, Subscription};

/// Handle to a dependency set in the runtime arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(pub(crate) usize);

/// Action run once the last subscriber leaves a set.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// The subscribers of one dependency set, in subscription order.
pub(crate) struct Dep {
    pub(crate) subscribers: IndexMap<SubscriberId, Subscription>,
    pub(crate) cleanup: Option<Cleanup>,
}

impl Dep {
    pub(crate) fn new(cleanup: Cleanup) -> Self {
        Self {
            subscribers: IndexMap::new(),
            cleanup: Some(cleanup),
        }
    }
}

/// A lazily allocated dependency set owned by a single cell (a ref or a
/// computed value) rather than by an `(object, key)` pair.
///
/// The slot is cleared by the set's cleanup action, so a cell never holds
/// the handle of a set that has been released back to the arena.
#[derive(Clone, Default)]
pub(crate) struct DepCell {
    slot: Rc<Cell<Option<DepId>>>,
}

impl DepCell {
    /// Subscribe the active computation, allocating the set on first use.
    pub(crate) fn track(&self) {
        let Some(active) = ReactiveContext::current() else {
            return;
        };
        let dep = match self.slot.get() {
            Some(dep) => dep,
            None => {
                let slot = Rc::downgrade(&self.slot);
                let dep = Runtime::create_dep(Box::new(move || {
                    if let Some(slot) = slot.upgrade() {
                        slot.set(None);
                    }
                }));
                self.slot.set(Some(dep));
                dep
            }
        };
        track_effect(&active, dep);
    }

    pub(crate) fn trigger(&self) {
        if let Some(dep) = self.slot.get() {
            Runtime::trigger_dep(dep);
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.slot
            .get()
            .map(Runtime::dep_subscriber_count)
            .unwrap_or(0)
    }
}
