//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive objects,
//! refs, computed values and effects. It owns the dependency graph and fans
//! out notifications when data changes.
//!
//! # How It Works
//!
//! 1. When a reactive object's key is read inside a running computation, the
//!    runtime looks up (or creates) the dependency set for `(object, key)`
//!    and subscribes the computation to it.
//!
//! 2. When the key is written with a different value, the runtime:
//!    a. Snapshots the subscribers of that set
//!    b. Marks every one of them dirty
//!    c. Invokes the scheduler of every subscriber that is not itself
//!       running
//!
//! 3. When the last subscriber leaves a set, the set goes back to the arena
//!    and its `(object, key)` entry is dropped from the target map.
//!
//! # Threading
//!
//! All state is thread-local. The runtime borrow is never held while user
//! code runs: notifications snapshot first, release the borrow, then call
//! out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slab::Slab;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::{Cleanup, Dep, DepId};
use super::effect::{track_effect, trigger_effects, EffectNode};
use super::object::ReactiveInner;
use super::subscriber::{SubscriberId, Subscription};
use super::value::{Key, ObjectId};

#[derive(Default)]
struct RuntimeState {
    /// Arena owning every live dependency set.
    deps: Slab<Dep>,
    /// `object -> key -> dependency set`.
    targets: HashMap<ObjectId, HashMap<Key, DepId>>,
    /// Wrapper cache keyed by `(object, shallow)`. Entries do not keep the
    /// wrapper alive.
    wrappers: HashMap<(ObjectId, bool), Weak<ReactiveInner>>,
}

impl RuntimeState {
    fn dep_for(&mut self, target: ObjectId, key: Key) -> DepId {
        if let Some(&dep) = self.targets.get(&target).and_then(|keys| keys.get(&key)) {
            return dep;
        }
        let cleanup_key = key.clone();
        let dep = DepId(self.deps.insert(Dep::new(Box::new(move || {
            Runtime::forget_target_key(target, &cleanup_key);
        }))));
        self.targets.entry(target).or_default().insert(key, dep);
        dep
    }

    /// Remove `subscriber` from `dep` unless it re-subscribed during run
    /// `current`. Returns the set's cleanup action if the set became empty.
    fn release(
        &mut self,
        dep: DepId,
        subscriber: SubscriberId,
        current: Option<u64>,
    ) -> Option<Dep> {
        let set = self.deps.get_mut(dep.0)?;
        let token = set.subscribers.get(&subscriber)?.track_id;
        if current == Some(token) {
            return None;
        }
        set.subscribers.shift_remove(&subscriber);
        if set.subscribers.is_empty() {
            return Some(self.deps.remove(dep.0));
        }
        None
    }
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

fn run_cleanup(dep: DepId, released: Option<Dep>) {
    if let Some(mut released) = released {
        trace!(dep = dep.0, "dependency set emptied");
        if let Some(cleanup) = released.cleanup.take() {
            cleanup();
        }
    }
}

/// The thread-local reactive runtime.
pub struct Runtime;

impl Runtime {
    fn with<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
    }

    /// Like `with`, but gives up instead of panicking when the runtime is
    /// already borrowed or being torn down with the thread.
    fn try_with<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
        RUNTIME
            .try_with(|rt| rt.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
            .ok()
            .flatten()
    }

    /// Subscribe the active computation to `(target, key)`.
    ///
    /// Reads outside any tracked computation subscribe nobody.
    pub fn track(target: ObjectId, key: Key) {
        let Some(active) = ReactiveContext::current() else {
            return;
        };
        trace!(object = target.raw(), key = %key, "track");
        let dep = Self::with(|rt| rt.dep_for(target, key));
        track_effect(&active, dep);
    }

    /// Notify every subscriber of `(target, key)`.
    pub fn trigger(target: ObjectId, key: &Key) {
        let dep = Self::with(|rt| {
            rt.targets
                .get(&target)
                .and_then(|keys| keys.get(key))
                .copied()
        });
        if let Some(dep) = dep {
            trace!(object = target.raw(), key = %key, "trigger");
            Self::trigger_dep(dep);
        }
    }

    pub(crate) fn trigger_dep(dep: DepId) {
        let nodes: SmallVec<[Rc<EffectNode>; 8]> = Self::with(|rt| {
            rt.deps
                .get(dep.0)
                .map(|set| {
                    set.subscribers
                        .values()
                        .filter_map(|sub| sub.node.upgrade())
                        .collect()
                })
                .unwrap_or_default()
        });
        trigger_effects(&nodes);
    }

    pub(crate) fn create_dep(cleanup: Cleanup) -> DepId {
        Self::with(|rt| DepId(rt.deps.insert(Dep::new(cleanup))))
    }

    /// Record that `subscriber` read `dep` during run `track_id`.
    ///
    /// Returns `false` if it already had during this run.
    pub(crate) fn subscribe(
        dep: DepId,
        subscriber: SubscriberId,
        node: Weak<EffectNode>,
        track_id: u64,
    ) -> bool {
        Self::with(|rt| {
            let Some(set) = rt.deps.get_mut(dep.0) else {
                return false;
            };
            match set.subscribers.get_mut(&subscriber) {
                Some(existing) if existing.track_id == track_id => false,
                Some(existing) => {
                    existing.track_id = track_id;
                    true
                }
                None => {
                    set.subscribers
                        .insert(subscriber, Subscription { node, track_id });
                    true
                }
            }
        })
    }

    /// Unsubscribe `subscriber` from `dep` unless it was tracked during run
    /// `current`; `None` unsubscribes unconditionally.
    pub(crate) fn release(dep: DepId, subscriber: SubscriberId, current: Option<u64>) {
        let released = Self::with(|rt| rt.release(dep, subscriber, current));
        run_cleanup(dep, released);
    }

    /// Unconditional release used while a subscriber is being dropped.
    pub(crate) fn release_on_drop(dep: DepId, subscriber: SubscriberId) {
        let released = Self::try_with(|rt| rt.release(dep, subscriber, None)).flatten();
        run_cleanup(dep, released);
    }

    fn forget_target_key(target: ObjectId, key: &Key) {
        Self::try_with(|rt| {
            if let Some(keys) = rt.targets.get_mut(&target) {
                keys.remove(key);
                if keys.is_empty() {
                    rt.targets.remove(&target);
                }
            }
        });
    }

    /// Number of computations subscribed to `(target, key)`.
    pub fn subscriber_count(target: ObjectId, key: &Key) -> usize {
        Self::with(|rt| {
            rt.targets
                .get(&target)
                .and_then(|keys| keys.get(key))
                .and_then(|dep| rt.deps.get(dep.0))
                .map(|set| set.subscribers.len())
                .unwrap_or(0)
        })
    }

    /// Whether `(target, key)` currently has a dependency set.
    pub fn is_tracked(target: ObjectId, key: &Key) -> bool {
        Self::with(|rt| {
            rt.targets
                .get(&target)
                .is_some_and(|keys| keys.contains_key(key))
        })
    }

    pub(crate) fn dep_subscriber_count(dep: DepId) -> usize {
        Self::with(|rt| rt.deps.get(dep.0).map_or(0, |set| set.subscribers.len()))
    }

    /// Number of live dependency sets on this thread.
    pub fn dependency_set_count() -> usize {
        Self::with(|rt| rt.deps.len())
    }

    pub(crate) fn cached_wrapper(target: ObjectId, shallow: bool) -> Option<Rc<ReactiveInner>> {
        Self::with(|rt| rt.wrappers.get(&(target, shallow)).and_then(Weak::upgrade))
    }

    pub(crate) fn cache_wrapper(target: ObjectId, shallow: bool, wrapper: Weak<ReactiveInner>) {
        Self::with(|rt| {
            rt.wrappers.insert((target, shallow), wrapper);
        });
    }

    pub(crate) fn forget_wrapper(target: ObjectId, shallow: bool) {
        Self::try_with(|rt| {
            if rt
                .wrappers
                .get(&(target, shallow))
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                rt.wrappers.remove(&(target, shallow));
            }
        });
    }
}
