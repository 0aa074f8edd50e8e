//! Effect Implementation
//!
//! A [`ReactiveEffect`] is a tracked computation: a function whose reactive
//! reads are recorded so that it can be marked dirty, and optionally
//! rescheduled, when any of them change.
//!
//! # How Effects Work
//!
//! 1. `run()` installs the effect as the active computation, bumps its run
//!    generation (`track_id`) and resets the per-run dependency cursor.
//!
//! 2. Each read subscribes the effect to a dependency set. The run generation
//!    makes repeated reads of the same set within one run free, and the
//!    cursor lets the new dependency list overwrite the previous run's list
//!    in place.
//!
//! 3. When the function returns (or unwinds), sets from the previous run
//!    that were not read again are released, and the previously active
//!    computation is restored.
//!
//! Rebuilding the list in place instead of clearing and re-subscribing keeps
//! dependency sets from emptying and refilling on every run, so their
//! cleanup actions only fire for sets that really were abandoned.
//!
//! # Scheduling
//!
//! An effect without a scheduler is only marked dirty when its inputs
//! change; whoever owns it decides when to re-run it. [`effect`] builds the
//! common variant whose scheduler re-runs it synchronously.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::dep::DepId;
use super::runtime::Runtime;
use super::subscriber::SubscriberId;

/// How stale a computation is.
///
/// The gap between the two levels is left for intermediate states
/// ("a dependency might have changed") should the engine ever grow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DirtyLevel {
    NotDirty = 0,
    Dirty = 4,
}

/// The type-erased half of an effect that dependency sets point at.
pub(crate) struct EffectNode {
    id: SubscriberId,
    active: Cell<bool>,
    dirty: Cell<DirtyLevel>,
    /// Run generation, incremented at the start of every tracked run.
    track_id: Cell<u64>,
    /// Nesting depth of in-flight runs of this effect.
    running: Cell<u32>,
    /// Number of dependency sets read so far in the current run.
    deps_len: Cell<usize>,
    deps: RefCell<SmallVec<[DepId; 8]>>,
    scheduler: RefCell<Option<Rc<dyn Fn()>>>,
}

impl EffectNode {
    fn new(scheduler: Option<Rc<dyn Fn()>>) -> Self {
        Self {
            id: SubscriberId::new(),
            active: Cell::new(true),
            dirty: Cell::new(DirtyLevel::Dirty),
            track_id: Cell::new(0),
            running: Cell::new(0),
            deps_len: Cell::new(0),
            deps: RefCell::new(SmallVec::new()),
            scheduler: RefCell::new(scheduler),
        }
    }

    fn pre_cleanup(&self) {
        self.track_id.set(self.track_id.get() + 1);
        self.deps_len.set(0);
    }

    /// Release every set past the cursor that was not re-read this run.
    fn post_cleanup(&self) {
        let len = self.deps_len.get();
        let stale: SmallVec<[DepId; 8]> = {
            let mut deps = self.deps.borrow_mut();
            if deps.len() <= len {
                return;
            }
            deps.drain(len..).collect()
        };
        let current = self.track_id.get();
        for dep in stale {
            Runtime::release(dep, self.id, Some(current));
        }
    }

    fn scheduler(&self) -> Option<Rc<dyn Fn()>> {
        self.scheduler.borrow().clone()
    }
}

impl Drop for EffectNode {
    fn drop(&mut self) {
        if !self.active.get() {
            return;
        }
        for dep in self.deps.get_mut().drain(..) {
            Runtime::release_on_drop(dep, self.id);
        }
    }
}

/// Subscribe `node` to `dep` for its current run.
pub(crate) fn track_effect(node: &Rc<EffectNode>, dep: DepId) {
    let track_id = node.track_id.get();
    if !Runtime::subscribe(dep, node.id, Rc::downgrade(node), track_id) {
        return;
    }
    let len = node.deps_len.get();
    let previous = node.deps.borrow().get(len).copied();
    match previous {
        Some(previous) if previous == dep => {}
        Some(previous) => {
            node.deps.borrow_mut()[len] = dep;
            Runtime::release(previous, node.id, Some(track_id));
        }
        None => node.deps.borrow_mut().push(dep),
    }
    node.deps_len.set(len + 1);
}

/// Mark every node dirty, then schedule those that are not running.
///
/// Marking completes for the whole set before the first scheduler runs, so
/// no subscriber can observe a half-notified set.
pub(crate) fn trigger_effects(nodes: &[Rc<EffectNode>]) {
    for node in nodes {
        if node.dirty.get() < DirtyLevel::Dirty {
            node.dirty.set(DirtyLevel::Dirty);
        }
    }
    for node in nodes {
        if node.running.get() > 0 || !node.active.get() {
            continue;
        }
        if let Some(scheduler) = node.scheduler() {
            scheduler();
        }
    }
}

/// Unwinds a tracked run: leaves the running state, drops abandoned
/// dependency sets, then restores the outer computation.
struct RunGuard<'a> {
    node: &'a EffectNode,
    _ctx: ReactiveContext,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.node.running.set(self.node.running.get() - 1);
        self.node.post_cleanup();
    }
}

struct EffectInner<T> {
    node: Rc<EffectNode>,
    func: Box<dyn Fn() -> T>,
}

/// A re-runnable tracked computation.
///
/// Cloning shares the computation. Dropping the last clone unsubscribes it
/// from everything it read.
pub struct ReactiveEffect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect with no scheduler. It does not run until `run()`.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(func, None)
    }

    /// Create an effect whose `scheduler` is invoked whenever a dependency
    /// changes.
    pub fn with_scheduler<F, S>(func: F, scheduler: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn() + 'static,
    {
        Self::build(func, Some(Rc::new(scheduler)))
    }

    fn build<F>(func: F, scheduler: Option<Rc<dyn Fn()>>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            inner: Rc::new(EffectInner {
                node: Rc::new(EffectNode::new(scheduler)),
                func: Box::new(func),
            }),
        }
    }

    pub(crate) fn node(&self) -> &Rc<EffectNode> {
        &self.inner.node
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.node.id
    }

    /// Run the function, tracking every reactive read it performs.
    ///
    /// A stopped effect runs its function without tracking. If the function
    /// panics, the panic propagates after the tracking state is unwound.
    pub fn run(&self) -> T {
        let node = &self.inner.node;
        node.dirty.set(DirtyLevel::NotDirty);
        if !node.active.get() {
            return (self.inner.func)();
        }

        let ctx = ReactiveContext::enter(node.clone());
        node.running.set(node.running.get() + 1);
        node.pre_cleanup();
        let _guard = RunGuard { node, _ctx: ctx };
        (self.inner.func)()
    }

    /// Unsubscribe from every dependency and become inert.
    pub fn stop(&self) {
        let node = &self.inner.node;
        if node.active.get() {
            node.pre_cleanup();
            node.post_cleanup();
            node.active.set(false);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.node.active.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.node.running.get() > 0
    }

    pub fn dirty(&self) -> bool {
        self.inner.node.dirty.get() == DirtyLevel::Dirty
    }

    pub fn dirty_level(&self) -> DirtyLevel {
        self.inner.node.dirty.get()
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.inner.node.dirty.set(if dirty {
            DirtyLevel::Dirty
        } else {
            DirtyLevel::NotDirty
        });
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> u64 {
        self.inner.node.track_id.get()
    }

    /// Number of dependency sets read by the latest run.
    pub fn dependency_count(&self) -> usize {
        self.inner.node.deps.borrow().len()
    }

    pub fn set_scheduler(&self, scheduler: Option<Rc<dyn Fn()>>) {
        *self.inner.node.scheduler.borrow_mut() = scheduler;
    }

    pub fn has_scheduler(&self) -> bool {
        self.inner.node.scheduler.borrow().is_some()
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("dirty", &self.dirty_level())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Non-owning handle to an effect, used by schedulers that must not keep
/// their own effect alive.
pub struct WeakEffect<T: 'static> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<ReactiveEffect<T>> {
        self.inner.upgrade().map(|inner| ReactiveEffect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Options for [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Replaces the default "re-run synchronously" scheduler.
    pub scheduler: Option<Rc<dyn Fn()>>,
    /// Skip the initial run.
    pub lazy: bool,
}

/// Handle returned by [`effect`].
///
/// The effect lives as long as this handle (or a clone of its
/// [`ReactiveEffect`]); dropping it stops the effect.
#[derive(Clone, Debug)]
pub struct EffectRunner {
    effect: ReactiveEffect<()>,
}

impl EffectRunner {
    pub fn run(&self) {
        self.effect.run()
    }

    pub fn stop(&self) {
        self.effect.stop()
    }

    pub fn effect(&self) -> &ReactiveEffect<()> {
        &self.effect
    }
}

/// Create an effect that re-runs synchronously whenever something it read
/// changes, and run it once.
pub fn effect<F>(func: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + 'static,
{
    let effect = ReactiveEffect::new(func);
    let scheduler = options.scheduler.unwrap_or_else(|| {
        let weak = effect.downgrade();
        Rc::new(move || {
            if let Some(effect) = weak.upgrade() {
                effect.run();
            }
        })
    });
    effect.set_scheduler(Some(scheduler));
    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
