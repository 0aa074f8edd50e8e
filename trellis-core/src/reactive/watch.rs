//! Watchers.
//!
//! A watcher runs a callback with the new and previous value of a source
//! every time the source changes. Sources can be closures, reactive objects
//! (observed deeply, down to an optional depth), refs or computed values.
//!
//! The job runs synchronously from the source's trigger. A callback that
//! writes its own source is not re-entered; the watcher re-runs once the
//! current callback returns.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use super::computed::Computed;
use super::effect::ReactiveEffect;
use super::object::Reactive;
use super::reference::Ref;
use super::value::{ObjectId, Value};

/// Something a watcher can observe.
pub trait WatchSource<T> {
    /// Turn the source into the getter run by the watcher's computation.
    /// `depth` bounds how far nested containers are traversed.
    fn into_getter(self, depth: Option<usize>) -> Box<dyn Fn() -> T>;
}

impl<T, F> WatchSource<T> for F
where
    F: Fn() -> T + 'static,
{
    fn into_getter(self, _depth: Option<usize>) -> Box<dyn Fn() -> T> {
        Box::new(self)
    }
}

impl WatchSource<Value> for Reactive {
    fn into_getter(self, depth: Option<usize>) -> Box<dyn Fn() -> Value> {
        Box::new(move || {
            let value = Value::Reactive(self.clone());
            traverse(&value, depth, &mut HashSet::new());
            value
        })
    }
}

impl WatchSource<Value> for Ref {
    fn into_getter(self, depth: Option<usize>) -> Box<dyn Fn() -> Value> {
        Box::new(move || {
            let value = self.get();
            if depth.is_some() {
                traverse(&value, depth, &mut HashSet::new());
            }
            value
        })
    }
}

impl<T: Clone + 'static> WatchSource<T> for Computed<T> {
    fn into_getter(self, _depth: Option<usize>) -> Box<dyn Fn() -> T> {
        Box::new(move || self.get())
    }
}

/// Read every key of every reactive container reachable from `value`, down
/// to `depth` levels (unbounded if `None`). Cycles are visited once.
fn traverse(value: &Value, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
    if depth == Some(0) {
        return;
    }
    let Value::Reactive(object) = value else {
        return;
    };
    if !seen.insert(object.id()) {
        return;
    }
    let next = depth.map(|d| d - 1);
    for nested in object.values() {
        traverse(&nested, next, seen);
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Call the callback once at creation, with no previous value.
    pub immediate: bool,
    /// Traversal depth for container sources. `Some(1)` observes only the
    /// top-level keys.
    pub depth: Option<usize>,
}

/// Registration slot for a watcher's cleanup action.
///
/// The registered action runs before the next callback invocation, or when
/// the watcher is stopped.
#[derive(Clone, Default)]
pub struct OnCleanup {
    pending: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.pending.borrow_mut() = Some(Box::new(cleanup));
    }

    fn run_pending(&self) {
        let pending = self.pending.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

trait StopHandle {
    fn stop(&self);
    fn is_active(&self) -> bool;
}

impl<T: 'static> StopHandle for ReactiveEffect<T> {
    fn stop(&self) {
        ReactiveEffect::stop(self)
    }

    fn is_active(&self) -> bool {
        ReactiveEffect::is_active(self)
    }
}

/// Handle to a running watcher.
///
/// Dropping the handle stops the watcher without running its pending
/// cleanup; [`stop`](Self::stop) runs it.
pub struct WatchHandle {
    effect: Rc<dyn StopHandle>,
    cleanup: OnCleanup,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
        self.cleanup.run_pending();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

struct WatchState<T, C> {
    old: RefCell<Option<T>>,
    callback: RefCell<C>,
    busy: Cell<bool>,
    pending: Cell<bool>,
}

/// Watch `source`, calling `callback(new, old, on_cleanup)` whenever it
/// changes.
///
/// Without `immediate`, the source is evaluated once at creation to collect
/// its dependencies and seed the previous value.
pub fn watch<S, T, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: WatchSource<T>,
    T: 'static,
    C: FnMut(&T, Option<&T>, &OnCleanup) + 'static,
{
    let getter = source.into_getter(options.depth);
    let effect = ReactiveEffect::new(getter);
    let cleanup = OnCleanup::default();
    let state = Rc::new(WatchState {
        old: RefCell::new(None),
        callback: RefCell::new(callback),
        busy: Cell::new(false),
        pending: Cell::new(false),
    });

    let job: Rc<dyn Fn()> = {
        let weak = effect.downgrade();
        let cleanup = cleanup.clone();
        let state = state.clone();
        Rc::new(move || {
            let Some(effect) = weak.upgrade() else {
                return;
            };
            if state.busy.replace(true) {
                state.pending.set(true);
                return;
            }
            while effect.is_active() {
                cleanup.run_pending();
                let next = effect.run();
                let previous = state.old.borrow_mut().take();
                (state.callback.borrow_mut())(&next, previous.as_ref(), &cleanup);
                *state.old.borrow_mut() = Some(next);
                if !state.pending.replace(false) {
                    break;
                }
            }
            state.busy.set(false);
        })
    };
    effect.set_scheduler(Some(job.clone()));

    if options.immediate {
        job();
    } else {
        let initial = effect.run();
        *state.old.borrow_mut() = Some(initial);
    }

    WatchHandle {
        effect: Rc::new(effect),
        cleanup,
    }
}

/// Run `f` now and again whenever anything it read changes.
///
/// A cleanup registered through the argument runs before the next run.
pub fn watch_effect<F>(f: F) -> WatchHandle
where
    F: Fn(&OnCleanup) + 'static,
{
    let cleanup = OnCleanup::default();
    let effect = {
        let cleanup = cleanup.clone();
        ReactiveEffect::new(move || f(&cleanup))
    };
    let weak = effect.downgrade();
    let pending = cleanup.clone();
    effect.set_scheduler(Some(Rc::new(move || {
        if let Some(effect) = weak.upgrade() {
            pending.run_pending();
            effect.run();
        }
    })));
    effect.run();

    WatchHandle {
        effect: Rc::new(effect),
        cleanup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::object::reactive;
    use crate::reactive::value::RawObject;

    type Log = Rc<RefCell<Vec<String>>>;

    #[test]
    fn callback_receives_new_and_old() {
        let count = Ref::new(1);
        let log: Log = Rc::default();
        let sink = log.clone();
        let _handle = watch(
            count.clone(),
            move |new: &Value, old: Option<&Value>, _: &OnCleanup| {
                sink.borrow_mut().push(format!("{:?}->{:?}", old.and_then(Value::as_int), new.as_int()));
            },
            WatchOptions::default(),
        );
        assert!(log.borrow().is_empty());

        count.set(2);
        count.set(3);
        assert_eq!(*log.borrow(), vec!["Some(1)->Some(2)", "Some(2)->Some(3)"]);
    }

    #[test]
    fn immediate_runs_without_old_value() {
        let count = Ref::new(1);
        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();
        let _handle = watch(
            move || count.get().as_int().unwrap_or(0),
            move |new: &i64, old: Option<&i64>, _: &OnCleanup| sink.set(Some((*new, old.copied()))),
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        );
        assert_eq!(seen.get(), Some((1, None)));
    }

    #[test]
    fn deep_reactive_source_sees_nested_writes() {
        let inner = RawObject::record([("x", Value::from(1))]);
        let state = reactive(RawObject::record([("inner", Value::from(inner))]));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _handle = watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>, _: &OnCleanup| counter.set(counter.get() + 1),
            WatchOptions::default(),
        );

        let nested = state.get("inner");
        if let Some(nested) = nested.as_reactive() {
            nested.set("x", 2).unwrap();
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn depth_one_ignores_nested_writes() {
        let inner = RawObject::record([("x", Value::from(1))]);
        let state = reactive(RawObject::record([("inner", Value::from(inner))]));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _handle = watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>, _: &OnCleanup| counter.set(counter.get() + 1),
            WatchOptions {
                depth: Some(1),
                ..WatchOptions::default()
            },
        );

        let nested = state.get("inner");
        if let Some(nested) = nested.as_reactive() {
            nested.set("x", 2).unwrap();
        }
        assert_eq!(calls.get(), 0);
        state.set("inner", Value::Null).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = Ref::new(0);
        let log: Log = Rc::default();
        let sink = log.clone();
        let handle = watch(
            count.clone(),
            move |new: &Value, _: Option<&Value>, on_cleanup: &OnCleanup| {
                let n = new.as_int().unwrap_or(0);
                sink.borrow_mut().push(format!("run {n}"));
                let sink = sink.clone();
                on_cleanup.register(move || sink.borrow_mut().push(format!("cleanup {n}")));
            },
            WatchOptions::default(),
        );

        count.set(1);
        count.set(2);
        handle.stop();
        count.set(3);

        assert_eq!(
            *log.borrow(),
            vec!["run 1", "cleanup 1", "run 2", "cleanup 2"]
        );
        assert!(!handle.is_active());
    }

    #[test]
    fn watch_effect_reruns_on_change() {
        let count = Ref::new(0);
        let seen = Rc::new(Cell::new(-1));
        let reader = count.clone();
        let sink = seen.clone();
        let handle = watch_effect(move |_| sink.set(reader.get().as_int().unwrap_or(0)));
        assert_eq!(seen.get(), 0);

        count.set(4);
        assert_eq!(seen.get(), 4);

        handle.stop();
        count.set(5);
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn callback_writing_its_source_is_not_reentered() {
        let count = Ref::new(0);
        let writer = count.clone();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let _handle = watch(
            count.clone(),
            move |new: &Value, _: Option<&Value>, _: &OnCleanup| {
                counter.set(counter.get() + 1);
                let n = new.as_int().unwrap_or(0);
                if n < 3 {
                    writer.set(n + 1);
                }
            },
            WatchOptions::default(),
        );

        count.set(1);
        assert_eq!(calls.get(), 3);
        assert_eq!(count.get_untracked(), Value::from(3));
    }
}
