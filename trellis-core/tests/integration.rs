//! Integration Tests for Reactive System
//!
//! These tests verify that reactive objects, refs, computed values, effects,
//! watchers and the scheduler work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::reactive::{
    effect, reactive, to_ref, watch, watch_effect, Computed, EffectOptions, Key, RawObject,
    ReactiveContext, Ref, Runtime, Value, WatchOptions,
};
use trellis_core::scheduler::{Job, Scheduler};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Rc<Cell<u32>>) {
    count.set(count.get() + 1);
}

/// Test that an effect re-runs when a key it read changes.
#[test]
fn effect_tracks_object_key() {
    let state = reactive(RawObject::record([("count", Value::from(0))]));
    let observed = Rc::new(Cell::new(-1));

    let reader = state.clone();
    let sink = observed.clone();
    let _runner = effect(
        move || sink.set(reader.get("count").as_int().unwrap_or_default()),
        EffectOptions::default(),
    );

    // Effect runs on creation, captures initial value
    assert_eq!(observed.get(), 0);

    state.set("count", 42).unwrap();
    assert_eq!(observed.get(), 42);
}

/// Test that writes to keys nobody read do not re-run anything.
#[test]
fn unrelated_keys_do_not_trigger() {
    let state = reactive(RawObject::record([
        ("a", Value::from(1)),
        ("b", Value::from(1)),
    ]));
    let runs = counter();

    let reader = state.clone();
    let count = runs.clone();
    let _runner = effect(
        move || {
            reader.get("a");
            bump(&count);
        },
        EffectOptions::default(),
    );
    assert_eq!(runs.get(), 1);

    state.set("b", 2).unwrap();
    assert_eq!(runs.get(), 1);
    state.set("a", 2).unwrap();
    assert_eq!(runs.get(), 2);
}

/// Test that a branch switch drops the dependency on the untaken branch.
#[test]
fn conditional_reads_resubscribe() {
    let state = reactive(RawObject::record([
        ("show", Value::from(true)),
        ("left", Value::from("l")),
        ("right", Value::from("r")),
    ]));
    let runs = counter();

    let reader = state.clone();
    let count = runs.clone();
    let _runner = effect(
        move || {
            bump(&count);
            if reader.get("show").as_bool() == Some(true) {
                reader.get("left");
            } else {
                reader.get("right");
            }
        },
        EffectOptions::default(),
    );
    assert_eq!(Runtime::subscriber_count(state.id(), &Key::from("left")), 1);

    state.set("show", false).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(Runtime::subscriber_count(state.id(), &Key::from("left")), 0);

    // The untaken branch no longer re-runs the effect
    state.set("left", "changed").unwrap();
    assert_eq!(runs.get(), 2);
    state.set("right", "changed").unwrap();
    assert_eq!(runs.get(), 3);
}

/// Test that computed values cache until a source changes.
#[test]
fn computed_caches_expensive_computation() {
    let source = Ref::new(21);
    let computes = counter();

    let input = source.clone();
    let count = computes.clone();
    let doubled = Computed::new(move || {
        bump(&count);
        input.get().as_int().unwrap_or_default() * 2
    });

    // Nothing runs until the first read
    assert_eq!(computes.get(), 0);

    assert_eq!(doubled.get(), 42);
    assert_eq!(doubled.get(), 42);
    assert_eq!(doubled.get(), 42);
    assert_eq!(computes.get(), 1);

    source.set(5);
    assert_eq!(computes.get(), 1);
    assert_eq!(doubled.get(), 10);
    assert_eq!(computes.get(), 2);
}

/// Test that computed values can depend on other computed values, and that
/// effects see the end of the chain.
#[test]
fn computed_chain_propagates_to_effect() {
    let base = Ref::new(1);

    let input = base.clone();
    let plus_one = Computed::new(move || input.get().as_int().unwrap_or_default() + 1);
    let inner = plus_one.clone();
    let times_ten = Computed::new(move || inner.get() * 10);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let outer = times_ten.clone();
    let _runner = effect(move || sink.borrow_mut().push(outer.get()), EffectOptions::default());

    base.set(2);
    base.set(3);
    assert_eq!(*seen.borrow(), vec![20, 30, 40]);
}

/// Test that watch callbacks are batched through the scheduler.
#[test]
fn watch_batches_through_scheduler() {
    let state = reactive(RawObject::record([("n", Value::from(0))]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let job_runs = counter();

    // The watcher pushes a job instead of reacting inline
    let job = {
        let count = job_runs.clone();
        Job::new(move || bump(&count))
    };

    let sink = seen.clone();
    let queued = job.clone();
    let source = state.clone();
    let _handle = watch(
        move || source.get("n"),
        move |new: &Value, old: Option<&Value>, _| {
            sink.borrow_mut().push((new.clone(), old.cloned()));
            Scheduler::queue(&queued);
        },
        WatchOptions::default(),
    );

    state.set("n", 1).unwrap();
    state.set("n", 2).unwrap();
    state.set("n", 3).unwrap();

    assert_eq!(seen.borrow().len(), 3);
    assert_eq!(seen.borrow()[0], (Value::from(1), Some(Value::from(0))));
    assert_eq!(seen.borrow()[2], (Value::from(3), Some(Value::from(2))));

    // Three notifications, one pending job
    assert_eq!(Scheduler::pending_count(), 1);
    assert_eq!(Scheduler::flush_all(), Ok(1));
    assert_eq!(job_runs.get(), 1);
}

/// Test that watch_effect cleanups run before the next run and on stop.
#[test]
fn watch_effect_cleanup_lifecycle() {
    let source = Ref::new(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let input = source.clone();
    let sink = log.clone();
    let handle = watch_effect(move |on_cleanup| {
        let n = input.get().as_int().unwrap_or_default();
        sink.borrow_mut().push(format!("run {n}"));
        let cleanup_sink = sink.clone();
        on_cleanup.register(move || cleanup_sink.borrow_mut().push(format!("cleanup {n}")));
    });

    source.set(1);
    handle.stop();
    source.set(2);

    assert_eq!(
        *log.borrow(),
        vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
    );
    assert!(!handle.is_active());
}

/// Test that object refs stay linked to their source key.
#[test]
fn object_ref_reads_and_writes_through() {
    let state = reactive(RawObject::record([("name", Value::from("a"))]));
    let name = to_ref(&state, "name");
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = seen.clone();
    let link = name.clone();
    let _runner = effect(
        move || sink.borrow_mut().push(link.get()),
        EffectOptions::default(),
    );

    name.set("b").unwrap();
    state.set("name", "c").unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
}

/// Test that deep reads through nested objects are tracked per level.
#[test]
fn nested_object_writes_are_observed() {
    let inner = RawObject::record([("value", Value::from(1))]);
    let state = reactive(RawObject::record([("inner", Value::from(inner))]));
    let observed = Rc::new(Cell::new(0));

    let reader = state.clone();
    let sink = observed.clone();
    let _runner = effect(
        move || {
            let nested = reader.get("inner");
            if let Some(nested) = nested.as_reactive() {
                sink.set(nested.get("value").as_int().unwrap_or_default());
            }
        },
        EffectOptions::default(),
    );

    let nested = state.get("inner");
    nested.as_reactive().unwrap().set("value", 7).unwrap();
    assert_eq!(observed.get(), 7);
}

/// Test that untracked reads never subscribe.
#[test]
fn untracked_reads_are_invisible() {
    let source = Ref::new(0);
    let runs = counter();

    let input = source.clone();
    let count = runs.clone();
    let _runner = effect(
        move || {
            bump(&count);
            ReactiveContext::untracked(|| input.get());
        },
        EffectOptions::default(),
    );

    source.set(1);
    assert_eq!(runs.get(), 1);
    assert_eq!(source.subscriber_count(), 0);
}

/// Test that dropping every handle releases all dependency sets.
#[test]
fn dropping_effects_releases_dependencies() {
    let before = Runtime::dependency_set_count();
    let state = reactive(RawObject::record([("a", Value::from(1))]));

    let reader = state.clone();
    let runner = effect(
        move || {
            reader.get("a");
            reader.get("b");
        },
        EffectOptions::default(),
    );
    assert_eq!(Runtime::dependency_set_count(), before + 2);

    drop(runner);
    assert_eq!(Runtime::dependency_set_count(), before);
}
