//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a reactive value is read,
//! we can subscribe the current computation to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of active computations. Running an effect
//! pushes it; the guard pops it again when dropped, which restores the
//! previously active computation on every exit path, including unwinding
//! out of a panicking computation.
//!
//! An entry may also be empty: [`ReactiveContext::untracked`] pushes one so
//! that reads inside it subscribe nobody, even when an outer computation is
//! running.

use std::cell::RefCell;
use std::rc::Rc;

use super::effect::EffectNode;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<EffectNode>>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    /// Make `node` the active computation until the guard is dropped.
    pub(crate) fn enter(node: Rc<EffectNode>) -> Self {
        Self::push(Some(node))
    }

    fn push(entry: Option<Rc<EffectNode>>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });
        Self { depth }
    }

    /// Run `f` with tracking paused.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::push(None);
        f()
    }

    /// Check if reads would currently be tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The computation reads should subscribe, if any.
    pub(crate) fn current() -> Option<Rc<EffectNode>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of nested contexts, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The popped entry is dropped after the stack borrow ends; it may be
        // the last handle to a computation.
        let popped = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            stack.pop()
        });
        drop(popped);
    }
}
