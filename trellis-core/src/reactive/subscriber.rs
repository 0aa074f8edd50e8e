//! Subscriber types for the reactive system.
//!
//! A subscriber is any tracked computation that depends on reactive values:
//! plain effects, computed values, watchers and component renders all share
//! the same [`EffectNode`](super::effect::EffectNode) bookkeeping.

use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectNode;

/// Unique identifier for a subscriber.
///
/// Dependency sets are keyed by this ID so that lookups and removals do not
/// depend on pointer identity of the subscriber allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in a dependency set.
///
/// `track_id` is the subscriber's run generation at the time it last read
/// the set. A matching generation means "already subscribed during this
/// run"; a stale one marks the entry as left over from an earlier run.
pub(crate) struct Subscription {
    pub(crate) node: Weak<EffectNode>,
    pub(crate) track_id: u64,
}
