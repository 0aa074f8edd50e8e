//! Host adapter boundary.
//!
//! The reconciler never touches a concrete UI tree. Every mutation goes
//! through a [`Host`], which owns the real nodes and hands out opaque
//! [`HostNode`] handles.

use crate::reactive::Value;

/// Opaque handle to a node owned by a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(u64);

impl HostNode {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Operations the reconciler needs from the platform.
///
/// `insert` places `node` before `anchor` inside `container`, or at the end
/// when there is no anchor; inserting a node that already has a parent moves
/// it. `remove` must tolerate nodes that are already detached.
pub trait Host {
    fn create_element(&mut self, tag: &str) -> HostNode;

    fn create_text(&mut self, text: &str) -> HostNode;

    fn set_text(&mut self, node: HostNode, text: &str);

    /// Replace all children of `node` with `text`.
    fn set_element_text(&mut self, node: HostNode, text: &str);

    fn insert(&mut self, node: HostNode, container: HostNode, anchor: Option<HostNode>);

    fn remove(&mut self, node: HostNode);

    /// Apply a property change. `new == None` removes the property.
    fn patch_prop(&mut self, node: HostNode, key: &str, old: Option<&Value>, new: Option<&Value>);

    fn parent_node(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;
}
