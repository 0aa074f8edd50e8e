//! Virtual-node rendering.
//!
//! [`VNode`] trees are reconciled against the previously rendered tree by a
//! [`Renderer`], which applies the difference through a pluggable [`Host`].
//! Components render inside tracked computations, so state they read
//! re-renders them through the [`Scheduler`](crate::scheduler::Scheduler).

mod component;
mod host;
mod memory;
mod renderer;
mod sequence;
mod vnode;

pub use component::{
    Binding, ComponentDef, ComponentInstance, DataFn, InstanceProxy, RenderFn, SetupContext,
    SetupFn, SetupResult,
};
pub use host::{Host, HostNode};
pub use memory::{HostOp, MemoryHost};
pub use renderer::Renderer;
pub use sequence::longest_increasing_subsequence;
pub use vnode::{Children, Props, Slot, VKey, VNode, VNodeBuilder, VNodeKind};
