//! Reconciler
//!
//! The [`Renderer`] turns virtual node trees into host nodes and keeps them
//! in sync: each new tree is diffed against the previous one and only the
//! differences are applied through the [`Host`].
//!
//! # How Patching Works
//!
//! `patch(old, new)` first checks whether the two nodes describe the same
//! thing (same kind, same key). If not, the old subtree is unmounted and the
//! new one is mounted in its place. Otherwise the work depends on the kind:
//!
//! - Text: update the host text if it changed.
//! - Fragment: diff the children directly inside the parent container,
//!   between the two empty text nodes that mark the fragment's start and end.
//! - Element: reuse the host node, patch props, diff children.
//! - Component: update the instance's props and re-render if they changed.
//!
//! # Keyed Children
//!
//! Two child lists are reconciled in five steps:
//!
//! 1. Patch the common prefix.
//! 2. Patch the common suffix.
//! 3. If only new nodes remain, mount them.
//! 4. If only old nodes remain, unmount them.
//! 5. Otherwise match the middle sections by key, unmount unmatched old
//!    nodes, and walk the new section backwards, mounting new nodes and
//!    moving every matched node that is not part of the longest increasing
//!    subsequence of old positions.
//!
//! Step 5 moves the fewest nodes needed to restore the order.
//!
//! # Components
//!
//! Every component renders inside its own tracked computation. A change to
//! anything the render read queues the component's job on the
//! [`Scheduler`]; the job re-renders and patches the component's previous
//! subtree. A parent passing new props updates the child synchronously.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::component::ComponentInstance;
use super::host::{Host, HostNode};
use super::sequence::longest_increasing_subsequence;
use super::vnode::{Children, Props, VKey, VNode, VNodeKind};
use crate::reactive::ReactiveEffect;
use crate::scheduler::{Job, Scheduler};

struct RendererInner<H: Host + 'static> {
    host: RefCell<H>,
    /// Last tree rendered into each container.
    roots: RefCell<HashMap<HostNode, VNode>>,
}

/// Renders virtual node trees through a [`Host`].
///
/// Clones share the host and the rendered trees.
pub struct Renderer<H: Host + 'static> {
    inner: Rc<RendererInner<H>>,
}

impl<H: Host + 'static> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host + 'static> Renderer<H> {
    pub fn new(host: H) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host: RefCell::new(host),
                roots: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Render `vnode` into `container`, patching whatever was rendered there
    /// before. `None` unmounts the previous tree.
    pub fn render(&self, vnode: Option<VNode>, container: HostNode) {
        let previous = self.inner.roots.borrow().get(&container).cloned();
        match vnode {
            Some(vnode) => {
                self.inner.patch(previous.as_ref(), &vnode, container, None);
                self.inner.roots.borrow_mut().insert(container, vnode);
            }
            None => {
                if let Some(previous) = previous {
                    self.inner.unmount(&previous, true);
                }
                self.inner.roots.borrow_mut().remove(&container);
            }
        }
    }

    /// Patch `old` into `new` inside `container`, inserting before `anchor`
    /// when something has to be mounted.
    pub fn patch(&self, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        self.inner.patch(old, new, container, anchor);
    }

    /// Unmount `vnode`, removing its host nodes.
    pub fn unmount(&self, vnode: &VNode) {
        self.inner.unmount(vnode, true);
    }

    /// The tree last rendered into `container`.
    pub fn root(&self, container: HostNode) -> Option<VNode> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    /// Access the host, e.g. to inspect a [`MemoryHost`](super::MemoryHost).
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }
}

impl<H: Host + 'static> RendererInner<H> {
    fn host(&self) -> std::cell::RefMut<'_, H> {
        self.host.borrow_mut()
    }

    fn patch(self: &Rc<Self>, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if old.ptr_eq(new) => return,
            Some(old) if !old.is_same_type(new) => {
                anchor = self.next_host_node(old).or(anchor);
                self.unmount(old, true);
                None
            }
            other => other,
        };

        match new.kind() {
            VNodeKind::Text => self.process_text(old, new, container, anchor),
            VNodeKind::Fragment => self.process_fragment(old, new, container, anchor),
            VNodeKind::Element(tag) => self.process_element(old, new, tag, container, anchor),
            VNodeKind::Component(_) => self.process_component(old, new, container, anchor),
        }
    }

    // ------------------------------------------------------------------------
    // Text, fragments and elements
    // ------------------------------------------------------------------------

    fn process_text(&self, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let text = new.text_content().unwrap_or_default();
        match old {
            None => {
                let el = self.host().create_text(text);
                new.set_el(Some(el));
                self.host().insert(el, container, anchor);
            }
            Some(old) => {
                let el = old.el();
                new.set_el(el);
                if let Some(el) = el {
                    if old.text_content() != new.text_content() {
                        self.host().set_text(el, text);
                    }
                }
            }
        }
    }

    fn process_fragment(
        self: &Rc<Self>,
        old: Option<&VNode>,
        new: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        match old {
            None => {
                let start = self.host().create_text("");
                let end = self.host().create_text("");
                new.set_el(Some(start));
                new.set_anchor(Some(end));
                self.host().insert(start, container, anchor);
                self.host().insert(end, container, anchor);
                if let Children::List(children) = new.children() {
                    self.mount_children(children, container, Some(end));
                }
            }
            Some(old) => {
                new.set_el(old.el());
                new.set_anchor(old.anchor());
                self.patch_children(old, new, container, old.anchor().or(anchor));
            }
        }
    }

    fn process_element(
        self: &Rc<Self>,
        old: Option<&VNode>,
        new: &VNode,
        tag: &str,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        match old {
            None => self.mount_element(new, tag, container, anchor),
            Some(old) => self.patch_element(old, new),
        }
    }

    fn mount_element(self: &Rc<Self>, vnode: &VNode, tag: &str, container: HostNode, anchor: Option<HostNode>) {
        let el = self.host().create_element(tag);
        vnode.set_el(Some(el));
        if let Some(props) = vnode.props() {
            for (key, value) in props.iter() {
                self.host().patch_prop(el, key, None, Some(value));
            }
        }
        match vnode.children() {
            Children::Text(text) => self.host().set_element_text(el, text),
            Children::List(children) => self.mount_children(children, el, None),
            Children::None => {}
        }
        self.host().insert(el, container, anchor);
    }

    fn patch_element(self: &Rc<Self>, old: &VNode, new: &VNode) {
        let el = old.el();
        new.set_el(el);
        let Some(el) = el else {
            return;
        };
        match (old.props(), new.props()) {
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => {}
            (a, b) => self.patch_props(el, a.map(|p| &**p), b.map(|p| &**p)),
        }
        self.patch_children(old, new, el, None);
    }

    /// Apply every new prop and remove every old prop the new set lacks.
    fn patch_props(&self, el: HostNode, old: Option<&Props>, new: Option<&Props>) {
        if let Some(new) = new {
            for (key, value) in new {
                let previous = old.and_then(|o| o.get(key));
                self.host().patch_prop(el, key, previous, Some(value));
            }
        }
        if let Some(old) = old {
            for (key, value) in old {
                if !new.is_some_and(|n| n.contains_key(key)) {
                    self.host().patch_prop(el, key, Some(value), None);
                }
            }
        }
    }

    fn mount_children(self: &Rc<Self>, children: &[VNode], container: HostNode, anchor: Option<HostNode>) {
        for child in children {
            self.patch(None, child, container, anchor);
        }
    }

    fn unmount_children(self: &Rc<Self>, children: &[VNode]) {
        for child in children {
            self.unmount(child, true);
        }
    }

    /// Reconcile the children of `old` and `new`: each side is either
    /// absent, text or a list.
    fn patch_children(
        self: &Rc<Self>,
        old: &VNode,
        new: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        match (old.children(), new.children()) {
            (Children::List(c1), Children::Text(text)) => {
                self.unmount_children(c1);
                self.host().set_element_text(container, text);
            }
            (Children::Text(previous), Children::Text(text)) => {
                if previous != text {
                    self.host().set_element_text(container, text);
                }
            }
            (Children::None, Children::Text(text)) => {
                self.host().set_element_text(container, text);
            }
            (Children::List(c1), Children::List(c2)) => {
                self.patch_keyed_children(c1, c2, container, anchor);
            }
            (Children::List(c1), Children::None) => self.unmount_children(c1),
            (Children::Text(_), Children::List(c2)) => {
                self.host().set_element_text(container, "");
                self.mount_children(c2, container, anchor);
            }
            (Children::Text(_), Children::None) => {
                self.host().set_element_text(container, "");
            }
            (Children::None, Children::List(c2)) => self.mount_children(c2, container, anchor),
            (Children::None, Children::None) => {}
        }
    }

    fn patch_keyed_children(
        self: &Rc<Self>,
        c1: &[VNode],
        c2: &[VNode],
        container: HostNode,
        parent_anchor: Option<HostNode>,
    ) {
        let mut i = 0;
        let mut end1 = c1.len();
        let mut end2 = c2.len();

        // 1. common prefix
        while i < end1 && i < end2 && c1[i].is_same_type(&c2[i]) {
            self.patch(Some(&c1[i]), &c2[i], container, None);
            i += 1;
        }

        // 2. common suffix
        while i < end1 && i < end2 && c1[end1 - 1].is_same_type(&c2[end2 - 1]) {
            self.patch(Some(&c1[end1 - 1]), &c2[end2 - 1], container, None);
            end1 -= 1;
            end2 -= 1;
        }

        // 3. only new nodes left
        if i >= end1 {
            if i < end2 {
                let anchor = self.anchor_at(c2, end2, parent_anchor);
                for node in &c2[i..end2] {
                    self.patch(None, node, container, anchor);
                }
            }
            return;
        }

        // 4. only old nodes left
        if i >= end2 {
            for node in &c1[i..end1] {
                self.unmount(node, true);
            }
            return;
        }

        // 5. unknown middle sections
        let (s1, s2) = (i, i);
        let mut key_to_new: HashMap<&VKey, usize> = HashMap::new();
        for (index, node) in c2.iter().enumerate().take(end2).skip(s2) {
            if let Some(key) = node.key() {
                key_to_new.entry(key).or_insert(index);
            }
        }

        // new index - s2 -> old index + 1, 0 for nodes with no old match
        let mut new_to_old = vec![0usize; end2 - s2];
        for (old_index, prev) in c1.iter().enumerate().take(end1).skip(s1) {
            let new_index = match prev.key() {
                Some(key) => key_to_new.get(key).copied(),
                None => (s2..end2).find(|&j| {
                    new_to_old[j - s2] == 0 && c2[j].key().is_none() && prev.is_same_type(&c2[j])
                }),
            };
            match new_index {
                Some(j) if new_to_old[j - s2] == 0 => {
                    new_to_old[j - s2] = old_index + 1;
                    self.patch(Some(prev), &c2[j], container, None);
                }
                _ => self.unmount(prev, true),
            }
        }

        let stable = longest_increasing_subsequence(&new_to_old);
        let mut remaining = stable.len();
        for offset in (0..new_to_old.len()).rev() {
            let index = s2 + offset;
            let node = &c2[index];
            let anchor = self.anchor_at(c2, index + 1, parent_anchor);
            if new_to_old[offset] == 0 {
                self.patch(None, node, container, anchor);
            } else if remaining > 0 && stable[remaining - 1] == offset {
                remaining -= 1;
            } else {
                self.move_node(node, container, anchor);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Host node lookup and moves
    // ------------------------------------------------------------------------

    /// First host node of the first sibling from `from` on that has one.
    fn anchor_at(&self, siblings: &[VNode], from: usize, parent_anchor: Option<HostNode>) -> Option<HostNode> {
        siblings
            .iter()
            .skip(from)
            .find_map(|node| self.first_host_node(node))
            .or(parent_anchor)
    }

    fn first_host_node(&self, vnode: &VNode) -> Option<HostNode> {
        match vnode.kind() {
            VNodeKind::Text | VNodeKind::Element(_) => vnode.el(),
            VNodeKind::Fragment => vnode.el(),
            VNodeKind::Component(_) => vnode
                .component_instance()
                .and_then(|i| i.sub_tree())
                .and_then(|tree| self.first_host_node(&tree)),
        }
    }

    fn last_host_node(&self, vnode: &VNode) -> Option<HostNode> {
        match vnode.kind() {
            VNodeKind::Text | VNodeKind::Element(_) => vnode.el(),
            VNodeKind::Fragment => vnode.anchor(),
            VNodeKind::Component(_) => vnode
                .component_instance()
                .and_then(|i| i.sub_tree())
                .and_then(|tree| self.last_host_node(&tree)),
        }
    }

    /// Host sibling following everything `vnode` rendered.
    fn next_host_node(&self, vnode: &VNode) -> Option<HostNode> {
        let last = self.last_host_node(vnode)?;
        self.host.borrow().next_sibling(last)
    }

    fn move_node(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match vnode.kind() {
            VNodeKind::Text | VNodeKind::Element(_) => {
                if let Some(el) = vnode.el() {
                    self.host().insert(el, container, anchor);
                }
            }
            VNodeKind::Fragment => {
                if let Some(start) = vnode.el() {
                    self.host().insert(start, container, anchor);
                }
                if let Children::List(children) = vnode.children() {
                    for child in children {
                        self.move_node(child, container, anchor);
                    }
                }
                if let Some(end) = vnode.anchor() {
                    self.host().insert(end, container, anchor);
                }
            }
            VNodeKind::Component(_) => {
                if let Some(tree) = vnode.component_instance().and_then(|i| i.sub_tree()) {
                    self.move_node(&tree, container, anchor);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Unmounting
    // ------------------------------------------------------------------------

    /// Unmount `vnode`. Host nodes are removed only when `remove` is set;
    /// descendants of a removed element are detached along with it and only
    /// need their components stopped.
    fn unmount(self: &Rc<Self>, vnode: &VNode, remove: bool) {
        match vnode.kind() {
            VNodeKind::Component(_) => {
                if let Some(instance) = vnode.component_instance() {
                    self.unmount_component(&instance, remove);
                }
            }
            VNodeKind::Fragment => {
                if let Children::List(children) = vnode.children() {
                    for child in children {
                        self.unmount(child, remove);
                    }
                }
                if remove {
                    for marker in [vnode.el(), vnode.anchor()].into_iter().flatten() {
                        self.host().remove(marker);
                    }
                }
            }
            VNodeKind::Element(_) => {
                if let Children::List(children) = vnode.children() {
                    for child in children {
                        self.unmount(child, false);
                    }
                }
                if remove {
                    if let Some(el) = vnode.el() {
                        self.host().remove(el);
                    }
                }
            }
            VNodeKind::Text => {
                if remove {
                    if let Some(el) = vnode.el() {
                        self.host().remove(el);
                    }
                }
            }
        }
    }

    fn unmount_component(self: &Rc<Self>, instance: &Rc<ComponentInstance>, remove: bool) {
        if instance.is_unmounted() {
            return;
        }
        if let Some(job) = instance.job() {
            Scheduler::cancel(job.id());
        }
        if let Some(effect) = instance.mark_unmounted() {
            effect.stop();
        }
        if let Some(tree) = instance.sub_tree() {
            self.unmount(&tree, remove);
        }
        debug!(component = %instance.name(), "component unmounted");
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    fn process_component(self: &Rc<Self>, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match old {
            None => self.mount_component(new, container, anchor),
            Some(old) => self.update_component(old, new),
        }
    }

    fn mount_component(self: &Rc<Self>, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let VNodeKind::Component(def) = vnode.kind() else {
            return;
        };
        let instance = ComponentInstance::create(Rc::clone(def), vnode);
        vnode.set_component_instance(Some(instance.clone()));

        let renderer: Weak<Self> = Rc::downgrade(self);
        let this: Weak<ComponentInstance> = Rc::downgrade(&instance);
        let effect = ReactiveEffect::new(move || {
            if let (Some(renderer), Some(instance)) = (renderer.upgrade(), this.upgrade()) {
                renderer.render_component(&instance, container, anchor);
            }
        });

        let weak_effect = effect.downgrade();
        let job = Job::new(move || {
            if let Some(effect) = weak_effect.upgrade() {
                if effect.is_active() {
                    effect.run();
                }
            }
        });
        let queued = job.clone();
        effect.set_scheduler(Some(Rc::new(move || Scheduler::queue(&queued))));

        instance.install(effect.clone(), job, container);
        effect.run();
    }

    /// Body of a component's render computation.
    fn render_component(self: &Rc<Self>, instance: &Rc<ComponentInstance>, container: HostNode, anchor: Option<HostNode>) {
        if instance.is_unmounted() {
            return;
        }
        if !instance.is_mounted() {
            let tree = instance.render_tree();
            self.patch(None, &tree, container, anchor);
            instance.set_sub_tree(tree);
            instance.mark_mounted();
            debug!(component = %instance.name(), "component mounted");
            return;
        }

        // Pending props are written while this computation is running, so
        // they do not schedule it again.
        if let Some(next) = instance.take_next() {
            instance.update_pre_render(&next);
        }
        let next_tree = instance.render_tree();
        let Some(previous) = instance.sub_tree() else {
            return;
        };
        let parent = self
            .first_host_node(&previous)
            .and_then(|node| self.host.borrow().parent_node(node))
            .or(instance.container())
            .unwrap_or(container);
        let anchor = self.next_host_node(&previous);
        instance.set_sub_tree(next_tree.clone());
        self.patch(Some(&previous), &next_tree, parent, anchor);
        debug!(component = %instance.name(), renders = instance.render_count(), "component updated");
    }

    fn update_component(self: &Rc<Self>, old: &VNode, new: &VNode) {
        let Some(instance) = old.component_instance() else {
            return;
        };
        new.set_component_instance(Some(instance.clone()));
        if should_update(old, new) {
            instance.set_next(new.clone());
            if let Some(job) = instance.job() {
                Scheduler::cancel(job.id());
            }
            instance.update();
        } else {
            instance.adopt(new);
        }
    }
}

/// Whether a component vnode's props differ from the previous vnode's:
/// not the same map, and either a different number of keys or some key
/// holding a different value.
fn should_update(old: &VNode, new: &VNode) -> bool {
    match (old.props(), new.props()) {
        (Some(a), Some(b)) if Rc::ptr_eq(a, b) => false,
        (None, None) => false,
        (a, b) => props_changed(a.map(|p| &**p), b.map(|p| &**p)),
    }
}

fn props_changed(old: Option<&Props>, new: Option<&Props>) -> bool {
    let empty = Props::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);
    old.len() != new.len() || new.iter().any(|(key, value)| old.get(key) != Some(value))
}
