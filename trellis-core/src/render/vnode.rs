//! Virtual nodes.
//!
//! A [`VNode`] is an immutable description of one renderable unit. The
//! reconciler diffs a new tree against the previous one and records, on the
//! new nodes, the host handle (for text and elements) or the component
//! instance (for components) it ended up with.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::component::{ComponentDef, ComponentInstance};
use super::host::HostNode;
use crate::reactive::Value;

/// Props of an element or component, in declaration order.
pub type Props = IndexMap<String, Value>;

/// A named slot: produces the vnodes to render in place of the slot.
pub type Slot = Rc<dyn Fn() -> Vec<VNode>>;

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VKey {
    Str(Rc<str>),
    Int(i64),
}

impl From<&str> for VKey {
    fn from(key: &str) -> Self {
        VKey::Str(key.into())
    }
}

impl From<String> for VKey {
    fn from(key: String) -> Self {
        VKey::Str(key.into())
    }
}

impl From<i64> for VKey {
    fn from(key: i64) -> Self {
        VKey::Int(key)
    }
}

impl From<i32> for VKey {
    fn from(key: i32) -> Self {
        VKey::Int(i64::from(key))
    }
}

impl From<usize> for VKey {
    fn from(key: usize) -> Self {
        VKey::Int(i64::try_from(key).unwrap_or(i64::MAX))
    }
}

#[derive(Clone)]
pub enum VNodeKind {
    Text,
    Fragment,
    Element(Rc<str>),
    Component(Rc<ComponentDef>),
}

impl PartialEq for VNodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VNodeKind::Text, VNodeKind::Text) => true,
            (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for VNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeKind::Text => f.write_str("Text"),
            VNodeKind::Fragment => f.write_str("Fragment"),
            VNodeKind::Element(tag) => write!(f, "Element({tag})"),
            VNodeKind::Component(def) => write!(f, "Component({})", def.name()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(Rc<str>),
    List(Vec<VNode>),
}

struct VNodeInner {
    kind: VNodeKind,
    key: Option<VKey>,
    props: Option<Rc<Props>>,
    children: Children,
    slots: IndexMap<String, Slot>,
    el: Cell<Option<HostNode>>,
    /// End marker of a fragment.
    anchor: Cell<Option<HostNode>>,
    component: RefCell<Option<Rc<ComponentInstance>>>,
}

/// Shared handle to a virtual node.
#[derive(Clone)]
pub struct VNode(Rc<VNodeInner>);

impl VNode {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        VNodeBuilder::new(VNodeKind::Text).text(text).build()
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        VNodeBuilder::new(VNodeKind::Fragment).children(children).build()
    }

    /// Start building an element node.
    pub fn element(tag: &str) -> VNodeBuilder {
        VNodeBuilder::new(VNodeKind::Element(tag.into()))
    }

    /// Start building a component node.
    pub fn component(def: &Rc<ComponentDef>) -> VNodeBuilder {
        VNodeBuilder::new(VNodeKind::Component(Rc::clone(def)))
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.0.kind
    }

    pub fn key(&self) -> Option<&VKey> {
        self.0.key.as_ref()
    }

    pub fn props(&self) -> Option<&Rc<Props>> {
        self.0.props.as_ref()
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.0.props.as_ref()?.get(key)
    }

    pub fn children(&self) -> &Children {
        &self.0.children
    }

    pub fn slots(&self) -> &IndexMap<String, Slot> {
        &self.0.slots
    }

    /// Text content of a text node, or of an element with text children.
    pub fn text_content(&self) -> Option<&str> {
        match &self.0.children {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Host node this vnode was rendered to, for text and element nodes.
    /// For fragments, the empty text node marking where they start.
    pub fn el(&self) -> Option<HostNode> {
        self.0.el.get()
    }

    pub(crate) fn set_el(&self, el: Option<HostNode>) {
        self.0.el.set(el);
    }

    /// The empty text node marking where a fragment ends.
    pub fn anchor(&self) -> Option<HostNode> {
        self.0.anchor.get()
    }

    pub(crate) fn set_anchor(&self, anchor: Option<HostNode>) {
        self.0.anchor.set(anchor);
    }

    pub fn component_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.0.component.borrow().clone()
    }

    pub(crate) fn set_component_instance(&self, instance: Option<Rc<ComponentInstance>>) {
        *self.0.component.borrow_mut() = instance;
    }

    /// Whether `other` describes the same node across renders: same kind
    /// and same key.
    pub fn is_same_type(&self, other: &VNode) -> bool {
        self.0.kind == other.0.kind && self.0.key == other.0.key
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.0.kind)
            .field("key", &self.0.key)
            .field("children", &self.0.children)
            .field("el", &self.0.el.get())
            .finish()
    }
}

/// Builder for element and component nodes.
pub struct VNodeBuilder {
    kind: VNodeKind,
    key: Option<VKey>,
    props: Option<Rc<Props>>,
    children: Children,
    slots: IndexMap<String, Slot>,
}

impl VNodeBuilder {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: None,
            children: Children::None,
            slots: IndexMap::new(),
        }
    }

    pub fn key(mut self, key: impl Into<VKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add one prop. Shares nothing with other nodes' props.
    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        let props = self.props.get_or_insert_with(Rc::default);
        Rc::make_mut(props).insert(key.to_owned(), value.into());
        self
    }

    /// Use an existing props map. Nodes built from the same `Rc` count as
    /// having unchanged props.
    pub fn props(mut self, props: Rc<Props>) -> Self {
        self.props = Some(props);
        self
    }

    pub fn text(mut self, text: impl Into<Rc<str>>) -> Self {
        self.children = Children::Text(text.into());
        self
    }

    pub fn children(mut self, children: Vec<VNode>) -> Self {
        self.children = Children::List(children);
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        match &mut self.children {
            Children::List(list) => list.push(child),
            _ => self.children = Children::List(vec![child]),
        }
        self
    }

    pub fn slot<F>(mut self, name: &str, slot: F) -> Self
    where
        F: Fn() -> Vec<VNode> + 'static,
    {
        self.slots.insert(name.to_owned(), Rc::new(slot));
        self
    }

    pub fn build(self) -> VNode {
        VNode(Rc::new(VNodeInner {
            kind: self.kind,
            key: self.key,
            props: self.props,
            children: self.children,
            slots: self.slots,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_needs_same_kind_and_key() {
        let a = VNode::element("li").key("a").build();
        let a2 = VNode::element("li").key("a").text("x").build();
        let b = VNode::element("li").key("b").build();
        let p = VNode::element("p").key("a").build();

        assert!(a.is_same_type(&a2));
        assert!(!a.is_same_type(&b));
        assert!(!a.is_same_type(&p));
        assert!(VNode::text("x").is_same_type(&VNode::text("y")));
    }

    #[test]
    fn components_compare_definitions_by_identity() {
        let first = Rc::new(ComponentDef::new("Item"));
        let second = Rc::new(ComponentDef::new("Item"));

        let a = VNode::component(&first).build();
        let b = VNode::component(&first).build();
        let c = VNode::component(&second).build();
        assert!(a.is_same_type(&b));
        assert!(!a.is_same_type(&c));
    }

    #[test]
    fn builder_collects_props_and_children() {
        let shared: Rc<Props> = Rc::new([("id".to_owned(), Value::from("x"))].into_iter().collect());
        let node = VNode::element("ul")
            .props(shared.clone())
            .child(VNode::text("a"))
            .child(VNode::text("b"))
            .build();

        assert!(node.props().is_some_and(|p| Rc::ptr_eq(p, &shared)));
        assert!(matches!(node.children(), Children::List(list) if list.len() == 2));
        assert_eq!(VNode::element("p").text("hi").build().text_content(), Some("hi"));
        assert_eq!(
            VNode::element("a").prop("href", "/").build().prop("href"),
            Some(&Value::from("/"))
        );
    }
}
