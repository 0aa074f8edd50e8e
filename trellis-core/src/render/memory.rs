//! An in-memory [`Host`].
//!
//! `MemoryHost` keeps a plain node tree plus a log of every operation the
//! reconciler issued, which makes it the host of choice for tests and
//! benchmarks: assertions can look at the resulting markup or count the
//! exact mutations a patch performed.

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::host::{Host, HostNode};
use crate::reactive::Value;

/// One mutation issued through the [`Host`] interface.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: HostNode, tag: String },
    CreateText { node: HostNode, text: String },
    SetText { node: HostNode, text: String },
    SetElementText { node: HostNode, text: String },
    Insert { node: HostNode, container: HostNode, anchor: Option<HostNode> },
    Remove { node: HostNode },
    PatchProp { node: HostNode, key: String, value: Option<Value> },
}

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attrs: IndexMap<String, Value>,
    },
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    data: NodeData,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

/// Host that renders into an in-memory tree.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: HashMap<HostNode, MemoryNode>,
    next_id: u64,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, data: NodeData) -> HostNode {
        let node = HostNode::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            node,
            MemoryNode {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        node
    }

    /// Create a detached container element. Not recorded in the log.
    pub fn create_root(&mut self) -> HostNode {
        self.alloc(NodeData::Element {
            tag: "root".to_owned(),
            attrs: IndexMap::new(),
        })
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: HostNode) -> Option<&str> {
        match &self.nodes.get(&node)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn attr(&self, node: HostNode, key: &str) -> Option<&Value> {
        match &self.nodes.get(&node)?.data {
            NodeData::Element { attrs, .. } => attrs.get(key),
            NodeData::Text(_) => None,
        }
    }

    /// Text content of `node` and all its descendants.
    pub fn text(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: HostNode, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        if let NodeData::Text(text) = &n.data {
            out.push_str(text);
        }
        for &child in &n.children {
            self.collect_text(child, out);
        }
    }

    /// Markup for `node` itself, including its own tag.
    pub fn serialize(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    /// Markup for the children of `node`.
    pub fn inner_markup(&self, node: HostNode) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, node: HostNode, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        match &n.data {
            NodeData::Text(text) => out.push_str(&escape(text)),
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attrs {
                    let rendered = match value {
                        Value::Null | Value::Func(_) => continue,
                        Value::Str(s) => s.to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Int(i) => i.to_string(),
                        Value::Float(f) => f.to_string(),
                        other => other.to_json().to_string(),
                    };
                    let _ = write!(out, " {key}=\"{}\"", escape(&rendered));
                }
                out.push('>');
                for &child in &n.children {
                    self.write_node(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn detach(&mut self, node: HostNode) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|&c| c != node);
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostNode {
        let node = self.alloc(NodeData::Element {
            tag: tag.to_owned(),
            attrs: IndexMap::new(),
        });
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_owned(),
        });
        node
    }

    fn create_text(&mut self, text: &str) -> HostNode {
        let node = self.alloc(NodeData::Text(text.to_owned()));
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_owned(),
        });
        node
    }

    fn set_text(&mut self, node: HostNode, text: &str) {
        if let Some(NodeData::Text(content)) = self.nodes.get_mut(&node).map(|n| &mut n.data) {
            *content = text.to_owned();
        }
        self.ops.push(HostOp::SetText {
            node,
            text: text.to_owned(),
        });
    }

    fn set_element_text(&mut self, node: HostNode, text: &str) {
        for child in self.children(node) {
            self.detach(child);
        }
        if !text.is_empty() {
            let child = self.alloc(NodeData::Text(text.to_owned()));
            if let Some(n) = self.nodes.get_mut(&child) {
                n.parent = Some(node);
            }
            if let Some(n) = self.nodes.get_mut(&node) {
                n.children.push(child);
            }
        }
        self.ops.push(HostOp::SetElementText {
            node,
            text: text.to_owned(),
        });
    }

    fn insert(&mut self, node: HostNode, container: HostNode, anchor: Option<HostNode>) {
        self.detach(node);
        if let Some(parent) = self.nodes.get_mut(&container) {
            let position = anchor
                .and_then(|a| parent.children.iter().position(|&c| c == a))
                .unwrap_or(parent.children.len());
            parent.children.insert(position, node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(container);
        }
        self.ops.push(HostOp::Insert {
            node,
            container,
            anchor,
        });
    }

    fn remove(&mut self, node: HostNode) {
        self.detach(node);
        self.ops.push(HostOp::Remove { node });
    }

    fn patch_prop(&mut self, node: HostNode, key: &str, _old: Option<&Value>, new: Option<&Value>) {
        if let Some(NodeData::Element { attrs, .. }) = self.nodes.get_mut(&node).map(|n| &mut n.data) {
            match new {
                Some(value) => {
                    attrs.insert(key.to_owned(), value.clone());
                }
                None => {
                    attrs.shift_remove(key);
                }
            }
        }
        self.ops.push(HostOp::PatchProp {
            node,
            key: key.to_owned(),
            value: new.cloned(),
        });
    }

    fn parent_node(&self, node: HostNode) -> Option<HostNode> {
        self.nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let parent = self.parent_node(node)?;
        let siblings = &self.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_respects_anchor_and_moves() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");
        host.insert(a, root, None);
        host.insert(c, root, None);
        host.insert(b, root, Some(c));
        assert_eq!(host.inner_markup(root), "abc");

        host.insert(c, root, Some(a));
        assert_eq!(host.inner_markup(root), "cab");
        assert_eq!(host.next_sibling(c), Some(a));
        assert_eq!(host.next_sibling(b), None);
        assert_eq!(host.parent_node(a), Some(root));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let el = host.create_element("p");
        host.insert(el, root, None);
        host.remove(el);
        host.remove(el);
        assert_eq!(host.inner_markup(root), "");
        assert_eq!(host.parent_node(el), None);
    }

    #[test]
    fn serialize_renders_attributes_and_text() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let el = host.create_element("a");
        host.patch_prop(el, "href", None, Some(&Value::from("/x?a&b")));
        host.patch_prop(el, "onClick", None, Some(&Value::Func(crate::reactive::Callback::new(|_| {}))));
        host.set_element_text(el, "<link>");
        host.insert(el, root, None);

        assert_eq!(
            host.inner_markup(root),
            "<a href=\"/x?a&amp;b\">&lt;link&gt;</a>"
        );
        assert_eq!(host.text(root), "<link>");

        host.patch_prop(el, "href", None, None);
        host.set_element_text(el, "");
        assert_eq!(host.serialize(el), "<a></a>");
    }
}
