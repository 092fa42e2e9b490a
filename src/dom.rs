//! Node adapter interface and in-memory tree
//!
//! Generated procedures never touch a concrete tree implementation
//! directly; they go through [`NodeAdapter`]. [`MemoryDom`] is the
//! built-in adapter: an arena-backed node tree with synthetic event
//! dispatch and an HTML serializer, used by tests and headless
//! rendering.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// An installed event listener. Receives the synthetic event payload.
pub type EventHandler = Rc<dyn Fn(&Value)>;

/// The mutation surface a generated procedure runs against.
pub trait NodeAdapter {
    /// Opaque node reference. Cheap to clone and compare.
    type Handle: Clone + PartialEq + fmt::Debug;

    fn create_element(&mut self, tag: &str) -> Self::Handle;
    fn create_text_node(&mut self, content: &str) -> Self::Handle;
    fn create_comment(&mut self) -> Self::Handle;
    fn set_attribute(&mut self, node: &Self::Handle, key: &str, value: &str);
    fn add_event_listener(&mut self, node: &Self::Handle, event: &str, handler: EventHandler);
    fn set_text_content(&mut self, node: &Self::Handle, content: &str);
    fn append_child(&mut self, parent: &Self::Handle, child: &Self::Handle);
    fn remove_child(&mut self, parent: &Self::Handle, child: &Self::Handle);
    fn insert_before(
        &mut self,
        parent: &Self::Handle,
        node: &Self::Handle,
        reference: &Self::Handle,
    );
}

/// Arena index of a [`MemoryDom`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

enum NodeKind {
    Element {
        tag: String,
        // BTreeMap keeps serialized attribute order deterministic.
        attributes: BTreeMap<String, String>,
    },
    Text(String),
    Comment,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<(String, EventHandler)>,
}

/// In-memory node tree. Nodes are never freed; detached subtrees simply
/// lose their parent link, which matches how generated destroy fragments
/// detach whole subtrees with a single remove.
#[derive(Default)]
pub struct MemoryDom {
    nodes: Vec<NodeData>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Fire a synthetic event on a node. Listeners are collected before
    /// invocation so a handler may mutate the tree while running.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: &Value) {
        let matching: Vec<EventHandler> = self.nodes[node.0]
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in matching {
            handler(payload);
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attributes, .. } => attributes.get(key).map(String::as_str),
            _ => None,
        }
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Serialize a node and its subtree to HTML-like text.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    /// Serialize only a node's children, useful for mount targets.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[node.0].children {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attributes {
                    out.push_str(&format!(" {key}=\"{value}\""));
                }
                out.push('>');
                for child in &self.nodes[node.0].children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            NodeKind::Text(content) => out.push_str(content),
            NodeKind::Comment => out.push_str("<!---->"),
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != child);
        }
    }
}

impl NodeAdapter for MemoryDom {
    type Handle = NodeId;

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
        })
    }

    fn create_text_node(&mut self, content: &str) -> NodeId {
        self.push(NodeKind::Text(content.to_string()))
    }

    fn create_comment(&mut self) -> NodeId {
        self.push(NodeKind::Comment)
    }

    fn set_attribute(&mut self, node: &NodeId, key: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[node.0].kind {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    fn add_event_listener(&mut self, node: &NodeId, event: &str, handler: EventHandler) {
        self.nodes[node.0]
            .listeners
            .push((event.to_string(), handler));
    }

    fn set_text_content(&mut self, node: &NodeId, content: &str) {
        if let NodeKind::Text(text) = &mut self.nodes[node.0].kind {
            *text = content.to_string();
        }
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.detach(*child);
        self.nodes[child.0].parent = Some(*parent);
        self.nodes[parent.0].children.push(*child);
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) {
        if self.nodes[child.0].parent == Some(*parent) {
            self.detach(*child);
        }
    }

    fn insert_before(&mut self, parent: &NodeId, node: &NodeId, reference: &NodeId) {
        self.detach(*node);
        self.nodes[node.0].parent = Some(*parent);
        let children = &mut self.nodes[parent.0].children;
        match children.iter().position(|c| c == reference) {
            Some(index) => children.insert(index, *node),
            None => children.push(*node),
        }
    }
}
