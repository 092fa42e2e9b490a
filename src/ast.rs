//! Element tree produced by the markup parser

/// Node kinds in the element tree. Lowering is a pure match over this
/// closed set; there is no runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The distinguished root; its slot holds the mount target.
    Root,
    /// A regular element (`<div>`, `<h1>`, ...).
    Tag,
    /// `#if` control node, leading a conditional chain.
    If,
    /// `#elseif` control node, consumed by the chain it follows.
    ElseIf,
    /// `#else` control node, consumed by the chain it follows.
    Else,
    /// `#for` loop node.
    For,
    /// A text run or embedded `{expr}` expression.
    Text,
}

impl NodeKind {
    /// Map a hoisted control attribute key to its node kind.
    pub fn from_control_key(key: &str) -> Option<NodeKind> {
        match key {
            "#if" => Some(NodeKind::If),
            "#elseif" => Some(NodeKind::ElseIf),
            "#else" => Some(NodeKind::Else),
            "#for" => Some(NodeKind::For),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(
            self,
            NodeKind::If | NodeKind::ElseIf | NodeKind::Else | NodeKind::For
        )
    }
}

/// One attribute on an element.
///
/// `key` is empty for the synthesized attribute of text nodes and control
/// nodes. `expression` marks the value as translated expression source
/// rather than literal text; `dynamic` marks it as reading instance state.
/// Invariant: `dynamic` implies `expression`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    pub expression: bool,
    pub dynamic: bool,
}

impl Attribute {
    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expression: false,
            dynamic: false,
        }
    }

    /// True for event-binding keys (`@click`, `@input`, ...).
    pub fn is_event(&self) -> bool {
        self.key.starts_with('@')
    }

    /// True for control-flow keys (`#if`, `#for`, ...).
    pub fn is_control(&self) -> bool {
        self.key.starts_with('#')
    }
}

/// A node in the element tree.
///
/// The parser leaves slot assignment to the generator: slot ids are
/// allocated during lowering by a threaded allocator, never stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Tag name for `Tag` nodes, the control keyword for control nodes,
    /// `#root` / `#text` otherwise.
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn root() -> Self {
        Self {
            kind: NodeKind::Root,
            name: "#root".to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Tag,
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(attribute: Attribute) -> Self {
        Self {
            kind: NodeKind::Text,
            name: "#text".to_string(),
            attributes: vec![attribute],
            children: Vec::new(),
        }
    }

    /// Wrap `child` in a control node carrying the hoisted expression.
    pub fn control(kind: NodeKind, name: String, attribute: Attribute, child: Node) -> Self {
        Self {
            kind,
            name,
            attributes: vec![attribute],
            children: vec![child],
        }
    }

    /// Count of nodes in this subtree, excluding the node itself for Root.
    pub fn descendant_count(&self) -> usize {
        let own = if self.kind == NodeKind::Root { 0 } else { 1 };
        own + self
            .children
            .iter()
            .map(Node::descendant_count)
            .sum::<usize>()
    }
}
