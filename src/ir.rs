//! Intermediate representation for generated procedures
//!
//! The generator lowers the element tree into a [`Program`] per subtree: a
//! create/update/destroy triple of primitive operations over numbered
//! slots. A program can be interpreted directly against a node adapter
//! (see `runtime`) or serialized to source text (see `emit`); the lowering
//! algorithm is independent of either target surface.

use std::rc::Rc;

use crate::ast::Attribute;

/// A numbered handle referencing one live node produced by generated
/// code. Slot ids are unique within one compilation unit; nested programs
/// occupy disjoint sub-ranges of the same numbering.
pub type SlotId = usize;

/// An attribute or text value as carried by the IR: either literal text
/// or translated expression source, with the dynamic flag deciding
/// whether it lands in the create or the update fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValue {
    pub source: String,
    pub expression: bool,
    pub dynamic: bool,
}

impl TemplateValue {
    pub fn literal(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            expression: false,
            dynamic: false,
        }
    }

    /// The literal boolean `true`, used for `#else` branch conditions.
    pub fn always() -> Self {
        Self {
            source: "true".to_string(),
            expression: true,
            dynamic: false,
        }
    }
}

impl From<&Attribute> for TemplateValue {
    fn from(attribute: &Attribute) -> Self {
        Self {
            source: attribute.value.clone(),
            expression: attribute.expression,
            dynamic: attribute.dynamic,
        }
    }
}

/// One branch of a conditional chain: the condition (`true` for `#else`)
/// and the independently slot-numbered body.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: TemplateValue,
    pub body: Program,
}

/// Descriptor for a lowered conditional chain, shared by its create,
/// update and destroy ops.
#[derive(Debug, PartialEq)]
pub struct IfChain {
    /// Holds the branch cache at runtime.
    pub state: SlotId,
    /// Placeholder comment anchoring the chain's position.
    pub anchor: SlotId,
    /// Condition list slot (re-declared on every update).
    pub conditions: SlotId,
    /// Portion list slot (declared once at create).
    pub portions: SlotId,
    /// The enclosing element's slot.
    pub parent: SlotId,
    pub branches: Vec<Branch>,
}

/// Descriptor for a lowered `#for` loop, shared by its ops.
#[derive(Debug, PartialEq)]
pub struct ForLoop {
    /// Placeholder comment anchoring the loop's position.
    pub anchor: SlotId,
    /// Per-item procedure factory slot.
    pub factory: SlotId,
    /// Item cache slot (portion per rendered index).
    pub items: SlotId,
    /// Locals cache slot (local scope per rendered index).
    pub locals: SlotId,
    /// The enclosing element's slot.
    pub parent: SlotId,
    /// Loop identifiers: value, then the optional key.
    pub value_identifier: String,
    pub key_identifier: Option<String>,
    /// Source-sequence expression, re-evaluated on every update.
    pub source: TemplateValue,
    pub body: Program,
}

/// A primitive operation of a generated procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Instantiate an element node into a slot.
    CreateElement { slot: SlotId, tag: String },
    /// Instantiate an empty text node into a slot.
    CreateText { slot: SlotId },
    /// Instantiate a comment node into a slot.
    CreateComment { slot: SlotId },
    /// Set an attribute from a literal or evaluated expression.
    SetAttribute {
        slot: SlotId,
        key: String,
        value: TemplateValue,
    },
    /// Set a text node's content.
    SetText { slot: SlotId, value: TemplateValue },
    /// Register an event listener delegating to a handler slot.
    BindEvent {
        slot: SlotId,
        handler: SlotId,
        event: String,
    },
    /// Install the handler closure for a handler slot. Emitted into the
    /// update fragment when the handler expression is dynamic.
    SetHandler {
        handler: SlotId,
        expression: TemplateValue,
    },
    /// Append a slot's node under a parent slot's node.
    Append { slot: SlotId, parent: SlotId },
    /// Mount before a reference node instead of appending.
    InsertBefore {
        slot: SlotId,
        reference: SlotId,
        parent: SlotId,
    },
    /// Detach a slot's node from its parent. Children are detached
    /// transitively by the adapter, not individually enumerated.
    Remove { slot: SlotId, parent: SlotId },
    /// Declare the portion list of a conditional chain (create).
    IfInit(Rc<IfChain>),
    /// Re-evaluate conditions and run the if-directive (update).
    IfApply(Rc<IfChain>),
    /// Tear down the active branch, if any (destroy).
    IfDestroy(Rc<IfChain>),
    /// Declare the factory and empty caches of a loop (create).
    ForInit(Rc<ForLoop>),
    /// Re-evaluate the source and run the for-directive (update).
    ForApply(Rc<ForLoop>),
    /// Run the for-directive with an empty source, forcing teardown.
    ForDestroy(Rc<ForLoop>),
}

/// The procedure triple covering one subtree: `create(target)` builds and
/// attaches all nodes, `update()` re-applies dynamic bindings, and
/// `destroy()` detaches the subtree. Slots `[root, next)` belong to this
/// program; `root` holds the mount target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub root: SlotId,
    pub next: SlotId,
    pub create: Vec<Op>,
    pub update: Vec<Op>,
    pub destroy: Vec<Op>,
}

impl Program {
    /// Number of slots owned by this program, mount target included.
    pub fn slot_count(&self) -> usize {
        self.next - self.root
    }

    /// Count dynamic bindings across this program and all nested ones.
    pub fn dynamic_count(&self) -> usize {
        fn count(ops: &[Op]) -> usize {
            ops.iter()
                .map(|op| match op {
                    Op::SetAttribute { value, .. } | Op::SetText { value, .. } => {
                        usize::from(value.dynamic)
                    }
                    Op::SetHandler { expression, .. } => usize::from(expression.dynamic),
                    Op::IfApply(chain) => chain
                        .branches
                        .iter()
                        .map(|b| usize::from(b.condition.dynamic) + b.body.dynamic_count())
                        .sum(),
                    Op::ForApply(l) => usize::from(l.source.dynamic) + l.body.dynamic_count(),
                    _ => 0,
                })
                .sum()
        }

        count(&self.create) + count(&self.update)
    }
}
