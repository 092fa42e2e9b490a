//! Lowering from the element tree to render programs
//!
//! Walks the tree depth-first and produces a [`Program`] per subtree.
//! Static attributes and text land only in the create fragment; dynamic
//! ones only in update. Conditional chains and loops lower to directive
//! ops over independently slot-numbered nested programs rather than
//! being unrolled.
//!
//! Slot ids come from one allocator threaded by `&mut` through every
//! recursive call, so nested programs can never collide with slots
//! already allocated in an enclosing scope.

use std::rc::Rc;

use crate::ast::{Node, NodeKind};
use crate::ir::{Branch, ForLoop, IfChain, Op, Program, SlotId, TemplateValue};

/// The shared slot counter. Ids are handed out strictly increasing,
/// exactly once each.
#[derive(Debug)]
pub struct SlotAllocator {
    next: SlotId,
}

impl SlotAllocator {
    pub fn new(next: SlotId) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> SlotId {
        let slot = self.next;
        self.next += 1;
        slot
    }

    pub fn position(&self) -> SlotId {
        self.next
    }
}

/// Lower a parsed tree into the top-level program. Slot 0 is reserved
/// for the mount target.
pub fn generate(root: &Node) -> Program {
    let mut allocator = SlotAllocator::new(1);
    generate_tree(&root.children, 0, &mut allocator, None)
}

/// Lower a sibling list into a self-contained program rooted at
/// `root_slot`. `insert` carries the anchor slot nested programs mount
/// before, when the subtree belongs to a directive.
fn generate_tree(
    children: &[Node],
    root_slot: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Program {
    let (create, update, destroy) = lower_siblings(children, root_slot, allocator, insert);

    Program {
        root: root_slot,
        next: allocator.position(),
        create,
        update,
        destroy,
    }
}

type Fragments = (Vec<Op>, Vec<Op>, Vec<Op>);

fn lower_siblings(
    children: &[Node],
    parent: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Fragments {
    let mut create = Vec::new();
    let mut update = Vec::new();
    let mut destroy = Vec::new();

    let mut index = 0;
    while index < children.len() {
        let node = &children[index];

        let (c, u, d) = match node.kind {
            NodeKind::If => {
                // Consume the maximal run of control siblings; the run is
                // generated once, by its leading node.
                let mut end = index + 1;
                while end < children.len() && children[end].kind.is_control()
                    && children[end].kind != NodeKind::For
                {
                    end += 1;
                }
                let run = &children[index..end];
                index = end;
                lower_if(run, parent, allocator, insert)
            }
            // Orphans not preceded by `#if` generate nothing standalone.
            NodeKind::ElseIf | NodeKind::Else => {
                index += 1;
                continue;
            }
            NodeKind::For => {
                index += 1;
                lower_for(node, parent, allocator, insert)
            }
            NodeKind::Text => {
                index += 1;
                lower_text(node, parent, allocator, insert)
            }
            NodeKind::Tag => {
                index += 1;
                lower_tag(node, parent, allocator, insert)
            }
            NodeKind::Root => {
                index += 1;
                continue;
            }
        };

        create.extend(c);
        update.extend(u);
        destroy.extend(d);
    }

    (create, update, destroy)
}

fn mount(slot: SlotId, parent: SlotId, insert: Option<SlotId>) -> Op {
    match insert {
        None => Op::Append { slot, parent },
        Some(reference) => Op::InsertBefore {
            slot,
            reference,
            parent,
        },
    }
}

fn lower_tag(
    node: &Node,
    parent: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Fragments {
    let slot = allocator.allocate();

    let mut create = vec![Op::CreateElement {
        slot,
        tag: node.name.clone(),
    }];
    let mut update = Vec::new();

    for attribute in &node.attributes {
        if attribute.is_event() {
            let handler = allocator.allocate();
            create.push(Op::BindEvent {
                slot,
                handler,
                event: attribute.key[1..].to_string(),
            });

            let op = Op::SetHandler {
                handler,
                expression: TemplateValue::from(attribute),
            };
            if attribute.dynamic {
                update.push(op);
            } else {
                create.push(op);
            }
        } else {
            let op = Op::SetAttribute {
                slot,
                key: attribute.key.clone(),
                value: TemplateValue::from(attribute),
            };
            if attribute.dynamic {
                update.push(op);
            } else {
                create.push(op);
            }
        }
    }

    // Children build into the detached element; the element mounts last.
    // Child destroy fragments are dropped: detaching this node detaches
    // the subtree transitively.
    let (child_create, child_update, _) = lower_siblings(&node.children, slot, allocator, None);
    create.extend(child_create);
    update.extend(child_update);
    create.push(mount(slot, parent, insert));

    (create, update, vec![Op::Remove { slot, parent }])
}

fn lower_text(
    node: &Node,
    parent: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Fragments {
    let slot = allocator.allocate();
    let attribute = &node.attributes[0];

    let mut create = vec![Op::CreateText { slot }];
    let mut update = Vec::new();

    let op = Op::SetText {
        slot,
        value: TemplateValue::from(attribute),
    };
    if attribute.dynamic {
        update.push(op);
    } else {
        create.push(op);
    }

    create.push(mount(slot, parent, insert));

    (create, update, vec![Op::Remove { slot, parent }])
}

fn lower_if(
    run: &[Node],
    parent: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Fragments {
    let state = allocator.allocate();
    let anchor = allocator.allocate();
    let conditions = allocator.allocate();
    let portions = allocator.allocate();

    let mut branches = Vec::with_capacity(run.len());
    for node in run {
        let condition = if node.kind == NodeKind::Else {
            TemplateValue::always()
        } else {
            node.attributes
                .first()
                .map(TemplateValue::from)
                .unwrap_or_else(TemplateValue::always)
        };

        let body_root = allocator.allocate();
        let body = generate_tree(&node.children, body_root, allocator, Some(anchor));
        branches.push(Branch { condition, body });
    }

    let chain = Rc::new(IfChain {
        state,
        anchor,
        conditions,
        portions,
        parent,
        branches,
    });

    (
        vec![
            Op::CreateComment { slot: anchor },
            mount(anchor, parent, insert),
            Op::IfInit(Rc::clone(&chain)),
        ],
        vec![Op::IfApply(Rc::clone(&chain))],
        vec![Op::IfDestroy(chain)],
    )
}

fn lower_for(
    node: &Node,
    parent: SlotId,
    allocator: &mut SlotAllocator,
    insert: Option<SlotId>,
) -> Fragments {
    let anchor = allocator.allocate();
    let factory = allocator.allocate();
    let items = allocator.allocate();
    let locals = allocator.allocate();

    let header = &node.attributes[0];
    let (mut identifiers, source) = parse_for_header(&header.value);
    let source = TemplateValue {
        source,
        expression: header.expression,
        dynamic: header.dynamic,
    };

    let key_identifier = if identifiers.len() > 1 {
        Some(identifiers.remove(1))
    } else {
        None
    };
    let value_identifier = identifiers.into_iter().next().unwrap_or_default();

    let body_root = allocator.allocate();
    let body = generate_tree(&node.children, body_root, allocator, Some(anchor));

    let for_loop = Rc::new(ForLoop {
        anchor,
        factory,
        items,
        locals,
        parent,
        value_identifier,
        key_identifier,
        source,
        body,
    });

    (
        vec![
            Op::CreateComment { slot: anchor },
            mount(anchor, parent, insert),
            Op::ForInit(Rc::clone(&for_loop)),
        ],
        vec![Op::ForApply(Rc::clone(&for_loop))],
        vec![Op::ForDestroy(for_loop)],
    )
}

/// Split a translated loop header into its identifier list and the
/// source-value expression. Identifiers are comma- or ` in `-delimited;
/// the remainder after the last delimiter is the source. The `locals.`
/// qualification added by translation is stripped back off.
fn parse_for_header(header: &str) -> (Vec<String>, String) {
    let chars: Vec<char> = header.chars().collect();
    let mut identifiers = Vec::new();
    let mut current = String::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let keyword = c == ' '
            && chars.get(i + 1) == Some(&'i')
            && chars.get(i + 2) == Some(&'n')
            && chars.get(i + 3) == Some(&' ');

        if c == ',' || keyword {
            if keyword {
                i += 3;
            }
            identifiers.push(strip_locals(current.trim()));
            current.clear();
        } else {
            current.push(c);
        }
        i += 1;
    }

    (identifiers, current.trim().to_string())
}

fn strip_locals(identifier: &str) -> String {
    identifier
        .strip_prefix("locals.")
        .unwrap_or(identifier)
        .to_string()
}
