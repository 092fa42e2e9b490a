//! Direct interpretation of render programs
//!
//! A [`View`] instantiates one [`Program`] against a node adapter:
//! `create` builds and mounts the nodes, `update` re-applies dynamic
//! bindings from current state, `destroy` detaches the subtree. Nested
//! programs (conditional branches, loop items) run as child views whose
//! slot frames chain to the enclosing view, so an op may reference an
//! outer slot (its parent element, a directive anchor) while every
//! branch or item instance keeps private storage for its own slots.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::directives::{directive_for, directive_if, new_scope, LocalScope, Portion};
use crate::dom::{EventHandler, NodeAdapter};
use crate::error::{Error, Result};
use crate::eval::{self, Expr};
use crate::ir::{ForLoop, Op, Program, SlotId, TemplateValue};

/// Shared instance state, read by expression evaluation and written by
/// the component layer.
pub type StateMap = Rc<RefCell<Map<String, Value>>>;

/// Receives method calls made from event-handler expressions.
pub type MethodDispatcher = Rc<dyn Fn(&str, Vec<Value>)>;

/// Everything op execution needs besides the view's own slot storage.
pub struct Runtime<A: NodeAdapter> {
    pub dom: A,
    pub state: StateMap,
    pub methods: MethodDispatcher,
}

impl<A: NodeAdapter> Runtime<A> {
    pub fn new(dom: A) -> Self {
        Self {
            dom,
            state: Rc::new(RefCell::new(Map::new())),
            methods: Rc::new(|_, _| {}),
        }
    }

    pub fn with_methods(mut self, methods: MethodDispatcher) -> Self {
        self.methods = methods;
        self
    }
}

/// Lexically chained slot storage. A frame owns the slot range of its
/// program; reads and writes outside that range route to the parent.
struct Frame<H> {
    base: SlotId,
    slots: RefCell<Vec<Option<H>>>,
    parent: Option<Rc<Frame<H>>>,
}

impl<H: Clone> Frame<H> {
    fn new(base: SlotId, len: usize, parent: Option<Rc<Frame<H>>>) -> Rc<Self> {
        Rc::new(Self {
            base,
            slots: RefCell::new(vec![None; len]),
            parent,
        })
    }

    fn owns(&self, slot: SlotId) -> bool {
        slot >= self.base && slot - self.base < self.slots.borrow().len()
    }

    fn set(&self, slot: SlotId, handle: H) {
        if self.owns(slot) {
            self.slots.borrow_mut()[slot - self.base] = Some(handle);
        } else if let Some(parent) = &self.parent {
            parent.set(slot, handle);
        }
    }

    fn get(&self, slot: SlotId) -> Option<H> {
        if self.owns(slot) {
            self.slots.borrow()[slot - self.base].clone()
        } else {
            self.parent.as_ref().and_then(|p| p.get(slot))
        }
    }
}

/// An installed handler expression plus the scope it closed over.
#[derive(Clone)]
struct Handler {
    expr: Expr,
    locals: LocalScope,
}

type HandlerCell = Rc<RefCell<Option<Handler>>>;

impl Handler {
    /// Run the handler for one event. A call form dispatches to an
    /// instance method after evaluating its arguments; any other
    /// expression is evaluated for its result, which is discarded.
    fn invoke(&self, state: &StateMap, methods: &MethodDispatcher, payload: &Value) -> Result<()> {
        let mut locals = self.locals.borrow().clone();
        locals.insert("$event".to_string(), payload.clone());

        match &self.expr {
            Expr::Call { path, args } => {
                let mut evaluated = Vec::with_capacity(args.len());
                {
                    let instance = state.borrow();
                    let scope = eval::Scope {
                        instance: &instance,
                        locals: &locals,
                    };
                    for arg in args {
                        evaluated.push(eval::evaluate(arg, &scope)?);
                    }
                }
                // State is released before dispatch; methods mutate it.
                let name = path.last().map(String::as_str).unwrap_or_default();
                methods(name, evaluated);
            }
            other => {
                let instance = state.borrow();
                let scope = eval::Scope {
                    instance: &instance,
                    locals: &locals,
                };
                eval::evaluate(other, &scope)?;
            }
        }
        Ok(())
    }
}

struct IfState<A: NodeAdapter> {
    active: Option<usize>,
    portions: Vec<LivePortion<A>>,
}

struct ForState<A: NodeAdapter> {
    items: Vec<LivePortion<A>>,
    locals: Vec<LocalScope>,
    target: A::Handle,
}

/// One live instantiation of a program.
pub struct View<A: NodeAdapter> {
    program: Rc<Program>,
    frame: Rc<Frame<A::Handle>>,
    locals: LocalScope,
    handlers: HashMap<SlotId, HandlerCell>,
    if_states: HashMap<SlotId, IfState<A>>,
    for_states: HashMap<SlotId, ForState<A>>,
}

impl<A: NodeAdapter> View<A> {
    pub fn new(program: Program) -> Self {
        Self::nested(Rc::new(program), None, new_scope())
    }

    fn nested(
        program: Rc<Program>,
        parent: Option<Rc<Frame<A::Handle>>>,
        locals: LocalScope,
    ) -> Self {
        let frame = Frame::new(program.root, program.next - program.root, parent);
        Self {
            program,
            frame,
            locals,
            handlers: HashMap::new(),
            if_states: HashMap::new(),
            for_states: HashMap::new(),
        }
    }

    /// Build and mount all nodes under `target`.
    pub fn create(&mut self, rt: &mut Runtime<A>, target: A::Handle) -> Result<()> {
        self.frame.set(self.program.root, target);
        let program = Rc::clone(&self.program);
        for op in &program.create {
            self.step(rt, op)?;
        }
        Ok(())
    }

    /// Re-apply every dynamic binding from current state.
    pub fn update(&mut self, rt: &mut Runtime<A>) -> Result<()> {
        let program = Rc::clone(&self.program);
        for op in &program.update {
            self.step(rt, op)?;
        }
        Ok(())
    }

    /// Detach the subtree from its mount target.
    pub fn destroy(&mut self, rt: &mut Runtime<A>) -> Result<()> {
        let program = Rc::clone(&self.program);
        for op in &program.destroy {
            self.step(rt, op)?;
        }
        Ok(())
    }

    fn node(&self, slot: SlotId) -> Result<A::Handle> {
        self.frame
            .get(slot)
            .ok_or_else(|| Error::Runtime(format!("slot m{slot} is unset")))
    }

    fn eval_value(&self, rt: &Runtime<A>, source: &str) -> Result<Value> {
        let expr = eval::parse(source)?;
        let instance = rt.state.borrow();
        let locals = self.locals.borrow();
        eval::evaluate(
            &expr,
            &eval::Scope {
                instance: &instance,
                locals: &locals,
            },
        )
    }

    fn text_of(&self, rt: &Runtime<A>, value: &TemplateValue) -> Result<String> {
        if value.expression {
            Ok(eval::display(&self.eval_value(rt, &value.source)?))
        } else {
            Ok(value.source.clone())
        }
    }

    fn bool_of(&self, rt: &Runtime<A>, value: &TemplateValue) -> Result<bool> {
        if value.expression {
            Ok(eval::truthy(&self.eval_value(rt, &value.source)?))
        } else {
            Ok(!value.source.is_empty())
        }
    }

    fn step(&mut self, rt: &mut Runtime<A>, op: &Op) -> Result<()> {
        match op {
            Op::CreateElement { slot, tag } => {
                let handle = rt.dom.create_element(tag);
                self.frame.set(*slot, handle);
            }
            Op::CreateText { slot } => {
                let handle = rt.dom.create_text_node("");
                self.frame.set(*slot, handle);
            }
            Op::CreateComment { slot } => {
                let handle = rt.dom.create_comment();
                self.frame.set(*slot, handle);
            }
            Op::SetAttribute { slot, key, value } => {
                let text = self.text_of(rt, value)?;
                let node = self.node(*slot)?;
                rt.dom.set_attribute(&node, key, &text);
            }
            Op::SetText { slot, value } => {
                let text = self.text_of(rt, value)?;
                let node = self.node(*slot)?;
                rt.dom.set_text_content(&node, &text);
            }
            Op::BindEvent {
                slot,
                handler,
                event,
            } => {
                let node = self.node(*slot)?;
                let cell = Rc::clone(self.handlers.entry(*handler).or_default());
                let state = Rc::clone(&rt.state);
                let methods = Rc::clone(&rt.methods);
                let listener: EventHandler = Rc::new(move |payload| {
                    let current = cell.borrow().clone();
                    if let Some(handler) = current {
                        if let Err(error) = handler.invoke(&state, &methods, payload) {
                            log::error!("event handler failed: {error}");
                        }
                    }
                });
                rt.dom.add_event_listener(&node, event, listener);
            }
            Op::SetHandler {
                handler,
                expression,
            } => {
                let expr = eval::parse(&expression.source)?;
                let cell = self.handlers.entry(*handler).or_default();
                *cell.borrow_mut() = Some(Handler {
                    expr,
                    locals: Rc::clone(&self.locals),
                });
            }
            Op::Append { slot, parent } => {
                let child = self.node(*slot)?;
                let parent = self.node(*parent)?;
                rt.dom.append_child(&parent, &child);
            }
            Op::InsertBefore {
                slot,
                reference,
                parent,
            } => {
                let node = self.node(*slot)?;
                let reference = self.node(*reference)?;
                let parent = self.node(*parent)?;
                rt.dom.insert_before(&parent, &node, &reference);
            }
            Op::Remove { slot, parent } => {
                let child = self.node(*slot)?;
                let parent = self.node(*parent)?;
                rt.dom.remove_child(&parent, &child);
            }
            Op::IfInit(chain) => {
                let target = self.node(chain.parent)?;
                let portions = chain
                    .branches
                    .iter()
                    .map(|branch| LivePortion {
                        view: View::nested(
                            Rc::new(branch.body.clone()),
                            Some(Rc::clone(&self.frame)),
                            // Branches share the enclosing scope.
                            Rc::clone(&self.locals),
                        ),
                        target: target.clone(),
                    })
                    .collect();
                self.if_states.insert(
                    chain.state,
                    IfState {
                        active: None,
                        portions,
                    },
                );
            }
            Op::IfApply(chain) => {
                let mut conditions = Vec::with_capacity(chain.branches.len());
                for branch in &chain.branches {
                    conditions.push(self.bool_of(rt, &branch.condition)?);
                }
                let state = self
                    .if_states
                    .get_mut(&chain.state)
                    .ok_or_else(|| Error::Runtime("conditional applied before init".into()))?;
                state.active = directive_if(state.active, &conditions, &mut state.portions, rt)?;
            }
            Op::IfDestroy(chain) => {
                if let Some(state) = self.if_states.get_mut(&chain.state) {
                    if let Some(active) = state.active.take() {
                        state.portions[active].destroy(rt)?;
                    }
                }
            }
            Op::ForInit(for_loop) => {
                let target = self.node(for_loop.parent)?;
                self.for_states.insert(
                    for_loop.items,
                    ForState {
                        items: Vec::new(),
                        locals: Vec::new(),
                        target,
                    },
                );
            }
            Op::ForApply(for_loop) => self.run_for(rt, for_loop, true)?,
            Op::ForDestroy(for_loop) => self.run_for(rt, for_loop, false)?,
        }
        Ok(())
    }

    fn run_for(&mut self, rt: &mut Runtime<A>, for_loop: &Rc<ForLoop>, apply: bool) -> Result<()> {
        // Only a sequence value drives items; anything else clears them.
        let values: Vec<Value> = if apply && for_loop.source.expression {
            match self.eval_value(rt, &for_loop.source.source)? {
                Value::Array(items) => items,
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let frame = Rc::clone(&self.frame);
        let body = Rc::clone(for_loop);
        let state = self
            .for_states
            .get_mut(&for_loop.items)
            .ok_or_else(|| Error::Runtime("loop applied before init".into()))?;
        let target = state.target.clone();

        directive_for(
            &for_loop.value_identifier,
            for_loop.key_identifier.as_deref(),
            &values,
            &mut state.items,
            &mut state.locals,
            &mut move |_rt, scope| LivePortion {
                view: View::nested(
                    Rc::new(body.body.clone()),
                    Some(Rc::clone(&frame)),
                    scope,
                ),
                target: target.clone(),
            },
            rt,
        )
    }
}

/// A nested view plus the mount target it re-creates under when its
/// directive brings it back.
struct LivePortion<A: NodeAdapter> {
    view: View<A>,
    target: A::Handle,
}

impl<A: NodeAdapter> Portion<Runtime<A>> for LivePortion<A> {
    fn create(&mut self, rt: &mut Runtime<A>) -> Result<()> {
        self.view.create(rt, self.target.clone())
    }

    fn update(&mut self, rt: &mut Runtime<A>) -> Result<()> {
        self.view.update(rt)
    }

    fn destroy(&mut self, rt: &mut Runtime<A>) -> Result<()> {
        self.view.destroy(rt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::{codegen, parser};
    use serde_json::json;

    fn program(markup: &str) -> Program {
        codegen::generate(&parser::parse_silent(markup).root)
    }

    fn set(rt: &mut Runtime<MemoryDom>, key: &str, value: Value) {
        rt.state.borrow_mut().insert(key.to_string(), value);
    }

    #[test]
    fn renders_dynamic_text() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "title", json!("Hello"));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<h1>{title}</h1>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<h1>Hello</h1>");

        set(&mut rt, "title", json!("Again"));
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<h1>Again</h1>");
    }

    #[test]
    fn static_content_renders_at_create() {
        let mut rt = Runtime::new(MemoryDom::new());
        let root = rt.dom.create_element("main");

        let mut view = View::new(program(r#"<a href="x">go</a>"#));
        view.create(&mut rt, root).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<a href=\"x\">go</a>");
    }

    #[test]
    fn destroy_detaches_everything() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "title", json!("x"));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<h1>{title}</h1><p>y</p>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        view.destroy(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "");
    }

    #[test]
    fn conditional_switches_branches() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "on", json!(true));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<p #if={on}>yes</p><p #else>no</p>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<p>yes</p><!---->");

        set(&mut rt, "on", json!(false));
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<p>no</p><!---->");

        set(&mut rt, "on", json!(true));
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<p>yes</p><!---->");
    }

    #[test]
    fn conditional_with_no_true_branch_unmounts() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "on", json!(true));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<p #if={on}>yes</p>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<p>yes</p><!---->");

        set(&mut rt, "on", json!(false));
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<!---->");
    }

    #[test]
    fn loop_grows_and_shrinks() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "items", json!(["a", "b"]));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program(
            "<ul><li #for={$item in items}>{$item}</li></ul>",
        ));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(
            rt.dom.inner_html(root),
            "<ul><li>a</li><li>b</li><!----></ul>"
        );

        set(&mut rt, "items", json!(["a", "b", "c"]));
        view.update(&mut rt).unwrap();
        assert_eq!(
            rt.dom.inner_html(root),
            "<ul><li>a</li><li>b</li><li>c</li><!----></ul>"
        );

        set(&mut rt, "items", json!(["z"]));
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<ul><li>z</li><!----></ul>");
    }

    #[test]
    fn loop_key_identifier_is_the_index() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "items", json!(["a", "b"]));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program(
            "<ul><li #for={$item,$i in items}>{$i}</li></ul>",
        ));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(
            rt.dom.inner_html(root),
            "<ul><li>0</li><li>1</li><!----></ul>"
        );
    }

    #[test]
    fn non_sequence_loop_source_renders_nothing() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "items", json!("not-a-list"));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<li #for={$item in items}>{$item}</li>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(rt.dom.inner_html(root), "<!---->");
    }

    #[test]
    fn event_handlers_dispatch_method_calls() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let mut rt = Runtime::new(MemoryDom::new()).with_methods(Rc::new(move |name, args| {
            sink.borrow_mut().push((name.to_string(), args));
        }));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program("<button @click={increment($event)}>+</button>"));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();

        let button = rt.dom.children(root)[0];
        rt.dom.dispatch(button, "click", &json!({"k": 1}));
        assert_eq!(
            &*calls.borrow(),
            &[("increment".to_string(), vec![json!({"k": 1})])]
        );
    }

    #[test]
    fn loop_handlers_see_their_own_item() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let mut rt = Runtime::new(MemoryDom::new()).with_methods(Rc::new(move |name, args| {
            sink.borrow_mut().push((name.to_string(), args));
        }));
        set(&mut rt, "items", json!(["a", "b"]));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program(
            "<ul><li #for={$item in items} @click={pick($item)}>{$item}</li></ul>",
        ));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();

        let ul = rt.dom.children(root)[0];
        let second = rt.dom.children(ul)[1];
        rt.dom.dispatch(second, "click", &Value::Null);
        assert_eq!(&*calls.borrow(), &[("pick".to_string(), vec![json!("b")])]);
    }

    #[test]
    fn nested_conditional_inside_loop_items_is_independent() {
        let mut rt = Runtime::new(MemoryDom::new());
        set(&mut rt, "items", json!([1, 0, 2]));
        let root = rt.dom.create_element("main");

        let mut view = View::new(program(
            "<ul><li #for={$item in items}><b #if={$item}>{$item}</b></li></ul>",
        ));
        view.create(&mut rt, root).unwrap();
        view.update(&mut rt).unwrap();
        assert_eq!(
            rt.dom.inner_html(root),
            "<ul><li><b>1</b><!----></li><li><!----></li><li><b>2</b><!----></li><!----></ul>"
        );
    }
}
