//! Component definitions and live instances
//!
//! A [`Component`] pairs a compiled program with initial state and named
//! methods. Instantiating it against a node adapter yields an
//! [`Instance`]: the mounted view plus the event bus and the batched
//! update cycle. State writes only mark the instance dirty; [`flush`]
//! applies all of them with a single view update.
//!
//! [`flush`]: Instance::flush

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::dom::NodeAdapter;
use crate::error::Result;
use crate::ir::Program;
use crate::runtime::{MethodDispatcher, Runtime, StateMap, View};

/// A lifecycle or custom event listener.
pub type Listener = Rc<dyn Fn(&Value)>;

/// A named instance method, callable from event-handler expressions.
pub type Method = Rc<dyn Fn(&StateHandle, Vec<Value>)>;

/// The state surface handed to methods: reads see current values,
/// writes land immediately but only mark the instance for a later
/// flush.
#[derive(Clone)]
pub struct StateHandle {
    state: StateMap,
    queued: Rc<Cell<bool>>,
}

impl StateHandle {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.borrow().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.state.borrow_mut().insert(key.to_string(), value);
        self.queued.set(true);
    }

    /// Merge a whole map of writes in one call.
    pub fn assign(&self, values: Map<String, Value>) {
        let mut state = self.state.borrow_mut();
        for (key, value) in values {
            state.insert(key, value);
        }
        self.queued.set(true);
    }
}

/// A reusable component definition.
pub struct Component {
    program: Program,
    state: Map<String, Value>,
    methods: HashMap<String, Method>,
}

impl Component {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            state: Map::new(),
            methods: HashMap::new(),
        }
    }

    /// Seed one state entry.
    pub fn data(mut self, key: &str, value: Value) -> Self {
        self.state.insert(key.to_string(), value);
        self
    }

    pub fn method(
        mut self,
        name: &str,
        method: impl Fn(&StateHandle, Vec<Value>) + 'static,
    ) -> Self {
        self.methods.insert(name.to_string(), Rc::new(method));
        self
    }

    pub fn instantiate<A: NodeAdapter>(self, dom: A) -> Instance<A> {
        Instance::new(self, dom)
    }
}

/// One live component instance bound to a node adapter.
pub struct Instance<A: NodeAdapter> {
    runtime: Runtime<A>,
    view: View<A>,
    handle: StateHandle,
    queued: Rc<Cell<bool>>,
    listeners: RefCell<HashMap<String, Vec<Listener>>>,
}

impl<A: NodeAdapter> Instance<A> {
    pub fn new(component: Component, dom: A) -> Self {
        let state: StateMap = Rc::new(RefCell::new(component.state));
        let queued = Rc::new(Cell::new(false));
        let handle = StateHandle {
            state: Rc::clone(&state),
            queued: Rc::clone(&queued),
        };

        let methods = component.methods;
        let method_handle = handle.clone();
        let dispatcher: MethodDispatcher = Rc::new(move |name, args| match methods.get(name) {
            Some(method) => method(&method_handle, args),
            None => log::warn!("unknown method `{name}` called from a handler"),
        });

        Self {
            runtime: Runtime {
                dom,
                state,
                methods: dispatcher,
            },
            view: View::new(component.program),
            handle,
            queued,
            listeners: RefCell::new(HashMap::new()),
        }
    }

    /// Build the view under `target` and render it from initial state.
    /// Emits `create` between the two phases, so listeners observe the
    /// structure before the first data pass.
    pub fn mount(&mut self, target: A::Handle) -> Result<()> {
        self.view.create(&mut self.runtime, target)?;
        self.emit("create", &Value::Null);
        self.view.update(&mut self.runtime)?;
        self.queued.set(false);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.handle.get(key)
    }

    /// Write one state entry and mark the instance for flushing.
    pub fn set(&mut self, key: &str, value: Value) {
        self.handle.set(key, value);
    }

    pub fn assign(&mut self, values: Map<String, Value>) {
        self.handle.assign(values);
    }

    /// Whether writes are waiting for a flush.
    pub fn queued(&self) -> bool {
        self.queued.get()
    }

    /// Apply all pending writes with a single view update. A no-op when
    /// nothing is queued; emits `update` after the view settles.
    pub fn flush(&mut self) -> Result<()> {
        if self.queued.replace(false) {
            self.view.update(&mut self.runtime)?;
            self.emit("update", &Value::Null);
        }
        Ok(())
    }

    /// Detach the view and emit `destroy`.
    pub fn destroy(&mut self) -> Result<()> {
        self.view.destroy(&mut self.runtime)?;
        self.emit("destroy", &Value::Null);
        Ok(())
    }

    pub fn on(&self, event: &str, listener: Listener) {
        self.listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove one previously registered listener, matched by identity.
    pub fn off(&self, event: &str, listener: &Listener) {
        if let Some(registered) = self.listeners.borrow_mut().get_mut(event) {
            registered.retain(|l| !Rc::ptr_eq(l, listener));
        }
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        let matching: Vec<Listener> = self
            .listeners
            .borrow()
            .get(event)
            .map(|registered| registered.iter().map(Rc::clone).collect())
            .unwrap_or_default();
        for listener in matching {
            listener(payload);
        }
    }

    pub fn dom(&self) -> &A {
        &self.runtime.dom
    }

    pub fn dom_mut(&mut self) -> &mut A {
        &mut self.runtime.dom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::{codegen, parser};
    use serde_json::json;

    fn component(markup: &str) -> Component {
        Component::new(codegen::generate(&parser::parse_silent(markup).root))
    }

    fn mounted(component: Component) -> (Instance<MemoryDom>, crate::dom::NodeId) {
        let mut dom = MemoryDom::new();
        let root = dom.create_element("main");
        let mut instance = component.instantiate(dom);
        instance.mount(root).unwrap();
        (instance, root)
    }

    #[test]
    fn mount_renders_initial_state() {
        let (instance, root) = mounted(component("<h1>{title}</h1>").data("title", json!("Hi")));
        assert_eq!(instance.dom().inner_html(root), "<h1>Hi</h1>");
    }

    #[test]
    fn set_is_inert_until_flush() {
        let (mut instance, root) =
            mounted(component("<h1>{title}</h1>").data("title", json!("one")));

        instance.set("title", json!("two"));
        assert!(instance.queued());
        assert_eq!(instance.dom().inner_html(root), "<h1>one</h1>");

        instance.flush().unwrap();
        assert!(!instance.queued());
        assert_eq!(instance.dom().inner_html(root), "<h1>two</h1>");
    }

    #[test]
    fn flush_coalesces_writes_into_one_update() {
        let (mut instance, _) = mounted(
            component("<p>{a}{b}</p>")
                .data("a", json!(1))
                .data("b", json!(2)),
        );

        let updates = Rc::new(Cell::new(0));
        let counter = Rc::clone(&updates);
        instance.on("update", Rc::new(move |_| counter.set(counter.get() + 1)));

        instance.set("a", json!(3));
        instance.set("b", json!(4));
        instance.flush().unwrap();
        instance.flush().unwrap();
        assert_eq!(updates.get(), 1);
    }

    #[test]
    fn methods_fire_from_events_and_batch() {
        let counter = component("<button @click={increment()}>{count}</button>")
            .data("count", json!(0))
            .method("increment", |state, _| {
                let count = state
                    .get("count")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default();
                state.set("count", json!(count + 1.0));
            });

        let (mut instance, root) = mounted(counter);
        let button = instance.dom().children(root)[0];

        instance.dom().dispatch(button, "click", &Value::Null);
        instance.dom().dispatch(button, "click", &Value::Null);
        assert!(instance.queued());
        instance.flush().unwrap();
        assert_eq!(
            instance.dom().inner_html(root),
            "<button>2</button>"
        );
    }

    #[test]
    fn lifecycle_events_fire_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dom = MemoryDom::new();
        let root = dom.create_element("main");
        let mut instance = component("<p>x</p>").instantiate(dom);

        for event in ["create", "update", "destroy"] {
            let sink = Rc::clone(&log);
            let name = event.to_string();
            instance.on(event, Rc::new(move |_| sink.borrow_mut().push(name.clone())));
        }

        instance.mount(root).unwrap();
        instance.set("unused", json!(1));
        instance.flush().unwrap();
        instance.destroy().unwrap();
        assert_eq!(&*log.borrow(), &["create", "update", "destroy"]);
        assert_eq!(instance.dom().inner_html(root), "");
    }

    #[test]
    fn off_removes_by_identity() {
        let (instance, _) = mounted(component("<p>x</p>"));
        let count = Rc::new(Cell::new(0));

        let counter = Rc::clone(&count);
        let listener: Listener = Rc::new(move |_| counter.set(counter.get() + 1));
        instance.on("ping", Rc::clone(&listener));
        instance.emit("ping", &Value::Null);
        instance.off("ping", &listener);
        instance.emit("ping", &Value::Null);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn assign_merges_and_queues() {
        let (mut instance, root) = mounted(
            component("<p>{a}{b}</p>")
                .data("a", json!("x"))
                .data("b", json!("y")),
        );

        let mut writes = Map::new();
        writes.insert("a".to_string(), json!("p"));
        writes.insert("b".to_string(), json!("q"));
        instance.assign(writes);
        instance.flush().unwrap();
        assert_eq!(instance.dom().inner_html(root), "<p>pq</p>");
    }
}
