//! Runtime reconciliation directives
//!
//! A conditional chain or loop compiles to per-branch (per-item)
//! procedure triples; at runtime these directives decide which triples
//! run. [`directive_if`] keeps at most one branch alive and switches it
//! when conditions change. [`directive_for`] diffs a value sequence
//! positionally against the live items, reusing existing portions by
//! mutating their local scopes in place.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::Result;

/// A live, owned subtree with the create/update/destroy contract of a
/// generated procedure. `C` is whatever ambient context the portions of
/// a given runtime need (node adapter, state, caches).
pub trait Portion<C> {
    fn create(&mut self, cx: &mut C) -> Result<()>;
    fn update(&mut self, cx: &mut C) -> Result<()>;
    fn destroy(&mut self, cx: &mut C) -> Result<()>;
}

/// One loop item's bindings, shared between the directive (which writes
/// them) and the item's procedure (which reads them on update).
pub type LocalScope = Rc<RefCell<Map<String, Value>>>;

pub fn new_scope() -> LocalScope {
    Rc::new(RefCell::new(Map::new()))
}

/// Reconcile a conditional chain. `state` is the index of the live
/// branch from the previous run; the first true condition wins. Returns
/// the new live branch, `None` when every condition is false.
///
/// A stable branch only gets an update. On a switch the old branch is
/// destroyed before the new one is created, so the two never coexist
/// under the parent.
pub fn directive_if<C, P: Portion<C>>(
    state: Option<usize>,
    conditions: &[bool],
    portions: &mut [P],
    cx: &mut C,
) -> Result<Option<usize>> {
    let next = conditions.iter().position(|c| *c);
    if state == next {
        if let Some(index) = next {
            portions[index].update(cx)?;
        }
        return Ok(next);
    }
    if let Some(old) = state {
        portions[old].destroy(cx)?;
    }
    if let Some(new) = next {
        portions[new].create(cx)?;
        portions[new].update(cx)?;
    }
    Ok(next)
}

/// Reconcile a loop positionally against `values`.
///
/// Indices covered by both runs keep their portion: the directive
/// rewrites the scope's value binding (and key binding, when named) and
/// updates the portion in place. Growth appends new portions built by
/// `factory`; shrinkage destroys surplus portions from the tail.
/// `items` and `locals` stay index-aligned throughout.
pub fn directive_for<C, P: Portion<C>>(
    value_identifier: &str,
    key_identifier: Option<&str>,
    values: &[Value],
    items: &mut Vec<P>,
    locals: &mut Vec<LocalScope>,
    factory: &mut dyn FnMut(&mut C, LocalScope) -> P,
    cx: &mut C,
) -> Result<()> {
    for (index, value) in values.iter().enumerate() {
        if index < items.len() {
            bind(&locals[index], value_identifier, key_identifier, index, value);
            items[index].update(cx)?;
        } else {
            let scope = new_scope();
            bind(&scope, value_identifier, key_identifier, index, value);
            locals.push(Rc::clone(&scope));
            let mut item = factory(cx, scope);
            item.create(cx)?;
            item.update(cx)?;
            items.push(item);
        }
    }

    while items.len() > values.len() {
        if let Some(mut item) = items.pop() {
            item.destroy(cx)?;
        }
        locals.pop();
    }

    Ok(())
}

fn bind(
    scope: &LocalScope,
    value_identifier: &str,
    key_identifier: Option<&str>,
    index: usize,
    value: &Value,
) {
    let mut map = scope.borrow_mut();
    map.insert(value_identifier.to_string(), value.clone());
    if let Some(key) = key_identifier {
        map.insert(key.to_string(), Value::from(index));
    }
}
