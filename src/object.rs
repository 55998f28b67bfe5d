use crate::error::TemplateError;
use crate::state::State;
use crate::value::{Kwargs, Value, ValueMap};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Capability set for engine objects: the loop variable, cyclers, joiners,
/// namespaces and imported modules all go through this trait instead of a
/// class hierarchy. Every method has a refusing default so implementers
/// only fill in what their object supports.
pub trait Object: fmt::Debug {
    /// Short name shown when the object is stringified, e.g. `namespace`.
    fn name(&self) -> &str;

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn get_item(&self, _key: &Value) -> Option<Value> {
        None
    }

    fn try_iter(&self) -> Option<Vec<Value>> {
        None
    }

    fn length(&self) -> Option<usize> {
        None
    }

    /// Invoking the object itself, `obj(...)`. `None` means not callable.
    fn call(
        &self,
        _args: &[Value],
        _kwargs: &Kwargs,
        _state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        None
    }

    /// Invoking a method, `obj.method(...)`. `None` falls back to calling
    /// the attribute as a plain value.
    fn call_method(
        &self,
        _name: &str,
        _args: &[Value],
        _kwargs: &Kwargs,
        _state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        None
    }

    /// Mutable attribute support; only namespaces opt in.
    fn set_attr(&self, _name: &str, _value: Value) -> bool {
        false
    }
}

/// The `namespace()` helper: a mutable attribute bag that `set ns.attr`
/// can write through from inner scopes.
#[derive(Debug)]
pub struct Namespace {
    attrs: RefCell<ValueMap>,
}

impl Namespace {
    pub fn new(attrs: ValueMap) -> Self {
        Namespace {
            attrs: RefCell::new(attrs),
        }
    }
}

impl Object for Namespace {
    fn name(&self) -> &str {
        "namespace"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    fn set_attr(&self, name: &str, value: Value) -> bool {
        self.attrs.borrow_mut().insert(name.to_string(), value);
        true
    }
}

/// The `cycler(*items)` helper. `next()` returns the current item and
/// advances, `reset()` rewinds, `current` peeks.
#[derive(Debug)]
pub struct Cycler {
    items: Vec<Value>,
    pos: Cell<usize>,
}

impl Cycler {
    pub fn new(items: Vec<Value>) -> Self {
        Cycler {
            items,
            pos: Cell::new(0),
        }
    }
}

impl Object for Cycler {
    fn name(&self) -> &str {
        "cycler"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "current" => Some(self.items[self.pos.get()].clone()),
            _ => None,
        }
    }

    fn call_method(
        &self,
        name: &str,
        _args: &[Value],
        _kwargs: &Kwargs,
        _state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        match name {
            "next" => {
                let item = self.items[self.pos.get()].clone();
                self.pos.set((self.pos.get() + 1) % self.items.len());
                Some(Ok(item))
            }
            "reset" => {
                self.pos.set(0);
                Some(Ok(Value::None))
            }
            _ => None,
        }
    }
}

/// The `joiner(sep)` helper: returns the empty string on its first call
/// and the separator on every call after that.
#[derive(Debug)]
pub struct Joiner {
    sep: String,
    called: Cell<bool>,
}

impl Joiner {
    pub fn new(sep: String) -> Self {
        Joiner {
            sep,
            called: Cell::new(false),
        }
    }
}

impl Object for Joiner {
    fn name(&self) -> &str {
        "joiner"
    }

    fn call(
        &self,
        _args: &[Value],
        _kwargs: &Kwargs,
        _state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        if self.called.replace(true) {
            Some(Ok(Value::string(self.sep.clone())))
        } else {
            Some(Ok(Value::string("")))
        }
    }
}

/// A template evaluated through `{% import %}`, exposing its top level
/// variables and macros as attributes.
#[derive(Debug)]
pub struct Module {
    name: String,
    vars: ValueMap,
}

impl Module {
    pub fn new(name: String, vars: ValueMap) -> Self {
        Module { name, vars }
    }
}

impl Object for Module {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}

#[test]
fn namespace_set_and_get() {
    let ns = Namespace::new(ValueMap::new());
    assert!(ns.set_attr("count", Value::Int(3)));
    assert_eq!(ns.get_attr("count"), Some(Value::Int(3)));
    assert_eq!(ns.get_attr("missing"), None);
}

#[test]
fn cycler_wraps_around() {
    let c = Cycler::new(vec![Value::string("odd"), Value::string("even")]);
    assert_eq!(c.get_attr("current"), Some(Value::string("odd")));
    let env = crate::environment::Environment::new();
    let mut state = crate::state::State::new(&env, ValueMap::new());
    let kwargs = Kwargs::new();
    let mut next = || c.call_method("next", &[], &kwargs, &mut state).unwrap().unwrap();
    assert_eq!(next(), Value::string("odd"));
    assert_eq!(next(), Value::string("even"));
    assert_eq!(next(), Value::string("odd"));
}
