use crate::ast::Stmt;
use crate::environment::Environment;
use crate::functions;
use crate::value::{Value, ValueMap};
use std::collections::HashMap;
use std::rc::Rc;

/// Per-render mutable state.
///
/// Holds the scope stack, the macro table, the block override tables that
/// drive template inheritance, and the auto-escape flag. A fresh state is
/// created for every render and never shared.
pub struct State<'env> {
    env: &'env Environment,
    scopes: Vec<ValueMap>,
    pub(crate) macros: HashMap<String, Value>,
    pub(crate) blocks: HashMap<String, Rc<Vec<Stmt>>>,
    /// Ancestor bodies per block name, nearest ancestor first. Each pass
    /// up the inheritance chain appends its own body when it consumes an
    /// override, so `super()` can climb one level per nested call.
    pub(crate) parent_blocks: HashMap<String, Vec<Rc<Vec<Stmt>>>>,
    /// How many ancestors `super()` has already climbed per block name.
    pub(crate) super_depths: HashMap<String, usize>,
    pub(crate) block_stack: Vec<String>,
    pub(crate) extends_target: Option<String>,
    pub(crate) autoescape: bool,
}

impl<'env> State<'env> {
    pub(crate) fn new(env: &'env Environment, root: ValueMap) -> Self {
        State {
            env,
            scopes: vec![root],
            macros: HashMap::new(),
            blocks: HashMap::new(),
            parent_blocks: HashMap::new(),
            super_depths: HashMap::new(),
            block_stack: Vec::new(),
            extends_target: None,
            autoescape: true,
        }
    }

    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Whether emitted values are HTML-escaped.
    pub fn auto_escape(&self) -> bool {
        self.autoescape
    }

    /// Resolves a name: innermost scope outwards, then macros, then
    /// environment globals, then registered functions, then built-in
    /// functions. A miss yields Undefined, never an error.
    pub fn lookup(&self, name: &str) -> Value {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value.clone();
            }
        }
        if let Some(value) = self.macros.get(name) {
            return value.clone();
        }
        if let Some(value) = self.env.get_global(name) {
            return value.clone();
        }
        if let Some(func) = self.env.get_function(name) {
            return Value::from_function(name, move |args, kwargs, state| {
                func(args, kwargs, state)
            });
        }
        match functions::builtin(name) {
            Some(value) => value,
            None => Value::Undefined,
        }
    }

    /// Writes into the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Writes into the outermost (template root) scope.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Runs `f` inside a fresh scope; the scope is popped on every exit
    /// path, including error returns.
    pub(crate) fn with_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(ValueMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// All visible scope variables flattened into one map, outer scopes
    /// first so inner bindings win. Used by `include` and `debug()`.
    pub(crate) fn flatten_scopes(&self) -> ValueMap {
        let mut flat = ValueMap::new();
        for scope in &self.scopes {
            for (k, v) in scope {
                flat.insert(k.clone(), v.clone());
            }
        }
        flat
    }

    /// Snapshot of the root scope, used to turn an imported template's
    /// state into a module.
    pub(crate) fn root_scope(&self) -> ValueMap {
        self.scopes.first().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
use crate::error::TemplateError;

#[test]
fn lookup_walks_scopes_inner_to_outer() {
    let env = Environment::new();
    let mut root = ValueMap::new();
    root.insert("a".to_string(), Value::Int(1));
    root.insert("b".to_string(), Value::Int(2));
    let mut state = State::new(&env, root);
    state.with_scope(|state| {
        state.set("a", Value::Int(10));
        assert_eq!(state.lookup("a"), Value::Int(10));
        assert_eq!(state.lookup("b"), Value::Int(2));
    });
    assert_eq!(state.lookup("a"), Value::Int(1));
    assert_eq!(state.lookup("missing"), Value::Undefined);
}

#[test]
fn scope_pops_even_when_the_body_fails() {
    let env = Environment::new();
    let mut state = State::new(&env, ValueMap::new());
    let result: Result<(), TemplateError> = state.with_scope(|state| {
        state.set("x", Value::Int(1));
        Err(TemplateError::type_error("boom"))
    });
    assert!(result.is_err());
    assert_eq!(state.lookup("x"), Value::Undefined);
}

#[test]
fn globals_resolve_after_scopes() {
    let mut env = Environment::new();
    env.add_global("site", Value::string("hanji"));
    let state = State::new(&env, ValueMap::new());
    assert_eq!(state.lookup("site"), Value::string("hanji"));
}

#[test]
fn builtin_functions_resolve_last() {
    let env = Environment::new();
    let state = State::new(&env, ValueMap::new());
    assert!(matches!(state.lookup("range"), Value::Callable(_)));
}
