use crate::ast::Stmt;
use crate::error::TemplateError;
use crate::eval;
use crate::parser;
use crate::state::State;
use crate::value::{Kwargs, NativeFn, Value, ValueMap};
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) type FilterFn =
    dyn Fn(&Value, &[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError>;
pub(crate) type TestFn = dyn Fn(&Value, &[Value]) -> Result<bool, TemplateError>;

/// Template rendering engine that should be constructed once.
///
/// Templates are parsed eagerly when added, so syntax errors surface at
/// registration. After setup the environment is read-only; every render
/// gets its own [`State`].
pub struct Environment {
    templates: HashMap<String, Rc<CompiledTemplate>>,
    globals: ValueMap,
    filters: HashMap<String, Rc<FilterFn>>,
    tests: HashMap<String, Rc<TestFn>>,
    functions: HashMap<String, Rc<NativeFn>>,
}

/// A parsed template together with the source it came from.
#[derive(Debug)]
pub(crate) struct CompiledTemplate {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) stmts: Vec<Stmt>,
}

/// Handle to a template inside an [`Environment`].
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment,
    compiled: Rc<CompiledTemplate>,
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("compiled", &self.compiled)
            .finish()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Environment {
            templates: HashMap::new(),
            globals: ValueMap::new(),
            filters: HashMap::new(),
            tests: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    /// Registers a named template. The source is parsed immediately.
    ///
    /// If there is already a template with the same name, this will return
    /// an error.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut env = hanji::Environment::new();
    /// env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// ```
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(TemplateError::type_error(format!(
                "{} is already added as a template",
                name
            )));
        }
        let source = source.into();
        let stmts = parser::parse(&source)?;
        log::debug!("registered template {} ({} bytes)", name, source.len());
        self.templates.insert(
            name.clone(),
            Rc::new(CompiledTemplate {
                name,
                source,
                stmts,
            }),
        );
        Ok(())
    }

    /// Parses an anonymous template that is not registered by name.
    pub fn template_from_string(
        &self,
        source: impl Into<String>,
    ) -> Result<Template<'_>, TemplateError> {
        let source = source.into();
        let stmts = parser::parse(&source)?;
        Ok(Template {
            env: self,
            compiled: Rc::new(CompiledTemplate {
                name: "<string>".to_string(),
                source,
                stmts,
            }),
        })
    }

    /// Looks up a registered template.
    pub fn get_template(&self, name: &str) -> Result<Template<'_>, TemplateError> {
        match self.templates.get(name) {
            Some(compiled) => Ok(Template {
                env: self,
                compiled: compiled.clone(),
            }),
            None => Err(TemplateError::unknown_name(format!(
                "Template {} is not found",
                name
            ))),
        }
    }

    /// Looks up and renders a registered template in one call.
    pub fn render_named(
        &self,
        name: &str,
        ctx: impl Into<Value>,
    ) -> Result<String, TemplateError> {
        self.get_template(name)?.render(ctx)
    }

    /// Injects a global variable visible to every render.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    /// Registers a filter. User filters shadow built-ins of the same name.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError>
            + 'static,
    {
        self.filters.insert(name.into(), Rc::new(filter));
    }

    /// Registers a test. User tests shadow built-ins of the same name.
    pub fn add_test<F>(&mut self, name: impl Into<String>, test: F)
    where
        F: Fn(&Value, &[Value]) -> Result<bool, TemplateError> + 'static,
    {
        self.tests.insert(name.into(), Rc::new(test));
    }

    /// Registers a callable global function.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError> + 'static,
    {
        self.functions.insert(name.into(), Rc::new(function));
    }

    pub(crate) fn get_compiled(&self, name: &str) -> Option<Rc<CompiledTemplate>> {
        self.templates.get(name).cloned()
    }

    pub(crate) fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub(crate) fn get_filter(&self, name: &str) -> Option<Rc<FilterFn>> {
        self.filters.get(name).cloned()
    }

    pub(crate) fn get_test(&self, name: &str) -> Option<Rc<TestFn>> {
        self.tests.get(name).cloned()
    }

    pub(crate) fn get_function(&self, name: &str) -> Option<Rc<NativeFn>> {
        self.functions.get(name).cloned()
    }
}

impl<'env> Template<'env> {
    /// Name the template was registered under, `<string>` for anonymous
    /// templates.
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    /// The source text the template was parsed from.
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    /// Renders the template against the provided context.
    ///
    /// The context can be `()`, a `Map` value, a `serde_json::Value`
    /// object, or anything else convertible into a map-shaped [`Value`].
    ///
    /// # Examples
    ///
    /// ```
    /// let mut env = hanji::Environment::new();
    /// env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let template = env.get_template("hello").unwrap();
    /// let page = template
    ///     .render(serde_json::json!({ "name": "World" }))
    ///     .unwrap();
    /// assert_eq!(page, "Hello World!");
    /// ```
    pub fn render(&self, ctx: impl Into<Value>) -> Result<String, TemplateError> {
        let root = match ctx.into() {
            Value::Map(map) => map,
            Value::Undefined | Value::None => ValueMap::new(),
            other => {
                return Err(TemplateError::Conversion(format!(
                    "Render context must be a map, got {}",
                    other.kind_name()
                )))
            }
        };
        log::debug!("rendering template {}", self.compiled.name);
        let mut state = State::new(self.env, root);
        eval::render(&mut state, self.compiled.clone())
    }
}

#[test]
fn duplicate_template_names_are_rejected() {
    let mut env = Environment::new();
    env.add_template("t", "a").unwrap();
    assert!(env.add_template("t", "b").is_err());
}

#[test]
fn missing_template_lookup_fails() {
    let env = Environment::new();
    match env.get_template("nope") {
        Err(TemplateError::UnknownName(msg)) => {
            assert!(msg.contains("nope"))
        }
        other => panic!("Expected unknown name error, got {:?}", other),
    }
}

#[test]
fn render_named_is_lookup_plus_render() {
    let mut env = Environment::new();
    env.add_template("t", "{{ 1 + 1 }}").unwrap();
    assert_eq!(env.render_named("t", ()).unwrap(), "2");
    assert!(env.render_named("missing", ()).is_err());
}

#[test]
fn template_handles_expose_name_and_source() {
    let mut env = Environment::new();
    env.add_template("t", "x").unwrap();
    let template = env.get_template("t").unwrap();
    assert_eq!(template.name(), "t");
    assert_eq!(template.source(), "x");
    assert_eq!(env.template_from_string("y").unwrap().name(), "<string>");
}

#[test]
fn non_map_context_is_a_conversion_error() {
    let env = Environment::new();
    let template = env.template_from_string("x").unwrap();
    match template.render(Value::Int(3)) {
        Err(TemplateError::Conversion(msg)) => assert!(msg.contains("map")),
        other => panic!("Expected conversion error, got {:?}", other),
    }
}

#[test]
fn syntax_errors_surface_at_registration() {
    let mut env = Environment::new();
    assert!(env.add_template("bad", "{% if %}").is_err());
    assert!(env.template_from_string("{{ 1 +").is_err());
}
