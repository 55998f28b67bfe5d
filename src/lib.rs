//! Hanji, a Jinja2 compatible text template engine.
//!
//! Hanji compiles template source into an AST and evaluates it against a
//! dynamically typed context. It supports variable interpolation, control
//! flow, filters, tests, macros, template inheritance, imports and HTML
//! auto-escaping.
//!
//! ```
//! let mut env = hanji::Environment::new();
//! env.add_template("hello", "Hello {{ name }}!").unwrap();
//! let page = env
//!     .get_template("hello")
//!     .unwrap()
//!     .render(serde_json::json!({ "name": "World" }))
//!     .unwrap();
//! assert_eq!(page, "Hello World!");
//! ```
mod ast;
mod context;
mod environment;
mod error;
mod eval;
mod filters;
mod functions;
mod lexer;
mod object;
mod parser;
mod state;
mod tests;
mod value;

pub use crate::context::ToTemplateValues;
pub use crate::environment::{Environment, Template};
pub use crate::error::TemplateError;
pub use crate::object::Object;
pub use crate::state::State;
pub use crate::value::{Callable, Kwargs, Value, ValueMap};
