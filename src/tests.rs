//! The built-in test table, used by `is` expressions.
//!
//! Tests receive `(subject, positional args)` and return a bool. User
//! tests registered on the environment shadow the built-ins.

use crate::error::TemplateError;
use crate::state::State;
use crate::value::{self, cmp_values, Value};
use std::cmp::Ordering;
use std::rc::Rc;

pub(crate) type BuiltinTest = fn(&Value, &[Value]) -> Result<bool, TemplateError>;

pub(crate) fn apply(
    state: &mut State<'_>,
    name: &str,
    subject: &Value,
    args: &[Value],
) -> Result<bool, TemplateError> {
    if let Some(test) = state.env().get_test(name) {
        return test(subject, args);
    }
    match find(name) {
        Some(test) => test(subject, args),
        None => Err(TemplateError::unknown_name(format!(
            "Test {} is not registered",
            name
        ))),
    }
}

pub(crate) fn find(name: &str) -> Option<BuiltinTest> {
    Some(match name {
        "defined" => defined,
        "undefined" => undefined,
        "none" => none,
        "true" => true_,
        "false" => false_,
        "odd" => odd,
        "even" => even,
        "divisibleby" => divisibleby,
        "number" => number,
        "string" => string,
        "sequence" => sequence,
        "mapping" => mapping,
        "iterable" => iterable,
        "callable" => callable,
        "sameas" => sameas,
        "eq" | "equalto" | "==" => eq,
        "ne" | "!=" => ne,
        "lt" | "lessthan" | "<" => lt,
        "le" | "<=" => le,
        "gt" | "greaterthan" | ">" => gt,
        "ge" | ">=" => ge,
        "in" => in_,
        "lower" => lower,
        "upper" => upper,
        "startingwith" => startingwith,
        "endingwith" => endingwith,
        "truthy" => truthy,
        "falsy" => falsy,
        _ => return None,
    })
}

fn required<'a>(test: &str, args: &'a [Value]) -> Result<&'a Value, TemplateError> {
    args.first().ok_or_else(|| {
        TemplateError::type_error(format!("{} requires argument", test))
    })
}

fn defined(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(!v.is_undefined())
}

fn undefined(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(v.is_undefined())
}

fn none(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(v.is_none())
}

fn true_(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Bool(true)))
}

fn false_(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Bool(false)))
}

fn odd(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Int(n) if n.rem_euclid(2) == 1))
}

fn even(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Int(n) if n.rem_euclid(2) == 0))
}

fn divisibleby(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    let divisor = required("divisibleby", args)?;
    match (v, divisor) {
        (Value::Int(n), Value::Int(d)) if *d != 0 => Ok(n % d == 0),
        (Value::Int(_), Value::Int(_)) => {
            Err(TemplateError::arithmetic("Division by zero"))
        }
        _ => Ok(false),
    }
}

fn number(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(v.is_number())
}

fn string(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::String { .. }))
}

fn sequence(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Seq(_) | Value::String { .. }))
}

fn mapping(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Map(_)))
}

fn iterable(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(v.try_iter().is_some())
}

fn callable(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(matches!(v, Value::Callable(_)))
}

/// Identity of the underlying payload. Only objects and callables carry a
/// shared payload, so everything else is never the same.
fn sameas(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    let other = required("sameas", args)?;
    Ok(match (v, other) {
        (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
        (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
        _ => false,
    })
}

fn eq(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(v == required("eq", args)?)
}

fn ne(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(v != required("ne", args)?)
}

fn lt(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(cmp_values(v, required("lt", args)?) == Ordering::Less)
}

fn le(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(cmp_values(v, required("le", args)?) != Ordering::Greater)
}

fn gt(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(cmp_values(v, required("gt", args)?) == Ordering::Greater)
}

fn ge(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    Ok(cmp_values(v, required("ge", args)?) != Ordering::Less)
}

fn in_(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    value::contains(required("in", args)?, v)
}

fn lower(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    match v.as_str() {
        Some(s) => Ok(!s.chars().any(|c| c.is_uppercase())),
        None => Ok(false),
    }
}

fn upper(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    match v.as_str() {
        Some(s) => Ok(!s.chars().any(|c| c.is_lowercase())),
        None => Ok(false),
    }
}

fn startingwith(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    let prefix = required("startingwith", args)?;
    match (v.as_str(), prefix.as_str()) {
        (Some(s), Some(prefix)) => Ok(s.starts_with(prefix)),
        _ => Ok(false),
    }
}

fn endingwith(v: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    let suffix = required("endingwith", args)?;
    match (v.as_str(), suffix.as_str()) {
        (Some(s), Some(suffix)) => Ok(s.ends_with(suffix)),
        _ => Ok(false),
    }
}

fn truthy(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(v.is_true())
}

fn falsy(v: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(!v.is_true())
}

#[test]
fn parity_tests() {
    assert!(odd(&Value::Int(3), &[]).unwrap());
    assert!(!odd(&Value::Int(4), &[]).unwrap());
    assert!(even(&Value::Int(-2), &[]).unwrap());
    assert!(odd(&Value::Int(-3), &[]).unwrap());
    assert!(!odd(&Value::string("3"), &[]).unwrap());
}

#[test]
fn divisibleby_needs_an_argument() {
    match divisibleby(&Value::Int(6), &[]) {
        Err(TemplateError::Type(msg)) => assert!(msg.contains("requires argument")),
        other => panic!("Expected type error, got {:?}", other),
    }
    assert!(divisibleby(&Value::Int(6), &[Value::Int(3)]).unwrap());
    assert!(!divisibleby(&Value::Int(7), &[Value::Int(3)]).unwrap());
}

#[test]
fn comparison_aliases_resolve() {
    for alias in ["eq", "equalto", "=="] {
        assert!(find(alias).is_some());
    }
    for alias in ["lt", "lessthan", "<", "ge", ">="] {
        assert!(find(alias).is_some());
    }
}

#[test]
fn sameas_is_payload_identity() {
    let ns = Value::from_object(crate::object::Namespace::new(
        crate::value::ValueMap::new(),
    ));
    assert!(sameas(&ns, &[ns.clone()]).unwrap());
    let other = Value::from_object(crate::object::Namespace::new(
        crate::value::ValueMap::new(),
    ));
    assert!(!sameas(&ns, &[other]).unwrap());
    // Small immutable kinds never share a payload.
    assert!(!sameas(&Value::Int(1), &[Value::Int(1)]).unwrap());
}

#[test]
fn string_shape_tests() {
    assert!(lower(&Value::string("abc"), &[]).unwrap());
    assert!(!lower(&Value::string("aBc"), &[]).unwrap());
    assert!(startingwith(&Value::string("hanji"), &[Value::string("ha")]).unwrap());
    assert!(endingwith(&Value::string("hanji"), &[Value::string("ji")]).unwrap());
}
