use crate::error::TemplateError;
use crate::object::Object;
use crate::state::State;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Insertion ordered mapping used for map values and scopes.
pub type ValueMap = IndexMap<String, Value>;

/// Keyword arguments of a call, in source order.
pub type Kwargs = IndexMap<String, Value>;

/// Signature of filters and of everything callable from a template.
pub type NativeFn =
    dyn Fn(&[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError>;

/// A runtime value.
///
/// Strings carry a `safe` flag; safe strings bypass HTML escaping at emit
/// time. Numbers keep their integer/float subkind: integer arithmetic stays
/// integral except for `/`, which always divides as float.
#[derive(Clone)]
pub enum Value {
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String { value: String, safe: bool },
    Seq(Vec<Value>),
    Map(ValueMap),
    Callable(Callable),
    Object(Rc<dyn Object>),
}

/// A named function value. Macros, `caller`, and registered functions all
/// take this shape.
#[derive(Clone)]
pub struct Callable {
    name: String,
    func: Rc<NativeFn>,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError> + 'static,
    {
        Callable {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(
        &self,
        args: &[Value],
        kwargs: &Kwargs,
        state: &mut State<'_>,
    ) -> Result<Value, TemplateError> {
        (self.func)(args, kwargs, state)
    }

    pub(crate) fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

impl Value {
    /// Creates a plain, unsafe string value.
    pub fn string(s: impl Into<String>) -> Value {
        Value::String {
            value: s.into(),
            safe: false,
        }
    }

    /// Creates a string that will not be escaped on emission.
    pub fn from_safe_string(s: impl Into<String>) -> Value {
        Value::String {
            value: s.into(),
            safe: true,
        }
    }

    /// Wraps an [`Object`] implementation.
    pub fn from_object(object: impl Object + 'static) -> Value {
        Value::Object(Rc::new(object))
    }

    /// Wraps a native function under the given name.
    pub fn from_function<F>(name: impl Into<String>, func: F) -> Value
    where
        F: Fn(&[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError> + 'static,
    {
        Value::Callable(Callable::new(name, func))
    }

    /// The kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "Undefined",
            Value::None => "None",
            Value::Bool(_) => "Bool",
            Value::Int(_) | Value::Float(_) => "Number",
            Value::String { .. } => "String",
            Value::Seq(_) => "Seq",
            Value::Map(_) => "Map",
            Value::Callable(_) => "Callable",
            Value::Object(_) => "Object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Value::String { safe: true, .. })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Truthiness as observed by `if` and the boolean operators.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String { value, .. } => !value.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Callable(_) | Value::Object(_) => true,
        }
    }

    /// Element count of strings (in chars), sequences, maps and objects.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String { value, .. } => Some(value.chars().count()),
            Value::Seq(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            Value::Object(obj) => obj.length(),
            _ => None,
        }
    }

    /// Materializes the value as a list: strings yield one-char strings,
    /// maps yield their keys in insertion order. `None` for non-iterables.
    pub fn try_iter(&self) -> Option<Vec<Value>> {
        match self {
            Value::String { value, .. } => {
                Some(value.chars().map(|c| Value::string(c.to_string())).collect())
            }
            Value::Seq(items) => Some(items.clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::string(k.clone())).collect()),
            Value::Object(obj) => obj.try_iter(),
            _ => None,
        }
    }

    /// Attribute access; failed lookups stay Undefined so chained access
    /// never aborts a render.
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or(Value::Undefined),
            Value::Object(obj) => obj.get_attr(name).unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Index access. Sequences and strings take integers (negative counts
    /// from the back), maps take their stringified key.
    pub fn get_item(&self, key: &Value) -> Value {
        match self {
            Value::Seq(items) => match resolve_index(key, items.len()) {
                Some(idx) => items.get(idx).cloned().unwrap_or(Value::Undefined),
                None => Value::Undefined,
            },
            Value::String { value, .. } => {
                let chars: Vec<char> = value.chars().collect();
                match resolve_index(key, chars.len()) {
                    Some(idx) => chars
                        .get(idx)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or(Value::Undefined),
                    None => Value::Undefined,
                }
            }
            Value::Map(map) => {
                let key = match key {
                    Value::String { value, .. } => value.clone(),
                    other => other.to_string(),
                };
                map.get(&key).cloned().unwrap_or(Value::Undefined)
            }
            Value::Object(obj) => obj.get_item(key).unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Python style slicing over sequences and strings.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, TemplateError> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(TemplateError::arithmetic("Slice step must not be zero"));
        }
        match self {
            Value::Seq(items) => {
                Ok(Value::Seq(slice_items(items, start, stop, step)))
            }
            Value::String { value, .. } => {
                let chars: Vec<char> = value.chars().collect();
                let picked = slice_items(&chars, start, stop, step);
                Ok(Value::string(picked.into_iter().collect::<String>()))
            }
            other => Err(TemplateError::type_error(format!(
                "Cannot slice {}",
                other.kind_name()
            ))),
        }
    }

    /// Quoting representation: like `to_string` but strings are quoted.
    pub fn to_repr(&self) -> String {
        match self {
            Value::String { value, .. } => format!("\"{}\"", value),
            other => other.to_string(),
        }
    }

    /// JSON serialization. Undefined and non-finite floats collapse to
    /// `null`, map keys are emitted in sorted order.
    pub fn to_json(&self, pretty: bool) -> String {
        let mut out = String::new();
        write_json(self, &mut out, pretty, 0);
        out
    }
}

fn resolve_index(key: &Value, len: usize) -> Option<usize> {
    let idx = match key {
        Value::Int(n) => *n,
        _ => return None,
    };
    if idx < 0 {
        let wrapped = len as i64 + idx;
        if wrapped < 0 {
            return None;
        }
        Some(wrapped as usize)
    } else {
        Some(idx as usize)
    }
}

fn slice_items<T: Clone>(items: &[T], start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<T> {
    let len = items.len() as i64;
    let clamp = |idx: i64, upper: i64| -> i64 {
        let idx = if idx < 0 { len + idx } else { idx };
        idx.max(0).min(upper)
    };
    let mut picked = Vec::new();
    if step > 0 {
        let start = clamp(start.unwrap_or(0), len);
        let stop = clamp(stop.unwrap_or(len), len);
        let mut i = start;
        while i < stop {
            picked.push(items[i as usize].clone());
            i += step;
        }
    } else {
        let start = clamp(start.unwrap_or(len - 1), len - 1);
        let stop = match stop {
            Some(s) => clamp(s, len),
            None => -1,
        };
        let mut i = start;
        while i > stop && i >= 0 {
            picked.push(items[i as usize].clone());
            i += step;
        }
    }
    picked
}

/// Float formatting: whole floats keep a trailing `.0` so the subkind
/// stays visible in rendered output.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String { value, .. } => write!(f, "{}", value),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.to_repr())?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, map[key.as_str()].to_repr())?;
                }
                write!(f, "}}")
            }
            Value::Callable(c) => write!(f, "<function {}>", c.name()),
            Value::Object(obj) => write!(f, "<{}>", obj.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            other => write!(f, "{}", other.to_repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String { value: a, .. }, Value::String { value: b, .. }) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Ordering is defined between numbers and between strings; every other
/// pair compares equal so sorting mixed sequences is stable.
pub fn cmp_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::String { value: a, .. }, Value::String { value: b, .. }) => a.as_bytes().cmp(b.as_bytes()),
        (a, b) if a.is_number() && b.is_number() => {
            let a = a.as_f64().unwrap();
            let b = b.as_f64().unwrap();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        _ => Ordering::Equal,
    }
}

pub(crate) fn add(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (a, b) if a.is_number() && b.is_number() => {
            Ok(Value::Float(a.as_f64().unwrap() + b.as_f64().unwrap()))
        }
        (Value::String { value: a, .. }, Value::String { value: b, .. }) => {
            let mut joined = a.clone();
            joined.push_str(b);
            Ok(Value::string(joined))
        }
        (Value::Seq(a), Value::Seq(b)) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Value::Seq(joined))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot add {} and {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn sub(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (a, b) if a.is_number() && b.is_number() => {
            Ok(Value::Float(a.as_f64().unwrap() - b.as_f64().unwrap()))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot subtract {} from {}",
            r.kind_name(),
            l.kind_name()
        ))),
    }
}

pub(crate) fn mul(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (a, b) if a.is_number() && b.is_number() => {
            Ok(Value::Float(a.as_f64().unwrap() * b.as_f64().unwrap()))
        }
        (Value::String { value, .. }, Value::Int(n))
        | (Value::Int(n), Value::String { value, .. }) => {
            Ok(Value::string(value.repeat((*n).max(0) as usize)))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot multiply {} and {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn div(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (a, b) if a.is_number() && b.is_number() => {
            let b = b.as_f64().unwrap();
            if b == 0.0 {
                return Err(TemplateError::arithmetic("Division by zero"));
            }
            Ok(Value::Float(a.as_f64().unwrap() / b))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot divide {} by {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn floor_div(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(TemplateError::arithmetic("Division by zero"));
            }
            Ok(Value::Int(a.div_euclid(*b)))
        }
        (a, b) if a.is_number() && b.is_number() => {
            let b = b.as_f64().unwrap();
            if b == 0.0 {
                return Err(TemplateError::arithmetic("Division by zero"));
            }
            Ok(Value::Int((a.as_f64().unwrap() / b).floor() as i64))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot divide {} by {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn rem(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(TemplateError::arithmetic("Division by zero"));
            }
            Ok(Value::Int(((a % b) + b) % b))
        }
        (a, b) if a.is_number() && b.is_number() => {
            let a = a.as_f64().unwrap();
            let b = b.as_f64().unwrap();
            if b == 0.0 {
                return Err(TemplateError::arithmetic("Division by zero"));
            }
            Ok(Value::Float(a - b * (a / b).floor()))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot take {} modulo {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn pow(left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) if *b >= 0 => {
            match u32::try_from(*b).ok().and_then(|e| a.checked_pow(e)) {
                Some(n) => Ok(Value::Int(n)),
                None => Ok(Value::Float((*a as f64).powf(*b as f64))),
            }
        }
        (a, b) if a.is_number() && b.is_number() => {
            Ok(Value::Float(a.as_f64().unwrap().powf(b.as_f64().unwrap())))
        }
        (l, r) => Err(TemplateError::type_error(format!(
            "Cannot raise {} to {}",
            l.kind_name(),
            r.kind_name()
        ))),
    }
}

pub(crate) fn neg(value: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::Int(n) => Ok(Value::Int(-n)),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(TemplateError::type_error(format!(
            "Cannot negate {}",
            other.kind_name()
        ))),
    }
}

/// Membership for the `in` operator: substring, sequence element or map key.
pub(crate) fn contains(container: &Value, item: &Value) -> Result<bool, TemplateError> {
    match container {
        Value::String { value, .. } => {
            let needle = match item {
                Value::String { value, .. } => value.clone(),
                other => other.to_string(),
            };
            Ok(value.contains(&needle))
        }
        Value::Seq(items) => Ok(items.iter().any(|v| v == item)),
        Value::Map(map) => {
            let key = match item {
                Value::String { value, .. } => value.clone(),
                other => other.to_string(),
            };
            Ok(map.contains_key(&key))
        }
        Value::Object(obj) => match obj.try_iter() {
            Some(items) => Ok(items.iter().any(|v| v == item)),
            None => Err(TemplateError::type_error(
                "Cannot test membership in this object",
            )),
        },
        other => Err(TemplateError::type_error(format!(
            "Cannot test membership in {}",
            other.kind_name()
        ))),
    }
}

fn write_json(value: &Value, out: &mut String, pretty: bool, level: usize) {
    match value {
        Value::Undefined | Value::None => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => {
            if f.is_finite() {
                out.push_str(&format_float(*f));
            } else {
                out.push_str("null");
            }
        }
        Value::String { value, .. } => write_json_string(value, out),
        Value::Seq(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                    if !pretty {
                        out.push(' ');
                    }
                }
                if pretty {
                    newline_indent(out, level + 1);
                }
                write_json(item, out, pretty, level + 1);
            }
            if pretty && !items.is_empty() {
                newline_indent(out, level);
            }
            out.push(']');
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                    if !pretty {
                        out.push(' ');
                    }
                }
                if pretty {
                    newline_indent(out, level + 1);
                }
                write_json_string(key, out);
                out.push_str(": ");
                write_json(&map[key.as_str()], out, pretty, level + 1);
            }
            if pretty && !map.is_empty() {
                newline_indent(out, level);
            }
            out.push('}');
        }
        Value::Callable(_) | Value::Object(_) => out.push_str("null"),
    }
}

fn newline_indent(out: &mut String, level: usize) {
    out.push('\n');
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[test]
fn truthiness() {
    assert!(!Value::Undefined.is_true());
    assert!(!Value::None.is_true());
    assert!(!Value::Int(0).is_true());
    assert!(Value::Int(-1).is_true());
    assert!(!Value::Float(f64::NAN).is_true());
    assert!(!Value::string("").is_true());
    assert!(Value::string("x").is_true());
    assert!(Value::Seq(vec![Value::Int(1)]).is_true());
    assert!(!Value::Map(ValueMap::new()).is_true());
}

#[test]
fn number_subkind_arithmetic() {
    assert_eq!(add(&Value::Int(1), &Value::Int(2)).unwrap(), Value::Int(3));
    assert_eq!(
        div(&Value::Int(10), &Value::Int(4)).unwrap(),
        Value::Float(2.5)
    );
    assert_eq!(
        floor_div(&Value::Int(10), &Value::Int(3)).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        floor_div(&Value::Int(-7), &Value::Int(2)).unwrap(),
        Value::Int(-4)
    );
    assert_eq!(
        pow(&Value::Int(2), &Value::Int(3)).unwrap(),
        Value::Int(8)
    );
    assert_eq!(
        pow(&Value::Int(2), &Value::Int(-1)).unwrap(),
        Value::Float(0.5)
    );
    assert_eq!(
        rem(&Value::Int(-7), &Value::Int(3)).unwrap(),
        Value::Int(2)
    );
}

#[test]
fn division_by_zero_is_an_error() {
    assert!(matches!(
        div(&Value::Int(1), &Value::Int(0)),
        Err(TemplateError::Arithmetic(_))
    ));
    assert!(matches!(
        rem(&Value::Int(1), &Value::Int(0)),
        Err(TemplateError::Arithmetic(_))
    ));
}

#[test]
fn string_rendering() {
    assert_eq!(Value::Undefined.to_string(), "");
    assert_eq!(Value::None.to_string(), "none");
    assert_eq!(Value::Float(8.0).to_string(), "8.0");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
    assert_eq!(Value::Float(f64::NAN).to_string(), "nan");
    let seq = Value::Seq(vec![Value::Int(1), Value::string("a")]);
    assert_eq!(seq.to_string(), "[1, \"a\"]");
}

#[test]
fn map_to_string_sorts_keys() {
    let mut map = ValueMap::new();
    map.insert("b".to_string(), Value::Int(2));
    map.insert("a".to_string(), Value::Int(1));
    assert_eq!(Value::Map(map).to_string(), "{\"a\": 1, \"b\": 2}");
}

#[test]
fn cross_kind_equality() {
    assert_eq!(Value::Int(1), Value::Float(1.0));
    assert_ne!(Value::Int(1), Value::string("1"));
    assert_eq!(Value::Undefined, Value::Undefined);
    assert_ne!(Value::Undefined, Value::None);
}

#[test]
fn slicing() {
    let seq = Value::Seq((1..=5).map(Value::Int).collect());
    assert_eq!(
        seq.slice(Some(1), Some(3), None).unwrap(),
        Value::Seq(vec![Value::Int(2), Value::Int(3)])
    );
    assert_eq!(
        seq.slice(None, None, Some(-1)).unwrap(),
        Value::Seq((1..=5).rev().map(Value::Int).collect())
    );
    let s = Value::string("hello");
    assert_eq!(s.slice(None, Some(2), None).unwrap(), Value::string("he"));
}

#[test]
fn membership() {
    assert!(contains(&Value::string("hanji"), &Value::string("an")).unwrap());
    let seq = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
    assert!(contains(&seq, &Value::Int(2)).unwrap());
    assert!(!contains(&seq, &Value::Int(3)).unwrap());
    let mut map = ValueMap::new();
    map.insert("k".to_string(), Value::Int(1));
    assert!(contains(&Value::Map(map), &Value::string("k")).unwrap());
    assert!(contains(&Value::Int(1), &Value::Int(1)).is_err());
}

#[test]
fn negative_indexing() {
    let seq = Value::Seq(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    assert_eq!(seq.get_item(&Value::Int(-1)), Value::Int(30));
    assert_eq!(seq.get_item(&Value::Int(-3)), Value::Int(10));
    assert_eq!(seq.get_item(&Value::Int(-4)), Value::Undefined);
    assert_eq!(seq.get_item(&Value::Int(5)), Value::Undefined);
    let s = Value::string("ab");
    assert_eq!(s.get_item(&Value::Int(-1)), Value::string("b"));
}

#[test]
fn string_repetition() {
    assert_eq!(
        mul(&Value::string("ab"), &Value::Int(3)).unwrap(),
        Value::string("ababab")
    );
    assert_eq!(
        mul(&Value::Int(0), &Value::string("ab")).unwrap(),
        Value::string("")
    );
}

#[test]
fn error_messages_name_the_kinds() {
    match add(&Value::Seq(Vec::new()), &Value::Int(1)) {
        Err(TemplateError::Type(msg)) => {
            assert_eq!(msg, "Cannot add Seq and Number")
        }
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn ordering_is_defined_for_numbers_and_strings_only() {
    assert_eq!(
        cmp_values(&Value::Int(1), &Value::Float(1.5)),
        Ordering::Less
    );
    assert_eq!(
        cmp_values(&Value::string("a"), &Value::string("b")),
        Ordering::Less
    );
    assert_eq!(
        cmp_values(&Value::Seq(Vec::new()), &Value::Int(1)),
        Ordering::Equal
    );
}

#[test]
fn repr_quotes_strings_only() {
    assert_eq!(Value::string("x").to_repr(), "\"x\"");
    assert_eq!(Value::Int(3).to_repr(), "3");
    assert_eq!(Value::None.to_repr(), "none");
}

#[test]
fn iteration_shapes() {
    assert_eq!(
        Value::string("ab").try_iter().unwrap(),
        vec![Value::string("a"), Value::string("b")]
    );
    let mut map = ValueMap::new();
    map.insert("z".to_string(), Value::Int(1));
    map.insert("a".to_string(), Value::Int(2));
    assert_eq!(
        Value::Map(map).try_iter().unwrap(),
        vec![Value::string("z"), Value::string("a")]
    );
    assert!(Value::Int(1).try_iter().is_none());
}

#[test]
fn pretty_json_indents() {
    let mut map = ValueMap::new();
    map.insert("a".to_string(), Value::Seq(vec![Value::Int(1)]));
    assert_eq!(
        Value::Map(map).to_json(true),
        "{\n  \"a\": [\n    1\n  ]\n}"
    );
}

#[test]
fn json_escapes_and_sorted_keys() {
    let mut map = ValueMap::new();
    map.insert("b".to_string(), Value::string("x\ny"));
    map.insert("a".to_string(), Value::Float(f64::INFINITY));
    assert_eq!(
        Value::Map(map).to_json(false),
        "{\"a\": null, \"b\": \"x\\ny\"}"
    );
}
