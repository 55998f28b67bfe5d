//! Conversions between host values and template values.
//!
//! The render entry point takes anything `Into<Value>`; JSON documents are
//! the canonical interchange form, so `serde_json::Value` converts directly
//! and arbitrary `Serialize` types go through [`Value::from_serialize`].

use crate::error::TemplateError;
use crate::value::{Value, ValueMap};
use serde::Serialize;
use std::collections::HashMap;

/// Conversion capability for host objects that want to hand a whole set of
/// variables to the engine, typically a `Map` value seeding the root scope.
pub trait ToTemplateValues {
    fn to_template_values(&self) -> Result<Value, TemplateError>;
}

impl Value {
    /// Converts any serializable host value through its JSON shape.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Value, TemplateError> {
        match serde_json::to_value(value) {
            Ok(json) => Ok(Value::from(json)),
            Err(e) => Err(TemplateError::Conversion(format!(
                "Value is not serializable: {}",
                e
            ))),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Float(u as f64)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut out = ValueMap::new();
                for (k, v) in map {
                    out.insert(k, Value::from(v));
                }
                Value::Map(out)
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Value {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::Seq(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Value {
        Value::Map(map)
    }
}

/// A sequence of pairs is read as a mapping, in the given order.
impl From<Vec<(String, Value)>> for Value {
    fn from(pairs: Vec<(String, Value)>) -> Value {
        Value::Map(pairs.into_iter().collect())
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Value {
        Value::Map(map.into_iter().collect())
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(opt: Option<T>) -> Value {
        match opt {
            Some(v) => Value::from(v),
            None => Value::None,
        }
    }
}

#[test]
fn json_conversion() {
    let json: serde_json::Value =
        serde_json::from_str(r#"{ "a": 1, "b": [true, null], "c": 2.5 }"#).unwrap();
    let value = Value::from(json);
    assert_eq!(value.get_attr("a"), Value::Int(1));
    assert_eq!(
        value.get_attr("b"),
        Value::Seq(vec![Value::Bool(true), Value::None])
    );
    assert_eq!(value.get_attr("c"), Value::Float(2.5));
}

#[test]
fn pairs_become_a_map() {
    let value = Value::from(vec![
        ("x".to_string(), Value::Int(1)),
        ("y".to_string(), Value::Int(2)),
    ]);
    assert_eq!(value.get_attr("x"), Value::Int(1));
    assert_eq!(value.get_attr("y"), Value::Int(2));
}

#[test]
fn from_serialize_goes_through_json() {
    #[derive(Serialize)]
    struct User {
        name: &'static str,
        admin: bool,
    }
    let value = Value::from_serialize(&User {
        name: "kim",
        admin: true,
    })
    .unwrap();
    assert_eq!(value.get_attr("name"), Value::string("kim"));
    assert_eq!(value.get_attr("admin"), Value::Bool(true));
}
