//! Built-in global functions, resolved after scopes, macros, environment
//! globals and user functions.

use crate::error::TemplateError;
use crate::object::{Cycler, Joiner, Namespace};
use crate::state::State;
use crate::value::{Kwargs, Value};

type BuiltinFunction =
    fn(&[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError>;

pub(crate) fn builtin(name: &str) -> Option<Value> {
    let function: BuiltinFunction = match name {
        "range" => range,
        "lipsum" => lipsum,
        "cycler" => cycler,
        "joiner" => joiner,
        "namespace" => namespace,
        "dict" => dict,
        "debug" => debug,
        _ => return None,
    };
    Some(Value::from_function(name, function))
}

fn int_arg(function: &str, value: &Value) -> Result<i64, TemplateError> {
    value.as_int().ok_or_else(|| {
        TemplateError::type_error(format!(
            "{} expects integer arguments, got {}",
            function,
            value.kind_name()
        ))
    })
}

/// `range(stop)`, `range(start, stop)` or `range(start, stop, step)`.
fn range(args: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let (start, stop, step) = match args {
        [stop] => (0, int_arg("range", stop)?, 1),
        [start, stop] => (int_arg("range", start)?, int_arg("range", stop)?, 1),
        [start, stop, step] => (
            int_arg("range", start)?,
            int_arg("range", stop)?,
            int_arg("range", step)?,
        ),
        _ => {
            return Err(TemplateError::type_error(
                "range takes one to three arguments",
            ))
        }
    };
    if step == 0 {
        return Err(TemplateError::arithmetic("Range step must not be zero"));
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current += step;
    }
    Ok(Value::Seq(items))
}

const LOREM: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit",
    "sed", "do", "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore",
    "magna", "aliqua", "enim", "ad", "minim", "veniam", "quis", "nostrud",
];

/// Deterministic filler text: `lipsum(n=5, html=true)`.
fn lipsum(args: &[Value], kwargs: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let n = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kwargs.get("n").and_then(Value::as_int))
        .unwrap_or(5)
        .max(0) as usize;
    let html = args
        .get(1)
        .map(Value::is_true)
        .or_else(|| kwargs.get("html").map(Value::is_true))
        .unwrap_or(true);
    let mut paragraphs = Vec::with_capacity(n);
    for p in 0..n {
        let mut sentences = Vec::new();
        for s in 0..4 {
            let mut words = Vec::new();
            for w in 0..8 {
                words.push(LOREM[(p * 11 + s * 5 + w) % LOREM.len()]);
            }
            let mut sentence = words.join(" ");
            let first = sentence.remove(0).to_uppercase().to_string();
            sentences.push(format!("{}{}.", first, sentence));
        }
        paragraphs.push(sentences.join(" "));
    }
    if html {
        let body = paragraphs
            .into_iter()
            .map(|p| format!("<p>{}</p>", p))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Value::from_safe_string(body))
    } else {
        Ok(Value::string(paragraphs.join("\n\n")))
    }
}

fn cycler(args: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    if args.is_empty() {
        return Err(TemplateError::type_error(
            "cycler expects at least one value",
        ));
    }
    Ok(Value::from_object(Cycler::new(args.to_vec())))
}

fn joiner(args: &[Value], kwargs: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let sep = args
        .first()
        .or_else(|| kwargs.get("sep"))
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| ", ".to_string());
    Ok(Value::from_object(Joiner::new(sep)))
}

fn namespace(_: &[Value], kwargs: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::from_object(Namespace::new(kwargs.clone())))
}

fn dict(_: &[Value], kwargs: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::Map(kwargs.clone()))
}

/// Dump of every visible variable, mostly useful while writing templates.
fn debug(_: &[Value], _: &Kwargs, state: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::string(Value::Map(state.flatten_scopes()).to_string()))
}

#[cfg(test)]
use crate::environment::Environment;
#[cfg(test)]
use crate::value::ValueMap;

#[cfg(test)]
fn call(name: &str, args: &[Value]) -> Result<Value, TemplateError> {
    let env = Environment::new();
    let mut state = State::new(&env, ValueMap::new());
    match builtin(name) {
        Some(Value::Callable(f)) => f.call(args, &Kwargs::new(), &mut state),
        other => panic!("Expected a builtin callable, got {:?}", other),
    }
}

#[test]
fn range_shapes() {
    assert_eq!(
        call("range", &[Value::Int(3)]).unwrap(),
        Value::Seq(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
    );
    assert_eq!(
        call("range", &[Value::Int(2), Value::Int(5)]).unwrap(),
        Value::Seq(vec![Value::Int(2), Value::Int(3), Value::Int(4)])
    );
    assert_eq!(
        call("range", &[Value::Int(5), Value::Int(1), Value::Int(-2)]).unwrap(),
        Value::Seq(vec![Value::Int(5), Value::Int(3)])
    );
}

#[test]
fn range_step_zero_is_an_error() {
    match call("range", &[Value::Int(0), Value::Int(5), Value::Int(0)]) {
        Err(TemplateError::Arithmetic(msg)) => assert!(msg.contains("step")),
        other => panic!("Expected arithmetic error, got {:?}", other),
    }
}

#[test]
fn lipsum_is_deterministic() {
    let a = call("lipsum", &[Value::Int(2)]).unwrap();
    let b = call("lipsum", &[Value::Int(2)]).unwrap();
    assert_eq!(a, b);
    assert!(a.is_safe());
    assert!(a.to_string().starts_with("<p>"));
}

#[test]
fn dict_builds_a_map_from_kwargs() {
    let env = Environment::new();
    let mut state = State::new(&env, ValueMap::new());
    let mut kwargs = Kwargs::new();
    kwargs.insert("a".to_string(), Value::Int(1));
    let value = match builtin("dict") {
        Some(Value::Callable(f)) => f.call(&[], &kwargs, &mut state).unwrap(),
        other => panic!("Expected a builtin callable, got {:?}", other),
    };
    assert_eq!(value.get_attr("a"), Value::Int(1));
}

#[test]
fn debug_dumps_the_scopes() {
    let env = Environment::new();
    let mut root = ValueMap::new();
    root.insert("a".to_string(), Value::Int(1));
    let mut state = State::new(&env, root);
    let out = debug(&[], &Kwargs::new(), &mut state).unwrap();
    assert_eq!(out, Value::string("{\"a\": 1}"));
}

#[test]
fn unknown_builtin_is_none() {
    assert!(builtin("florp").is_none());
}
