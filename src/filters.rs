//! The built-in filter table.
//!
//! Every filter receives `(subject, positional args, keyword args, state)`.
//! User filters registered on the environment are consulted first, so any
//! name here can be overridden.

use crate::error::TemplateError;
use crate::state::State;
use crate::tests;
use crate::value::{cmp_values, Kwargs, Value, ValueMap};
use itertools::Itertools;

pub(crate) type BuiltinFilter =
    fn(&Value, &[Value], &Kwargs, &mut State<'_>) -> Result<Value, TemplateError>;

/// Applies a filter by name: user-registered filters shadow built-ins.
pub(crate) fn apply(
    state: &mut State<'_>,
    name: &str,
    subject: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value, TemplateError> {
    if let Some(filter) = state.env().get_filter(name) {
        return filter(subject, args, kwargs, state);
    }
    match find(name) {
        Some(filter) => filter(subject, args, kwargs, state),
        None => Err(TemplateError::unknown_name(format!(
            "Filter {} is not registered",
            name
        ))),
    }
}

pub(crate) fn find(name: &str) -> Option<BuiltinFilter> {
    Some(match name {
        "upper" => upper,
        "lower" => lower,
        "capitalize" => capitalize,
        "title" => title,
        "trim" => trim,
        "length" | "count" => length,
        "first" => first,
        "last" => last,
        "reverse" => reverse,
        "sort" => sort,
        "join" => join,
        "replace" => replace,
        "split" => split,
        "abs" => abs,
        "int" => int,
        "float" => float,
        "string" => string,
        "default" | "d" => default,
        "list" => list,
        "batch" => batch,
        "slice" => slice,
        "items" => items,
        "dictsort" => dictsort,
        "groupby" => groupby,
        "map" => map,
        "select" => select,
        "reject" => reject,
        "selectattr" => selectattr,
        "rejectattr" => rejectattr,
        "unique" => unique,
        "min" => min,
        "max" => max,
        "sum" => sum,
        "round" => round,
        "attr" => attr,
        "tojson" => tojson,
        "safe" => safe,
        "escape" | "e" => escape,
        "striptags" => striptags,
        "urlencode" => urlencode,
        "indent" => indent,
        "wordcount" => wordcount,
        "truncate" => truncate,
        "wordwrap" => wordwrap,
        "center" => center,
        "format" => format,
        "pprint" => pprint,
        "xmlattr" => xmlattr,
        _ => return None,
    })
}

// Argument helpers --------------------------------------------------------

fn iterable(filter: &str, value: &Value) -> Result<Vec<Value>, TemplateError> {
    value.try_iter().ok_or_else(|| {
        TemplateError::type_error(format!(
            "Filter {} expects an iterable, got {}",
            filter,
            value.kind_name()
        ))
    })
}

fn kw_bool(kwargs: &Kwargs, name: &str, fallback: bool) -> bool {
    kwargs.get(name).map(Value::is_true).unwrap_or(fallback)
}

fn kw_str(kwargs: &Kwargs, name: &str) -> Option<String> {
    kwargs.get(name).map(|v| match v.as_str() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    })
}

fn kw_int(kwargs: &Kwargs, name: &str) -> Option<i64> {
    kwargs.get(name).and_then(Value::as_int)
}

fn arg_str(args: &[Value], idx: usize) -> Option<String> {
    args.get(idx).map(|v| match v.as_str() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    })
}

fn attribute_of(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for part in path.split('.') {
        current = match part.parse::<i64>() {
            Ok(idx) => current.get_item(&Value::Int(idx)),
            Err(_) => current.get_attr(part),
        };
    }
    current
}

// String filters ----------------------------------------------------------

fn upper(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::string(v.to_string().to_uppercase()))
}

fn lower(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::string(v.to_string().to_lowercase()))
}

fn capitalize(
    v: &Value,
    _: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::string(out))
}

fn title(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let mut out = String::new();
    let mut at_word_start = true;
    for c in v.to_string().chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    Ok(Value::string(out))
}

fn trim(v: &Value, args: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let out = match arg_str(args, 0) {
        Some(chars) => {
            let set: Vec<char> = chars.chars().collect();
            s.trim_matches(|c| set.contains(&c)).to_string()
        }
        None => s.trim().to_string(),
    };
    Ok(Value::string(out))
}

fn replace(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let old = arg_str(args, 0).ok_or_else(|| {
        TemplateError::type_error("Filter replace requires the string to replace")
    })?;
    let new = arg_str(args, 1).unwrap_or_default();
    let out = match args.get(2).and_then(Value::as_int).or_else(|| kw_int(kwargs, "count")) {
        Some(count) => s.replacen(&old, &new, count.max(0) as usize),
        None => s.replace(&old, &new),
    };
    Ok(Value::string(out))
}

fn split(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let parts: Vec<Value> = match args.first() {
        Some(Value::None) | Some(Value::Undefined) | None => {
            s.split_whitespace().map(Value::string).collect()
        }
        Some(sep) => {
            let sep = match sep.as_str() {
                Some(sep) => sep.to_string(),
                None => sep.to_string(),
            };
            s.split(sep.as_str()).map(Value::string).collect()
        }
    };
    Ok(Value::Seq(parts))
}

fn indent(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let width = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "width"))
        .unwrap_or(4)
        .max(0) as usize;
    let first = args.get(1).map(Value::is_true).unwrap_or_else(|| kw_bool(kwargs, "first", false));
    let blank = args.get(2).map(Value::is_true).unwrap_or_else(|| kw_bool(kwargs, "blank", false));
    let pad = " ".repeat(width);
    let s = v.to_string();
    let mut out = String::new();
    for (i, line) in s.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let skip = (i == 0 && !first) || (line.is_empty() && !blank);
        if !skip {
            out.push_str(&pad);
        }
        out.push_str(line);
    }
    Ok(Value::string(out))
}

fn wordcount(
    v: &Value,
    _: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    Ok(Value::Int(v.to_string().split_whitespace().count() as i64))
}

fn truncate(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let length = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "length"))
        .unwrap_or(255)
        .max(0) as usize;
    let killwords = args.get(1).map(Value::is_true).unwrap_or_else(|| kw_bool(kwargs, "killwords", false));
    let end = arg_str(args, 2)
        .or_else(|| kw_str(kwargs, "end"))
        .unwrap_or_else(|| "...".to_string());
    let leeway = kw_int(kwargs, "leeway").unwrap_or(5).max(0) as usize;
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= length + leeway {
        return Ok(Value::string(s));
    }
    let keep = length.saturating_sub(end.chars().count());
    let cut: String = chars[..keep].iter().collect();
    let cut = if killwords {
        cut
    } else {
        match cut.rfind(' ') {
            Some(idx) => cut[..idx].to_string(),
            None => cut,
        }
    };
    Ok(Value::string(cut + &end))
}

fn wordwrap(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let width = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "width"))
        .unwrap_or(79)
        .max(1) as usize;
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for word in v.to_string().split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    Ok(Value::string(lines.join("\n")))
}

fn center(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let width = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "width"))
        .unwrap_or(80)
        .max(0) as usize;
    let s = v.to_string();
    let len = s.chars().count();
    if len >= width {
        return Ok(Value::string(s));
    }
    let total = width - len;
    let left = total / 2;
    Ok(Value::string(format!(
        "{}{}{}",
        " ".repeat(left),
        s,
        " ".repeat(total - left)
    )))
}

/// printf-style formatting with `%s`, `%d`, `%f` and `%%`.
fn format(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let template = v.to_string();
    let mut out = String::new();
    let mut next_arg = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(directive) => {
                let arg = args.get(next_arg).ok_or_else(|| {
                    TemplateError::type_error("Not enough arguments for format string")
                })?;
                next_arg += 1;
                match directive {
                    's' => out.push_str(&arg.to_string()),
                    'd' => match arg.as_f64() {
                        Some(f) => out.push_str(&(f as i64).to_string()),
                        None => {
                            return Err(TemplateError::type_error(format!(
                                "%d expects a number, got {}",
                                arg.kind_name()
                            )))
                        }
                    },
                    'f' => match arg.as_f64() {
                        Some(f) => out.push_str(&format!("{:.6}", f)),
                        None => {
                            return Err(TemplateError::type_error(format!(
                                "%f expects a number, got {}",
                                arg.kind_name()
                            )))
                        }
                    },
                    other => {
                        return Err(TemplateError::type_error(format!(
                            "Unsupported format directive %{}",
                            other
                        )))
                    }
                }
            }
            None => out.push('%'),
        }
    }
    Ok(Value::string(out))
}

// Sequence filters --------------------------------------------------------

fn length(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match v.len() {
        Some(len) => Ok(Value::Int(len as i64)),
        None => Err(TemplateError::type_error(format!(
            "Cannot compute length of {}",
            v.kind_name()
        ))),
    }
}

fn first(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let items = iterable("first", v)?;
    Ok(items.into_iter().next().unwrap_or(Value::Undefined))
}

fn last(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let items = iterable("last", v)?;
    Ok(items.into_iter().last().unwrap_or(Value::Undefined))
}

fn reverse(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match v {
        Value::String { value, .. } => Ok(Value::string(value.chars().rev().collect::<String>())),
        other => {
            let mut items = iterable("reverse", other)?;
            items.reverse();
            Ok(Value::Seq(items))
        }
    }
}

fn sort(
    v: &Value,
    _: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let mut items = iterable("sort", v)?;
    let reverse = kw_bool(kwargs, "reverse", false);
    match kw_str(kwargs, "attribute") {
        Some(path) => items
            .sort_by(|a, b| cmp_values(&attribute_of(a, &path), &attribute_of(b, &path))),
        None => items.sort_by(cmp_values),
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::Seq(items))
}

fn join(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("join", v)?;
    let sep = arg_str(args, 0).unwrap_or_default();
    let joined = match kw_str(kwargs, "attribute") {
        Some(path) => items
            .iter()
            .map(|item| attribute_of(item, &path).to_string())
            .join(&sep),
        None => items.iter().map(|item| item.to_string()).join(&sep),
    };
    Ok(Value::string(joined))
}

fn list(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::Seq(iterable("list", v)?))
}

fn batch(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("batch", v)?;
    let size = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "linecount"))
        .unwrap_or(1)
        .max(1) as usize;
    let fill = args.get(1).cloned().or_else(|| kwargs.get("fill_with").cloned());
    let mut rows = Vec::new();
    for chunk in items.chunks(size) {
        let mut row = chunk.to_vec();
        if let Some(fill) = &fill {
            while row.len() < size {
                row.push(fill.clone());
            }
        }
        rows.push(Value::Seq(row));
    }
    Ok(Value::Seq(rows))
}

fn slice(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("slice", v)?;
    let count = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "slices"))
        .unwrap_or(1)
        .max(1) as usize;
    let fill = args.get(1).cloned().or_else(|| kwargs.get("fill_with").cloned());
    let per = items.len() / count;
    let extra = items.len() % count;
    let mut out = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let take = per + usize::from(i < extra);
        let mut group: Vec<Value> = items[offset..offset + take].to_vec();
        offset += take;
        if let Some(fill) = &fill {
            if i >= extra && per + 1 > group.len() && extra > 0 {
                group.push(fill.clone());
            }
        }
        out.push(Value::Seq(group));
    }
    Ok(Value::Seq(out))
}

fn unique(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let items = iterable("unique", v)?;
    let mut seen: Vec<Value> = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    Ok(Value::Seq(seen))
}

fn min(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let items = iterable("min", v)?;
    Ok(items
        .into_iter()
        .min_by(|a, b| cmp_values(a, b))
        .unwrap_or(Value::Undefined))
}

fn max(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let items = iterable("max", v)?;
    Ok(items
        .into_iter()
        .max_by(|a, b| cmp_values(a, b))
        .unwrap_or(Value::Undefined))
}

fn sum(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("sum", v)?;
    let mut total = args
        .get(0)
        .cloned()
        .or_else(|| kwargs.get("start").cloned())
        .unwrap_or(Value::Int(0));
    let path = kw_str(kwargs, "attribute");
    for item in items {
        let term = match &path {
            Some(path) => attribute_of(&item, path),
            None => item,
        };
        total = crate::value::add(&total, &term)?;
    }
    Ok(total)
}

// Map filters -------------------------------------------------------------

fn items(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match v {
        Value::Map(map) => Ok(Value::Seq(
            map.iter()
                .map(|(k, v)| Value::Seq(vec![Value::string(k.clone()), v.clone()]))
                .collect(),
        )),
        Value::Undefined => Ok(Value::Seq(Vec::new())),
        other => Err(TemplateError::type_error(format!(
            "Filter items expects a map, got {}",
            other.kind_name()
        ))),
    }
}

fn dictsort(
    v: &Value,
    _: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let map = match v {
        Value::Map(map) => map,
        other => {
            return Err(TemplateError::type_error(format!(
                "Filter dictsort expects a map, got {}",
                other.kind_name()
            )))
        }
    };
    let by_value = match kw_str(kwargs, "by").as_deref() {
        Some("value") => true,
        Some("key") | None => false,
        Some(other) => {
            return Err(TemplateError::type_error(format!(
                "dictsort by must be key or value, got {}",
                other
            )))
        }
    };
    let mut pairs: Vec<(String, Value)> =
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    if by_value {
        pairs.sort_by(|a, b| cmp_values(&a.1, &b.1));
    } else {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
    }
    if kw_bool(kwargs, "reverse", false) {
        pairs.reverse();
    }
    Ok(Value::Seq(
        pairs
            .into_iter()
            .map(|(k, v)| Value::Seq(vec![Value::string(k), v]))
            .collect(),
    ))
}

fn groupby(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("groupby", v)?;
    let path = arg_str(args, 0)
        .or_else(|| kw_str(kwargs, "attribute"))
        .ok_or_else(|| TemplateError::type_error("Filter groupby requires an attribute"))?;
    let mut sorted = items;
    sorted.sort_by(|a, b| cmp_values(&attribute_of(a, &path), &attribute_of(b, &path)));
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in sorted {
        let key = attribute_of(&item, &path);
        match groups.last_mut() {
            Some((grouper, members)) if *grouper == key => members.push(item),
            _ => groups.push((key, vec![item])),
        }
    }
    Ok(Value::Seq(
        groups
            .into_iter()
            .map(|(grouper, members)| Value::Seq(vec![grouper, Value::Seq(members)]))
            .collect(),
    ))
}

fn attr(v: &Value, args: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match arg_str(args, 0) {
        Some(name) => Ok(v.get_attr(&name)),
        None => Err(TemplateError::type_error("Filter attr requires a name")),
    }
}

// Higher order filters ----------------------------------------------------

fn map(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable("map", v)?;
    if let Some(path) = kw_str(kwargs, "attribute") {
        let fallback = kwargs.get("default").cloned();
        let mapped = items
            .iter()
            .map(|item| {
                let picked = attribute_of(item, &path);
                match (&picked, &fallback) {
                    (Value::Undefined, Some(fallback)) => fallback.clone(),
                    _ => picked,
                }
            })
            .collect();
        return Ok(Value::Seq(mapped));
    }
    let filter_name = arg_str(args, 0)
        .ok_or_else(|| TemplateError::type_error("Filter map requires a filter name"))?;
    let rest = &args[1..];
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        mapped.push(apply(state, &filter_name, &item, rest, &Kwargs::new())?);
    }
    Ok(Value::Seq(mapped))
}

fn select_impl(
    filter: &str,
    keep_matching: bool,
    by_attr: bool,
    v: &Value,
    args: &[Value],
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let items = iterable(filter, v)?;
    let (path, args) = if by_attr {
        let path = arg_str(args, 0).ok_or_else(|| {
            TemplateError::type_error(format!("Filter {} requires an attribute", filter))
        })?;
        (Some(path), &args[1..])
    } else {
        (None, args)
    };
    let test_name = args.first().map(|v| match v.as_str() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    });
    let test_args = if args.is_empty() { &[][..] } else { &args[1..] };
    let mut kept = Vec::new();
    for item in items {
        let subject = match &path {
            Some(path) => attribute_of(&item, path),
            None => item.clone(),
        };
        let passed = match &test_name {
            Some(name) => tests::apply(state, name, &subject, test_args)?,
            None => subject.is_true(),
        };
        if passed == keep_matching {
            kept.push(item);
        }
    }
    Ok(Value::Seq(kept))
}

fn select(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    select_impl("select", true, false, v, args, state)
}

fn reject(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    select_impl("reject", false, false, v, args, state)
}

fn selectattr(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    select_impl("selectattr", true, true, v, args, state)
}

fn rejectattr(
    v: &Value,
    args: &[Value],
    _: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    select_impl("rejectattr", false, true, v, args, state)
}

// Numeric filters ---------------------------------------------------------

fn abs(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match v {
        Value::Int(n) => Ok(Value::Int(n.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(TemplateError::type_error(format!(
            "Filter abs expects a number, got {}",
            other.kind_name()
        ))),
    }
}

fn int(v: &Value, args: &[Value], kwargs: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let fallback = || {
        args.first()
            .and_then(Value::as_int)
            .or_else(|| kw_int(kwargs, "default"))
            .unwrap_or(0)
    };
    let out = match v {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => i64::from(*b),
        Value::String { value, .. } => match value.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => match value.trim().parse::<f64>() {
                Ok(f) => f as i64,
                Err(_) => fallback(),
            },
        },
        _ => fallback(),
    };
    Ok(Value::Int(out))
}

fn float(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let fallback = || {
        args.first()
            .and_then(Value::as_f64)
            .or_else(|| kwargs.get("default").and_then(Value::as_f64))
            .unwrap_or(0.0)
    };
    let out = match v {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::String { value, .. } => value.trim().parse::<f64>().unwrap_or_else(|_| fallback()),
        _ => fallback(),
    };
    Ok(Value::Float(out))
}

fn round(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let value = v.as_f64().ok_or_else(|| {
        TemplateError::type_error(format!("Filter round expects a number, got {}", v.kind_name()))
    })?;
    let precision = args
        .first()
        .and_then(Value::as_int)
        .or_else(|| kw_int(kwargs, "precision"))
        .unwrap_or(0);
    let method = arg_str(args, 1)
        .or_else(|| kw_str(kwargs, "method"))
        .unwrap_or_else(|| "common".to_string());
    let factor = 10f64.powi(precision as i32);
    let scaled = value * factor;
    let rounded = match method.as_str() {
        "common" => scaled.round(),
        "ceil" => scaled.ceil(),
        "floor" => scaled.floor(),
        other => {
            return Err(TemplateError::type_error(format!(
                "round method must be common, ceil or floor, got {}",
                other
            )))
        }
    };
    Ok(Value::Float(rounded / factor))
}

// Conversion and HTML filters ---------------------------------------------

fn string(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    match v {
        Value::String { .. } => Ok(v.clone()),
        other => Ok(Value::string(other.to_string())),
    }
}

fn default(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let fallback = args.first().cloned().unwrap_or_else(|| Value::string(""));
    let falsy_counts = args.get(1).map(Value::is_true).unwrap_or_else(|| kw_bool(kwargs, "boolean", false));
    let missing = if falsy_counts {
        !v.is_true()
    } else {
        v.is_undefined()
    };
    Ok(if missing { fallback } else { v.clone() })
}

fn safe(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::from_safe_string(v.to_string()))
}

fn escape(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    if v.is_safe() {
        return Ok(v.clone());
    }
    let escaped = html_escape::encode_safe(&v.to_string()).into_owned();
    Ok(Value::from_safe_string(escaped))
}

fn striptags(
    v: &Value,
    _: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let s = v.to_string();
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    Ok(Value::string(out.split_whitespace().join(" ")))
}

fn urlencode(
    v: &Value,
    _: &[Value],
    _: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    match v {
        Value::Map(map) => {
            let encoded = map
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        percent_encode(k, false),
                        percent_encode(&v.to_string(), false)
                    )
                })
                .join("&");
            Ok(Value::string(encoded))
        }
        other => Ok(Value::string(percent_encode(&other.to_string(), true))),
    }
}

fn percent_encode(s: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'.' | b'_' | b'~')
            || (keep_slash && byte == b'/');
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn tojson(
    v: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    _: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let pretty = args.first().map(Value::is_true).unwrap_or_else(|| kwargs.contains_key("indent"));
    Ok(Value::from_safe_string(v.to_json(pretty)))
}

fn pprint(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    Ok(Value::from_safe_string(v.to_repr()))
}

fn xmlattr(v: &Value, _: &[Value], _: &Kwargs, _: &mut State<'_>) -> Result<Value, TemplateError> {
    let map = match v {
        Value::Map(map) => map,
        other => {
            return Err(TemplateError::type_error(format!(
                "Filter xmlattr expects a map, got {}",
                other.kind_name()
            )))
        }
    };
    let mut out = String::new();
    for (key, value) in map {
        if value.is_undefined() || value.is_none() {
            continue;
        }
        out.push(' ');
        out.push_str(&html_escape::encode_safe(key));
        out.push_str("=\"");
        out.push_str(&html_escape::encode_safe(&value.to_string()));
        out.push('"');
    }
    Ok(Value::from_safe_string(out))
}

#[cfg(test)]
use crate::environment::Environment;

#[cfg(test)]
fn run(name: &str, subject: Value, args: &[Value]) -> Result<Value, TemplateError> {
    let env = Environment::new();
    let mut state = State::new(&env, ValueMap::new());
    apply(&mut state, name, &subject, args, &Kwargs::new())
}

#[test]
fn string_filters() {
    assert_eq!(
        run("upper", Value::string("hello"), &[]).unwrap(),
        Value::string("HELLO")
    );
    assert_eq!(
        run("capitalize", Value::string("hELLO"), &[]).unwrap(),
        Value::string("Hello")
    );
    assert_eq!(
        run("title", Value::string("war and peace"), &[]).unwrap(),
        Value::string("War And Peace")
    );
    assert_eq!(
        run("reverse", Value::string("HELLO"), &[]).unwrap(),
        Value::string("OLLEH")
    );
}

#[test]
fn trim_is_idempotent() {
    let once = run("trim", Value::string("  x  "), &[]).unwrap();
    let twice = run("trim", once.clone(), &[]).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, Value::string("x"));
}

#[test]
fn sort_orders_and_keeps_every_element() {
    let input = Value::Seq(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
    let sorted = run("sort", input, &[]).unwrap();
    assert_eq!(
        sorted,
        Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn default_only_replaces_undefined() {
    assert_eq!(
        run("default", Value::Undefined, &[Value::string("x")]).unwrap(),
        Value::string("x")
    );
    assert_eq!(
        run("default", Value::string(""), &[Value::string("x")]).unwrap(),
        Value::string("")
    );
    assert_eq!(
        run(
            "default",
            Value::string(""),
            &[Value::string("x"), Value::Bool(true)]
        )
        .unwrap(),
        Value::string("x")
    );
}

#[test]
fn batch_fills_the_tail() {
    let input = Value::Seq((1..=5).map(Value::Int).collect());
    let rows = run("batch", input, &[Value::Int(2), Value::Int(0)]).unwrap();
    assert_eq!(
        rows,
        Value::Seq(vec![
            Value::Seq(vec![Value::Int(1), Value::Int(2)]),
            Value::Seq(vec![Value::Int(3), Value::Int(4)]),
            Value::Seq(vec![Value::Int(5), Value::Int(0)]),
        ])
    );
}

#[test]
fn tojson_is_safe_and_escaped() {
    let out = run("tojson", Value::string("a\"b"), &[]).unwrap();
    assert!(out.is_safe());
    assert_eq!(out.to_string(), "\"a\\\"b\"");
}

#[test]
fn unknown_filter_is_reported() {
    match run("florp", Value::Int(1), &[]) {
        Err(TemplateError::UnknownName(msg)) => assert!(msg.contains("florp")),
        other => panic!("Expected unknown name error, got {:?}", other),
    }
}

#[cfg(test)]
fn run_kw(
    name: &str,
    subject: Value,
    args: &[Value],
    kwargs: &[(&str, Value)],
) -> Result<Value, TemplateError> {
    let env = Environment::new();
    let mut state = State::new(&env, ValueMap::new());
    let kwargs: Kwargs = kwargs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    apply(&mut state, name, &subject, args, &kwargs)
}

#[test]
fn sort_by_attribute_and_reverse() {
    let input = Value::Seq(vec![
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(2))])),
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(1))])),
    ]);
    let sorted = run_kw(
        "sort",
        input.clone(),
        &[],
        &[("attribute", Value::string("n"))],
    )
    .unwrap();
    match &sorted {
        Value::Seq(items) => assert_eq!(items[0].get_attr("n"), Value::Int(1)),
        other => panic!("Expected seq, got {:?}", other),
    }
    let reversed = run_kw(
        "sort",
        Value::Seq(vec![Value::Int(1), Value::Int(3), Value::Int(2)]),
        &[],
        &[("reverse", Value::Bool(true))],
    )
    .unwrap();
    assert_eq!(
        reversed,
        Value::Seq(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
    );
}

#[test]
fn numeric_conversions() {
    assert_eq!(run("int", Value::string(" 42 "), &[]).unwrap(), Value::Int(42));
    assert_eq!(run("int", Value::string("2.9"), &[]).unwrap(), Value::Int(2));
    assert_eq!(
        run("int", Value::string("nope"), &[Value::Int(7)]).unwrap(),
        Value::Int(7)
    );
    assert_eq!(run("int", Value::Bool(true), &[]).unwrap(), Value::Int(1));
    assert_eq!(
        run("float", Value::string("2.5"), &[]).unwrap(),
        Value::Float(2.5)
    );
    assert_eq!(run("abs", Value::Int(-3), &[]).unwrap(), Value::Int(3));
}

#[test]
fn rounding_methods() {
    assert_eq!(
        run("round", Value::Float(1.25), &[Value::Int(1)]).unwrap(),
        Value::Float(1.3)
    );
    assert_eq!(
        run("round", Value::Float(2.5), &[]).unwrap(),
        Value::Float(3.0)
    );
    assert_eq!(
        run(
            "round",
            Value::Float(2.1),
            &[Value::Int(0), Value::string("ceil")]
        )
        .unwrap(),
        Value::Float(3.0)
    );
    assert_eq!(
        run(
            "round",
            Value::Float(2.9),
            &[Value::Int(0), Value::string("floor")]
        )
        .unwrap(),
        Value::Float(2.0)
    );
}

#[test]
fn select_and_reject_with_tests() {
    let input = Value::Seq((1..=5).map(Value::Int).collect());
    assert_eq!(
        run("select", input.clone(), &[Value::string("odd")]).unwrap(),
        Value::Seq(vec![Value::Int(1), Value::Int(3), Value::Int(5)])
    );
    assert_eq!(
        run(
            "reject",
            input.clone(),
            &[Value::string("lt"), Value::Int(3)]
        )
        .unwrap(),
        Value::Seq(vec![Value::Int(3), Value::Int(4), Value::Int(5)])
    );
    // Without a test the filter keeps (or drops) truthy items.
    let with_zero = Value::Seq(vec![Value::Int(0), Value::Int(1)]);
    assert_eq!(
        run("select", with_zero, &[]).unwrap(),
        Value::Seq(vec![Value::Int(1)])
    );
}

#[test]
fn selectattr_inspects_attributes() {
    let input = Value::Seq(vec![
        Value::Map(ValueMap::from_iter([
            ("name".to_string(), Value::string("a")),
            ("ok".to_string(), Value::Bool(true)),
        ])),
        Value::Map(ValueMap::from_iter([
            ("name".to_string(), Value::string("b")),
            ("ok".to_string(), Value::Bool(false)),
        ])),
    ]);
    let kept = run("selectattr", input, &[Value::string("ok")]).unwrap();
    match kept {
        Value::Seq(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].get_attr("name"), Value::string("a"));
        }
        other => panic!("Expected seq, got {:?}", other),
    }
}

#[test]
fn map_by_attribute_and_by_filter() {
    let input = Value::Seq(vec![
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(1))])),
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(2))])),
    ]);
    assert_eq!(
        run_kw("map", input, &[], &[("attribute", Value::string("n"))]).unwrap(),
        Value::Seq(vec![Value::Int(1), Value::Int(2)])
    );
    let strings = Value::Seq(vec![Value::string("a"), Value::string("b")]);
    assert_eq!(
        run("map", strings, &[Value::string("upper")]).unwrap(),
        Value::Seq(vec![Value::string("A"), Value::string("B")])
    );
}

#[test]
fn aggregate_filters() {
    let input = Value::Seq(vec![Value::Int(4), Value::Int(1), Value::Int(3)]);
    assert_eq!(run("min", input.clone(), &[]).unwrap(), Value::Int(1));
    assert_eq!(run("max", input.clone(), &[]).unwrap(), Value::Int(4));
    assert_eq!(run("sum", input, &[]).unwrap(), Value::Int(8));
    assert_eq!(run("min", Value::Seq(Vec::new()), &[]).unwrap(), Value::Undefined);
    let maps = Value::Seq(vec![
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(2))])),
        Value::Map(ValueMap::from_iter([("n".to_string(), Value::Int(5))])),
    ]);
    assert_eq!(
        run_kw("sum", maps, &[], &[("attribute", Value::string("n"))]).unwrap(),
        Value::Int(7)
    );
}

#[test]
fn unique_keeps_first_occurrences() {
    let input = Value::Seq(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(1),
        Value::Float(2.0),
    ]);
    assert_eq!(
        run("unique", input, &[]).unwrap(),
        Value::Seq(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn text_layout_filters() {
    assert_eq!(
        run("indent", Value::string("a\nb"), &[Value::Int(2)]).unwrap(),
        Value::string("a\n  b")
    );
    assert_eq!(
        run("center", Value::string("ab"), &[Value::Int(6)]).unwrap(),
        Value::string("  ab  ")
    );
    assert_eq!(
        run("wordwrap", Value::string("aa bb cc"), &[Value::Int(5)]).unwrap(),
        Value::string("aa bb\ncc")
    );
    assert_eq!(
        run("wordcount", Value::string("one two  three"), &[]).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn truncation() {
    let s = Value::string("this is a long sentence");
    assert_eq!(
        run_kw(
            "truncate",
            s.clone(),
            &[Value::Int(10)],
            &[("leeway", Value::Int(0))]
        )
        .unwrap(),
        Value::string("this...")
    );
    // Under length + leeway the string is untouched.
    assert_eq!(
        run("truncate", Value::string("short"), &[Value::Int(10)]).unwrap(),
        Value::string("short")
    );
}

#[test]
fn format_directives() {
    assert_eq!(
        run(
            "format",
            Value::string("%s=%d%%"),
            &[Value::string("x"), Value::Int(3)]
        )
        .unwrap(),
        Value::string("x=3%")
    );
    assert!(run("format", Value::string("%s"), &[]).is_err());
}

#[test]
fn html_helpers() {
    assert_eq!(
        run("striptags", Value::string("<p>a  <b>b</b></p>"), &[]).unwrap(),
        Value::string("a b")
    );
    let escaped = run("escape", Value::string("<x>"), &[]).unwrap();
    assert!(escaped.is_safe());
    assert_eq!(escaped.to_string(), "&lt;x&gt;");
    // Escaping an already safe value leaves it alone.
    let safe = run("escape", Value::from_safe_string("<x>"), &[]).unwrap();
    assert_eq!(safe.to_string(), "<x>");
    let attrs = run(
        "xmlattr",
        Value::Map(ValueMap::from_iter([
            ("class".to_string(), Value::string("a b")),
            ("id".to_string(), Value::None),
        ])),
        &[],
    )
    .unwrap();
    assert_eq!(attrs.to_string(), " class=\"a b\"");
}

#[test]
fn urlencoding() {
    assert_eq!(
        run("urlencode", Value::string("a b/c?"), &[]).unwrap(),
        Value::string("a%20b/c%3F")
    );
    let query = run(
        "urlencode",
        Value::Map(ValueMap::from_iter([
            ("q".to_string(), Value::string("a b")),
            ("n".to_string(), Value::Int(1)),
        ])),
        &[],
    )
    .unwrap();
    assert_eq!(query.to_string(), "q=a%20b&n=1");
}

#[test]
fn replace_and_split() {
    assert_eq!(
        run(
            "replace",
            Value::string("a.b.c"),
            &[Value::string("."), Value::string("-")]
        )
        .unwrap(),
        Value::string("a-b-c")
    );
    assert_eq!(
        run(
            "replace",
            Value::string("aaa"),
            &[Value::string("a"), Value::string("b"), Value::Int(2)]
        )
        .unwrap(),
        Value::string("bba")
    );
    assert_eq!(
        run("split", Value::string("a b  c"), &[]).unwrap(),
        Value::Seq(vec![
            Value::string("a"),
            Value::string("b"),
            Value::string("c")
        ])
    );
    assert_eq!(
        run("split", Value::string("a,b"), &[Value::string(",")]).unwrap(),
        Value::Seq(vec![Value::string("a"), Value::string("b")])
    );
}

#[test]
fn first_last_and_items() {
    let seq = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(run("first", seq.clone(), &[]).unwrap(), Value::Int(1));
    assert_eq!(run("last", seq, &[]).unwrap(), Value::Int(2));
    assert_eq!(run("first", Value::Seq(Vec::new()), &[]).unwrap(), Value::Undefined);
    let map = Value::Map(ValueMap::from_iter([
        ("b".to_string(), Value::Int(1)),
        ("a".to_string(), Value::Int(2)),
    ]));
    assert_eq!(
        run("items", map, &[]).unwrap(),
        Value::Seq(vec![
            Value::Seq(vec![Value::string("b"), Value::Int(1)]),
            Value::Seq(vec![Value::string("a"), Value::Int(2)]),
        ])
    );
}

#[test]
fn dictsort_directions() {
    let map = Value::Map(ValueMap::from_iter([
        ("b".to_string(), Value::Int(1)),
        ("a".to_string(), Value::Int(2)),
    ]));
    let by_key = run("dictsort", map.clone(), &[]).unwrap();
    match &by_key {
        Value::Seq(pairs) => {
            assert_eq!(pairs[0].get_item(&Value::Int(0)), Value::string("a"))
        }
        other => panic!("Expected seq, got {:?}", other),
    }
    let reversed = run_kw("dictsort", map, &[], &[("reverse", Value::Bool(true))]).unwrap();
    match &reversed {
        Value::Seq(pairs) => {
            assert_eq!(pairs[0].get_item(&Value::Int(0)), Value::string("b"))
        }
        other => panic!("Expected seq, got {:?}", other),
    }
}

#[test]
fn groupby_pairs_grouper_with_members() {
    let input = Value::Seq(vec![
        Value::Map(ValueMap::from_iter([
            ("city".to_string(), Value::string("b")),
            ("n".to_string(), Value::Int(1)),
        ])),
        Value::Map(ValueMap::from_iter([
            ("city".to_string(), Value::string("a")),
            ("n".to_string(), Value::Int(2)),
        ])),
        Value::Map(ValueMap::from_iter([
            ("city".to_string(), Value::string("b")),
            ("n".to_string(), Value::Int(3)),
        ])),
    ]);
    let grouped = run("groupby", input, &[Value::string("city")]).unwrap();
    match grouped {
        Value::Seq(groups) => {
            assert_eq!(groups.len(), 2);
            match &groups[0] {
                Value::Seq(pair) => assert_eq!(pair[0], Value::string("a")),
                other => panic!("Expected pair, got {:?}", other),
            }
        }
        other => panic!("Expected seq, got {:?}", other),
    }
}
