use crate::ast::*;
use crate::environment::CompiledTemplate;
use crate::error::TemplateError;
use crate::filters;
use crate::object::{Module, Object};
use crate::state::State;
use crate::tests;
use crate::value::{self, cmp_values, Kwargs, Value, ValueMap};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

/// Renders a compiled template, driving the inheritance loop: when a pass
/// leaves an `extends` target behind, the buffer is discarded and the
/// parent template is evaluated with the recorded block overrides.
pub(crate) fn render(
    state: &mut State<'_>,
    mut current: Rc<CompiledTemplate>,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    loop {
        out.clear();
        eval_stmts(&current.stmts, state, &mut out)?;
        match state.extends_target.take() {
            Some(name) => {
                current = state.env().get_compiled(&name).ok_or_else(|| {
                    TemplateError::unknown_name(format!("Template {} is not found", name))
                })?;
            }
            None => break,
        }
    }
    Ok(out)
}

pub(crate) fn eval_stmts(
    stmts: &[Stmt],
    state: &mut State<'_>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for stmt in stmts {
        eval_stmt(stmt, state, out)?;
    }
    Ok(())
}

fn eval_stmt(stmt: &Stmt, state: &mut State<'_>, out: &mut String) -> Result<(), TemplateError> {
    match stmt {
        Stmt::Text(text) => out.push_str(text),
        Stmt::Emit(expr) => {
            let value = eval_expr(expr, state)?;
            emit_value(&value, state, out);
        }
        Stmt::If {
            cond,
            body,
            else_body,
        } => {
            if eval_expr(cond, state)?.is_true() {
                eval_stmts(body, state, out)?;
            } else {
                eval_stmts(else_body, state, out)?;
            }
        }
        Stmt::For(f) => eval_for(f, state, out, None)?,
        Stmt::Set { name, attr, value } => {
            let value = eval_expr(value, state)?;
            match attr {
                Some(attr) => {
                    // Only namespace-like objects take attribute writes;
                    // anything else is left untouched.
                    if let Value::Object(obj) = state.lookup(name) {
                        obj.set_attr(attr, value);
                    }
                }
                None => state.set(name.clone(), value),
            }
        }
        Stmt::With { bindings, body } => {
            state.with_scope(|state| -> Result<(), TemplateError> {
                for (name, expr) in bindings {
                    let value = eval_expr(expr, state)?;
                    state.set(name.clone(), value);
                }
                eval_stmts(body, state, out)
            })?;
        }
        Stmt::Macro(decl) => {
            let value = make_macro(decl.clone());
            state.macros.insert(decl.name.clone(), value);
        }
        Stmt::CallBlock(cb) => {
            let body = cb.clone();
            let caller = Value::from_function("caller", move |args, _kwargs, state| {
                state.with_scope(|state| {
                    for (i, param) in body.params.iter().enumerate() {
                        state.set(
                            param.clone(),
                            args.get(i).cloned().unwrap_or(Value::Undefined),
                        );
                    }
                    let mut buf = String::new();
                    eval_stmts(&body.body, state, &mut buf)?;
                    Ok(Value::from_safe_string(buf))
                })
            });
            let result = state.with_scope(|state| {
                state.set("caller", caller);
                eval_expr(&cb.call, state)
            })?;
            emit_value(&result, state, out);
        }
        Stmt::FilterBlock { name, args, body } => {
            let mut buf = String::new();
            eval_stmts(body, state, &mut buf)?;
            let subject = Value::string(buf);
            let (args, kwargs) = eval_args(args, state)?;
            let result = filters::apply(state, name, &subject, &args, &kwargs)?;
            emit_value(&result, state, out);
        }
        Stmt::Block { name, body } => eval_block(name, body, state, out)?,
        Stmt::Extends(target) => {
            let target = eval_expr(target, state)?;
            match target.as_str() {
                Some(name) => state.extends_target = Some(name.to_string()),
                None => {
                    return Err(TemplateError::type_error(format!(
                        "extends target must be a string, got {}",
                        target.kind_name()
                    )))
                }
            }
        }
        Stmt::Include {
            target,
            ignore_missing,
        } => {
            let target = eval_expr(target, state)?;
            let name = match target.as_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(TemplateError::type_error(format!(
                        "include target must be a string, got {}",
                        target.kind_name()
                    )))
                }
            };
            match state.env().get_compiled(&name) {
                Some(compiled) => {
                    // The included template sees a snapshot of the current
                    // variables, but runs with its own blocks and macros.
                    let mut sub = State::new(state.env(), state.flatten_scopes());
                    sub.autoescape = state.autoescape;
                    out.push_str(&render(&mut sub, compiled)?);
                }
                None if *ignore_missing => {
                    log::warn!("include of missing template {} ignored", name);
                }
                None => {
                    return Err(TemplateError::unknown_name(format!(
                        "Template {} is not found",
                        name
                    )))
                }
            }
        }
        Stmt::Import { target, alias } => {
            let (name, module) = eval_module(target, state)?;
            state.set(alias.clone(), Value::from_object(Module::new(name, module)));
        }
        Stmt::FromImport { target, names } => {
            let (tpl_name, module) = eval_module(target, state)?;
            for (name, alias) in names {
                match module.get(name) {
                    Some(value) => {
                        let bound = alias.as_ref().unwrap_or(name);
                        state.set(bound.clone(), value.clone());
                    }
                    None => {
                        return Err(TemplateError::unknown_name(format!(
                            "Template {} does not export {}",
                            tpl_name, name
                        )))
                    }
                }
            }
        }
        Stmt::Autoescape { enabled: _, body } => {
            // Accepted for compatibility; the body renders unchanged.
            eval_stmts(body, state, out)?;
        }
    }
    Ok(())
}

/// Evaluates the target template in a fresh state and returns its top
/// level variables and macros.
fn eval_module(
    target: &Expr,
    state: &mut State<'_>,
) -> Result<(String, ValueMap), TemplateError> {
    let target = eval_expr(target, state)?;
    let name = match target.as_str() {
        Some(name) => name.to_string(),
        None => {
            return Err(TemplateError::type_error(format!(
                "import target must be a string, got {}",
                target.kind_name()
            )))
        }
    };
    let compiled = state.env().get_compiled(&name).ok_or_else(|| {
        TemplateError::unknown_name(format!("Template {} is not found", name))
    })?;
    let mut sub = State::new(state.env(), ValueMap::new());
    render(&mut sub, compiled)?;
    let mut vars = sub.root_scope();
    for (k, v) in &sub.macros {
        vars.insert(k.clone(), v.clone());
    }
    Ok((name, vars))
}

/// The two-pass block override protocol. A consumed override is cleared
/// so the next pass up the chain sees the parent's own body; when this
/// template extends further, the override is put back so the childmost
/// body still wins at the top of the chain.
fn eval_block(
    name: &str,
    body: &Rc<Vec<Stmt>>,
    state: &mut State<'_>,
    out: &mut String,
) -> Result<(), TemplateError> {
    match state.blocks.remove(name) {
        Some(override_body) => {
            // Each consuming pass appends its own body; a block re-entered
            // within the same pass must not push it twice.
            let ancestors = state.parent_blocks.entry(name.to_string()).or_default();
            if ancestors.last().map_or(true, |last| !Rc::ptr_eq(last, body)) {
                ancestors.push(body.clone());
            }
            state.block_stack.push(name.to_string());
            let result = eval_stmts(&override_body, state, out);
            state.block_stack.pop();
            result?;
            if state.extends_target.is_some() {
                state.blocks.insert(name.to_string(), override_body);
            }
        }
        None => {
            if state.extends_target.is_some() {
                state.blocks.insert(name.to_string(), body.clone());
            }
            state.block_stack.push(name.to_string());
            let result = eval_stmts(body, state, out);
            state.block_stack.pop();
            result?;
        }
    }
    Ok(())
}

/// `super()`: the next ancestor body for the block currently being
/// overridden, rendered to a safe string. The climb cursor is advanced
/// while the ancestor evaluates, so a `super()` inside that body resolves
/// one level further up instead of re-entering the same body. Outside a
/// block it is empty.
fn super_block(state: &mut State<'_>) -> Result<Value, TemplateError> {
    let name = match state.block_stack.last() {
        Some(name) => name.clone(),
        None => return Ok(Value::from_safe_string("")),
    };
    let depth = state.super_depths.get(&name).copied().unwrap_or(0);
    let body = match state
        .parent_blocks
        .get(&name)
        .and_then(|ancestors| ancestors.get(depth))
        .cloned()
    {
        Some(body) => body,
        None => return Ok(Value::from_safe_string("")),
    };
    state.super_depths.insert(name.clone(), depth + 1);
    let mut buf = String::new();
    let result = eval_stmts(&body, state, &mut buf);
    state.super_depths.insert(name, depth);
    result?;
    Ok(Value::from_safe_string(buf))
}

fn eval_for(
    f: &Rc<ForLoop>,
    state: &mut State<'_>,
    out: &mut String,
    items_override: Option<Vec<Value>>,
) -> Result<(), TemplateError> {
    let items = match items_override {
        Some(items) => items,
        None => {
            let iterable = eval_expr(&f.iter, state)?;
            match iterable.try_iter() {
                Some(items) => items,
                None => {
                    return Err(match (&iterable, &f.iter) {
                        (Value::Undefined, Expr::Ident(name)) => TemplateError::undefined(
                            format!("{} is undefined and not iterable", name),
                        ),
                        (Value::Undefined, _) => {
                            TemplateError::undefined("Cannot iterate over undefined")
                        }
                        (other, _) => TemplateError::type_error(format!(
                            "Cannot iterate over {}",
                            other.kind_name()
                        )),
                    })
                }
            }
        }
    };
    let items = match &f.cond {
        Some(cond) => {
            let mut kept = Vec::new();
            for item in items {
                let keep = state.with_scope(|state| -> Result<bool, TemplateError> {
                    bind_targets(state, &f.targets, &item);
                    Ok(eval_expr(cond, state)?.is_true())
                })?;
                if keep {
                    kept.push(item);
                }
            }
            kept
        }
        None => items,
    };
    if items.is_empty() {
        return eval_stmts(&f.else_body, state, out);
    }
    let loop_obj = Rc::new(LoopObject {
        len: items.len(),
        idx: Cell::new(0),
        last_change: RefCell::new(None),
        for_stmt: if f.recursive { Some(f.clone()) } else { None },
    });
    state.with_scope(|state| -> Result<(), TemplateError> {
        state.set("loop", Value::Object(loop_obj.clone() as Rc<dyn Object>));
        for (i, item) in items.iter().enumerate() {
            loop_obj.idx.set(i);
            state.with_scope(|state| -> Result<(), TemplateError> {
                bind_targets(state, &f.targets, item);
                eval_stmts(&f.body, state, out)
            })?;
        }
        Ok(())
    })
}

/// Tuple targets unpack the leading elements of each item; positions the
/// item does not cover are bound to none.
fn bind_targets(state: &mut State<'_>, targets: &[String], item: &Value) {
    if targets.len() == 1 {
        state.set(targets[0].clone(), item.clone());
        return;
    }
    let parts = item.try_iter().unwrap_or_default();
    for (i, name) in targets.iter().enumerate() {
        state.set(name.clone(), parts.get(i).cloned().unwrap_or(Value::None));
    }
}

/// The `loop` variable bound inside for bodies.
#[derive(Debug)]
struct LoopObject {
    len: usize,
    idx: Cell<usize>,
    last_change: RefCell<Option<Vec<Value>>>,
    for_stmt: Option<Rc<ForLoop>>,
}

impl Object for LoopObject {
    fn name(&self) -> &str {
        "loop"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        let idx = self.idx.get();
        Some(match name {
            "index0" => Value::Int(idx as i64),
            "index" => Value::Int(idx as i64 + 1),
            "revindex0" => Value::Int((self.len - idx - 1) as i64),
            "revindex" => Value::Int((self.len - idx) as i64),
            "first" => Value::Bool(idx == 0),
            "last" => Value::Bool(idx + 1 == self.len),
            "length" => Value::Int(self.len as i64),
            "depth" => Value::Int(1),
            "depth0" => Value::Int(0),
            "previtem" | "nextitem" => Value::None,
            _ => return None,
        })
    }

    fn call_method(
        &self,
        name: &str,
        args: &[Value],
        _kwargs: &Kwargs,
        _state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        match name {
            "cycle" => Some(if args.is_empty() {
                Err(TemplateError::type_error("cycle of empty sequence"))
            } else {
                Ok(args[self.idx.get() % args.len()].clone())
            }),
            "changed" => {
                let mut last = self.last_change.borrow_mut();
                let changed = last.as_deref() != Some(args);
                *last = Some(args.to_vec());
                Some(Ok(Value::Bool(changed)))
            }
            _ => None,
        }
    }

    fn call(
        &self,
        args: &[Value],
        _kwargs: &Kwargs,
        state: &mut State<'_>,
    ) -> Option<Result<Value, TemplateError>> {
        let f = match &self.for_stmt {
            Some(f) => f.clone(),
            None => {
                return Some(Err(TemplateError::type_error(
                    "loop() is only callable in a recursive for loop",
                )))
            }
        };
        Some((|| {
            let arg = args.first().cloned().unwrap_or(Value::Undefined);
            let items = arg.try_iter().ok_or_else(|| {
                TemplateError::type_error(format!(
                    "Cannot iterate over {}",
                    arg.kind_name()
                ))
            })?;
            let mut buf = String::new();
            eval_for(&f, state, &mut buf, Some(items))?;
            Ok(Value::from_safe_string(buf))
        })())
    }
}

fn make_macro(decl: Rc<MacroDecl>) -> Value {
    let name = decl.name.clone();
    Value::from_function(name, move |args, kwargs, state| {
        let decl = decl.clone();
        state.with_scope(move |state| {
            for (i, param) in decl.params.iter().enumerate() {
                let value = if let Some(v) = kwargs.get(&param.name) {
                    v.clone()
                } else if i < args.len() {
                    args[i].clone()
                } else if let Some(default) = &param.default {
                    eval_expr(default, state)?
                } else {
                    Value::Undefined
                };
                state.set(param.name.clone(), value);
            }
            let varargs = args.get(decl.params.len()..).unwrap_or(&[]).to_vec();
            state.set("varargs", Value::Seq(varargs));
            let mut extra = ValueMap::new();
            for (k, v) in kwargs {
                if !decl.params.iter().any(|p| &p.name == k) {
                    extra.insert(k.clone(), v.clone());
                }
            }
            state.set("kwargs", Value::Map(extra));
            let mut buf = String::new();
            eval_stmts(&decl.body, state, &mut buf)?;
            Ok(Value::from_safe_string(buf))
        })
    })
}

/// Emission policy: Undefined and none are suppressed, safe strings pass
/// through, everything else is stringified and HTML-escaped while the
/// auto-escape flag is on.
fn emit_value(value: &Value, state: &State<'_>, out: &mut String) {
    match value {
        Value::Undefined | Value::None => {}
        Value::String { value: s, safe } => {
            if *safe || !state.auto_escape() {
                out.push_str(s);
            } else {
                out.push_str(&html_escape::encode_safe(s));
            }
        }
        other => {
            let s = other.to_string();
            if state.auto_escape() {
                out.push_str(&html_escape::encode_safe(&s));
            } else {
                out.push_str(&s);
            }
        }
    }
}

pub(crate) fn eval_expr(expr: &Expr, state: &mut State<'_>) -> Result<Value, TemplateError> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::Ident(name) => Ok(state.lookup(name)),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, state)?);
            }
            Ok(Value::Seq(out))
        }
        Expr::MapLit(pairs) => {
            let mut out = ValueMap::new();
            for (key, value) in pairs {
                let key = match eval_expr(key, state)? {
                    Value::String { value, .. } => value,
                    other => other.to_string(),
                };
                out.insert(key, eval_expr(value, state)?);
            }
            Ok(Value::Map(out))
        }
        Expr::Unary { op, expr } => {
            let value = eval_expr(expr, state)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_true())),
                UnaryOp::Neg => value::neg(&value),
                UnaryOp::Pos => match value.is_number() {
                    true => Ok(value),
                    false => Err(TemplateError::type_error(format!(
                        "Cannot apply unary plus to {}",
                        value.kind_name()
                    ))),
                },
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, state),
        Expr::Cond {
            value,
            cond,
            alternative,
        } => {
            if eval_expr(cond, state)?.is_true() {
                eval_expr(value, state)
            } else {
                match alternative {
                    Some(alt) => eval_expr(alt, state),
                    None => Ok(Value::Undefined),
                }
            }
        }
        Expr::Member { base, name } => Ok(eval_expr(base, state)?.get_attr(name)),
        Expr::Index { base, index } => {
            let base = eval_expr(base, state)?;
            let index = eval_expr(index, state)?;
            Ok(base.get_item(&index))
        }
        Expr::Slice {
            base,
            start,
            stop,
            step,
        } => {
            let base = eval_expr(base, state)?;
            let start = eval_slice_bound(start, state)?;
            let stop = eval_slice_bound(stop, state)?;
            let step = eval_slice_bound(step, state)?;
            base.slice(start, stop, step)
        }
        Expr::Call { callee, args } => eval_call(callee, args, state),
        Expr::Filter { name, base, args } => {
            let subject = eval_expr(base, state)?;
            let (args, kwargs) = eval_args(args, state)?;
            filters::apply(state, name, &subject, &args, &kwargs)
        }
        Expr::Test {
            name,
            base,
            args,
            negated,
        } => {
            let subject = eval_expr(base, state)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expr(arg, state)?);
            }
            let result = tests::apply(state, name, &subject, &evaluated)?;
            Ok(Value::Bool(result != *negated))
        }
    }
}

fn eval_slice_bound(
    bound: &Option<Box<Expr>>,
    state: &mut State<'_>,
) -> Result<Option<i64>, TemplateError> {
    match bound {
        None => Ok(None),
        Some(expr) => match eval_expr(expr, state)? {
            Value::Int(n) => Ok(Some(n)),
            Value::None | Value::Undefined => Ok(None),
            other => Err(TemplateError::type_error(format!(
                "Slice indices must be integers, got {}",
                other.kind_name()
            ))),
        },
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    // `and`/`or` short-circuit and return the deciding operand itself.
    if op == BinaryOp::And {
        let left = eval_expr(left, state)?;
        if !left.is_true() {
            return Ok(left);
        }
        return eval_expr(right, state);
    }
    if op == BinaryOp::Or {
        let left = eval_expr(left, state)?;
        if left.is_true() {
            return Ok(left);
        }
        return eval_expr(right, state);
    }
    let left = eval_expr(left, state)?;
    let right = eval_expr(right, state)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(Value::Bool(cmp_values(&left, &right) == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(cmp_values(&left, &right) != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(cmp_values(&left, &right) == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(cmp_values(&left, &right) != Ordering::Less)),
        BinaryOp::In => Ok(Value::Bool(value::contains(&right, &left)?)),
        BinaryOp::Concat => Ok(Value::string(format!("{}{}", left, right))),
        BinaryOp::Add => value::add(&left, &right),
        BinaryOp::Sub => value::sub(&left, &right),
        BinaryOp::Mul => value::mul(&left, &right),
        BinaryOp::Div => value::div(&left, &right),
        BinaryOp::FloorDiv => value::floor_div(&left, &right),
        BinaryOp::Rem => value::rem(&left, &right),
        BinaryOp::Pow => value::pow(&left, &right),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn eval_args(
    args: &CallArgs,
    state: &mut State<'_>,
) -> Result<(Vec<Value>, Kwargs), TemplateError> {
    let mut positional = Vec::with_capacity(args.args.len());
    for arg in &args.args {
        positional.push(eval_expr(arg, state)?);
    }
    let mut kwargs = Kwargs::new();
    for (name, expr) in &args.kwargs {
        let value = eval_expr(expr, state)?;
        kwargs.insert(name.clone(), value);
    }
    Ok((positional, kwargs))
}

fn eval_call(
    callee: &Expr,
    args: &CallArgs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    let (positional, kwargs) = eval_args(args, state)?;
    match callee {
        Expr::Ident(name) => {
            let target = state.lookup(name);
            if target.is_undefined() {
                // Engine-provided callables that need evaluator state.
                if name == "super" {
                    return super_block(state);
                }
                return Err(TemplateError::undefined(format!(
                    "{} is undefined and not callable",
                    name
                )));
            }
            call_value(&target, &positional, &kwargs, state)
        }
        Expr::Member { base, name } => {
            let base = eval_expr(base, state)?;
            if let Value::Object(obj) = &base {
                if let Some(result) = obj.call_method(name, &positional, &kwargs, state) {
                    return result;
                }
            }
            let target = base.get_attr(name);
            if target.is_undefined() {
                return Err(TemplateError::undefined(format!(
                    "{} is undefined and not callable",
                    name
                )));
            }
            call_value(&target, &positional, &kwargs, state)
        }
        other => {
            let target = eval_expr(other, state)?;
            call_value(&target, &positional, &kwargs, state)
        }
    }
}

fn call_value(
    target: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    state: &mut State<'_>,
) -> Result<Value, TemplateError> {
    match target {
        Value::Callable(c) => c.call(args, kwargs, state),
        Value::Object(obj) => match obj.call(args, kwargs, state) {
            Some(result) => result,
            None => Err(TemplateError::type_error(format!(
                "{} is not callable",
                obj.name()
            ))),
        },
        other => Err(TemplateError::type_error(format!(
            "Value of kind {} is not callable",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
fn render_str(source: &str, ctx: serde_json::Value) -> Result<String, TemplateError> {
    let env = crate::environment::Environment::new();
    env.template_from_string(source)?.render(ctx)
}

#[test]
fn short_circuit_returns_the_operand() {
    let out = render_str("{{ a or 'fallback' }}", serde_json::json!({ "a": "" })).unwrap();
    assert_eq!(out, "fallback");
    let out = render_str("{{ a or 'fallback' }}", serde_json::json!({ "a": "hit" })).unwrap();
    assert_eq!(out, "hit");
}

#[test]
fn emit_suppresses_undefined_and_none() {
    let out = render_str("a{{ missing }}{{ n }}b", serde_json::json!({ "n": null })).unwrap();
    assert_eq!(out, "ab");
}

#[test]
fn calling_undefined_is_an_error() {
    match render_str("{{ nope() }}", serde_json::json!({})) {
        Err(TemplateError::Undefined(msg)) => assert!(msg.contains("nope")),
        other => panic!("Expected undefined error, got {:?}", other),
    }
}

#[test]
fn set_attr_only_mutates_namespaces() {
    let out = render_str(
        "{% set ns = namespace(count=0) %}{% set ns.count = 2 %}{{ ns.count }}",
        serde_json::json!({}),
    )
    .unwrap();
    assert_eq!(out, "2");
    // Non-namespace targets are silently unchanged.
    let out = render_str(
        "{% set m = 1 %}{% set m.x = 2 %}{{ m }}",
        serde_json::json!({}),
    )
    .unwrap();
    assert_eq!(out, "1");
}

#[test]
fn loop_object_attributes() {
    let out = render_str(
        "{% for x in [7, 8] %}{{ loop.index }}/{{ loop.revindex }}/{{ loop.first }}/{{ loop.last }};{% endfor %}",
        serde_json::json!({}),
    )
    .unwrap();
    assert_eq!(out, "1/2/true/false;2/1/false/true;");
}

#[test]
fn concat_always_produces_an_unsafe_string() {
    let out = render_str("{{ ('<a>'|safe) ~ 'x' }}", serde_json::json!({})).unwrap();
    assert_eq!(out, "&lt;a&gt;x");
}

#[test]
fn arithmetic_type_errors_name_both_kinds() {
    match render_str("{{ [1] + 2 }}", serde_json::json!({})) {
        Err(TemplateError::Type(msg)) => assert_eq!(msg, "Cannot add Seq and Number"),
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn attribute_chains_on_undefined_stay_undefined() {
    let out = render_str("[{{ a.b.c }}]", serde_json::json!({})).unwrap();
    assert_eq!(out, "[]");
}

#[test]
fn map_literal_keys_keep_insertion_order() {
    let out = render_str(
        "{% for k in {'z': 1, 'a': 2, 'm': 3} %}{{ k }}{% endfor %}",
        serde_json::json!({}),
    )
    .unwrap();
    assert_eq!(out, "zam");
}

#[test]
fn comparisons_between_other_kinds_read_as_equal() {
    let out = render_str(
        "{{ [1] < [2] }}/{{ [1] <= [2] }}",
        serde_json::json!({}),
    )
    .unwrap();
    assert_eq!(out, "false/true");
}

#[test]
fn macro_result_bypasses_escaping() {
    let out = render_str(
        "{% macro tag() %}<b>{{ x }}</b>{% endmacro %}{{ tag() }}",
        serde_json::json!({ "x": "<i>" }),
    )
    .unwrap();
    // The macro body escapes its interpolations, the wrapper markup stays.
    assert_eq!(out, "<b>&lt;i&gt;</b>");
}

#[test]
fn recursive_loop_restarts_the_body() {
    let out = render_str(
        "{% for item in tree recursive %}{{ item.v }}{% if item.children %}[{{ loop(item.children) }}]{% endif %}{% endfor %}",
        serde_json::json!({
            "tree": [
                { "v": 1, "children": [ { "v": 2 }, { "v": 3 } ] },
                { "v": 4 }
            ]
        }),
    )
    .unwrap();
    assert_eq!(out, "1[23]4");
}
