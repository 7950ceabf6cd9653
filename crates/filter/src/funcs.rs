//! Built-in function library.
//!
//! Functions that take a projection (`map`, `filter`, `sort`, `uniqBy`,
//! `groupBy`, …) receive their argument unevaluated and apply it per
//! element; everything else evaluates its arguments eagerly against the
//! current input.

use serde_json::{Map, Value};
use spg_domain::error::{ErrorKind, Result};

use crate::ast::Expr;
use crate::eval::{num, sort_cmp, truthy, type_name, value_eq, Evaluator};

pub(crate) fn call(
    ev: &Evaluator,
    name: &str,
    args: &[Expr],
    input: &Value,
    depth: usize,
) -> Result<Value> {
    match name {
        // ── Structure ────────────────────────────────────────────────
        "get" => {
            let path = eval_one_string(ev, name, args, input, depth)?;
            Ok(lookup(input, &path))
        }
        "pipe" => {
            let mut current = input.clone();
            for stage in args {
                current = ev.eval_at(stage, &current, depth + 1)?;
            }
            Ok(current)
        }
        "object" => {
            if args.len() % 2 != 0 {
                return Err(arity(name, "an even number of arguments"));
            }
            let mut map = Map::new();
            for pair in args.chunks(2) {
                let key = ev.eval_at(&pair[0], input, depth + 1)?;
                let value = ev.eval_at(&pair[1], input, depth + 1)?;
                map.insert(stringify(&key), value);
            }
            Ok(Value::Object(map))
        }
        "array" => {
            let mut out = Vec::with_capacity(args.len());
            for arg in args {
                out.push(ev.eval_at(arg, input, depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        "pick" => {
            let mut paths = Vec::with_capacity(args.len());
            for arg in args {
                match ev.eval_at(arg, input, depth + 1)? {
                    Value::String(s) => paths.push(s),
                    other => {
                        return Err(ErrorKind::FilterFailed(format!(
                            "pick() takes path strings, got {}",
                            type_name(&other)
                        )))
                    }
                }
            }
            match input {
                Value::Array(items) => Ok(Value::Array(
                    items.iter().map(|item| pick_paths(item, &paths)).collect(),
                )),
                other => Ok(pick_paths(other, &paths)),
            }
        }
        "keys" => match input {
            Value::Object(map) => Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            )),
            Value::Array(items) => Ok(Value::Array(
                (0..items.len()).map(|i| Value::from(i as i64)).collect(),
            )),
            other => Err(applies_to(name, "an object or array", other)),
        },
        "values" => match input {
            Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
            Value::Array(_) => Ok(input.clone()),
            other => Err(applies_to(name, "an object or array", other)),
        },
        "flatten" => {
            let levels = match args {
                [] => 1,
                [d] => eval_number(ev, name, d, input, depth)? as i64,
                _ => return Err(arity(name, "at most one argument")),
            };
            let items = as_array(name, input)?;
            let mut out = items.clone();
            for _ in 0..levels.max(0) {
                let mut next = Vec::new();
                let mut changed = false;
                for item in out {
                    match item {
                        Value::Array(inner) => {
                            changed = true;
                            next.extend(inner);
                        }
                        other => next.push(other),
                    }
                }
                out = next;
                if !changed {
                    break;
                }
            }
            Ok(Value::Array(out))
        }

        // ── Sequences ────────────────────────────────────────────────
        "filter" => {
            let pred = one_lambda(name, args)?;
            let items = as_array(name, input)?;
            let mut out = Vec::new();
            for item in items {
                if truthy(&ev.eval_at(pred, item, depth + 1)?) {
                    out.push(item.clone());
                }
            }
            Ok(Value::Array(out))
        }
        "map" => {
            let f = one_lambda(name, args)?;
            let items = as_array(name, input)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(ev.eval_at(f, item, depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        "sort" => {
            let items = as_array(name, input)?;
            let (key, descending) = match args {
                [] => (None, false),
                [k] => (Some(k), false),
                [k, d] => {
                    let dir = eval_string(ev, name, d, input, depth)?;
                    match dir.as_str() {
                        "asc" => (Some(k), false),
                        "desc" => (Some(k), true),
                        other => {
                            return Err(ErrorKind::FilterFailed(format!(
                                "sort() direction must be \"asc\" or \"desc\", got {other:?}"
                            )))
                        }
                    }
                }
                _ => return Err(arity(name, "at most two arguments")),
            };
            let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
            for item in items {
                let k = match key {
                    Some(expr) => project(ev, expr, item, depth)?,
                    None => item.clone(),
                };
                keyed.push((k, item.clone()));
            }
            keyed.sort_by(|a, b| sort_cmp(&a.0, &b.0));
            if descending {
                keyed.reverse();
            }
            Ok(Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
        }
        "reverse" => match input {
            Value::Array(items) => {
                Ok(Value::Array(items.iter().rev().cloned().collect()))
            }
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            other => Err(applies_to(name, "an array or string", other)),
        },
        "uniq" => {
            let items = as_array(name, input)?;
            Ok(Value::Array(dedupe(items.iter())))
        }
        "uniqBy" => {
            let key = one_lambda(name, args)?;
            let items = as_array(name, input)?;
            let mut seen: Vec<Value> = Vec::new();
            let mut out = Vec::new();
            for item in items {
                let k = project(ev, key, item, depth)?;
                if !seen.iter().any(|s| value_eq(s, &k)) {
                    seen.push(k);
                    out.push(item.clone());
                }
            }
            Ok(Value::Array(out))
        }
        "groupBy" => {
            let key = one_lambda(name, args)?;
            let items = as_array(name, input)?;
            let mut map = Map::new();
            for item in items {
                let k = stringify(&project(ev, key, item, depth)?);
                map.entry(k)
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                    .expect("group entries are arrays")
                    .push(item.clone());
            }
            Ok(Value::Object(map))
        }
        "keyBy" => {
            let key = one_lambda(name, args)?;
            let items = as_array(name, input)?;
            let mut map = Map::new();
            for item in items {
                let k = stringify(&project(ev, key, item, depth)?);
                map.insert(k, item.clone());
            }
            Ok(Value::Object(map))
        }
        "limit" => {
            let n = eval_one_number(ev, name, args, input, depth)?;
            let items = as_array(name, input)?;
            let n = n.max(0.0) as usize;
            Ok(Value::Array(items.iter().take(n).cloned().collect()))
        }

        // ── Objects ──────────────────────────────────────────────────
        "mapObject" => {
            let f = one_lambda(name, args)?;
            let map = as_object(name, input)?;
            let mut out = Map::new();
            for (k, v) in map {
                let entry = serde_json::json!({"key": k, "value": v});
                let mapped = ev.eval_at(f, &entry, depth + 1)?;
                let key = mapped
                    .get("key")
                    .map(stringify)
                    .ok_or_else(|| {
                        ErrorKind::FilterFailed(
                            "mapObject() projection must return {key, value}".into(),
                        )
                    })?;
                let value = mapped.get("value").cloned().unwrap_or(Value::Null);
                out.insert(key, value);
            }
            Ok(Value::Object(out))
        }
        "mapKeys" => {
            let f = one_lambda(name, args)?;
            let map = as_object(name, input)?;
            let mut out = Map::new();
            for (k, v) in map {
                let new_key = ev.eval_at(f, &Value::String(k.clone()), depth + 1)?;
                out.insert(stringify(&new_key), v.clone());
            }
            Ok(Value::Object(out))
        }
        "mapValues" => {
            let f = one_lambda(name, args)?;
            let map = as_object(name, input)?;
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), ev.eval_at(f, v, depth + 1)?);
            }
            Ok(Value::Object(out))
        }

        // ── Strings ──────────────────────────────────────────────────
        "join" => {
            let sep = eval_one_string(ev, name, args, input, depth)?;
            let items = as_array(name, input)?;
            let parts: Vec<String> = items.iter().map(stringify).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "split" => {
            let sep = eval_one_string(ev, name, args, input, depth)?;
            let s = as_str(name, input)?;
            Ok(Value::Array(
                s.split(sep.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            ))
        }
        "substring" => {
            let s = as_str(name, input)?;
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = match args {
                [a] => (eval_number(ev, name, a, input, depth)? as usize, chars.len()),
                [a, b] => (
                    eval_number(ev, name, a, input, depth)? as usize,
                    eval_number(ev, name, b, input, depth)? as usize,
                ),
                _ => return Err(arity(name, "one or two arguments")),
            };
            let start = start.min(chars.len());
            let end = end.clamp(start, chars.len());
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "regex" => {
            let (text, pattern, flags) = match args {
                [t, p] => (
                    eval_string(ev, name, t, input, depth)?,
                    eval_string(ev, name, p, input, depth)?,
                    String::new(),
                ),
                [t, p, f] => (
                    eval_string(ev, name, t, input, depth)?,
                    eval_string(ev, name, p, input, depth)?,
                    eval_string(ev, name, f, input, depth)?,
                ),
                _ => return Err(arity(name, "two or three arguments")),
            };
            for flag in flags.chars() {
                if !matches!(flag, 'i' | 'm' | 's') {
                    return Err(ErrorKind::FilterFailed(format!(
                        "regex() flags may only be 'i', 'm', 's', got {flag:?}"
                    )));
                }
            }
            let full = if flags.is_empty() {
                pattern
            } else {
                format!("(?{flags}){pattern}")
            };
            let re = regex::Regex::new(&full)
                .map_err(|e| ErrorKind::FilterFailed(format!("invalid regex: {e}")))?;
            Ok(Value::Bool(re.is_match(&text)))
        }

        // ── Aggregates ───────────────────────────────────────────────
        "size" => match input {
            Value::Null => Ok(Value::from(0)),
            Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
            Value::Array(items) => Ok(Value::from(items.len() as i64)),
            Value::Object(map) => Ok(Value::from(map.len() as i64)),
            other => Err(applies_to(name, "a collection or string", other)),
        },
        "sum" => fold_numbers(name, input, 0.0, |acc, n| acc + n),
        "prod" => fold_numbers(name, input, 1.0, |acc, n| acc * n),
        "min" => extremum(name, input, std::cmp::Ordering::Less),
        "max" => extremum(name, input, std::cmp::Ordering::Greater),
        "average" => {
            let items = as_array(name, input)?;
            if items.is_empty() {
                return Ok(Value::Null);
            }
            let total = numbers_of(name, items)?.into_iter().sum::<f64>();
            Ok(num(total / items.len() as f64))
        }

        // ── Logic & comparison (function forms) ──────────────────────
        "eq" | "ne" | "gt" | "gte" | "lt" | "lte" => {
            let (l, r) = eval_two(ev, name, args, input, depth)?;
            let op = match name {
                "eq" => crate::ast::BinOp::Eq,
                "ne" => crate::ast::BinOp::Ne,
                "gt" => crate::ast::BinOp::Gt,
                "gte" => crate::ast::BinOp::Ge,
                "lt" => crate::ast::BinOp::Lt,
                _ => crate::ast::BinOp::Le,
            };
            let expr = Expr::Binary(
                op,
                Box::new(Expr::from_value(&l)),
                Box::new(Expr::from_value(&r)),
            );
            ev.eval_at(&expr, input, depth + 1)
        }
        "and" => {
            for arg in args {
                if !truthy(&ev.eval_at(arg, input, depth + 1)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "or" => {
            for arg in args {
                if truthy(&ev.eval_at(arg, input, depth + 1)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "not" => {
            let v = eval_one(ev, name, args, input, depth)?;
            Ok(Value::Bool(!truthy(&v)))
        }
        "exists" => {
            let v = eval_one(ev, name, args, input, depth)?;
            let found = match v {
                Value::String(path) => !lookup(input, &path).is_null(),
                other => !other.is_null(),
            };
            Ok(Value::Bool(found))
        }
        "if" => match args {
            [cond, then] => {
                if truthy(&ev.eval_at(cond, input, depth + 1)?) {
                    ev.eval_at(then, input, depth + 1)
                } else {
                    Ok(Value::Null)
                }
            }
            [cond, then, otherwise] => {
                if truthy(&ev.eval_at(cond, input, depth + 1)?) {
                    ev.eval_at(then, input, depth + 1)
                } else {
                    ev.eval_at(otherwise, input, depth + 1)
                }
            }
            _ => Err(arity(name, "two or three arguments")),
        },

        // ── Arithmetic (function forms) ──────────────────────────────
        "add" | "sub" | "mul" | "div" | "pow" | "mod" => {
            let (l, r) = eval_two(ev, name, args, input, depth)?;
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(ErrorKind::FilterFailed(format!(
                        "{name}() requires numbers"
                    )))
                }
            };
            let out = match name {
                "add" => a + b,
                "sub" => a - b,
                "mul" => a * b,
                "div" => {
                    if b == 0.0 {
                        return Err(ErrorKind::FilterFailed("division by zero".into()));
                    }
                    a / b
                }
                "pow" => a.powf(b),
                _ => {
                    if b == 0.0 {
                        return Err(ErrorKind::FilterFailed("modulo by zero".into()));
                    }
                    a % b
                }
            };
            Ok(num(out))
        }
        "abs" => {
            let v = eval_one(ev, name, args, input, depth)?;
            match v.as_f64() {
                Some(n) => Ok(num(n.abs())),
                None => Err(ErrorKind::FilterFailed("abs() requires a number".into())),
            }
        }
        "round" => {
            let (value, digits) = match args {
                [v] => (eval_number(ev, name, v, input, depth)?, 0i32),
                [v, d] => (
                    eval_number(ev, name, v, input, depth)?,
                    eval_number(ev, name, d, input, depth)? as i32,
                ),
                _ => return Err(arity(name, "one or two arguments")),
            };
            let factor = 10f64.powi(digits);
            Ok(num((value * factor).round() / factor))
        }
        "number" => {
            let v = eval_one(ev, name, args, input, depth)?;
            match &v {
                Value::Number(_) => Ok(v),
                Value::String(s) => s.trim().parse::<f64>().map(num).map_err(|_| {
                    ErrorKind::FilterFailed(format!("number() cannot parse {s:?}"))
                }),
                Value::Bool(b) => Ok(Value::from(if *b { 1 } else { 0 })),
                other => Err(ErrorKind::FilterFailed(format!(
                    "number() cannot convert {}",
                    type_name(other)
                ))),
            }
        }
        "string" => {
            let v = eval_one(ev, name, args, input, depth)?;
            Ok(Value::String(stringify(&v)))
        }

        other => Err(ErrorKind::FilterFailed(format!("unknown function {other:?}"))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluate a projection per element. A literal string projects as a
/// dotted path so callers can write `sort("attributes.qty")`.
fn project(ev: &Evaluator, expr: &Expr, item: &Value, depth: usize) -> Result<Value> {
    match expr {
        Expr::Str(path) => Ok(lookup(item, path)),
        other => ev.eval_at(other, item, depth + 1),
    }
}

/// Dotted-path lookup; missing segments yield null.
pub(crate) fn lookup(input: &Value, path: &str) -> Value {
    let mut current = input;
    for seg in path.split('.') {
        match current.get(seg) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Rebuild an object keeping only the given dotted paths, preserving
/// nesting. Over an array input the caller maps this per element.
fn pick_paths(input: &Value, paths: &[String]) -> Value {
    let mut out = Map::new();
    for path in paths {
        let value = lookup(input, path);
        if value.is_null() {
            continue;
        }
        let segs: Vec<&str> = path.split('.').collect();
        insert_nested(&mut out, &segs, value);
    }
    Value::Object(out)
}

/// Insert `value` at the nested dotted-path `segs` within `map`, creating
/// intermediate objects as needed. If a shorter path already claimed a slot
/// with a scalar, the insertion is silently skipped.
fn insert_nested(map: &mut Map<String, Value>, segs: &[&str], value: Value) {
    if segs.len() == 1 {
        map.insert(segs[0].to_string(), value);
        return;
    }
    let slot = map
        .entry(segs[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(next) = slot.as_object_mut() {
        insert_nested(next, &segs[1..], value);
    }
}

fn dedupe<'a>(items: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|v| value_eq(v, item)) {
            out.push(item.clone());
        }
    }
    out
}

/// Canonical string form used for keys and `string()`.
fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn fold_numbers(name: &str, input: &Value, init: f64, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let items = as_array(name, input)?;
    let mut acc = init;
    for n in numbers_of(name, items)? {
        acc = f(acc, n);
    }
    Ok(num(acc))
}

fn extremum(name: &str, input: &Value, want: std::cmp::Ordering) -> Result<Value> {
    let items = as_array(name, input)?;
    if items.is_empty() {
        return Ok(Value::Null);
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        if sort_cmp(item, &best) == want {
            best = item.clone();
        }
    }
    Ok(best)
}

fn numbers_of(name: &str, items: &[Value]) -> Result<Vec<f64>> {
    items
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                ErrorKind::FilterFailed(format!(
                    "{name}() requires an array of numbers, found {}",
                    type_name(v)
                ))
            })
        })
        .collect()
}

fn one_lambda<'a>(name: &str, args: &'a [Expr]) -> Result<&'a Expr> {
    match args {
        [one] => Ok(one),
        _ => Err(arity(name, "exactly one argument")),
    }
}

fn eval_one(ev: &Evaluator, name: &str, args: &[Expr], input: &Value, depth: usize) -> Result<Value> {
    match args {
        [one] => ev.eval_at(one, input, depth + 1),
        _ => Err(arity(name, "exactly one argument")),
    }
}

fn eval_two(
    ev: &Evaluator,
    name: &str,
    args: &[Expr],
    input: &Value,
    depth: usize,
) -> Result<(Value, Value)> {
    match args {
        [a, b] => Ok((
            ev.eval_at(a, input, depth + 1)?,
            ev.eval_at(b, input, depth + 1)?,
        )),
        _ => Err(arity(name, "exactly two arguments")),
    }
}

fn eval_string(ev: &Evaluator, name: &str, arg: &Expr, input: &Value, depth: usize) -> Result<String> {
    match ev.eval_at(arg, input, depth + 1)? {
        Value::String(s) => Ok(s),
        other => Err(ErrorKind::FilterFailed(format!(
            "{name}() expects a string argument, got {}",
            type_name(&other)
        ))),
    }
}

fn eval_number(ev: &Evaluator, name: &str, arg: &Expr, input: &Value, depth: usize) -> Result<f64> {
    ev.eval_at(arg, input, depth + 1)?.as_f64().ok_or_else(|| {
        ErrorKind::FilterFailed(format!("{name}() expects a numeric argument"))
    })
}

fn eval_one_string(
    ev: &Evaluator,
    name: &str,
    args: &[Expr],
    input: &Value,
    depth: usize,
) -> Result<String> {
    match args {
        [one] => eval_string(ev, name, one, input, depth),
        _ => Err(arity(name, "exactly one argument")),
    }
}

fn eval_one_number(
    ev: &Evaluator,
    name: &str,
    args: &[Expr],
    input: &Value,
    depth: usize,
) -> Result<f64> {
    match args {
        [one] => eval_number(ev, name, one, input, depth),
        _ => Err(arity(name, "exactly one argument")),
    }
}

fn as_array<'a>(name: &str, input: &'a Value) -> Result<&'a Vec<Value>> {
    input
        .as_array()
        .ok_or_else(|| applies_to(name, "an array", input))
}

fn as_object<'a>(name: &str, input: &'a Value) -> Result<&'a Map<String, Value>> {
    input
        .as_object()
        .ok_or_else(|| applies_to(name, "an object", input))
}

fn as_str<'a>(name: &str, input: &'a Value) -> Result<&'a str> {
    input
        .as_str()
        .ok_or_else(|| applies_to(name, "a string", input))
}

fn applies_to(name: &str, expected: &str, got: &Value) -> ErrorKind {
    ErrorKind::FilterFailed(format!(
        "{name}() applies to {expected}, got {}",
        type_name(got)
    ))
}

fn arity(name: &str, expected: &str) -> ErrorKind {
    ErrorKind::FilterFailed(format!("{name}() takes {expected}"))
}
