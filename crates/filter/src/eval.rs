//! Expression evaluator.
//!
//! Evaluation is pure and bounded: a recursion-depth limit guards the tree
//! walk and a step budget guards total work. Both abort with a filter
//! error when exceeded.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;
use spg_domain::error::{ErrorKind, Result};

use crate::ast::{BinOp, Expr};
use crate::funcs;

#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    pub max_depth: usize,
    pub max_steps: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_steps: 10_000,
        }
    }
}

pub struct Evaluator {
    limits: EvalLimits,
    params: HashMap<String, Value>,
    steps: Cell<usize>,
}

impl Evaluator {
    pub fn new(limits: EvalLimits, params: HashMap<String, Value>) -> Self {
        Self {
            limits,
            params,
            steps: Cell::new(0),
        }
    }

    /// Evaluate `expr` against `input`.
    pub fn eval(&self, expr: &Expr, input: &Value) -> Result<Value> {
        self.eval_at(expr, input, 0)
    }

    pub(crate) fn eval_at(&self, expr: &Expr, input: &Value, depth: usize) -> Result<Value> {
        let steps = self.steps.get() + 1;
        if steps > self.limits.max_steps {
            return Err(ErrorKind::FilterFailed(format!(
                "evaluation exceeded the step budget of {}",
                self.limits.max_steps
            )));
        }
        self.steps.set(steps);

        if depth > self.limits.max_depth {
            return Err(ErrorKind::FilterFailed(format!(
                "evaluation exceeded the depth limit of {}",
                self.limits.max_depth
            )));
        }

        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(num(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Param(name) => Ok(self.params.get(name).cloned().unwrap_or(Value::Null)),
            Expr::Identity => Ok(input.clone()),
            Expr::Access(target, seg) => {
                let base = self.eval_at(target, input, depth + 1)?;
                Ok(base.get(seg.as_str()).cloned().unwrap_or(Value::Null))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_at(item, input, depth + 1)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), self.eval_at(value, input, depth + 1)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Neg(inner) => {
                let v = self.eval_at(inner, input, depth + 1)?;
                match v.as_f64() {
                    Some(n) => Ok(num(-n)),
                    None => Err(type_error("-", &v)),
                }
            }
            Expr::Not(inner) => {
                let v = self.eval_at(inner, input, depth + 1)?;
                Ok(Value::Bool(!truthy(&v)))
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, input, depth),
            Expr::Pipe(lhs, rhs) => {
                let mid = self.eval_at(lhs, input, depth + 1)?;
                self.eval_at(rhs, &mid, depth + 1)
            }
            Expr::Call(name, args) => funcs::call(self, name, args, input, depth),
        }
    }

    fn binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        input: &Value,
        depth: usize,
    ) -> Result<Value> {
        // Boolean operators short-circuit.
        match op {
            BinOp::And => {
                let l = self.eval_at(lhs, input, depth + 1)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval_at(rhs, input, depth + 1)?;
                return Ok(Value::Bool(truthy(&r)));
            }
            BinOp::Or => {
                let l = self.eval_at(lhs, input, depth + 1)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval_at(rhs, input, depth + 1)?;
                return Ok(Value::Bool(truthy(&r)));
            }
            _ => {}
        }

        let l = self.eval_at(lhs, input, depth + 1)?;
        let r = self.eval_at(rhs, input, depth + 1)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(value_eq(&l, &r))),
            BinOp::Ne => Ok(Value::Bool(!value_eq(&l, &r))),
            BinOp::Gt => Ok(Value::Bool(ordered(&l, &r, Ordering::Greater, false))),
            BinOp::Ge => Ok(Value::Bool(ordered(&l, &r, Ordering::Greater, true))),
            BinOp::Lt => Ok(Value::Bool(ordered(&l, &r, Ordering::Less, false))),
            BinOp::Le => Ok(Value::Bool(ordered(&l, &r, Ordering::Less, true))),
            BinOp::In => Ok(Value::Bool(contains(&r, &l)?)),
            BinOp::NotIn => Ok(Value::Bool(!contains(&r, &l)?)),
            BinOp::Add => add_values(&l, &r),
            BinOp::Sub => arith(&l, &r, "-", |a, b| Ok(a - b)),
            BinOp::Mul => arith(&l, &r, "*", |a, b| Ok(a * b)),
            BinOp::Div => arith(&l, &r, "/", |a, b| {
                if b == 0.0 {
                    Err(ErrorKind::FilterFailed("division by zero".into()))
                } else {
                    Ok(a / b)
                }
            }),
            BinOp::Mod => arith(&l, &r, "%", |a, b| {
                if b == 0.0 {
                    Err(ErrorKind::FilterFailed("modulo by zero".into()))
                } else {
                    Ok(a % b)
                }
            }),
            BinOp::Pow => arith(&l, &r, "^", |a, b| Ok(a.powf(b))),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Value helpers (shared with the function library)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Only `false` and `null` are falsy.
pub(crate) fn truthy(v: &Value) -> bool {
    !matches!(v, Value::Null | Value::Bool(false))
}

/// Render an f64 back into a JSON number, keeping integral values integral.
pub(crate) fn num(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
        Value::from(n as i64)
    } else {
        serde_json::json!(n)
    }
}

/// Deep structural equality; numbers compare by value.
pub(crate) fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| value_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| value_eq(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Order comparison for `> >= < <=`: same-class values compare, a class
/// mismatch is `false`.
fn ordered(a: &Value, b: &Value, want: Ordering, or_equal: bool) -> bool {
    let ord = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    };
    match ord {
        Some(Ordering::Equal) => or_equal,
        Some(ord) => ord == want,
        None => false,
    }
}

/// Total order used by `sort`: booleans < numbers < strings < others,
/// with "others" left in input order (stable sort).
pub(crate) fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            _ => 3,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.as_str().cmp(y.as_str()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Membership: element of an array, key of an object, substring of a string.
pub(crate) fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|v| value_eq(v, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Ok(false),
        },
        _ => Err(ErrorKind::FilterFailed(format!(
            "'in' requires an array, object or string on the right, got {}",
            type_name(haystack)
        ))),
    }
}

fn add_values(l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::Number(_), Value::Number(_)) => {
            let (a, b) = (l.as_f64().unwrap(), r.as_f64().unwrap());
            Ok(num(a + b))
        }
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => Err(ErrorKind::FilterFailed(format!(
            "'+' cannot combine {} and {}",
            type_name(l),
            type_name(r)
        ))),
    }
}

fn arith(l: &Value, r: &Value, op: &str, f: impl Fn(f64, f64) -> Result<f64>) -> Result<Value> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => f(a, b).map(num),
        _ => Err(ErrorKind::FilterFailed(format!(
            "'{op}' requires numbers, got {} and {}",
            type_name(l),
            type_name(r)
        ))),
    }
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn type_error(op: &str, v: &Value) -> ErrorKind {
    ErrorKind::FilterFailed(format!("'{op}' cannot apply to {}", type_name(v)))
}
