//! Expression AST and its canonical printer.
//!
//! The printer emits source the parser accepts back into an identical tree,
//! inserting parentheses only where precedence demands them.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::Lt
            | BinOp::Le
            | BinOp::In
            | BinOp::NotIn => 5,
            BinOp::Add | BinOp::Sub => 6,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
            BinOp::Pow => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// `$name` parameter reference.
    Param(String),
    /// Bare `.`, the current input.
    Identity,
    /// `expr.segment` field access.
    Access(Box<Expr>, String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Pipe(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Build a literal expression from a JSON value.
    pub fn from_value(value: &Value) -> Expr {
        match value {
            Value::Null => Expr::Null,
            Value::Bool(b) => Expr::Bool(*b),
            Value::Number(n) => Expr::Num(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Expr::Str(s.clone()),
            Value::Array(items) => Expr::Array(items.iter().map(Expr::from_value).collect()),
            Value::Object(map) => Expr::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Expr::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Substitute `$name` references that appear in `params`.
    ///
    /// References absent from the map are left in place (they evaluate to
    /// `null` unless the evaluator's environment supplies them).
    pub fn bind(&self, params: &HashMap<String, Value>) -> Expr {
        match self {
            Expr::Param(name) => match params.get(name) {
                Some(v) => Expr::from_value(v),
                None => self.clone(),
            },
            Expr::Access(target, seg) => {
                Expr::Access(Box::new(target.bind(params)), seg.clone())
            }
            Expr::Array(items) => Expr::Array(items.iter().map(|e| e.bind(params)).collect()),
            Expr::Object(pairs) => Expr::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.bind(params)))
                    .collect(),
            ),
            Expr::Neg(e) => Expr::Neg(Box::new(e.bind(params))),
            Expr::Not(e) => Expr::Not(Box::new(e.bind(params))),
            Expr::Binary(op, l, r) => {
                Expr::Binary(*op, Box::new(l.bind(params)), Box::new(r.bind(params)))
            }
            Expr::Pipe(l, r) => Expr::Pipe(Box::new(l.bind(params)), Box::new(r.bind(params))),
            Expr::Call(name, args) => Expr::Call(
                name.clone(),
                args.iter().map(|e| e.bind(params)).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Binding strength of this node when printed.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Pipe(..) => 1,
            Expr::Binary(op, ..) => op.precedence(),
            Expr::Not(_) => 4,
            Expr::Neg(_) => 9,
            Expr::Access(..) => 10,
            _ => 11,
        }
    }

    fn fmt_at(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let prec = self.precedence();
        if prec < min {
            write!(f, "(")?;
            self.fmt_inner(f)?;
            write!(f, ")")
        } else {
            self.fmt_inner(f)
        }
    }

    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => write!(f, "null"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Num(n) => write_number(f, *n),
            Expr::Str(s) => write_quoted(f, s),
            Expr::Param(name) => write!(f, "${name}"),
            Expr::Identity => write!(f, "."),
            Expr::Access(target, seg) => {
                // Chains rooted at the input print as bare paths.
                if !matches!(target.as_ref(), Expr::Identity) {
                    target.fmt_at(f, 10)?;
                }
                write!(f, ".")?;
                if is_bare_ident(seg) {
                    write!(f, "{seg}")
                } else {
                    write_quoted(f, seg)
                }
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_at(f, 2)?;
                }
                write!(f, "]")
            }
            Expr::Object(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if is_bare_ident(key) {
                        write!(f, "{key}: ")?;
                    } else {
                        write_quoted(f, key)?;
                        write!(f, ": ")?;
                    }
                    value.fmt_at(f, 2)?;
                }
                write!(f, "}}")
            }
            Expr::Neg(e) => {
                write!(f, "-")?;
                e.fmt_at(f, 9)
            }
            Expr::Not(e) => {
                write!(f, "not ")?;
                e.fmt_at(f, 4)
            }
            Expr::Binary(op, l, r) => {
                let prec = op.precedence();
                if *op == BinOp::Pow {
                    // Right-associative.
                    l.fmt_at(f, prec + 1)?;
                    write!(f, " {} ", op.symbol())?;
                    r.fmt_at(f, prec)
                } else {
                    l.fmt_at(f, prec)?;
                    write!(f, " {} ", op.symbol())?;
                    r.fmt_at(f, prec + 1)
                }
            }
            Expr::Pipe(l, r) => {
                l.fmt_at(f, 1)?;
                write!(f, " | ")?;
                r.fmt_at(f, 2)
            }
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    // Arguments restart at full expression level.
                    arg.fmt_at(f, 0)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            other => write!(f, "{other}")?,
        }
    }
    write!(f, "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prints_paths_and_pipes() {
        let expr = Expr::Pipe(
            Box::new(Expr::Access(Box::new(Expr::Identity), "orders".into())),
            Box::new(Expr::Call(
                "map".into(),
                vec![Expr::Access(Box::new(Expr::Identity), "id".into())],
            )),
        );
        assert_eq!(expr.to_string(), ".orders | map(.id)");
    }

    #[test]
    fn prints_quoted_segments() {
        let expr = Expr::Access(Box::new(Expr::Identity), "Order Total".into());
        assert_eq!(expr.to_string(), ".\"Order Total\"");
    }

    #[test]
    fn parenthesizes_by_precedence() {
        // (1 + 2) * 3 keeps its parens; 1 + 2 * 3 does not gain any.
        let sum = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Num(1.0)),
            Box::new(Expr::Num(2.0)),
        );
        let grouped = Expr::Binary(BinOp::Mul, Box::new(sum.clone()), Box::new(Expr::Num(3.0)));
        assert_eq!(grouped.to_string(), "(1 + 2) * 3");

        let product = Expr::Binary(
            BinOp::Mul,
            Box::new(Expr::Num(2.0)),
            Box::new(Expr::Num(3.0)),
        );
        let flat = Expr::Binary(BinOp::Add, Box::new(Expr::Num(1.0)), Box::new(product));
        assert_eq!(flat.to_string(), "1 + 2 * 3");
    }

    #[test]
    fn bind_substitutes_known_params() {
        let expr = Expr::Binary(
            BinOp::Gt,
            Box::new(Expr::Access(Box::new(Expr::Identity), "price".into())),
            Box::new(Expr::Param("threshold".into())),
        );
        let mut params = HashMap::new();
        params.insert("threshold".to_string(), json!(50));
        let bound = expr.bind(&params);
        assert_eq!(bound.to_string(), ".price > 50");

        // Unknown params stay in place.
        let unbound = expr.bind(&HashMap::new());
        assert_eq!(unbound.to_string(), ".price > $threshold");
    }

    #[test]
    fn integers_print_without_fraction() {
        assert_eq!(Expr::Num(5.0).to_string(), "5");
        assert_eq!(Expr::Num(2.5).to_string(), "2.5");
    }
}
