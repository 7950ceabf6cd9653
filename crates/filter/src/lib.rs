//! Query-language engine for reshaping JSON documents.
//!
//! A small expression language in the jq family: accessor paths, pipes,
//! object/array constructors, arithmetic, comparisons, and a fixed function
//! library (`map`, `filter`, `sort`, `pick`, …). Expressions are parsed to a
//! tagged AST, optionally bound against a parameter map (`$name`
//! references), and evaluated against an input document.
//!
//! The engine is pure: no I/O, no host access. Evaluation is bounded by a
//! recursion-depth limit and a step budget; exceeding either aborts the
//! evaluation with a filter error.

mod ast;
mod eval;
mod funcs;
mod parser;
mod token;

pub use ast::{BinOp, Expr};
pub use eval::{EvalLimits, Evaluator};

use std::collections::HashMap;

use serde_json::Value;
use spg_domain::error::Result;

/// Parse an expression into its AST.
pub fn parse(source: &str) -> Result<Expr> {
    parser::parse(source)
}

/// Parse, bind parameters, and evaluate in one call with default limits.
pub fn apply(source: &str, input: &Value, params: &HashMap<String, Value>) -> Result<Value> {
    let expr = parse(source)?.bind(params);
    Evaluator::new(EvalLimits::default(), params.clone()).eval(&expr, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(src: &str, input: Value) -> Value {
        apply(src, &input, &HashMap::new()).unwrap()
    }

    #[test]
    fn accessor_and_pipe() {
        let input = json!({"order": {"total": {"amount": "89.99"}}});
        assert_eq!(run(".order.total.amount", input.clone()), json!("89.99"));
        assert_eq!(run(".order | .total | .amount", input), json!("89.99"));
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run("1 + 2 * 3", json!(null)), json!(7));
        assert_eq!(run("(1 + 2) * 3", json!(null)), json!(9));
        assert_eq!(run("2 ^ 3 ^ 2", json!(null)), json!(512));
        assert_eq!(run("7 % 4", json!(null)), json!(3));
    }

    #[test]
    fn filter_and_map_over_records() {
        let input = json!([
            {"sku": "A", "qty": 5},
            {"sku": "B", "qty": 0},
            {"sku": "C", "qty": 2}
        ]);
        assert_eq!(
            run("filter(.qty > 0) | map(.sku)", input),
            json!(["A", "C"])
        );
    }

    #[test]
    fn object_constructor_reshapes() {
        let input = json!({"AmazonOrderId": "123", "OrderStatus": "Shipped"});
        assert_eq!(
            run("{orderId: .AmazonOrderId, status: .OrderStatus}", input),
            json!({"orderId": "123", "status": "Shipped"})
        );
    }

    #[test]
    fn parameters_bind_into_expressions() {
        let mut params = HashMap::new();
        params.insert("threshold".to_string(), json!(50));
        let input = json!([{"price": 75.0}, {"price": 25.0}]);
        let out = apply("filter(.price > $threshold)", &input, &params).unwrap();
        assert_eq!(out, json!([{"price": 75.0}]));
    }

    #[test]
    fn unbound_parameter_evaluates_to_null() {
        let out = apply("$missing", &json!(1), &HashMap::new()).unwrap();
        assert_eq!(out, json!(null));
    }
}
