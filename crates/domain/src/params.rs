//! Typed filter-parameter values.
//!
//! Caller-supplied parameter blobs are coerced into this tagged union
//! against the type a filter definition declares; mismatches are rejected
//! rather than silently stringified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// Declared type of a filter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Date,
}

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
}

impl ParamValue {
    /// Coerce a raw JSON value against a declared type.
    ///
    /// Accepted coercions are explicit: numbers from JSON numbers or
    /// numeric strings, booleans from JSON booleans or `"true"`/`"false"`,
    /// dates from ISO-8601 strings. Anything else is `InvalidInput`.
    pub fn coerce(name: &str, raw: &Value, ty: ParamType) -> Result<Self, ErrorKind> {
        match ty {
            ParamType::String => match raw {
                Value::String(s) => Ok(ParamValue::String(s.clone())),
                Value::Number(n) => Ok(ParamValue::String(n.to_string())),
                _ => Err(mismatch(name, "string", raw)),
            },
            ParamType::Number => match raw {
                Value::Number(n) => n
                    .as_f64()
                    .map(ParamValue::Number)
                    .ok_or_else(|| mismatch(name, "number", raw)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(ParamValue::Number)
                    .map_err(|_| mismatch(name, "number", raw)),
                _ => Err(mismatch(name, "number", raw)),
            },
            ParamType::Boolean => match raw {
                Value::Bool(b) => Ok(ParamValue::Boolean(*b)),
                Value::String(s) if s == "true" => Ok(ParamValue::Boolean(true)),
                Value::String(s) if s == "false" => Ok(ParamValue::Boolean(false)),
                _ => Err(mismatch(name, "boolean", raw)),
            },
            ParamType::Date => match raw {
                Value::String(s) => s
                    .parse::<DateTime<Utc>>()
                    .map(ParamValue::Date)
                    .map_err(|_| {
                        ErrorKind::InvalidInput(format!(
                            "parameter '{name}' is not an ISO-8601 date: {s:?}"
                        ))
                    }),
                _ => Err(mismatch(name, "date", raw)),
            },
        }
    }

    /// Render the value back into the JSON the filter engine evaluates over.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::Number(n) => serde_json::json!(n),
            ParamValue::Boolean(b) => Value::Bool(*b),
            ParamValue::Date(d) => Value::String(crate::envelope::iso(*d)),
        }
    }
}

fn mismatch(name: &str, expected: &str, raw: &Value) -> ErrorKind {
    ErrorKind::InvalidInput(format!(
        "parameter '{name}' expects a {expected}, got {raw}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_from_number_and_numeric_string() {
        assert_eq!(
            ParamValue::coerce("threshold", &json!(50), ParamType::Number).unwrap(),
            ParamValue::Number(50.0)
        );
        assert_eq!(
            ParamValue::coerce("threshold", &json!("12.5"), ParamType::Number).unwrap(),
            ParamValue::Number(12.5)
        );
    }

    #[test]
    fn number_rejects_non_numeric() {
        let err = ParamValue::coerce("threshold", &json!("abc"), ParamType::Number).unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidInput(_)));
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn boolean_from_bool_and_literal_strings() {
        assert_eq!(
            ParamValue::coerce("details", &json!(true), ParamType::Boolean).unwrap(),
            ParamValue::Boolean(true)
        );
        assert_eq!(
            ParamValue::coerce("details", &json!("false"), ParamType::Boolean).unwrap(),
            ParamValue::Boolean(false)
        );
        assert!(ParamValue::coerce("details", &json!("yes"), ParamType::Boolean).is_err());
    }

    #[test]
    fn date_roundtrips_to_trailing_z() {
        let v = ParamValue::coerce("after", &json!("2025-01-30T10:00:00Z"), ParamType::Date)
            .unwrap();
        assert_eq!(v.to_json(), json!("2025-01-30T10:00:00Z"));
    }

    #[test]
    fn date_rejects_non_iso() {
        assert!(ParamValue::coerce("after", &json!("30/01/2025"), ParamType::Date).is_err());
        assert!(ParamValue::coerce("after", &json!(20250130), ParamType::Date).is_err());
    }

    #[test]
    fn string_accepts_numbers() {
        assert_eq!(
            ParamValue::coerce("sku", &json!(42), ParamType::String).unwrap(),
            ParamValue::String("42".into())
        );
        assert!(ParamValue::coerce("sku", &json!([1]), ParamType::String).is_err());
    }
}
