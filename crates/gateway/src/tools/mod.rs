//! Operation adapters exposed as tools.
//!
//! Each tool gates on the session token, validates its arguments before
//! any network traffic, drives the dispatcher, and post-processes the
//! response with the filter engine where that applies.

pub mod auth;
pub mod feeds;
pub mod filters;
pub mod inventory;
pub mod listings;
pub mod orders;
pub mod reports;

use chrono::{DateTime, Utc};
use serde_json::Value;

use spg_domain::envelope::ResponseEnvelope;
use spg_domain::error::{ErrorKind, Result};

use crate::core::Core;

/// Every protected tool's first act: the session gate.
pub(crate) fn gate(core: &Core, args: &Value) -> Result<()> {
    let token = args.get("token").and_then(Value::as_str).unwrap_or_default();
    core.sessions.validate(token)
}

pub(crate) fn envelope_from(
    outcome: Result<(Value, spg_domain::envelope::ResponseMetadata)>,
) -> ResponseEnvelope {
    match outcome {
        Ok((data, metadata)) => ResponseEnvelope::ok(data, metadata),
        Err(kind) => ResponseEnvelope::err(kind),
    }
}

// ── Argument extraction ──────────────────────────────────────────────

pub(crate) fn required_str(args: &Value, name: &str) -> Result<String> {
    match args.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(ErrorKind::InvalidInput(
            format!("'{name}' is required"),
        )),
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "'{name}' must be a string, got {other}"
        ))),
    }
}

pub(crate) fn optional_str(args: &Value, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "'{name}' must be a string, got {other}"
        ))),
    }
}

pub(crate) fn optional_bool(args: &Value, name: &str) -> Result<bool> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "'{name}' must be a boolean, got {other}"
        ))),
    }
}

pub(crate) fn optional_u32(args: &Value, name: &str) -> Result<Option<u32>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v <= u32::MAX as u64 => Ok(Some(v as u32)),
            _ => Err(ErrorKind::InvalidInput(format!(
                "'{name}' must be a non-negative integer"
            ))),
        },
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "'{name}' must be a number, got {other}"
        ))),
    }
}

/// A string or an array of strings.
pub(crate) fn string_list(args: &Value, name: &str) -> Result<Option<Vec<String>>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    other => {
                        return Err(ErrorKind::InvalidInput(format!(
                            "'{name}' entries must be strings, got {other}"
                        )))
                    }
                }
            }
            Ok(Some(out))
        }
        Some(other) => Err(ErrorKind::InvalidInput(format!(
            "'{name}' must be a string or an array of strings, got {other}"
        ))),
    }
}

/// Optional ISO-8601 instant, re-emitted canonically with a trailing `Z`.
pub(crate) fn optional_date(args: &Value, name: &str) -> Result<Option<String>> {
    match optional_str(args, name)? {
        None => Ok(None),
        Some(raw) => {
            let parsed = raw.parse::<DateTime<Utc>>().map_err(|_| {
                ErrorKind::InvalidInput(format!("'{name}' is not an ISO-8601 date: {raw:?}"))
            })?;
            Ok(Some(spg_domain::envelope::iso(parsed)))
        }
    }
}

/// A fresh request id for operations that never touch the network.
pub(crate) fn local_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_list_accepts_both_shapes() {
        let args = json!({"a": "X, Y ,Z", "b": ["X", "Y"], "c": 5});
        assert_eq!(
            string_list(&args, "a").unwrap(),
            Some(vec!["X".to_string(), "Y".to_string(), "Z".to_string()])
        );
        assert_eq!(
            string_list(&args, "b").unwrap(),
            Some(vec!["X".to_string(), "Y".to_string()])
        );
        assert!(string_list(&args, "c").is_err());
        assert_eq!(string_list(&args, "missing").unwrap(), None);
    }

    #[test]
    fn dates_are_canonicalized() {
        let args = json!({"when": "2025-01-30T10:00:00+01:00"});
        assert_eq!(
            optional_date(&args, "when").unwrap(),
            Some("2025-01-30T09:00:00Z".to_string())
        );
        let bad = json!({"when": "yesterday"});
        assert!(optional_date(&bad, "when").is_err());
    }

    #[test]
    fn required_strings_reject_blank_and_wrong_types() {
        assert!(required_str(&json!({"x": "  "}), "x").is_err());
        assert!(required_str(&json!({"x": 9}), "x").is_err());
        assert!(required_str(&json!({}), "x").is_err());
        assert_eq!(required_str(&json!({"x": "ok"}), "x").unwrap(), "ok");
    }
}
