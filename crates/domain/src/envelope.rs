//! The uniform success/error wrapper returned by every operation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Discriminated result of a tool operation.
///
/// Serializes with a `status` tag so callers can branch on
/// `"ok"` / `"error"` without probing for fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseEnvelope {
    Ok {
        data: Value,
        metadata: ResponseMetadata,
    },
    Error {
        error: ErrorBody,
    },
}

impl ResponseEnvelope {
    pub fn ok(data: Value, metadata: ResponseMetadata) -> Self {
        ResponseEnvelope::Ok { data, metadata }
    }

    pub fn err(kind: ErrorKind) -> Self {
        ResponseEnvelope::Error {
            error: ErrorBody::from(kind),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseEnvelope::Ok { .. })
    }
}

/// Per-response metadata carried on every successful envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// ISO-8601 with trailing `Z`.
    pub timestamp: String,
    pub marketplace_id: String,
    pub request_id: String,
    /// Best-effort advisory (e.g. the FBM inventory substitution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Filters applied during post-processing, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters_applied: Option<Vec<String>>,
    /// Canonical JSON size before post-processing, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_bytes: Option<usize>,
    /// Canonical JSON size after post-processing, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_bytes: Option<usize>,
    /// Percent reduction, rounded to one decimal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduction_percent: Option<f64>,
}

impl ResponseMetadata {
    pub fn new(marketplace_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            timestamp: iso_now(),
            marketplace_id: marketplace_id.into(),
            request_id: request_id.into(),
            warning: None,
            filters_applied: None,
            original_bytes: None,
            final_bytes: None,
            reduction_percent: None,
        }
    }
}

/// Render `now` as ISO-8601 UTC with a trailing `Z`.
pub fn iso_now() -> String {
    iso(Utc::now())
}

/// Render an instant as ISO-8601 UTC with a trailing `Z`.
pub fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error body
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caller-facing error payload derived from [`ErrorKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl From<ErrorKind> for ErrorBody {
    fn from(kind: ErrorKind) -> Self {
        let code = kind.code().to_string();
        let message = kind.to_string();
        let (details, retry_after, status_code) = match kind {
            ErrorKind::UpstreamError {
                status_code,
                details,
                ..
            } => (details, None, Some(status_code)),
            ErrorKind::RateLimitExceeded { retry_after } => (None, Some(retry_after), None),
            _ => (None, None, None),
        };
        Self {
            kind: code,
            message,
            details,
            retry_after,
            status_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_serializes_with_status_tag() {
        let env = ResponseEnvelope::ok(
            serde_json::json!({"orders": []}),
            ResponseMetadata::new("A1F83G8C2ARO7P", "req-1"),
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["metadata"]["marketplaceId"], "A1F83G8C2ARO7P");
        assert_eq!(json["metadata"]["requestId"], "req-1");
        assert!(json["metadata"]["timestamp"].as_str().unwrap().ends_with('Z'));
        // Optional fields stay off the wire until set.
        assert!(json["metadata"].get("warning").is_none());
        assert!(json["metadata"].get("reductionPercent").is_none());
    }

    #[test]
    fn err_envelope_carries_retry_after() {
        let env = ResponseEnvelope::err(ErrorKind::RateLimitExceeded { retry_after: 2.5 });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "RateLimitExceeded");
        assert_eq!(json["error"]["retryAfter"], 2.5);
    }

    #[test]
    fn err_envelope_carries_upstream_details() {
        let env = ResponseEnvelope::err(ErrorKind::UpstreamError {
            status_code: 400,
            message: "InvalidInput".into(),
            details: Some(serde_json::json!([{"code": "InvalidInput"}])),
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["error"]["statusCode"], 400);
        assert_eq!(json["error"]["details"][0]["code"], "InvalidInput");
    }

    #[test]
    fn iso_timestamps_end_with_z() {
        assert!(iso_now().ends_with('Z'));
    }
}
