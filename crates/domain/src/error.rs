//! Canonical error taxonomy shared across all gateway crates.
//!
//! Every failure that crosses a crate boundary is one of these kinds; no
//! other error type escapes into the tool surface.

/// Shared error type used across all gateway crates.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rate limit exceeded, retry after {retry_after:.3}s")]
    RateLimitExceeded { retry_after: f64 },

    #[error("upstream HTTP {status_code}: {message}")]
    UpstreamError {
        status_code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("network: {0}")]
    NetworkError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("filter failed: {0}")]
    FilterFailed(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ErrorKind>;

impl ErrorKind {
    /// Stable machine-readable name, used in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::AuthFailed(_) => "AuthFailed",
            ErrorKind::InvalidInput(_) => "InvalidInput",
            ErrorKind::RateLimitExceeded { .. } => "RateLimitExceeded",
            ErrorKind::UpstreamError { .. } => "UpstreamError",
            ErrorKind::NetworkError(_) => "NetworkError",
            ErrorKind::Timeout(_) => "Timeout",
            ErrorKind::FilterFailed(_) => "FilterFailed",
            ErrorKind::Internal(_) => "Internal",
        }
    }

    /// Whether the dispatcher may retry an attempt that failed this way.
    ///
    /// Only upstream 429s, server-side 5xx (500/502/503/504) and transport
    /// faults are retry-eligible; everything else is surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::RateLimitExceeded { .. } => true,
            ErrorKind::NetworkError(_) => true,
            ErrorKind::UpstreamError { status_code, .. } => {
                matches!(status_code, 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ErrorKind::RateLimitExceeded { retry_after: 1.0 }.is_retryable());
        assert!(ErrorKind::NetworkError("dns".into()).is_retryable());
        assert!(ErrorKind::UpstreamError {
            status_code: 503,
            message: "unavailable".into(),
            details: None
        }
        .is_retryable());

        assert!(!ErrorKind::AuthFailed("bad token".into()).is_retryable());
        assert!(!ErrorKind::InvalidInput("negative quantity".into()).is_retryable());
        assert!(!ErrorKind::UpstreamError {
            status_code: 400,
            message: "bad request".into(),
            details: None
        }
        .is_retryable());
        assert!(!ErrorKind::Timeout("deadline".into()).is_retryable());
        assert!(!ErrorKind::FilterFailed("parse".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::AuthFailed(String::new()).code(), "AuthFailed");
        assert_eq!(
            ErrorKind::RateLimitExceeded { retry_after: 0.5 }.code(),
            "RateLimitExceeded"
        );
        assert_eq!(ErrorKind::Internal(String::new()).code(), "Internal");
    }

    #[test]
    fn display_includes_status_code() {
        let err = ErrorKind::UpstreamError {
            status_code: 502,
            message: "bad gateway".into(),
            details: None,
        };
        assert!(err.to_string().contains("502"));
    }
}
