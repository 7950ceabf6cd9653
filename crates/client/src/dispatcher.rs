//! Request dispatcher.
//!
//! One call runs the whole outbound pipeline: rate admission → credentials
//! → signing → transmission → classification → bounded retry. The rate
//! token is reacquired on every attempt. An upstream 401 triggers exactly
//! one forced credential refresh per dispatch before becoming terminal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};
use spg_domain::marketplace::Marketplace;

use crate::backoff;
use crate::credentials::CredentialProvider;
use crate::ratelimit::{Admission, RateLimiter};
use crate::signer::{self, SigningInput};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

const USER_AGENT: &str = concat!("spgateway/", env!("CARGO_PKG_VERSION"), " (Language=Rust)");

/// Per-attempt transport timeout.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default overall deadline for one dispatched operation.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// One outbound call, fully described.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operation: String,
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub marketplace: &'static Marketplace,
    pub retry_budget: u32,
    pub deadline: Duration,
}

impl RequestContext {
    pub fn new(
        operation: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        marketplace: &'static Marketplace,
    ) -> Self {
        Self {
            operation: operation.into(),
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
            body: None,
            marketplace,
            retry_budget: backoff::MAX_RETRIES,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A classified successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub payload: Value,
    pub status: u16,
    pub request_id: String,
}

/// The outbound pipeline.
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialProvider>,
    limiter: Arc<RateLimiter>,
    wait_for_rate_limit: bool,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialProvider>,
        limiter: Arc<RateLimiter>,
        wait_for_rate_limit: bool,
    ) -> Self {
        Self {
            transport,
            credentials,
            limiter,
            wait_for_rate_limit,
        }
    }

    pub async fn dispatch(&self, ctx: &RequestContext) -> Result<UpstreamResponse> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut forced_refresh_done = false;

        loop {
            let remaining = self.remaining(ctx, started)?;

            // (1) Rate admission; a fresh token on every attempt.
            if self.wait_for_rate_limit {
                tokio::time::timeout(remaining, self.limiter.acquire(&ctx.path))
                    .await
                    .map_err(|_| deadline_error(ctx))?;
            } else if let Admission::Denied { retry_after } = self.limiter.admit(&ctx.path) {
                return Err(ErrorKind::RateLimitExceeded { retry_after });
            }

            // (2) Credentials. Auth failures are terminal here.
            let region = ctx.marketplace.region;
            let access_token = self.credentials.access_token(region).await?;
            let signing = self.credentials.signing_credentials(region).await?;

            // (3) Build and sign.
            let request = self.build_request(ctx, &access_token, &signing)?;
            let our_request_id = request
                .header("x-request-id")
                .unwrap_or_default()
                .to_string();

            // (4) Transmit.
            let outcome = self.transport.send(request).await;

            // (5) Classify.
            let error = match outcome {
                Ok(response) => match classify(&response) {
                    Ok(payload) => {
                        let request_id = response
                            .header("x-amzn-requestid")
                            .map(str::to_string)
                            .unwrap_or(our_request_id);
                        return Ok(UpstreamResponse {
                            payload,
                            status: response.status,
                            request_id,
                        });
                    }
                    Err(err) => {
                        // One forced refresh on 401, not counted as a retry.
                        if response.status == 401 && !forced_refresh_done {
                            forced_refresh_done = true;
                            self.credentials.invalidate_access_token(region).await;
                            tracing::warn!(
                                operation = %ctx.operation,
                                "upstream 401, forcing credential refresh"
                            );
                            continue;
                        }
                        err
                    }
                },
                Err(err) => err,
            };

            // (6) Retry or surface.
            if !error.is_retryable() || attempt >= ctx.retry_budget {
                tracing::warn!(
                    operation = %ctx.operation,
                    attempt,
                    error = %error,
                    "dispatch failed"
                );
                return Err(error);
            }

            let retry_after = match &error {
                ErrorKind::RateLimitExceeded { retry_after } => Some(*retry_after),
                _ => None,
            };
            let delay = backoff::retry_delay(attempt, retry_after);
            if delay >= self.remaining(ctx, started)? {
                return Err(deadline_error(ctx));
            }
            tracing::debug!(
                operation = %ctx.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn remaining(&self, ctx: &RequestContext, started: Instant) -> Result<Duration> {
        ctx.deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| deadline_error(ctx))
    }

    fn build_request(
        &self,
        ctx: &RequestContext,
        access_token: &str,
        signing: &crate::credentials::SigningCredentials,
    ) -> Result<HttpRequest> {
        let body_bytes = match &ctx.body {
            Some(body) => serde_json::to_vec(body)
                .map_err(|e| ErrorKind::Internal(format!("serializing request body: {e}")))?,
            None => Vec::new(),
        };

        let host = ctx.marketplace.endpoint_host;
        let signed = signer::sign(
            &SigningInput {
                method: &ctx.method,
                host,
                path: &ctx.path,
                query: &ctx.query,
                extra_headers: &[],
                body: &body_bytes,
                region: ctx.marketplace.region,
                service: "execute-api",
                timestamp: Utc::now(),
            },
            signing,
        );

        let mut headers = vec![
            ("host".to_string(), host.to_string()),
            ("user-agent".to_string(), USER_AGENT.to_string()),
            ("x-amz-access-token".to_string(), access_token.to_string()),
            (
                "x-request-id".to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
        ];
        if ctx.body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        headers.extend(signed);

        let query_string = signer::canonical_query_string(&ctx.query);
        let url = if query_string.is_empty() {
            format!("{}{}", ctx.marketplace.endpoint_base(), ctx.path)
        } else {
            format!("{}{}?{query_string}", ctx.marketplace.endpoint_base(), ctx.path)
        };

        Ok(HttpRequest {
            method: ctx.method.clone(),
            url,
            headers,
            body: (!body_bytes.is_empty()).then_some(body_bytes),
            timeout: TRANSPORT_TIMEOUT,
        })
    }
}

fn deadline_error(ctx: &RequestContext) -> ErrorKind {
    ErrorKind::Timeout(format!("operation '{}' exceeded its deadline", ctx.operation))
}

/// Map a received response onto the error taxonomy, or extract its payload.
fn classify(response: &HttpResponse) -> Result<Value> {
    match response.status {
        200..=299 => response.json(),
        401 | 403 => Err(ErrorKind::AuthFailed(format!(
            "upstream rejected the request with HTTP {}",
            response.status
        ))),
        429 => {
            let retry_after = response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(1.0);
            Err(ErrorKind::RateLimitExceeded { retry_after })
        }
        status => {
            let details = response.json().ok().filter(|v| !v.is_null());
            let message = details
                .as_ref()
                .and_then(|v| v.get("errors"))
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("upstream returned HTTP {status}"));
            Err(ErrorKind::UpstreamError {
                status_code: status,
                message,
                details: details.and_then(|v| v.get("errors").cloned()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn success_extracts_payload() {
        let payload = classify(&response(200, r#"{"payload":{"Orders":[]}}"#)).unwrap();
        assert_eq!(payload["payload"]["Orders"], serde_json::json!([]));
    }

    #[test]
    fn auth_statuses_map_to_auth_failed() {
        assert!(matches!(
            classify(&response(401, "")),
            Err(ErrorKind::AuthFailed(_))
        ));
        assert!(matches!(
            classify(&response(403, "")),
            Err(ErrorKind::AuthFailed(_))
        ));
    }

    #[test]
    fn throttle_reads_retry_after_header() {
        let resp = HttpResponse {
            status: 429,
            headers: vec![("Retry-After".into(), "7".into())],
            body: Vec::new(),
        };
        match classify(&resp) {
            Err(ErrorKind::RateLimitExceeded { retry_after }) => assert_eq!(retry_after, 7.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn client_errors_carry_upstream_details() {
        let body = r#"{"errors":[{"code":"InvalidInput","message":"Bad marketplace"}]}"#;
        match classify(&response(400, body)) {
            Err(ErrorKind::UpstreamError {
                status_code,
                message,
                details,
            }) => {
                assert_eq!(status_code, 400);
                assert_eq!(message, "Bad marketplace");
                assert!(details.unwrap().is_array());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        assert!(classify(&response(503, "")).unwrap_err().is_retryable());
        assert!(!classify(&response(404, "")).unwrap_err().is_retryable());
    }
}
