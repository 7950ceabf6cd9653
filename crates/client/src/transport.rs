//! HTTP transport seam.
//!
//! The dispatcher and credential provider speak to the network through this
//! trait; production uses [`ReqwestTransport`], tests substitute an
//! in-memory upstream.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use spg_domain::error::{ErrorKind, Result};

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON (tests inspect outgoing payloads this way).
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// A received response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON; an empty body is `null`.
    pub fn json(&self) -> Result<Value> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            ErrorKind::UpstreamError {
                status_code: self.status,
                message: format!("response body is not JSON: {e}"),
                details: None,
            }
        })
    }
}

/// Trait the outbound path is generic over.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Transmit one request. Transport faults (DNS, TCP, TLS, timeouts)
    /// surface as `NetworkError`; any received response, whatever its
    /// status, is `Ok`.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| ErrorKind::Internal(format!("bad HTTP method {:?}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(from_reqwest)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|s| (k.as_str().to_string(), s.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(from_reqwest)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Map a [`reqwest::Error`] into the domain taxonomy.
///
/// Every transport fault, timeouts included, is a `NetworkError`; the
/// `Timeout` kind is reserved for operation deadlines.
pub(crate) fn from_reqwest(e: reqwest::Error) -> ErrorKind {
    ErrorKind::NetworkError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![("X-Amzn-RequestId".into(), "req-9".into())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("x-amzn-requestid"), Some("req-9"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn empty_body_parses_as_null() {
        let resp = HttpResponse {
            status: 204,
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(resp.json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn non_json_body_is_an_upstream_error() {
        let resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: b"<html>".to_vec(),
        };
        assert!(resp.json().is_err());
    }
}
