//! Credential manager.
//!
//! Two caches keyed by region: the short-lived access token from the
//! identity provider's refresh exchange, and the signing credentials
//! (static pair, or a temporary triple from a role assumption). Each cache
//! sits behind an async mutex held across the refresh, so concurrent
//! callers that observe an expired artifact coalesce onto a single
//! upstream request. A failed refresh never populates the cache, and a
//! caller cancelled mid-refresh leaves the cache untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use spg_domain::config::CredentialsConfig;
use spg_domain::error::{ErrorKind, Result};

use crate::signer::{self, SigningInput};
use crate::transport::{HttpRequest, HttpTransport};

/// Refresh when less than this margin remains before expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Identity-provider token endpoint for the refresh exchange.
const TOKEN_ENDPOINT: &str = "https://api.amazon.com/auth/o2/token";

/// Lifetime requested for assumed-role credentials.
const ROLE_SESSION_SECS: u32 = 3600;

const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials used to sign outbound requests.
///
/// `Debug` is manually implemented to redact the secret material.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredentials {
    pub key_id: String,
    pub secret: String,
    /// Present only for temporary (assumed-role) credentials.
    pub session: Option<String>,
    /// `None` means the pair does not expire (static credentials).
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .field("session", &self.session.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone)]
struct CachedAccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// The credential manager.
pub struct CredentialProvider {
    config: CredentialsConfig,
    transport: Arc<dyn HttpTransport>,
    token_endpoint: String,
    /// Test override; `None` uses the regional federation endpoint.
    sts_endpoint: Option<String>,
    access_tokens: Mutex<HashMap<String, CachedAccessToken>>,
    signing: Mutex<HashMap<String, SigningCredentials>>,
}

impl CredentialProvider {
    pub fn new(config: CredentialsConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            sts_endpoint: None,
            access_tokens: Mutex::new(HashMap::new()),
            signing: Mutex::new(HashMap::new()),
        }
    }

    /// Point the refresh exchanges somewhere else (test upstreams).
    pub fn with_endpoints(
        mut self,
        token_endpoint: impl Into<String>,
        sts_endpoint: Option<String>,
    ) -> Self {
        self.token_endpoint = token_endpoint.into();
        self.sts_endpoint = sts_endpoint;
        self
    }

    /// A currently valid access token for the region.
    ///
    /// The cache lock is held across the refresh so that N concurrent
    /// misses produce exactly one upstream exchange.
    pub async fn access_token(&self, region: &str) -> Result<String> {
        let mut cache = self.access_tokens.lock().await;
        if let Some(entry) = cache.get(region) {
            if seconds_until(entry.expires_at) > EXPIRY_MARGIN_SECS {
                return Ok(entry.token.clone());
            }
        }

        let refreshed = self.refresh_access_token().await?;
        cache.insert(region.to_string(), refreshed.clone());
        tracing::info!(region, "access token refreshed");
        Ok(refreshed.token)
    }

    /// Drop the cached access token so the next caller refreshes.
    /// Used for the one forced refresh after an upstream 401.
    pub async fn invalidate_access_token(&self, region: &str) {
        self.access_tokens.lock().await.remove(region);
    }

    /// Currently valid signing credentials for the region.
    pub async fn signing_credentials(&self, region: &str) -> Result<SigningCredentials> {
        let mut cache = self.signing.lock().await;
        if let Some(entry) = cache.get(region) {
            let fresh = match entry.expires_at {
                Some(at) => seconds_until(at) > EXPIRY_MARGIN_SECS,
                None => true,
            };
            if fresh {
                return Ok(entry.clone());
            }
        }

        let static_pair = self.static_pair()?;
        let creds = match &self.config.role_arn {
            Some(role_arn) => self.assume_role(region, role_arn, &static_pair).await?,
            None => static_pair,
        };
        cache.insert(region.to_string(), creds.clone());
        Ok(creds)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn static_pair(&self) -> Result<SigningCredentials> {
        match (&self.config.access_key_id, &self.config.secret_access_key) {
            (Some(key_id), Some(secret)) => Ok(SigningCredentials {
                key_id: key_id.clone(),
                secret: secret.clone(),
                session: None,
                expires_at: None,
            }),
            _ => Err(ErrorKind::AuthFailed(
                "signing key pair is not configured".into(),
            )),
        }
    }

    async fn refresh_access_token(&self) -> Result<CachedAccessToken> {
        let (refresh_token, client_id, client_secret) = match (
            &self.config.refresh_token,
            &self.config.client_id,
            &self.config.client_secret,
        ) {
            (Some(r), Some(i), Some(s)) => (r, i, s),
            _ => {
                return Err(ErrorKind::AuthFailed(
                    "identity-provider credentials are not configured".into(),
                ))
            }
        };

        let body = form_encode(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ]);

        let request = HttpRequest {
            method: "POST".into(),
            url: self.token_endpoint.clone(),
            headers: vec![(
                "content-type".into(),
                "application/x-www-form-urlencoded".into(),
            )],
            body: Some(body.into_bytes()),
            timeout: REFRESH_TIMEOUT,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ErrorKind::AuthFailed(format!("token refresh transport: {e}")))?;

        if !(200..300).contains(&response.status) {
            return Err(ErrorKind::AuthFailed(format!(
                "token refresh returned HTTP {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body),
            )));
        }

        let parsed: Value = response
            .json()
            .map_err(|e| ErrorKind::AuthFailed(format!("token refresh body: {e}")))?;
        let token = parsed
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::AuthFailed("token response missing access_token".into()))?;
        let expires_in = parsed
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(3600);

        Ok(CachedAccessToken {
            token: token.to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        })
    }

    async fn assume_role(
        &self,
        region: &str,
        role_arn: &str,
        static_pair: &SigningCredentials,
    ) -> Result<SigningCredentials> {
        let host = match &self.sts_endpoint {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("sts.{region}.amazonaws.com"),
        };
        let url_base = match &self.sts_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{host}"),
        };

        let session_name = format!("spgateway-{}", Utc::now().timestamp());
        let duration = ROLE_SESSION_SECS.to_string();
        let body = form_encode(&[
            ("Action", "AssumeRole"),
            ("Version", "2011-06-15"),
            ("RoleArn", role_arn),
            ("RoleSessionName", &session_name),
            ("DurationSeconds", &duration),
        ]);

        let timestamp = Utc::now();
        let extra_headers = vec![(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        )];
        let signed_headers = signer::sign(
            &SigningInput {
                method: "POST",
                host: &host,
                path: "/",
                query: &[],
                extra_headers: &extra_headers,
                body: body.as_bytes(),
                region,
                service: "sts",
                timestamp,
            },
            static_pair,
        );

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ),
            ("accept".to_string(), "application/json".to_string()),
        ];
        headers.extend(signed_headers);

        let request = HttpRequest {
            method: "POST".into(),
            url: format!("{url_base}/"),
            headers,
            body: Some(body.into_bytes()),
            timeout: REFRESH_TIMEOUT,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ErrorKind::AuthFailed(format!("role assumption transport: {e}")))?;

        if !(200..300).contains(&response.status) {
            return Err(ErrorKind::AuthFailed(format!(
                "role assumption returned HTTP {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body),
            )));
        }

        let parsed: Value = response
            .json()
            .map_err(|e| ErrorKind::AuthFailed(format!("role assumption body: {e}")))?;
        let creds = &parsed["AssumeRoleResponse"]["AssumeRoleResult"]["Credentials"];
        let key_id = creds
            .get("AccessKeyId")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::AuthFailed("role assumption missing AccessKeyId".into()))?;
        let secret = creds
            .get("SecretAccessKey")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ErrorKind::AuthFailed("role assumption missing SecretAccessKey".into())
            })?;
        let session = creds
            .get("SessionToken")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::AuthFailed("role assumption missing SessionToken".into()))?;
        let expires_at = creds.get("Expiration").and_then(parse_expiration);

        tracing::info!(region, "signing credentials assumed");
        Ok(SigningCredentials {
            key_id: key_id.to_string(),
            secret: secret.to_string(),
            session: Some(session.to_string()),
            expires_at,
        })
    }
}

fn seconds_until(at: DateTime<Utc>) -> i64 {
    (at - Utc::now()).num_seconds()
}

/// Expiration arrives as epoch seconds (JSON protocol) or ISO-8601.
fn parse_expiration(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
        Value::String(s) => s.parse::<DateTime<Utc>>().ok(),
        _ => None,
    }
}

/// `application/x-www-form-urlencoded` body.
fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", signer::form_component(k), signer::form_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expiration_parses_both_wire_shapes() {
        let epoch = parse_expiration(&json!(1_760_000_000.0)).unwrap();
        assert_eq!(epoch.timestamp(), 1_760_000_000);

        let iso = parse_expiration(&json!("2025-01-30T11:00:00Z")).unwrap();
        assert_eq!(iso.to_rfc3339(), "2025-01-30T11:00:00+00:00");

        assert!(parse_expiration(&json!(null)).is_none());
    }

    #[test]
    fn form_bodies_escape_reserved_characters() {
        let body = form_encode(&[("refresh_token", "Atzr|IQEB/x+y"), ("client_id", "abc")]);
        assert_eq!(body, "refresh_token=Atzr%7CIQEB%2Fx%2By&client_id=abc");
    }

    #[test]
    fn signing_credentials_debug_redacts() {
        let creds = SigningCredentials {
            key_id: "AKIAEXAMPLE".into(),
            secret: "very-secret".into(),
            session: Some("session-token".into()),
            expires_at: None,
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("AKIAEXAMPLE"));
        assert!(!dbg.contains("very-secret"));
        assert!(!dbg.contains("session-token"));
    }
}
