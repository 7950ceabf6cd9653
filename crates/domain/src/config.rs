//! Process configuration.
//!
//! Configuration is assembled in three layers: built-in defaults, then an
//! optional TOML file, then environment variables (which always win).
//! Credential material only ever arrives via the environment.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Country code selecting the default marketplace.
    #[serde(default = "d_marketplace")]
    pub default_marketplace: String,
    /// Block on a saturated bucket instead of failing fast with a 429.
    #[serde(default)]
    pub wait_for_rate_limit: bool,
}

impl GatewayConfig {
    /// Load configuration: defaults, then the TOML file at `path` (if any),
    /// then environment variables on top.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    ErrorKind::InvalidInput(format!("cannot read config {}: {e}", p.display()))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    ErrorKind::InvalidInput(format!("invalid config {}: {e}", p.display()))
                })?
            }
            None => GatewayConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay recognized `SPAPI_*` environment variables.
    pub fn apply_env(&mut self) {
        let mut set = |target: &mut Option<String>, var: &str| {
            if let Ok(v) = std::env::var(var) {
                if !v.is_empty() {
                    *target = Some(v);
                }
            }
        };
        set(&mut self.credentials.refresh_token, "SPAPI_REFRESH_TOKEN");
        set(&mut self.credentials.client_id, "SPAPI_CLIENT_ID");
        set(&mut self.credentials.client_secret, "SPAPI_CLIENT_SECRET");
        set(&mut self.credentials.access_key_id, "SPAPI_ACCESS_KEY_ID");
        set(
            &mut self.credentials.secret_access_key,
            "SPAPI_SECRET_ACCESS_KEY",
        );
        set(&mut self.credentials.role_arn, "SPAPI_ROLE_ARN");

        if let Ok(v) = std::env::var("SPAPI_DEFAULT_MARKETPLACE") {
            if !v.is_empty() {
                self.default_marketplace = v;
            }
        }
        if let Ok(v) = std::env::var("SPAPI_CATALOG_PATH") {
            if !v.is_empty() {
                self.catalog.path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("SPAPI_WAIT_FOR_RATE_LIMIT") {
            self.wait_for_rate_limit = v == "true" || v == "1";
        }
    }
}

fn d_marketplace() -> String {
    crate::marketplace::DEFAULT_COUNTRY.to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Credential material. `Debug` is manually implemented to redact secrets.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Long-lived refresh secret for the identity-provider exchange.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Static signing key pair.
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Optional delegated role to assume for signing credentials.
    #[serde(default)]
    pub role_arn: Option<String>,
}

impl CredentialsConfig {
    /// Whether the access-token refresh exchange can run.
    pub fn has_login_credentials(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Whether signed dispatch can run.
    pub fn has_signing_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialsConfig")
            .field("refresh_token", &redact(&self.refresh_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("role_arn", &self.role_arn)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One bucket setting: refill rate per second and burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketLimit {
    pub rate: f64,
    pub burst: u32,
}

/// Per-endpoint rate-limit table.
///
/// The defaults mirror the upstream API's published limits; a config file
/// may supply its own table under `[limits.endpoints]` when they drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Longest-prefix match over the request path.
    #[serde(default = "d_endpoint_limits")]
    pub endpoints: HashMap<String, BucketLimit>,
    /// Fallback for paths with no configured prefix.
    #[serde(default = "d_default_limit")]
    pub default: BucketLimit,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            endpoints: d_endpoint_limits(),
            default: d_default_limit(),
        }
    }
}

impl LimitsConfig {
    /// Key shared by every path that matches no table row.
    pub const DEFAULT_KEY: &'static str = "default";

    /// Resolve a request path to its table row: the row's key (the bucket
    /// identity) and its limit.
    ///
    /// Row prefixes are matched per path segment; a `{placeholder}`
    /// segment matches any concrete segment, so
    /// `/orders/v0/orders/{id}/orderItems` covers every order's items
    /// path. The most specific match (most segments) wins. Unmatched
    /// paths all share [`Self::DEFAULT_KEY`].
    pub fn resolve(&self, path: &str) -> (String, BucketLimit) {
        self.endpoints
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, path))
            .max_by(|(a, _), (b, _)| {
                segment_count(a)
                    .cmp(&segment_count(b))
                    .then_with(|| a.len().cmp(&b.len()))
                    .then_with(|| a.cmp(b))
            })
            .map(|(pattern, limit)| (pattern.clone(), *limit))
            .unwrap_or_else(|| (Self::DEFAULT_KEY.to_string(), self.default))
    }
}

fn segment_count(pattern: &str) -> usize {
    pattern.split('/').filter(|s| !s.is_empty()).count()
}

/// Segment-wise prefix match; `{…}` matches any one concrete segment.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if path_segs.len() < pattern_segs.len() {
        return false;
    }
    pattern_segs
        .iter()
        .zip(path_segs.iter())
        .all(|(p, s)| (p.starts_with('{') && p.ends_with('}')) || p == s)
}

fn d_default_limit() -> BucketLimit {
    BucketLimit {
        rate: 5.0,
        burst: 10,
    }
}

fn d_endpoint_limits() -> HashMap<String, BucketLimit> {
    let rows: &[(&str, f64, u32)] = &[
        ("/orders/v0/orders", 0.0167, 20),
        ("/orders/v0/orders/{id}/orderItems", 0.5, 30),
        ("/fba/inventory/v1/summaries", 5.0, 10),
        ("/listings/2021-08-01/items", 5.0, 10),
        ("/feeds/2021-06-30/feeds", 15.0, 30),
        ("/reports/2021-06-30/reports", 15.0, 30),
        ("/products/pricing/v0/price", 10.0, 20),
    ];
    rows.iter()
        .map(|&(prefix, rate, burst)| (prefix.to_string(), BucketLimit { rate, burst }))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path of the durable catalog document.
    #[serde(default = "d_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: d_catalog_path(),
        }
    }
}

fn d_catalog_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".spgateway")
        .join("catalog.json")
}
