//! Canonical request signing for the regional signing scheme (SigV4).
//!
//! Produces the `authorization`, `x-amz-date` and (for temporary
//! credentials) `x-amz-security-token` headers for a request. The caller
//! supplies any additional headers that must be covered by the signature.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::SigningCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything the signature covers.
pub struct SigningInput<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Query pairs, unencoded; canonicalization sorts and encodes them.
    pub query: &'a [(String, String)],
    /// Extra headers to include in the signature, beyond `host` and
    /// `x-amz-date` which are always covered.
    pub extra_headers: &'a [(String, String)],
    pub body: &'a [u8],
    pub region: &'a str,
    pub service: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Headers to attach to the outgoing request.
pub fn sign(input: &SigningInput<'_>, credentials: &SigningCredentials) -> Vec<(String, String)> {
    let amz_date = input.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = input.timestamp.format("%Y%m%d").to_string();

    // Canonical headers: host, x-amz-date, any extras, plus the session
    // token when signing with temporary credentials.
    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), input.host.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    for (name, value) in input.extra_headers {
        headers.push((name.to_lowercase(), value.trim().to_string()));
    }
    if let Some(session) = &credentials.session {
        headers.push(("x-amz-security-token".to_string(), session.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_query = canonical_query_string(input.query);
    let payload_hash = hex::encode(Sha256::digest(input.body));

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method.to_uppercase(),
        canonical_path(input.path),
        canonical_query,
        canonical_headers,
        signed_headers,
        payload_hash,
    );

    let scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        input.region, input.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes())),
    );

    let signing_key = derive_key(&credentials.secret, &date_stamp, input.region, input.service);
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.key_id,
    );

    let mut out = vec![
        ("authorization".to_string(), authorization),
        ("x-amz-date".to_string(), amz_date),
    ];
    if let Some(session) = &credentials.session {
        out.push(("x-amz-security-token".to_string(), session.clone()));
    }
    out
}

fn derive_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode each path segment, preserving the separators.
fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|seg| uri_encode(seg, false))
        .collect::<Vec<_>>()
        .join("/")
}

/// Sorted, fully encoded query string, also used to build request URLs so
/// the wire form matches what was signed.
pub(crate) fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode a form-body component.
pub(crate) fn form_component(value: &str) -> String {
    uri_encode(value, true)
}

/// RFC 3986 unreserved-set percent encoding.
fn uri_encode(value: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
