//! Upstream client: credentials, signing, rate limiting and dispatch.
//!
//! The dispatcher composes the whole outbound path: admission on the
//! per-endpoint token buckets, credential lookup, request signing,
//! transmission, response classification and bounded retries. HTTP itself
//! goes through the [`transport::HttpTransport`] seam so tests can run
//! against an in-memory upstream.

pub mod backoff;
pub mod credentials;
pub mod dispatcher;
pub mod paginate;
pub mod ratelimit;
pub mod signer;
pub mod transport;

pub use credentials::{CredentialProvider, SigningCredentials};
pub use dispatcher::{Dispatcher, RequestContext, UpstreamResponse};
pub use ratelimit::{Admission, RateLimiter};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
