//! Shared domain types for the SP-API gateway.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! the response envelope every operation returns, the marketplace constant
//! table, typed filter-parameter values, and process configuration.

pub mod config;
pub mod envelope;
pub mod error;
pub mod marketplace;
pub mod params;

pub use envelope::{ErrorBody, ResponseEnvelope, ResponseMetadata};
pub use error::{ErrorKind, Result};
pub use marketplace::Marketplace;
pub use params::{ParamType, ParamValue};
