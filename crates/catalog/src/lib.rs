//! Durable catalog of filter definitions.
//!
//! The catalog is a single JSON document on disk, versioned by an integer
//! schema number with ordered migrations applied on open, and cached in
//! memory behind a read-mostly lock. Seed content ships with the crate and
//! is imported idempotently (upsert by id) on first open.

mod migrate;
mod seed;
mod store;
mod types;

pub use seed::{builtin_seeds, SeedDocument};
pub use store::{CatalogStore, ImportStats, SearchQuery, SCHEMA_VERSION};
pub use types::{FilterDefinition, FilterKind, FilterTest, ParameterSpec};
