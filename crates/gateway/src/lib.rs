//! Gateway binary crate: the tool protocol loop and operation adapters.
//!
//! The gateway exposes the upstream marketplace operations as named tools
//! over a newline-delimited JSON-RPC stream on stdin/stdout. Every tool
//! call passes the session gate, runs its adapter against the dispatcher,
//! and returns the uniform response envelope, optionally post-processed by
//! the filter engine.

pub mod cli;
pub mod core;
pub mod postprocess;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod tools;
