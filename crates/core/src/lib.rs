//! redb-core
//!
//! Core library for function-similarity search over reverse-engineered binaries.
//!
//! This crate defines the fingerprint model, the filtering and scoring heuristics
//! of the matching pipeline, the matching service that ties them together, and a
//! SQLite-backed corpus store.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, servers, etc.).

pub mod config;
pub mod db;
pub mod filters;
pub mod heuristics;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
