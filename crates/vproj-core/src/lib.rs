#![forbid(unsafe_code)]
//! vproj-core: schemas, columnar storage, configuration, IDs, and hashing.
//!
//! Everything here is pure data plus the abstract memory-budget traits. No
//! expression logic, allocation policy, or execution lives in core.

pub mod budget;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

/// Engine version string for provenance in run summaries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
