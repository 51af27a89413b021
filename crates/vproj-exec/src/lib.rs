#![forbid(unsafe_code)]
//! vproj-exec: execution driver for the projection operator.
//!
//! The engine builds operators over any `BatchSource`, shares one memory
//! budget and one compile cache among them, and summarizes each run.

pub mod runtime;

pub use runtime::{Engine, ExecError, RunSummary};
pub use vproj_operators::MemorySource;
