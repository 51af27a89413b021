#![forbid(unsafe_code)]
//! vproj-mem: hard memory budgeting and column allocation.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `vproj-core::budget`. Every output column the projection operator
//! creates is sized and accounted here, so the hard memory ceiling is
//! enforced with RAII guards that travel inside the columns themselves.

pub mod alloc;
pub mod error;
pub mod guard;
pub mod tracking;

pub use alloc::{BudgetAllocator, ColumnAllocator};
pub use error::{Error, Result};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use tracking::PeakTracker;
