//! Convenient re-exports for downstream crates.

pub use crate::budget::{BudgetGuard, MemoryBudget};
pub use crate::config::ProjectConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{FieldId, OpId};
pub use crate::schema::{DataType, Field, Schema, SelectionVectorMode};
pub use crate::types::{Column, Reservation, RowBatch, Scalar};
