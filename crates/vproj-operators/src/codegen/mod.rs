//! Projector compilation: turning a set of "write expression into output
//! column" instructions into one executable routine.
//!
//! The operator only depends on the two traits here. `interp` is the default
//! closure-tree compiler, `cache` memoizes any compiler by plan fingerprint.

pub mod cache;
pub mod interp;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vproj_core::hash::{hash_serde, Hash256};
use vproj_core::id::FieldId;
use vproj_core::schema::{DataType, Field, Schema};
use vproj_core::types::{Column, RowBatch};
use vproj_planner::{EvalError, TypedExpr};

pub use cache::CachingCompiler;
pub use interp::InterpretedCompiler;

/// Write the value of `expr` into evaluation output `slot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteInstruction {
    pub slot: usize,
    pub expr: TypedExpr,
    pub field: Field,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritePlan {
    pub input_schema: Schema,
    pub writes: Vec<WriteInstruction>,
}

impl WritePlan {
    pub fn new(input_schema: Schema) -> Self {
        Self {
            input_schema,
            writes: vec![],
        }
    }

    /// Append an instruction for the next free slot; returns that slot.
    pub fn push(&mut self, expr: TypedExpr, field: Field) -> usize {
        let slot = self.writes.len();
        self.writes.push(WriteInstruction { slot, expr, field });
        slot
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Stable identity of the plan; equal plans compile to equal routines.
    pub fn fingerprint(&self) -> Result<Hash256, CompileError> {
        hash_serde(self).map_err(|e| CompileError::Fingerprint(e.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("slot {slot}: output slot out of range or duplicated")]
    BadSlot { slot: usize },

    #[error("slot {slot}: {field} is outside the input schema")]
    FieldOutOfRange { slot: usize, field: FieldId },

    #[error("slot {slot}: unknown function '{func}'")]
    UnknownFunction { slot: usize, func: String },

    #[error("slot {slot}: '{func}' takes {expected} arguments, got {got}")]
    Arity {
        slot: usize,
        func: String,
        expected: String,
        got: usize,
    },

    #[error("slot {slot}: expression yields {actual}, output column '{column}' is {expected}")]
    TypeMismatch {
        slot: usize,
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("fingerprinting write plan: {0}")]
    Fingerprint(String),
}

/// A compiled routine. Stateless and shareable.
pub trait ExecutableProjector: Send + Sync {
    /// Evaluate logical rows `[start, end)` of `input`, writing row `r` at
    /// index `r - start` of each output slot.
    ///
    /// Returns the first row that could not be written because an output
    /// column ran out of room, or `end` when every row was written.
    fn project_records(
        &self,
        input: &RowBatch,
        outputs: &mut [Column],
        start: usize,
        end: usize,
    ) -> Result<usize, EvalError>;

    /// Number of output slots the routine writes.
    fn slots(&self) -> usize;
}

pub trait ProjectorCompiler: Send + Sync {
    fn compile(&self, plan: &WritePlan) -> Result<Arc<dyn ExecutableProjector>, CompileError>;
}
