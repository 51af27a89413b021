//! Pull-based iterator contract shared by the projection operator, its
//! upstream, and whatever consumes its output.
//!
//! A consumer calls `next()`, then reads `batch()` (row count + columns).
//! The batch stays valid until the following `next()`. Consumers must not
//! assume one output batch per upstream batch: a remainder spreads one input
//! batch over several pulls.

use thiserror::Error;

use vproj_core::schema::Schema;
use vproj_core::types::RowBatch;
use vproj_planner::{EvalError, TypeError};

use crate::codegen::CompileError;

/// Materialization errors of one projection entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryError {
    pub index: usize,
    pub name: String,
    pub errors: Vec<TypeError>,
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msgs: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "entry {} ('{}'): {}", self.index, self.name, msgs.join("; "))
    }
}

fn join_entries(entries: &[EntryError]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum OpError {
    #[error("schema resolution failed:\n{}", join_entries(.0))]
    SchemaResolution(Vec<EntryError>),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("allocating output column '{column}': {source}")]
    Alloc {
        column: String,
        #[source]
        source: vproj_mem::Error,
    },

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("operator aborted after an earlier error")]
    Aborted,

    #[error("storage error: {0}")]
    Storage(#[from] vproj_core::error::Error),
}

/// Outcome of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterOutcome {
    /// A batch is ready; same schema as the previous one.
    Ok,
    /// A batch is ready and its schema differs from the previous one.
    OkNewSchema,
    /// The stream is exhausted.
    None,
}

impl IterOutcome {
    pub fn has_batch(&self) -> bool {
        !matches!(self, IterOutcome::None)
    }
}

/// Anything the projection operator can pull batches from.
pub trait BatchSource {
    fn next(&mut self) -> Result<IterOutcome, OpError>;

    /// Schema of the current batch.
    fn schema(&self) -> Schema;

    fn batch(&self) -> &RowBatch;

    /// Mutable access, used to take transferred columns and to release a
    /// batch once it is fully consumed.
    fn batch_mut(&mut self) -> &mut RowBatch;
}

impl<S: BatchSource + ?Sized> BatchSource for Box<S> {
    fn next(&mut self) -> Result<IterOutcome, OpError> {
        (**self).next()
    }

    fn schema(&self) -> Schema {
        (**self).schema()
    }

    fn batch(&self) -> &RowBatch {
        (**self).batch()
    }

    fn batch_mut(&mut self) -> &mut RowBatch {
        (**self).batch_mut()
    }
}
