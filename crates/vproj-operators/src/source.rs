//! In-memory upstream: replays a queue of prepared batches.

use std::collections::VecDeque;

use vproj_core::schema::Schema;
use vproj_core::types::RowBatch;

use crate::traits::{BatchSource, IterOutcome, OpError};

enum Item {
    Batch(RowBatch),
    Error(String),
}

/// Batches are announced as `OkNewSchema` whenever their schema differs from
/// the previous batch's (and for the first batch).
#[derive(Default)]
pub struct MemorySource {
    queue: VecDeque<Item>,
    current: RowBatch,
    schema: Option<Schema>,
    pulls: usize,
}

impl MemorySource {
    pub fn new(batches: Vec<RowBatch>) -> Self {
        let mut src = Self::default();
        for b in batches {
            src.push(b);
        }
        src
    }

    pub fn push(&mut self, batch: RowBatch) {
        self.queue.push_back(Item::Batch(batch));
    }

    /// Queue a failure; the pull that reaches it returns `OpError::Upstream`.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.queue.push_back(Item::Error(message.into()));
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Number of `next()` calls seen so far.
    pub fn pulls(&self) -> usize {
        self.pulls
    }
}

impl BatchSource for MemorySource {
    fn next(&mut self) -> Result<IterOutcome, OpError> {
        self.pulls += 1;
        match self.queue.pop_front() {
            None => {
                self.current.clear();
                Ok(IterOutcome::None)
            }
            Some(Item::Error(msg)) => Err(OpError::Upstream(msg)),
            Some(Item::Batch(batch)) => {
                let schema = batch.schema();
                let changed = self.schema.as_ref() != Some(&schema);
                self.schema = Some(schema);
                self.current = batch;
                Ok(if changed {
                    IterOutcome::OkNewSchema
                } else {
                    IterOutcome::Ok
                })
            }
        }
    }

    fn schema(&self) -> Schema {
        self.schema.clone().unwrap_or_else(Schema::empty)
    }

    fn batch(&self) -> &RowBatch {
        &self.current
    }

    fn batch_mut(&mut self) -> &mut RowBatch {
        &mut self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproj_core::schema::DataType;
    use vproj_core::types::{Column, Scalar};

    fn ints(name: &str, n: i32) -> RowBatch {
        RowBatch::new(vec![Column::new(
            name,
            DataType::Int32,
            (0..n).map(Scalar::I32).collect(),
        )])
    }

    #[test]
    fn announces_schema_changes() {
        let mut src = MemorySource::new(vec![ints("a", 3), ints("a", 2), ints("b", 1)]);
        assert_eq!(src.next().unwrap(), IterOutcome::OkNewSchema);
        assert_eq!(src.batch().num_rows(), 3);
        assert_eq!(src.next().unwrap(), IterOutcome::Ok);
        assert_eq!(src.next().unwrap(), IterOutcome::OkNewSchema);
        assert_eq!(src.schema().fields[0].name, "b");
        assert_eq!(src.next().unwrap(), IterOutcome::None);
        assert_eq!(src.pulls(), 4);
    }

    #[test]
    fn queued_errors_surface() {
        let mut src = MemorySource::new(vec![]);
        src.push_error("disk on fire");
        assert!(matches!(src.next(), Err(OpError::Upstream(m)) if m == "disk on fire"));
    }
}
