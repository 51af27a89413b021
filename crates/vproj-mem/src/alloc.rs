//! Capacity-bounded column allocation on top of the hard MemoryBudget.
//!
//! Output columns are sized here: fixed-width columns get exactly the rows
//! requested (capped by `max_rows`), variable-width columns additionally get a
//! data buffer of `rows * bytes_per_row_hint` bytes. A hint that is too small
//! is not an error; the writer simply runs out of room and the operator
//! resumes on the next pull.

use vproj_core::budget::MemoryBudget;
use vproj_core::schema::Field;
use vproj_core::types::Column;

use crate::error::{Error, Result};
use crate::guard::{BudgetGuardImpl, MemoryBudgetImpl};

const OFFSET_WIDTH: usize = 4;

/// Allocation capability handed to operators.
pub trait ColumnAllocator: Send + Sync {
    /// Allocate an empty column for `field` sized for `row_hint` rows.
    /// `bytes_per_row_hint` only matters for variable-width types.
    fn allocate(&self, field: &Field, row_hint: usize, bytes_per_row_hint: usize)
        -> Result<Column>;
}

/// Bytes a column of `rows` rows will be charged for, and the data-buffer
/// capacity for variable-width types.
pub fn column_footprint(
    field: &Field,
    rows: usize,
    bytes_per_row_hint: usize,
) -> Option<(usize, Option<usize>)> {
    let validity = if field.nullable { rows.div_ceil(8) } else { 0 };
    match field.data_type.fixed_width() {
        Some(width) => {
            let data = rows.checked_mul(width)?;
            Some((data.checked_add(validity)?, None))
        }
        None => {
            let data = rows.checked_mul(bytes_per_row_hint)?;
            let offsets = rows.checked_add(1)?.checked_mul(OFFSET_WIDTH)?;
            let total = data.checked_add(offsets)?.checked_add(validity)?;
            Some((total, Some(data)))
        }
    }
}

/// Allocator that charges every column against a shared budget.
pub struct BudgetAllocator<B: MemoryBudget<Guard = BudgetGuardImpl> = MemoryBudgetImpl> {
    budget: B,
    max_rows: usize,
}

impl<B: MemoryBudget<Guard = BudgetGuardImpl>> BudgetAllocator<B> {
    pub fn new(budget: B, max_rows: usize) -> Self {
        Self {
            budget,
            max_rows: max_rows.max(1),
        }
    }

    pub fn budget(&self) -> &B {
        &self.budget
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }
}

impl<B: MemoryBudget<Guard = BudgetGuardImpl>> ColumnAllocator for BudgetAllocator<B> {
    fn allocate(
        &self,
        field: &Field,
        row_hint: usize,
        bytes_per_row_hint: usize,
    ) -> Result<Column> {
        let rows = row_hint.min(self.max_rows);
        let (bytes, data_capacity) = column_footprint(field, rows, bytes_per_row_hint)
            .ok_or_else(|| Error::SizeOverflow {
                column: field.name.clone(),
                rows,
            })?;

        let guard = self
            .budget
            .try_acquire(bytes, "project.output")
            .ok_or_else(|| Error::BudgetExceeded {
                column: field.name.clone(),
                requested: bytes,
                capacity: self.budget.capacity_bytes(),
                used: self.budget.used_bytes(),
            })?;

        #[cfg(feature = "tracing")]
        tracing::trace!(column = %field.name, rows, bytes, "allocated output column");

        Ok(Column::with_capacity(field, rows, data_capacity).with_reservation(guard.into_reservation()))
    }
}
