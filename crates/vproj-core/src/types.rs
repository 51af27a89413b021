//! Columnar storage: `Scalar` values, capacity-bounded `Column`s, and the
//! row-aligned `RowBatch` that groups them.
//!
//! Columns are deliberately simple (a shared `Vec<Scalar>` plus a validity
//! side-channel encoded as `Scalar::Null`), but they carry the capacity model the projection
//! operator relies on: a row capacity, a byte capacity for variable-width data,
//! and the memory reservation that paid for them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::budget::BudgetGuard;
use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema, SelectionVectorMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    /// Logical type of the value; `None` for `Null`, which fits any type.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Bytes the value occupies in a variable-width data buffer.
    pub fn var_width_len(&self) -> usize {
        match self {
            Scalar::Str(s) => s.len(),
            Scalar::Bin(b) => b.len(),
            _ => 0,
        }
    }
}

/// Memory accounting that travels with a column's storage.
pub struct Reservation(Box<dyn BudgetGuard>);

impl Reservation {
    pub fn new(guard: Box<dyn BudgetGuard>) -> Self {
        Self(guard)
    }

    pub fn bytes(&self) -> usize {
        self.0.bytes()
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("tag", &self.0.tag())
            .field("bytes", &self.0.bytes())
            .finish()
    }
}

/// One typed columnar buffer.
///
/// Invariants:
/// - `len() <= row_capacity()`.
/// - for variable-width types, `bytes_used() <= byte_capacity()`.
/// - values are written in order; `try_set` only appends.
///
/// `offset` opens a window onto the stored values; everything public is
/// expressed relative to it. Only transferred columns ever slide the window.
///
/// Storage is reference counted. Cloning a column shares its values; the
/// first write through a shared handle copies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    values: Arc<Vec<Scalar>>,
    offset: usize,
    row_capacity: usize,
    byte_capacity: Option<usize>,
    bytes_used: usize,
    #[serde(skip)]
    reservation: Option<Reservation>,
}

impl Clone for Column {
    /// Shares the values; the handle is not accounted against any budget.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data_type: self.data_type,
            nullable: self.nullable,
            values: Arc::clone(&self.values),
            offset: self.offset,
            row_capacity: self.row_capacity,
            byte_capacity: self.byte_capacity,
            bytes_used: self.bytes_used,
            reservation: None,
        }
    }
}

impl Column {
    /// Build a fully populated column without type checks. Meant for sources
    /// and tests; capacity equals the number of values.
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Scalar>) -> Self {
        let bytes_used = values.iter().map(Scalar::var_width_len).sum();
        let row_capacity = values.len();
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            byte_capacity: data_type.is_variable_width().then_some(bytes_used),
            values: Arc::new(values),
            offset: 0,
            row_capacity,
            bytes_used,
            reservation: None,
        }
    }

    /// Build a fully populated column, checking every value against `field`.
    pub fn try_new(field: &Field, values: Vec<Scalar>) -> Result<Self> {
        let mut col = Self::with_capacity(field, values.len(), None);
        for (idx, v) in values.into_iter().enumerate() {
            col.check_value(&v)?;
            col.bytes_used += v.var_width_len();
            debug_assert_eq!(idx, col.values.len());
            Arc::make_mut(&mut col.values).push(v);
        }
        if field.data_type.is_variable_width() {
            col.byte_capacity = Some(col.bytes_used);
        }
        Ok(col)
    }

    /// Empty column sized for `rows` values. `byte_capacity` bounds the
    /// variable-width data buffer; `None` leaves it unbounded.
    pub fn with_capacity(field: &Field, rows: usize, byte_capacity: Option<usize>) -> Self {
        Self {
            name: field.name.clone(),
            data_type: field.data_type,
            nullable: field.nullable,
            values: Arc::new(Vec::with_capacity(rows)),
            offset: 0,
            row_capacity: rows,
            byte_capacity: if field.data_type.is_variable_width() {
                byte_capacity
            } else {
                None
            },
            bytes_used: 0,
            reservation: None,
        }
    }

    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }

    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.data_type, self.nullable)
    }

    /// Visible value count.
    pub fn len(&self) -> usize {
        self.values.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values physically held, including any rows before the window.
    pub fn stored_len(&self) -> usize {
        self.values.len()
    }

    /// Whether both columns read the same storage.
    pub fn shares_storage(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    pub fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    pub fn byte_capacity(&self) -> Option<usize> {
        self.byte_capacity
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn reserved_bytes(&self) -> usize {
        self.reservation.as_ref().map(Reservation::bytes).unwrap_or(0)
    }

    pub fn get(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(self.offset + idx)
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values[self.offset..]
    }

    fn check_value(&self, value: &Scalar) -> Result<()> {
        match value.data_type() {
            None if !self.nullable => Err(Error::NullViolation(self.name.clone())),
            None => Ok(()),
            Some(dt) if dt == self.data_type => Ok(()),
            Some(dt) => Err(Error::TypeMismatch {
                column: self.name.clone(),
                expected: self.data_type,
                actual: dt.to_string(),
            }),
        }
    }

    /// Write `value` at `index`, which must be the next free slot.
    ///
    /// Returns `Ok(false)` when the column has no room left (row capacity or
    /// variable-width byte capacity); the value is not written in that case.
    pub fn try_set(&mut self, index: usize, value: Scalar) -> Result<bool> {
        if index != self.len() {
            return Err(Error::Invariant(format!(
                "column '{}' written out of order: index {index}, next slot {}",
                self.name,
                self.len()
            )));
        }
        if index >= self.row_capacity {
            return Ok(false);
        }
        self.check_value(&value)?;
        let width = value.var_width_len();
        if let Some(cap) = self.byte_capacity {
            if self.bytes_used + width > cap {
                return Ok(false);
            }
        }
        self.bytes_used += width;
        Arc::make_mut(&mut self.values).push(value);
        Ok(true)
    }

    /// Finalize the visible value count, dropping anything written past it.
    pub fn set_value_count(&mut self, count: usize) -> Result<()> {
        if count > self.len() {
            return Err(Error::Invariant(format!(
                "column '{}' value count {count} exceeds written values {}",
                self.name,
                self.len()
            )));
        }
        let dropped: usize = self.values[self.offset + count..]
            .iter()
            .map(Scalar::var_width_len)
            .sum();
        if count < self.len() {
            Arc::make_mut(&mut self.values).truncate(self.offset + count);
        }
        self.bytes_used -= dropped;
        Ok(())
    }

    /// Advance the visible window by `rows` without touching storage.
    pub fn slide(&mut self, rows: usize) {
        self.offset = (self.offset + rows).min(self.values.len());
    }

    /// Hand this column's storage (and its reservation) to a new column named
    /// `name`. `self` is left empty with zero capacity.
    pub fn transfer_to(&mut self, name: impl Into<String>) -> Column {
        Column {
            name: name.into(),
            data_type: self.data_type,
            nullable: self.nullable,
            values: std::mem::take(&mut self.values),
            offset: std::mem::take(&mut self.offset),
            row_capacity: std::mem::take(&mut self.row_capacity),
            byte_capacity: self.byte_capacity.take(),
            bytes_used: std::mem::take(&mut self.bytes_used),
            reservation: self.reservation.take(),
        }
    }

    /// Release storage and reservation; name and type are kept.
    pub fn clear(&mut self) {
        self.values = Arc::default();
        self.offset = 0;
        self.row_capacity = 0;
        self.byte_capacity = self.byte_capacity.map(|_| 0);
        self.bytes_used = 0;
        self.reservation = None;
    }
}

/// Row-aligned collection of columns.
///
/// `row_count` is authoritative: it is what consumers read, even when some
/// columns physically hold more values (see transferred columns).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowBatch {
    pub columns: Vec<Column>,
    row_count: usize,
    selection: Option<Vec<u32>>,
}

impl RowBatch {
    /// Dense batch; the row count is taken from the first column.
    pub fn new(columns: Vec<Column>) -> Self {
        let row_count = columns.first().map(|c| c.len()).unwrap_or(0);
        Self {
            columns,
            row_count,
            selection: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach a selection vector; only the listed physical rows are logically
    /// present, in the listed order.
    pub fn with_selection(mut self, selection: Vec<u32>) -> Self {
        self.row_count = selection.len();
        self.selection = Some(selection);
        self
    }

    pub fn num_rows(&self) -> usize {
        self.row_count
    }

    pub fn set_row_count(&mut self, rows: usize) {
        self.row_count = rows;
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn selection(&self) -> Option<&[u32]> {
        self.selection.as_deref()
    }

    pub fn take_selection(&mut self) -> Option<Vec<u32>> {
        self.selection.take()
    }

    /// Physical row backing logical row `row`.
    pub fn physical_row(&self, row: usize) -> usize {
        match &self.selection {
            Some(sel) => sel[row] as usize,
            None => row,
        }
    }

    pub fn schema(&self) -> Schema {
        let mode = if self.selection.is_some() {
            SelectionVectorMode::Indirect
        } else {
            SelectionVectorMode::None
        };
        Schema::new(self.columns.iter().map(Column::field).collect()).with_selection(mode)
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_mut(&mut self, idx: usize) -> Option<&mut Column> {
        self.columns.get_mut(idx)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Logical value at (`col`, `row`), following the selection vector.
    pub fn value(&self, col: usize, row: usize) -> Option<&Scalar> {
        if row >= self.row_count {
            return None;
        }
        self.columns.get(col)?.get(self.physical_row(row))
    }

    /// Logical row `row` across all columns.
    pub fn row(&self, row: usize) -> Option<Vec<Scalar>> {
        (0..self.columns.len())
            .map(|c| self.value(c, row).cloned())
            .collect()
    }

    pub fn reserved_bytes(&self) -> usize {
        self.columns.iter().map(Column::reserved_bytes).sum()
    }

    /// Release every column's storage. Names and types survive so the schema
    /// stays stable for the batch's lifetime.
    pub fn clear(&mut self) {
        for col in &mut self.columns {
            col.clear();
        }
        self.row_count = 0;
        self.selection = None;
    }
}
