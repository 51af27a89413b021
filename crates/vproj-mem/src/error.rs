use thiserror::Error;

/// Result type local to vproj-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The budget cannot cover an output column of the requested size.
    #[error("output column '{column}' needs {requested} bytes; budget {capacity}, in use {used}")]
    BudgetExceeded {
        column: String,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("size of output column '{column}' overflows for {rows} rows")]
    SizeOverflow { column: String, rows: usize },
}
