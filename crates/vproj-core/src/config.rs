//! Projection configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-row byte estimate for variable-width output columns.
pub const DEFAULT_VAR_WIDTH_BYTES_PER_ROW: usize = 250;

/// Upper bound on the rows a single output column is sized for.
pub const DEFAULT_MAX_BATCH_ROWS: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Hard memory cap (in bytes) for output columns allocated by the operator.
    pub mem_cap_bytes: usize,

    /// Growth hint used to size variable-width output buffers.
    /// Under-predicting it is what produces remainders.
    pub var_width_bytes_per_row: usize,

    /// Row capacity ceiling of one output column.
    pub max_batch_rows: usize,

    /// When false, every explicit projection entry takes the evaluation path.
    pub enable_transfers: bool,

    /// Memoize compiled routines keyed by their write-plan hash.
    pub compile_cache: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 512 * 1024 * 1024, // 512 MiB default
            var_width_bytes_per_row: DEFAULT_VAR_WIDTH_BYTES_PER_ROW,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            enable_transfers: true,
            compile_cache: true,
        }
    }
}

impl ProjectConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `VPROJ_MEM_CAP_BYTES`: memory cap in bytes
    /// - `VPROJ_VAR_WIDTH_BYTES_PER_ROW`: variable-width growth hint
    /// - `VPROJ_MAX_BATCH_ROWS`: output row capacity ceiling
    /// - `VPROJ_ENABLE_TRANSFERS`: `true`/`false`
    /// - `VPROJ_COMPILE_CACHE`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("VPROJ_MEM_CAP_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.mem_cap_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("VPROJ_VAR_WIDTH_BYTES_PER_ROW") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.var_width_bytes_per_row = v;
            }
        }

        if let Ok(s) = std::env::var("VPROJ_MAX_BATCH_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_batch_rows = v;
            }
        }

        if let Ok(s) = std::env::var("VPROJ_ENABLE_TRANSFERS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.enable_transfers = v;
            }
        }

        if let Ok(s) = std::env::var("VPROJ_COMPILE_CACHE") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.compile_cache = v;
            }
        }

        cfg
    }

    /// Reject settings the operator cannot make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_rows == 0 {
            return Err(Error::Config("max_batch_rows must be > 0".into()));
        }
        if self.var_width_bytes_per_row == 0 {
            return Err(Error::Config(
                "var_width_bytes_per_row must be > 0".into(),
            ));
        }
        Ok(())
    }
}
