//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `vproj-mem`. Only traits live here so
//! `Column` can carry its reservation without pulling in the allocator.

/// A guard returned by a memory budget when bytes are acquired.
///
/// Must release its bytes on Drop. Columns own their guard, so handing a
/// column to another batch hands over the accounting with it.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Debug tag for metrics/tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle representing a memory-cap enforcer.
///
/// Allocators call `try_acquire` before sizing a column. `None` means the
/// budget is exhausted and the allocation must fail.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;
}

// NOTE: Do *not* add default impls here that would silently "allow" allocations.
// The mem crate is the only place where guards should be constructed.
